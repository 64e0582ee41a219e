use std::sync::Arc;

use chrono::Utc;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, DatabaseConnection, EntityTrait, QueryFilter, QueryOrder, Set,
};
use serde::Deserialize;
use tracing::instrument;
use uuid::Uuid;
use validator::Validate;

use crate::{entities::category, errors::ServiceError};

#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewCategory {
    #[validate(length(min = 1, max = 100))]
    pub name_en: String,
    #[validate(length(min = 1, max = 100))]
    pub name_ar: String,
    #[serde(default)]
    pub description: String,
}

/// Service for part categories.
#[derive(Clone)]
pub struct CategoryService {
    db: Arc<DatabaseConnection>,
}

impl CategoryService {
    pub fn new(db: Arc<DatabaseConnection>) -> Self {
        Self { db }
    }

    #[instrument(skip(self, new_category))]
    pub async fn create(&self, new_category: NewCategory) -> Result<category::Model, ServiceError> {
        new_category.validate()?;

        let created = category::ActiveModel {
            id: Set(Uuid::new_v4()),
            name_en: Set(new_category.name_en),
            name_ar: Set(new_category.name_ar),
            description: Set(new_category.description),
            is_active: Set(true),
            created_at: Set(Utc::now()),
            updated_at: Set(None),
        }
        .insert(&*self.db)
        .await?;
        Ok(created)
    }

    pub async fn get(&self, category_id: Uuid) -> Result<category::Model, ServiceError> {
        category::Entity::find_by_id(category_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Category {} not found", category_id)))
    }

    /// Active categories, ordered by English name.
    pub async fn list_active(&self) -> Result<Vec<category::Model>, ServiceError> {
        let categories = category::Entity::find()
            .filter(category::Column::IsActive.eq(true))
            .order_by_asc(category::Column::NameEn)
            .all(&*self.db)
            .await?;
        Ok(categories)
    }
}
