use std::sync::Arc;

use chrono::Utc;
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, Condition, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use serde::Deserialize;
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    entities::category,
    entities::inventory_transaction::{self, TransactionType},
    entities::part::{self, PartCondition, PartStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

/// Payload for adding a part to the catalog.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewPart {
    #[validate(length(min = 1, max = 200))]
    pub name_en: String,
    #[validate(length(min = 1, max = 200))]
    pub name_ar: String,
    #[serde(default)]
    pub description_en: String,
    #[serde(default)]
    pub description_ar: String,
    pub category_id: Uuid,
    #[validate(length(min = 1, max = 100))]
    pub part_number: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub total_quantity: i32,
    pub minimum_stock: Option<i32>,
    #[serde(default = "default_condition")]
    pub condition: PartCondition,
    pub storage_location: Option<String>,
    pub purchase_price: Option<Decimal>,
    pub notes: Option<String>,
    pub added_by: Option<Uuid>,
}

fn default_condition() -> PartCondition {
    PartCondition::Excellent
}

/// Catalog metadata fields staff may edit after creation. Quantity
/// counters are off limits here; those belong to the ledger.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartUpdate {
    pub description_en: Option<String>,
    pub description_ar: Option<String>,
    pub manufacturer: Option<String>,
    pub model: Option<String>,
    pub minimum_stock: Option<i32>,
    pub storage_location: Option<String>,
    pub notes: Option<String>,
    pub is_active: Option<bool>,
}

/// Filters for the part list query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct PartFilter {
    /// Substring match against names and the part number.
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub status: Option<PartStatus>,
    pub condition: Option<PartCondition>,
}

/// Service for the parts catalog.
#[derive(Clone)]
pub struct PartService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl PartService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Adds a part to the catalog with its opening stock, recording the
    /// intake as the part's first ledger entry.
    #[instrument(skip(self, new_part), fields(part_number = %new_part.part_number))]
    pub async fn create(&self, new_part: NewPart) -> Result<part::Model, ServiceError> {
        new_part.validate()?;
        if new_part.total_quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Total quantity must be greater than 0".into(),
            ));
        }
        if new_part
            .minimum_stock
            .is_some_and(|minimum| minimum < 0)
        {
            return Err(ServiceError::ValidationError(
                "Minimum stock cannot be negative".into(),
            ));
        }

        let created = self
            .db
            .transaction::<_, part::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    category::Entity::find_by_id(new_part.category_id)
                        .one(txn)
                        .await?
                        .ok_or_else(|| {
                            ServiceError::NotFound(format!(
                                "Category {} not found",
                                new_part.category_id
                            ))
                        })?;

                    let duplicate = part::Entity::find()
                        .filter(part::Column::PartNumber.eq(new_part.part_number.clone()))
                        .one(txn)
                        .await?;
                    if duplicate.is_some() {
                        return Err(ServiceError::Conflict(format!(
                            "Part number '{}' already exists",
                            new_part.part_number
                        )));
                    }

                    let part = part::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        name_en: Set(new_part.name_en.clone()),
                        name_ar: Set(new_part.name_ar.clone()),
                        description_en: Set(new_part.description_en.clone()),
                        description_ar: Set(new_part.description_ar.clone()),
                        category_id: Set(new_part.category_id),
                        part_number: Set(new_part.part_number.clone()),
                        manufacturer: Set(new_part.manufacturer.clone()),
                        model: Set(new_part.model.clone()),
                        total_quantity: Set(new_part.total_quantity),
                        available_quantity: Set(new_part.total_quantity),
                        minimum_stock: Set(new_part.minimum_stock.unwrap_or(1)),
                        condition: Set(new_part.condition),
                        status: Set(PartStatus::Available),
                        storage_location: Set(new_part.storage_location.clone()),
                        purchase_price: Set(new_part.purchase_price),
                        added_by: Set(new_part.added_by),
                        notes: Set(new_part.notes.clone()),
                        is_active: Set(true),
                        version: Set(1),
                        created_at: Set(Utc::now()),
                        updated_at: Set(None),
                    }
                    .insert(txn)
                    .await?;

                    inventory_transaction::ActiveModel {
                        id: Set(Uuid::new_v4()),
                        part_id: Set(part.id),
                        transaction_type: Set(TransactionType::Add),
                        quantity: Set(part.total_quantity),
                        previous_quantity: Set(0),
                        new_quantity: Set(part.total_quantity),
                        performed_by: Set(new_part.added_by),
                        reason: Set("Initial inventory addition".into()),
                        reference_id: Set(None),
                        created_at: Set(Utc::now()),
                    }
                    .insert(txn)
                    .await?;

                    Ok(part)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        self.event_sender
            .send(Event::PartCreated(created.id))
            .await
            .map_err(ServiceError::EventError)?;

        info!(part_id = %created.id, "Part added to catalog");
        Ok(created)
    }

    /// Updates catalog metadata on a part.
    #[instrument(skip(self, update), fields(part_id = %part_id))]
    pub async fn update(
        &self,
        part_id: Uuid,
        update: PartUpdate,
    ) -> Result<part::Model, ServiceError> {
        if update.minimum_stock.is_some_and(|minimum| minimum < 0) {
            return Err(ServiceError::ValidationError(
                "Minimum stock cannot be negative".into(),
            ));
        }

        let current = self.get(part_id).await?;
        let mut active: part::ActiveModel = current.into();
        if let Some(description_en) = update.description_en {
            active.description_en = Set(description_en);
        }
        if let Some(description_ar) = update.description_ar {
            active.description_ar = Set(description_ar);
        }
        if let Some(manufacturer) = update.manufacturer {
            active.manufacturer = Set(Some(manufacturer));
        }
        if let Some(model) = update.model {
            active.model = Set(Some(model));
        }
        if let Some(minimum_stock) = update.minimum_stock {
            active.minimum_stock = Set(minimum_stock);
        }
        if let Some(storage_location) = update.storage_location {
            active.storage_location = Set(Some(storage_location));
        }
        if let Some(notes) = update.notes {
            active.notes = Set(Some(notes));
        }
        if let Some(is_active) = update.is_active {
            active.is_active = Set(is_active);
        }

        let updated = active.update(&*self.db).await?;
        Ok(updated)
    }

    pub async fn get(&self, part_id: Uuid) -> Result<part::Model, ServiceError> {
        part::Entity::find_by_id(part_id)
            .one(&*self.db)
            .await?
            .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", part_id)))
    }

    /// Lists catalog parts matching the filter.
    pub async fn list(
        &self,
        filter: PartFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<part::Model>, u64), ServiceError> {
        let mut query = part::Entity::find();
        if let Some(search) = filter.search.filter(|s| !s.trim().is_empty()) {
            query = query.filter(
                Condition::any()
                    .add(part::Column::NameEn.contains(search.as_str()))
                    .add(part::Column::NameAr.contains(search.as_str()))
                    .add(part::Column::PartNumber.contains(search.as_str())),
            );
        }
        if let Some(category_id) = filter.category_id {
            query = query.filter(part::Column::CategoryId.eq(category_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(part::Column::Status.eq(status));
        }
        if let Some(condition) = filter.condition {
            query = query.filter(part::Column::Condition.eq(condition));
        }

        let paginator = query
            .order_by_asc(part::Column::PartNumber)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let parts = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((parts, total))
    }
}
