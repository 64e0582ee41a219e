use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::localization::Localized;

/// Physical condition of a part.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PartCondition {
    #[sea_orm(string_value = "excellent")]
    Excellent,
    #[sea_orm(string_value = "good")]
    Good,
    #[sea_orm(string_value = "fair")]
    Fair,
    #[sea_orm(string_value = "damaged")]
    Damaged,
    #[sea_orm(string_value = "out_of_order")]
    OutOfOrder,
}

impl PartCondition {
    /// Only parts in these conditions may leave the lab.
    pub fn is_lendable(self) -> bool {
        matches!(self, PartCondition::Excellent | PartCondition::Good)
    }
}

/// Availability status of a part.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum PartStatus {
    #[sea_orm(string_value = "available")]
    Available,
    #[sea_orm(string_value = "borrowed")]
    Borrowed,
    #[sea_orm(string_value = "maintenance")]
    Maintenance,
    #[sea_orm(string_value = "discontinued")]
    Discontinued,
}

/// The `parts` table: one row per catalog entry, with quantity counters
/// that only the inventory ledger mutates.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "parts")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub name_en: String,
    pub name_ar: String,
    pub description_en: String,
    pub description_ar: String,

    pub category_id: Uuid,
    #[sea_orm(unique)]
    pub part_number: String,
    pub manufacturer: Option<String>,
    pub model: Option<String>,

    pub total_quantity: i32,
    pub available_quantity: i32,
    pub minimum_stock: i32,

    pub condition: PartCondition,
    pub status: PartStatus,

    pub storage_location: Option<String>,
    pub purchase_price: Option<Decimal>,

    pub added_by: Option<Uuid>,
    pub notes: Option<String>,
    pub is_active: bool,

    /// Optimistic-lock counter; bumped on every ledger mutation.
    pub version: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn name(&self) -> Localized {
        Localized::new(self.name_en.clone(), self.name_ar.clone())
    }

    pub fn description(&self) -> Localized {
        Localized::new(self.description_en.clone(), self.description_ar.clone())
    }

    pub fn is_low_stock(&self) -> bool {
        self.available_quantity <= self.minimum_stock
    }

    /// A part can be handed out only when it is active, in stock, in
    /// lendable condition, and not pulled from circulation.
    pub fn is_borrowable(&self) -> bool {
        self.status == PartStatus::Available
            && self.available_quantity > 0
            && self.condition.is_lendable()
            && self.is_active
    }

    pub fn can_borrow(&self, quantity: i32) -> bool {
        self.is_borrowable() && self.available_quantity >= quantity
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::category::Entity",
        from = "Column::CategoryId",
        to = "super::category::Column::Id"
    )]
    Category,
    #[sea_orm(has_many = "super::inventory_transaction::Entity")]
    Transactions,
    #[sea_orm(has_many = "super::borrow_record::Entity")]
    BorrowRecords,
}

impl Related<super::category::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Category.def()
    }
}

impl Related<super::inventory_transaction::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Transactions.def()
    }
}

impl Related<super::borrow_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::BorrowRecords.def()
    }
}

#[async_trait]
impl ActiveModelBehavior for ActiveModel {
    async fn before_save<C: ConnectionTrait>(self, _db: &C, insert: bool) -> Result<Self, DbErr>
    where
        C: ConnectionTrait,
    {
        let mut active_model = self;
        if insert {
            if let ActiveValue::NotSet = active_model.created_at {
                active_model.created_at = Set(Utc::now());
            }
        } else {
            active_model.updated_at = Set(Some(Utc::now()));
        }
        Ok(active_model)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn part(available: i32, condition: PartCondition, status: PartStatus) -> Model {
        Model {
            id: Uuid::new_v4(),
            name_en: "Arduino Uno R3".into(),
            name_ar: "أردوينو أونو".into(),
            description_en: String::new(),
            description_ar: String::new(),
            category_id: Uuid::new_v4(),
            part_number: "ARD-UNO-R3".into(),
            manufacturer: None,
            model: None,
            total_quantity: 10,
            available_quantity: available,
            minimum_stock: 2,
            condition,
            status,
            storage_location: None,
            purchase_price: None,
            added_by: None,
            notes: None,
            is_active: true,
            version: 1,
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn borrowable_requires_stock_condition_and_status() {
        assert!(part(3, PartCondition::Good, PartStatus::Available).is_borrowable());
        assert!(!part(0, PartCondition::Good, PartStatus::Available).is_borrowable());
        assert!(!part(3, PartCondition::Fair, PartStatus::Available).is_borrowable());
        assert!(!part(3, PartCondition::Good, PartStatus::Maintenance).is_borrowable());

        let mut inactive = part(3, PartCondition::Excellent, PartStatus::Available);
        inactive.is_active = false;
        assert!(!inactive.is_borrowable());
    }

    #[test]
    fn can_borrow_checks_requested_quantity() {
        let p = part(3, PartCondition::Excellent, PartStatus::Available);
        assert!(p.can_borrow(3));
        assert!(!p.can_borrow(4));
    }

    #[test]
    fn low_stock_at_or_below_minimum() {
        assert!(part(2, PartCondition::Good, PartStatus::Available).is_low_stock());
        assert!(!part(5, PartCondition::Good, PartStatus::Available).is_low_stock());
    }
}
