use async_trait::async_trait;
use chrono::{DateTime, Utc};
use rust_decimal::Decimal;
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Condition of a line item at hand-out or hand-back time.
///
/// `Missing` only ever appears on the returned side.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RecordCondition {
    #[default]
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
    #[sea_orm(string_value = "missing")]
    Missing,
}

impl RecordCondition {
    pub fn counts_as_damage(self) -> bool {
        matches!(
            self,
            RecordCondition::Damaged | RecordCondition::OutOfOrder | RecordCondition::Missing
        )
    }

    /// The physical part condition a returned item maps to for the ledger.
    /// Missing units are written off as damaged stock; the record itself
    /// keeps `Missing` for replacement-cost reporting.
    pub fn as_part_condition(self) -> crate::entities::part::PartCondition {
        use crate::entities::part::PartCondition;
        match self {
            RecordCondition::Excellent => PartCondition::Excellent,
            RecordCondition::Good => PartCondition::Good,
            RecordCondition::Fair => PartCondition::Fair,
            RecordCondition::Damaged | RecordCondition::Missing => PartCondition::Damaged,
            RecordCondition::OutOfOrder => PartCondition::OutOfOrder,
        }
    }
}

/// One line item of a borrow request. Part identity is carried as text so
/// requests can name parts the inventory does not track; `part_id` links
/// the record to the ledger when it does.
#[derive(Clone, Debug, PartialEq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "borrow_records")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub request_id: Uuid,
    pub part_id: Option<Uuid>,

    pub part_name: String,
    pub part_number: String,
    #[sea_orm(column_type = "Text")]
    pub part_description: String,

    pub quantity: i32,
    pub unit_cost: Option<Decimal>,

    pub condition_borrowed: RecordCondition,
    pub condition_returned: Option<RecordCondition>,
    pub damage_description: Option<String>,
    pub replacement_cost: Option<Decimal>,

    /// Serial numbers of the specific units handed out, when tracked.
    pub serial_numbers: Json,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn is_damaged(&self) -> bool {
        self.condition_returned
            .map(RecordCondition::counts_as_damage)
            .unwrap_or(false)
    }

    /// Value of the borrowed units, when a unit cost is on file.
    pub fn total_value(&self) -> Option<Decimal> {
        self.unit_cost.map(|cost| cost * Decimal::from(self.quantity))
    }

    pub fn damage_cost(&self) -> Option<Decimal> {
        if self.is_damaged() {
            self.replacement_cost
        } else {
            None
        }
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(
        belongs_to = "super::borrow_request::Entity",
        from = "Column::RequestId",
        to = "super::borrow_request::Column::Id"
    )]
    Request,
    #[sea_orm(
        belongs_to = "super::part::Entity",
        from = "Column::PartId",
        to = "super::part::Column::Id"
    )]
    Part,
}

impl Related<super::borrow_request::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Request.def()
    }
}

impl Related<super::part::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Part.def()
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
    use rust_decimal_macros::dec;

    fn record(quantity: i32) -> Model {
        Model {
            id: Uuid::new_v4(),
            request_id: Uuid::new_v4(),
            part_id: None,
            part_name: "HC-SR04".into(),
            part_number: "SEN-HCSR04".into(),
            part_description: String::new(),
            quantity,
            unit_cost: Some(dec!(3.50)),
            condition_borrowed: RecordCondition::Excellent,
            condition_returned: None,
            damage_description: None,
            replacement_cost: Some(dec!(5.00)),
            serial_numbers: serde_json::json!([]),
            created_at: Utc::now(),
            updated_at: None,
        }
    }

    #[test]
    fn total_value_multiplies_unit_cost() {
        assert_eq!(record(4).total_value(), Some(dec!(14.00)));
    }

    #[test]
    fn damage_cost_only_for_damaged_returns() {
        let mut rec = record(1);
        assert_eq!(rec.damage_cost(), None);

        rec.condition_returned = Some(RecordCondition::Good);
        assert_eq!(rec.damage_cost(), None);

        rec.condition_returned = Some(RecordCondition::Missing);
        assert_eq!(rec.damage_cost(), Some(dec!(5.00)));
    }
}
