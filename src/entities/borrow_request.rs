use async_trait::async_trait;
use chrono::{DateTime, NaiveDate, Utc};
use sea_orm::entity::prelude::*;
use sea_orm::{ActiveValue, Set};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Lifecycle states of a borrow request.
///
/// The transition table below is the single authority on which status
/// changes are legal; every workflow operation consults it before writing.
#[derive(
    Clone, Copy, Debug, PartialEq, Eq, Hash, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(20))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum RequestStatus {
    #[sea_orm(string_value = "draft")]
    Draft,
    #[sea_orm(string_value = "submitted")]
    Submitted,
    #[sea_orm(string_value = "approved")]
    Approved,
    #[sea_orm(string_value = "rejected")]
    Rejected,
    #[sea_orm(string_value = "borrowed")]
    Borrowed,
    #[sea_orm(string_value = "returned")]
    Returned,
    #[sea_orm(string_value = "overdue")]
    Overdue,
    #[sea_orm(string_value = "damaged")]
    Damaged,
    #[sea_orm(string_value = "cancelled")]
    Cancelled,
}

impl RequestStatus {
    /// Statuses this one may move to. Empty slice means terminal.
    pub fn allowed_transitions(self) -> &'static [RequestStatus] {
        use RequestStatus::*;
        match self {
            Draft => &[Submitted, Cancelled],
            Submitted => &[Approved, Rejected, Cancelled],
            Approved => &[Borrowed, Cancelled],
            Rejected => &[],
            Borrowed => &[Returned, Overdue, Damaged],
            Returned => &[],
            Overdue => &[Returned, Damaged],
            Damaged => &[Returned],
            Cancelled => &[],
        }
    }

    pub fn can_transition_to(self, target: RequestStatus) -> bool {
        self.allowed_transitions().contains(&target)
    }

    pub fn is_terminal(self) -> bool {
        self.allowed_transitions().is_empty()
    }
}

/// How urgently the requester needs the parts.
#[derive(
    Clone, Copy, Debug, Default, PartialEq, Eq, EnumIter, DeriveActiveEnum, Serialize, Deserialize, strum::Display,
)]
#[sea_orm(rs_type = "String", db_type = "String(StringLen::N(10))")]
#[serde(rename_all = "snake_case")]
#[strum(serialize_all = "snake_case")]
pub enum Urgency {
    #[sea_orm(string_value = "low")]
    Low,
    #[default]
    #[sea_orm(string_value = "normal")]
    Normal,
    #[sea_orm(string_value = "high")]
    High,
    #[sea_orm(string_value = "urgent")]
    Urgent,
}

/// The `borrow_requests` table.
#[derive(Clone, Debug, PartialEq, Eq, DeriveEntityModel, Serialize, Deserialize)]
#[sea_orm(table_name = "borrow_requests")]
pub struct Model {
    #[sea_orm(primary_key, auto_increment = false)]
    pub id: Uuid,

    pub requester_id: Uuid,
    #[sea_orm(column_type = "Text")]
    pub purpose: String,
    pub expected_return_date: NaiveDate,
    pub urgency: Urgency,
    pub status: RequestStatus,

    pub approved_by: Option<Uuid>,
    pub approval_date: Option<DateTime<Utc>>,
    pub rejection_reason: Option<String>,

    pub borrowed_date: Option<DateTime<Utc>>,
    pub actual_return_date: Option<DateTime<Utc>>,

    pub staff_notes: Option<String>,
    pub requester_notes: Option<String>,

    pub version: i32,

    pub created_at: DateTime<Utc>,
    pub updated_at: Option<DateTime<Utc>>,
}

impl Model {
    pub fn is_overdue(&self, today: NaiveDate) -> bool {
        self.status == RequestStatus::Borrowed && today > self.expected_return_date
    }

    pub fn can_be_cancelled(&self) -> bool {
        matches!(
            self.status,
            RequestStatus::Draft | RequestStatus::Submitted
        )
    }
}

#[derive(Copy, Clone, Debug, EnumIter, DeriveRelation)]
pub enum Relation {
    #[sea_orm(has_many = "super::borrow_record::Entity")]
    Records,
    #[sea_orm(has_many = "super::request_history::Entity")]
    History,
}

impl Related<super::borrow_record::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::Records.def()
    }
}

impl Related<super::request_history::Entity> for Entity {
    fn to() -> RelationDef {
        Relation::History.def()
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
    use super::RequestStatus::*;
    use super::*;

    #[test]
    fn legal_transitions() {
        assert!(Draft.can_transition_to(Submitted));
        assert!(Draft.can_transition_to(Cancelled));
        assert!(Submitted.can_transition_to(Approved));
        assert!(Submitted.can_transition_to(Rejected));
        assert!(Submitted.can_transition_to(Cancelled));
        assert!(Approved.can_transition_to(Borrowed));
        assert!(Approved.can_transition_to(Cancelled));
        assert!(Borrowed.can_transition_to(Returned));
        assert!(Borrowed.can_transition_to(Overdue));
        assert!(Borrowed.can_transition_to(Damaged));
        assert!(Overdue.can_transition_to(Returned));
        assert!(Overdue.can_transition_to(Damaged));
        assert!(Damaged.can_transition_to(Returned));
    }

    #[test]
    fn terminal_states_allow_nothing() {
        for terminal in [Rejected, Returned, Cancelled] {
            assert!(terminal.is_terminal());
            for target in [
                Draft, Submitted, Approved, Rejected, Borrowed, Returned, Overdue, Damaged,
                Cancelled,
            ] {
                assert!(!terminal.can_transition_to(target));
            }
        }
    }

    #[test]
    fn skipping_states_is_illegal() {
        assert!(!Draft.can_transition_to(Approved));
        assert!(!Submitted.can_transition_to(Borrowed));
        assert!(!Approved.can_transition_to(Returned));
        assert!(!Borrowed.can_transition_to(Cancelled));
        assert!(!Overdue.can_transition_to(Cancelled));
    }

    #[test]
    fn overdue_only_while_borrowed_past_due() {
        let mut request = Model {
            id: Uuid::new_v4(),
            requester_id: Uuid::new_v4(),
            purpose: "Line follower project".into(),
            expected_return_date: NaiveDate::from_ymd_opt(2026, 3, 1).unwrap(),
            urgency: Urgency::Normal,
            status: Borrowed,
            approved_by: None,
            approval_date: None,
            rejection_reason: None,
            borrowed_date: None,
            actual_return_date: None,
            staff_notes: None,
            requester_notes: None,
            version: 1,
            created_at: Utc::now(),
            updated_at: None,
        };
        let after_due = NaiveDate::from_ymd_opt(2026, 3, 2).unwrap();
        assert!(request.is_overdue(after_due));
        assert!(!request.is_overdue(request.expected_return_date));

        request.status = Returned;
        assert!(!request.is_overdue(after_due));
    }
}
