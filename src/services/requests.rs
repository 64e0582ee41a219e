use std::collections::{HashMap, HashSet};
use std::sync::Arc;

use chrono::{Duration, NaiveDate, Utc};
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};
use rust_decimal::Decimal;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, QuerySelect, Set, TransactionTrait,
};
use serde::{Deserialize, Serialize};
use tracing::{info, instrument};
use uuid::Uuid;
use validator::Validate;

use crate::{
    config::BorrowPolicy,
    entities::borrow_record::{self, RecordCondition},
    entities::borrow_request::{self, RequestStatus, Urgency},
    entities::part,
    entities::request_history::{self, HistoryAction},
    errors::ServiceError,
    events::{Event, EventSender},
    services::inventory,
};

lazy_static! {
    static ref REQUEST_TRANSITIONS: IntCounterVec = register_int_counter_vec!(
        "borrowdesk_request_transitions_total",
        "Total number of borrow request status transitions",
        &["action"]
    )
    .expect("metric can be created");
}

/// Payload for creating a borrow request.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBorrowRequest {
    pub requester_id: Uuid,
    #[validate(length(
        min = 1,
        max = 2000,
        message = "Purpose must be between 1 and 2000 characters"
    ))]
    pub purpose: String,
    pub expected_return_date: NaiveDate,
    #[serde(default)]
    pub urgency: Urgency,
    pub requester_notes: Option<String>,
    pub items: Vec<NewBorrowItem>,
}

/// One requested line item. `part_id` links the item to the inventory
/// ledger; without it the item rides through the workflow as plain text.
#[derive(Debug, Clone, Deserialize, Validate)]
pub struct NewBorrowItem {
    pub part_id: Option<Uuid>,
    #[validate(length(
        min = 1,
        max = 200,
        message = "Part name must be between 1 and 200 characters"
    ))]
    pub part_name: String,
    #[serde(default)]
    pub part_number: String,
    #[serde(default)]
    pub part_description: String,
    pub quantity: i32,
    pub unit_cost: Option<Decimal>,
    #[serde(default)]
    pub condition: RecordCondition,
    #[serde(default)]
    pub serial_numbers: Vec<String>,
}

/// Observed state of one line item at hand-back time.
#[derive(Debug, Clone, Deserialize)]
pub struct ItemReturn {
    pub record_id: Uuid,
    #[serde(default)]
    pub condition: RecordCondition,
    pub damage_description: Option<String>,
    pub replacement_cost: Option<Decimal>,
}

/// Filters for the request list query.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RequestFilter {
    pub requester_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
    pub created_after: Option<chrono::DateTime<Utc>>,
    pub created_before: Option<chrono::DateTime<Utc>>,
}

/// A request together with its line items and audit trail.
#[derive(Debug, Clone, Serialize)]
pub struct RequestDetails {
    pub request: borrow_request::Model,
    pub records: Vec<borrow_record::Model>,
    pub history: Vec<request_history::Model>,
}

/// Per-status request counts, optionally scoped to one requester.
#[derive(Debug, Clone, Default, Serialize)]
pub struct RequestStats {
    pub total: u64,
    pub draft: u64,
    pub submitted: u64,
    pub approved: u64,
    pub borrowed: u64,
    pub overdue: u64,
    pub returned: u64,
    pub rejected: u64,
    pub damaged: u64,
    pub cancelled: u64,
}

async fn load_request<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
) -> Result<borrow_request::Model, ServiceError> {
    borrow_request::Entity::find_by_id(request_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Borrow request {} not found", request_id)))
}

/// The one place that consults the transition table before a status write.
fn ensure_transition(
    request: &borrow_request::Model,
    target: RequestStatus,
) -> Result<(), ServiceError> {
    if !request.status.can_transition_to(target) {
        return Err(ServiceError::InvalidTransition {
            from: request.status,
            to: target,
        });
    }
    Ok(())
}

/// Version-guarded request update; returns the refreshed row.
async fn update_request_guarded<C: ConnectionTrait>(
    conn: &C,
    current: &borrow_request::Model,
    changes: borrow_request::ActiveModel,
) -> Result<borrow_request::Model, ServiceError> {
    let mut changes = changes;
    changes.version = Set(current.version + 1);
    changes.updated_at = Set(Some(Utc::now()));

    let result = borrow_request::Entity::update_many()
        .set(changes)
        .filter(borrow_request::Column::Id.eq(current.id))
        .filter(borrow_request::Column::Version.eq(current.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        return Err(ServiceError::ConcurrentModification(current.id));
    }

    load_request(conn, current.id).await
}

async fn append_history<C: ConnectionTrait>(
    conn: &C,
    request_id: Uuid,
    action: HistoryAction,
    performed_by: Uuid,
    notes: impl Into<String>,
) -> Result<(), ServiceError> {
    request_history::ActiveModel {
        id: Set(Uuid::new_v4()),
        request_id: Set(request_id),
        action: Set(action),
        performed_by: Set(performed_by),
        notes: Set(notes.into()),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;
    Ok(())
}

/// Orchestrates the borrow request lifecycle and, on approval and return,
/// the inventory reservations that go with it. Every operation is one
/// all-or-nothing database transaction.
#[derive(Clone)]
pub struct BorrowRequestService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
    policy: BorrowPolicy,
}

impl BorrowRequestService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender, policy: BorrowPolicy) -> Self {
        Self {
            db,
            event_sender,
            policy,
        }
    }

    fn validate_return_date(&self, expected: NaiveDate) -> Result<(), ServiceError> {
        let today = Utc::now().date_naive();
        let min_date = today + Duration::days(self.policy.min_lead_days);
        let max_date = today + Duration::days(self.policy.max_loan_days);
        if expected < min_date {
            return Err(ServiceError::ValidationError(format!(
                "Expected return date must be {} or later",
                min_date
            )));
        }
        if expected > max_date {
            return Err(ServiceError::ValidationError(format!(
                "Expected return date must not be after {}",
                max_date
            )));
        }
        Ok(())
    }

    fn validate_items(items: &[NewBorrowItem]) -> Result<(), ServiceError> {
        if items.is_empty() {
            return Err(ServiceError::ValidationError(
                "At least one line item is required".into(),
            ));
        }
        let mut seen = HashSet::new();
        for item in items {
            item.validate()?;
            if item.quantity <= 0 {
                return Err(ServiceError::ValidationError(format!(
                    "Quantity for '{}' must be greater than 0",
                    item.part_name
                )));
            }
            if item.unit_cost.is_some_and(|cost| cost < Decimal::ZERO) {
                return Err(ServiceError::ValidationError(format!(
                    "Unit cost for '{}' cannot be negative",
                    item.part_name
                )));
            }
            if !seen.insert((item.part_name.clone(), item.part_number.clone())) {
                return Err(ServiceError::ValidationError(format!(
                    "Duplicate line item for part '{}' {}",
                    item.part_name, item.part_number
                )));
            }
        }
        Ok(())
    }

    /// Creates a request in `submitted` status together with its line items.
    #[instrument(skip(self, new_request), fields(requester_id = %new_request.requester_id))]
    pub async fn submit(
        &self,
        new_request: NewBorrowRequest,
    ) -> Result<borrow_request::Model, ServiceError> {
        self.create(new_request, false).await
    }

    /// Creates a request in `draft` status; the requester submits it later.
    #[instrument(skip(self, new_request), fields(requester_id = %new_request.requester_id))]
    pub async fn create_draft(
        &self,
        new_request: NewBorrowRequest,
    ) -> Result<borrow_request::Model, ServiceError> {
        self.create(new_request, true).await
    }

    async fn create(
        &self,
        new_request: NewBorrowRequest,
        draft: bool,
    ) -> Result<borrow_request::Model, ServiceError> {
        new_request.validate()?;
        Self::validate_items(&new_request.items)?;
        self.validate_return_date(new_request.expected_return_date)?;

        let request_id = Uuid::new_v4();
        let status = if draft {
            RequestStatus::Draft
        } else {
            RequestStatus::Submitted
        };

        let created = self
            .db
            .transaction::<_, borrow_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    for item in &new_request.items {
                        if let Some(part_id) = item.part_id {
                            part::Entity::find_by_id(part_id).one(txn).await?.ok_or_else(
                                || {
                                    ServiceError::NotFound(format!(
                                        "Part {} referenced by '{}' not found",
                                        part_id, item.part_name
                                    ))
                                },
                            )?;
                        }
                    }

                    let request = borrow_request::ActiveModel {
                        id: Set(request_id),
                        requester_id: Set(new_request.requester_id),
                        purpose: Set(new_request.purpose.clone()),
                        expected_return_date: Set(new_request.expected_return_date),
                        urgency: Set(new_request.urgency),
                        status: Set(status),
                        approved_by: Set(None),
                        approval_date: Set(None),
                        rejection_reason: Set(None),
                        borrowed_date: Set(None),
                        actual_return_date: Set(None),
                        staff_notes: Set(None),
                        requester_notes: Set(new_request.requester_notes.clone()),
                        version: Set(1),
                        created_at: Set(Utc::now()),
                        updated_at: Set(None),
                    }
                    .insert(txn)
                    .await?;

                    for item in &new_request.items {
                        borrow_record::ActiveModel {
                            id: Set(Uuid::new_v4()),
                            request_id: Set(request_id),
                            part_id: Set(item.part_id),
                            part_name: Set(item.part_name.clone()),
                            part_number: Set(item.part_number.clone()),
                            part_description: Set(item.part_description.clone()),
                            quantity: Set(item.quantity),
                            unit_cost: Set(item.unit_cost),
                            condition_borrowed: Set(item.condition),
                            condition_returned: Set(None),
                            damage_description: Set(None),
                            replacement_cost: Set(None),
                            serial_numbers: Set(serde_json::json!(item.serial_numbers)),
                            created_at: Set(Utc::now()),
                            updated_at: Set(None),
                        }
                        .insert(txn)
                        .await?;
                    }

                    append_history(
                        txn,
                        request_id,
                        HistoryAction::Created,
                        new_request.requester_id,
                        "Request created",
                    )
                    .await?;
                    if !draft {
                        append_history(
                            txn,
                            request_id,
                            HistoryAction::Submitted,
                            new_request.requester_id,
                            "Request submitted for approval",
                        )
                        .await?;
                    }

                    Ok(request)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        if !draft {
            REQUEST_TRANSITIONS.with_label_values(&["submitted"]).inc();
            self.event_sender
                .send(Event::RequestSubmitted(created.id))
                .await
                .map_err(ServiceError::EventError)?;
        }

        info!(request_id = %created.id, draft, "Borrow request created");
        Ok(created)
    }

    /// Moves a draft into the approval queue.
    #[instrument(skip(self), fields(request_id = %request_id))]
    pub async fn submit_draft(
        &self,
        request_id: Uuid,
        actor: Uuid,
    ) -> Result<borrow_request::Model, ServiceError> {
        let policy = self.policy;
        let updated = self
            .db
            .transaction::<_, borrow_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = load_request(txn, request_id).await?;
                    ensure_transition(&request, RequestStatus::Submitted)?;

                    let today = Utc::now().date_naive();
                    if request.expected_return_date < today + Duration::days(policy.min_lead_days)
                    {
                        return Err(ServiceError::PreconditionFailed(
                            "Expected return date has already passed; edit the draft first".into(),
                        ));
                    }

                    let updated = update_request_guarded(
                        txn,
                        &request,
                        borrow_request::ActiveModel {
                            status: Set(RequestStatus::Submitted),
                            ..Default::default()
                        },
                    )
                    .await?;

                    append_history(
                        txn,
                        request_id,
                        HistoryAction::Submitted,
                        actor,
                        "Request submitted for approval",
                    )
                    .await?;
                    Ok(updated)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        REQUEST_TRANSITIONS.with_label_values(&["submitted"]).inc();
        self.event_sender
            .send(Event::RequestSubmitted(updated.id))
            .await
            .map_err(ServiceError::EventError)?;
        Ok(updated)
    }

    /// Approves a submitted request, reserving stock for every linked line
    /// item. Any failed reservation aborts the whole operation.
    #[instrument(skip(self), fields(request_id = %request_id, approver = %approver))]
    pub async fn approve(
        &self,
        request_id: Uuid,
        approver: Uuid,
    ) -> Result<borrow_request::Model, ServiceError> {
        let (updated, reserved) = self
            .db
            .transaction::<_, (borrow_request::Model, Vec<(Uuid, i32)>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let request = load_request(txn, request_id).await?;
                        ensure_transition(&request, RequestStatus::Approved)?;

                        let records = borrow_record::Entity::find()
                            .filter(borrow_record::Column::RequestId.eq(request_id))
                            .order_by_asc(borrow_record::Column::CreatedAt)
                            .all(txn)
                            .await?;

                        let mut reserved = Vec::new();
                        for record in &records {
                            if let Some(part_id) = record.part_id {
                                inventory::reserve(
                                    txn,
                                    part_id,
                                    record.quantity,
                                    Some(approver),
                                    Some(request_id),
                                )
                                .await?;
                                reserved.push((part_id, record.quantity));
                            }
                        }

                        let updated = update_request_guarded(
                            txn,
                            &request,
                            borrow_request::ActiveModel {
                                status: Set(RequestStatus::Approved),
                                approved_by: Set(Some(approver)),
                                approval_date: Set(Some(Utc::now())),
                                ..Default::default()
                            },
                        )
                        .await?;

                        append_history(
                            txn,
                            request_id,
                            HistoryAction::Approved,
                            approver,
                            "Request approved",
                        )
                        .await?;

                        Ok((updated, reserved))
                    })
                },
            )
            .await
            .map_err(ServiceError::from)?;

        REQUEST_TRANSITIONS.with_label_values(&["approved"]).inc();
        self.event_sender
            .send(Event::RequestApproved {
                request_id,
                approver_id: approver,
            })
            .await
            .map_err(ServiceError::EventError)?;
        for (part_id, quantity) in reserved {
            self.event_sender
                .send(Event::InventoryReserved {
                    part_id,
                    quantity,
                    request_id,
                })
                .await
                .map_err(ServiceError::EventError)?;

            if let Some(part) = part::Entity::find_by_id(part_id).one(&*self.db).await? {
                if part.is_low_stock() {
                    self.event_sender
                        .send(Event::LowStock {
                            part_id: part.id,
                            available_quantity: part.available_quantity,
                            minimum_stock: part.minimum_stock,
                        })
                        .await
                        .map_err(ServiceError::EventError)?;
                }
            }
        }

        info!(request_id = %request_id, "Borrow request approved");
        Ok(updated)
    }

    /// Rejects a submitted request. A non-empty reason is required.
    #[instrument(skip(self, reason), fields(request_id = %request_id))]
    pub async fn reject(
        &self,
        request_id: Uuid,
        approver: Uuid,
        reason: String,
    ) -> Result<borrow_request::Model, ServiceError> {
        if reason.trim().is_empty() {
            return Err(ServiceError::PreconditionFailed(
                "A rejection reason is required".into(),
            ));
        }

        let reason_for_event = reason.clone();
        let updated = self
            .db
            .transaction::<_, borrow_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = load_request(txn, request_id).await?;
                    ensure_transition(&request, RequestStatus::Rejected)?;

                    let updated = update_request_guarded(
                        txn,
                        &request,
                        borrow_request::ActiveModel {
                            status: Set(RequestStatus::Rejected),
                            rejection_reason: Set(Some(reason.clone())),
                            ..Default::default()
                        },
                    )
                    .await?;

                    append_history(
                        txn,
                        request_id,
                        HistoryAction::Rejected,
                        approver,
                        format!("Request rejected: {}", reason),
                    )
                    .await?;
                    Ok(updated)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        REQUEST_TRANSITIONS.with_label_values(&["rejected"]).inc();
        self.event_sender
            .send(Event::RequestRejected {
                request_id,
                reason: reason_for_event,
            })
            .await
            .map_err(ServiceError::EventError)?;
        Ok(updated)
    }

    /// Records the physical hand-out of an approved request.
    #[instrument(skip(self), fields(request_id = %request_id))]
    pub async fn mark_borrowed(
        &self,
        request_id: Uuid,
        actor: Uuid,
    ) -> Result<borrow_request::Model, ServiceError> {
        let updated = self
            .db
            .transaction::<_, borrow_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = load_request(txn, request_id).await?;
                    ensure_transition(&request, RequestStatus::Borrowed)?;

                    let updated = update_request_guarded(
                        txn,
                        &request,
                        borrow_request::ActiveModel {
                            status: Set(RequestStatus::Borrowed),
                            borrowed_date: Set(Some(Utc::now())),
                            ..Default::default()
                        },
                    )
                    .await?;

                    append_history(
                        txn,
                        request_id,
                        HistoryAction::Borrowed,
                        actor,
                        "Items handed out",
                    )
                    .await?;
                    Ok(updated)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        REQUEST_TRANSITIONS.with_label_values(&["borrowed"]).inc();
        self.event_sender
            .send(Event::RequestBorrowed(request_id))
            .await
            .map_err(ServiceError::EventError)?;
        Ok(updated)
    }

    /// Records the hand-back of all items, releasing the stock each linked
    /// line item reserved. Items not listed are assumed returned in
    /// excellent condition.
    #[instrument(skip(self, item_returns), fields(request_id = %request_id))]
    pub async fn mark_returned(
        &self,
        request_id: Uuid,
        actor: Uuid,
        item_returns: Vec<ItemReturn>,
    ) -> Result<borrow_request::Model, ServiceError> {
        let (updated, released) = self
            .db
            .transaction::<_, (borrow_request::Model, Vec<(Uuid, i32)>), ServiceError>(
                move |txn| {
                    Box::pin(async move {
                        let request = load_request(txn, request_id).await?;
                        ensure_transition(&request, RequestStatus::Returned)?;

                        let records = borrow_record::Entity::find()
                            .filter(borrow_record::Column::RequestId.eq(request_id))
                            .order_by_asc(borrow_record::Column::CreatedAt)
                            .all(txn)
                            .await?;

                        let mut observations: HashMap<Uuid, ItemReturn> = HashMap::new();
                        for item in item_returns {
                            if !records.iter().any(|record| record.id == item.record_id) {
                                return Err(ServiceError::ValidationError(format!(
                                    "Record {} does not belong to request {}",
                                    item.record_id, request_id
                                )));
                            }
                            observations.insert(item.record_id, item);
                        }

                        let mut released = Vec::new();
                        let mut damaged_count = 0usize;
                        for record in records {
                            let observation = observations.remove(&record.id);
                            let condition = observation
                                .as_ref()
                                .map(|item| item.condition)
                                .unwrap_or_default();
                            if condition.counts_as_damage() {
                                damaged_count += 1;
                            }

                            let part_id = record.part_id;
                            let quantity = record.quantity;

                            let mut active: borrow_record::ActiveModel = record.into();
                            active.condition_returned = Set(Some(condition));
                            if let Some(item) = observation {
                                active.damage_description = Set(item.damage_description);
                                active.replacement_cost = Set(item.replacement_cost);
                            }
                            active.updated_at = Set(Some(Utc::now()));
                            active.update(txn).await?;

                            if let Some(part_id) = part_id {
                                inventory::release(
                                    txn,
                                    part_id,
                                    quantity,
                                    condition.as_part_condition(),
                                    Some(actor),
                                    Some(request_id),
                                )
                                .await?;
                                released.push((part_id, quantity));
                            }
                        }

                        let updated = update_request_guarded(
                            txn,
                            &request,
                            borrow_request::ActiveModel {
                                status: Set(RequestStatus::Returned),
                                actual_return_date: Set(Some(Utc::now())),
                                ..Default::default()
                            },
                        )
                        .await?;

                        let notes = if damaged_count == 0 {
                            "Items returned".to_string()
                        } else {
                            format!("Items returned; {} reported damaged", damaged_count)
                        };
                        append_history(txn, request_id, HistoryAction::Returned, actor, notes)
                            .await?;

                        Ok((updated, released))
                    })
                },
            )
            .await
            .map_err(ServiceError::from)?;

        REQUEST_TRANSITIONS.with_label_values(&["returned"]).inc();
        self.event_sender
            .send(Event::RequestReturned(request_id))
            .await
            .map_err(ServiceError::EventError)?;
        for (part_id, quantity) in released {
            self.event_sender
                .send(Event::InventoryReleased {
                    part_id,
                    quantity,
                    request_id,
                })
                .await
                .map_err(ServiceError::EventError)?;
        }
        Ok(updated)
    }

    /// Flags a borrowed request whose expected return date has passed.
    #[instrument(skip(self), fields(request_id = %request_id))]
    pub async fn mark_overdue(
        &self,
        request_id: Uuid,
        actor: Uuid,
    ) -> Result<borrow_request::Model, ServiceError> {
        let updated = self
            .db
            .transaction::<_, borrow_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = load_request(txn, request_id).await?;
                    ensure_transition(&request, RequestStatus::Overdue)?;
                    if !request.is_overdue(Utc::now().date_naive()) {
                        return Err(ServiceError::PreconditionFailed(format!(
                            "Request {} is not past its expected return date",
                            request_id
                        )));
                    }

                    let updated = update_request_guarded(
                        txn,
                        &request,
                        borrow_request::ActiveModel {
                            status: Set(RequestStatus::Overdue),
                            ..Default::default()
                        },
                    )
                    .await?;

                    append_history(
                        txn,
                        request_id,
                        HistoryAction::MarkedOverdue,
                        actor,
                        "Request marked overdue",
                    )
                    .await?;
                    Ok(updated)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        REQUEST_TRANSITIONS
            .with_label_values(&["marked_overdue"])
            .inc();
        self.event_sender
            .send(Event::RequestMarkedOverdue(request_id))
            .await
            .map_err(ServiceError::EventError)?;
        Ok(updated)
    }

    /// Flags a borrowed or overdue request as damaged. Stock is settled
    /// later, when the items come back through `mark_returned`.
    #[instrument(skip(self, notes), fields(request_id = %request_id))]
    pub async fn mark_damaged(
        &self,
        request_id: Uuid,
        actor: Uuid,
        notes: String,
    ) -> Result<borrow_request::Model, ServiceError> {
        if notes.trim().is_empty() {
            return Err(ServiceError::PreconditionFailed(
                "A damage description is required".into(),
            ));
        }

        let updated = self
            .db
            .transaction::<_, borrow_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = load_request(txn, request_id).await?;
                    ensure_transition(&request, RequestStatus::Damaged)?;

                    let updated = update_request_guarded(
                        txn,
                        &request,
                        borrow_request::ActiveModel {
                            status: Set(RequestStatus::Damaged),
                            ..Default::default()
                        },
                    )
                    .await?;

                    append_history(txn, request_id, HistoryAction::Damaged, actor, notes).await?;
                    Ok(updated)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        REQUEST_TRANSITIONS.with_label_values(&["damaged"]).inc();
        self.event_sender
            .send(Event::RequestMarkedDamaged(request_id))
            .await
            .map_err(ServiceError::EventError)?;
        Ok(updated)
    }

    /// Cancels a request that has not yet been approved. After approval a
    /// reservation exists, so cancellation is no longer available.
    #[instrument(skip(self, reason), fields(request_id = %request_id))]
    pub async fn cancel(
        &self,
        request_id: Uuid,
        actor: Uuid,
        reason: Option<String>,
    ) -> Result<borrow_request::Model, ServiceError> {
        let updated = self
            .db
            .transaction::<_, borrow_request::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let request = load_request(txn, request_id).await?;
                    ensure_transition(&request, RequestStatus::Cancelled)?;
                    if !request.can_be_cancelled() {
                        return Err(ServiceError::PreconditionFailed(format!(
                            "Request {} already holds a reservation and cannot be cancelled",
                            request_id
                        )));
                    }

                    let updated = update_request_guarded(
                        txn,
                        &request,
                        borrow_request::ActiveModel {
                            status: Set(RequestStatus::Cancelled),
                            ..Default::default()
                        },
                    )
                    .await?;

                    let notes = match reason {
                        Some(reason) if !reason.trim().is_empty() => {
                            format!("Request cancelled: {}", reason)
                        }
                        _ => "Request cancelled".to_string(),
                    };
                    append_history(txn, request_id, HistoryAction::Cancelled, actor, notes)
                        .await?;
                    Ok(updated)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        REQUEST_TRANSITIONS.with_label_values(&["cancelled"]).inc();
        self.event_sender
            .send(Event::RequestCancelled(request_id))
            .await
            .map_err(ServiceError::EventError)?;
        Ok(updated)
    }

    /// Appends a free-text note to the audit trail without touching status.
    #[instrument(skip(self, note), fields(request_id = %request_id))]
    pub async fn add_note(
        &self,
        request_id: Uuid,
        actor: Uuid,
        note: String,
    ) -> Result<(), ServiceError> {
        if note.trim().is_empty() {
            return Err(ServiceError::ValidationError("Note must not be empty".into()));
        }
        let db = &*self.db;
        load_request(db, request_id).await?;
        append_history(db, request_id, HistoryAction::NoteAdded, actor, note).await
    }

    /// Lists requests matching the filter, newest first.
    pub async fn list(
        &self,
        filter: RequestFilter,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<borrow_request::Model>, u64), ServiceError> {
        let mut query = borrow_request::Entity::find();
        if let Some(requester_id) = filter.requester_id {
            query = query.filter(borrow_request::Column::RequesterId.eq(requester_id));
        }
        if let Some(status) = filter.status {
            query = query.filter(borrow_request::Column::Status.eq(status));
        }
        if let Some(created_after) = filter.created_after {
            query = query.filter(borrow_request::Column::CreatedAt.gte(created_after));
        }
        if let Some(created_before) = filter.created_before {
            query = query.filter(borrow_request::Column::CreatedAt.lte(created_before));
        }

        let paginator = query
            .order_by_desc(borrow_request::Column::CreatedAt)
            .paginate(&*self.db, limit);
        let total = paginator.num_items().await?;
        let requests = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((requests, total))
    }

    /// One request with its line items and audit trail.
    pub async fn get_details(&self, request_id: Uuid) -> Result<RequestDetails, ServiceError> {
        let db = &*self.db;
        let request = load_request(db, request_id).await?;
        let records = borrow_record::Entity::find()
            .filter(borrow_record::Column::RequestId.eq(request_id))
            .order_by_asc(borrow_record::Column::CreatedAt)
            .all(db)
            .await?;
        let history = request_history::Entity::find()
            .filter(request_history::Column::RequestId.eq(request_id))
            .order_by_asc(request_history::Column::CreatedAt)
            .all(db)
            .await?;
        Ok(RequestDetails {
            request,
            records,
            history,
        })
    }

    /// Borrowed requests past their expected return date.
    pub async fn list_overdue(&self) -> Result<Vec<borrow_request::Model>, ServiceError> {
        let today = Utc::now().date_naive();
        let requests = borrow_request::Entity::find()
            .filter(borrow_request::Column::Status.eq(RequestStatus::Borrowed))
            .filter(borrow_request::Column::ExpectedReturnDate.lt(today))
            .order_by_asc(borrow_request::Column::ExpectedReturnDate)
            .all(&*self.db)
            .await?;
        Ok(requests)
    }

    /// Borrowed requests due within the policy's due-soon window.
    pub async fn list_due_soon(&self) -> Result<Vec<borrow_request::Model>, ServiceError> {
        let today = Utc::now().date_naive();
        let horizon = today + Duration::days(self.policy.due_soon_days);
        let requests = borrow_request::Entity::find()
            .filter(borrow_request::Column::Status.eq(RequestStatus::Borrowed))
            .filter(borrow_request::Column::ExpectedReturnDate.gte(today))
            .filter(borrow_request::Column::ExpectedReturnDate.lte(horizon))
            .order_by_asc(borrow_request::Column::ExpectedReturnDate)
            .all(&*self.db)
            .await?;
        Ok(requests)
    }

    /// Per-status counts, optionally scoped to one requester.
    pub async fn stats(&self, requester_id: Option<Uuid>) -> Result<RequestStats, ServiceError> {
        let mut query = borrow_request::Entity::find()
            .select_only()
            .column(borrow_request::Column::Status)
            .column_as(borrow_request::Column::Id.count(), "count")
            .group_by(borrow_request::Column::Status);
        if let Some(requester_id) = requester_id {
            query = query.filter(borrow_request::Column::RequesterId.eq(requester_id));
        }

        let rows: Vec<(RequestStatus, i64)> = query.into_tuple().all(&*self.db).await?;

        let mut stats = RequestStats::default();
        for (status, count) in rows {
            let count = count as u64;
            stats.total += count;
            match status {
                RequestStatus::Draft => stats.draft = count,
                RequestStatus::Submitted => stats.submitted = count,
                RequestStatus::Approved => stats.approved = count,
                RequestStatus::Borrowed => stats.borrowed = count,
                RequestStatus::Overdue => stats.overdue = count,
                RequestStatus::Returned => stats.returned = count,
                RequestStatus::Rejected => stats.rejected = count,
                RequestStatus::Damaged => stats.damaged = count,
                RequestStatus::Cancelled => stats.cancelled = count,
            }
        }
        Ok(stats)
    }
}
