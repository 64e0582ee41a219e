use std::sync::Arc;

use chrono::Utc;
use lazy_static::lazy_static;
use prometheus::{register_int_counter_vec, IntCounterVec};
use sea_orm::sea_query::Expr;
use sea_orm::{
    ActiveModelTrait, ColumnTrait, ConnectionTrait, DatabaseConnection, EntityTrait, PaginatorTrait,
    QueryFilter, QueryOrder, Set, TransactionTrait,
};
use tracing::{info, instrument, warn};
use uuid::Uuid;

use crate::{
    entities::inventory_transaction::{self, TransactionType},
    entities::part::{self, PartCondition, PartStatus},
    errors::ServiceError,
    events::{Event, EventSender},
};

lazy_static! {
    static ref INVENTORY_MUTATIONS: IntCounterVec = register_int_counter_vec!(
        "borrowdesk_inventory_mutations_total",
        "Total number of inventory ledger mutations",
        &["transaction_type"]
    )
    .expect("metric can be created");
}

/// Appends one audit row for a ledger mutation. Every quantity or
/// condition change goes through here; nothing mutates a part silently.
async fn record_transaction<C: ConnectionTrait>(
    conn: &C,
    part_id: Uuid,
    transaction_type: TransactionType,
    quantity: i32,
    previous_quantity: i32,
    new_quantity: i32,
    performed_by: Option<Uuid>,
    reason: impl Into<String>,
    reference_id: Option<Uuid>,
) -> Result<(), ServiceError> {
    inventory_transaction::ActiveModel {
        id: Set(Uuid::new_v4()),
        part_id: Set(part_id),
        transaction_type: Set(transaction_type),
        quantity: Set(quantity),
        previous_quantity: Set(previous_quantity),
        new_quantity: Set(new_quantity),
        performed_by: Set(performed_by),
        reason: Set(reason.into()),
        reference_id: Set(reference_id),
        created_at: Set(Utc::now()),
    }
    .insert(conn)
    .await?;

    let type_label = transaction_type.to_string();
    INVENTORY_MUTATIONS
        .with_label_values(&[type_label.as_str()])
        .inc();
    Ok(())
}

/// Applies a version-guarded update to a part row. A stale version means
/// another transaction touched the part first; the caller's transaction
/// aborts so no partial state survives.
async fn update_part_guarded<C: ConnectionTrait>(
    conn: &C,
    current: &part::Model,
    changes: part::ActiveModel,
) -> Result<(), ServiceError> {
    let mut changes = changes;
    changes.version = Set(current.version + 1);
    changes.updated_at = Set(Some(Utc::now()));

    let result = part::Entity::update_many()
        .set(changes)
        .filter(part::Column::Id.eq(current.id))
        .filter(part::Column::Version.eq(current.version))
        .exec(conn)
        .await?;

    if result.rows_affected == 0 {
        warn!(part_id = %current.id, "Concurrent modification detected for part");
        return Err(ServiceError::ConcurrentModification(current.id));
    }
    Ok(())
}

async fn load_part<C: ConnectionTrait>(conn: &C, part_id: Uuid) -> Result<part::Model, ServiceError> {
    part::Entity::find_by_id(part_id)
        .one(conn)
        .await?
        .ok_or_else(|| ServiceError::NotFound(format!("Part {} not found", part_id)))
}

/// Reserves `quantity` units of a part for a borrow request.
///
/// Runs on the caller's connection so the reservation commits or rolls
/// back together with the request transition that triggered it.
pub async fn reserve<C: ConnectionTrait>(
    conn: &C,
    part_id: Uuid,
    quantity: i32,
    performed_by: Option<Uuid>,
    reference_id: Option<Uuid>,
) -> Result<part::Model, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Reservation quantity must be greater than 0".into(),
        ));
    }

    let current = load_part(conn, part_id).await?;
    if !current.can_borrow(quantity) {
        return Err(ServiceError::InsufficientStock(format!(
            "Part '{}' cannot supply {} unit(s); {} available",
            current.part_number, quantity, current.available_quantity
        )));
    }

    let new_available = current.available_quantity - quantity;
    let new_status = if new_available == 0 {
        PartStatus::Borrowed
    } else {
        current.status
    };

    update_part_guarded(
        conn,
        &current,
        part::ActiveModel {
            available_quantity: Set(new_available),
            status: Set(new_status),
            ..Default::default()
        },
    )
    .await?;

    record_transaction(
        conn,
        current.id,
        TransactionType::Borrow,
        -quantity,
        current.available_quantity,
        new_available,
        performed_by,
        "Reserved for borrow request",
        reference_id,
    )
    .await?;

    let mut updated = current;
    updated.available_quantity = new_available;
    updated.status = new_status;
    updated.version += 1;
    Ok(updated)
}

/// Returns `quantity` units of a part to stock, never exceeding
/// `total_quantity`. A damaged or out-of-order observation updates the
/// part's condition and writes a second `damaged` audit row; out-of-order
/// parts are pulled into maintenance.
pub async fn release<C: ConnectionTrait>(
    conn: &C,
    part_id: Uuid,
    quantity: i32,
    observed_condition: PartCondition,
    performed_by: Option<Uuid>,
    reference_id: Option<Uuid>,
) -> Result<part::Model, ServiceError> {
    if quantity <= 0 {
        return Err(ServiceError::ValidationError(
            "Release quantity must be greater than 0".into(),
        ));
    }

    let current = load_part(conn, part_id).await?;
    let new_available = (current.available_quantity + quantity).min(current.total_quantity);

    let mut new_status = if new_available > 0 {
        PartStatus::Available
    } else {
        current.status
    };
    let mut new_condition = current.condition;
    let damaged = matches!(
        observed_condition,
        PartCondition::Damaged | PartCondition::OutOfOrder
    );
    if damaged {
        new_condition = observed_condition;
        if observed_condition == PartCondition::OutOfOrder {
            new_status = PartStatus::Maintenance;
        }
    }

    update_part_guarded(
        conn,
        &current,
        part::ActiveModel {
            available_quantity: Set(new_available),
            status: Set(new_status),
            condition: Set(new_condition),
            ..Default::default()
        },
    )
    .await?;

    record_transaction(
        conn,
        current.id,
        TransactionType::Return,
        new_available - current.available_quantity,
        current.available_quantity,
        new_available,
        performed_by,
        "Returned from borrow request",
        reference_id,
    )
    .await?;

    if damaged {
        record_transaction(
            conn,
            current.id,
            TransactionType::Damaged,
            0,
            new_available,
            new_available,
            performed_by,
            format!("Returned in condition '{}'", observed_condition),
            reference_id,
        )
        .await?;
    }

    let mut updated = current;
    updated.available_quantity = new_available;
    updated.status = new_status;
    updated.condition = new_condition;
    updated.version += 1;
    Ok(updated)
}

/// Service for quantity and condition maintenance outside the borrow
/// workflow: receiving stock, corrections, and repairs.
#[derive(Clone)]
pub struct InventoryService {
    db: Arc<DatabaseConnection>,
    event_sender: EventSender,
}

impl InventoryService {
    pub fn new(db: Arc<DatabaseConnection>, event_sender: EventSender) -> Self {
        Self { db, event_sender }
    }

    /// Receives new stock for a part: grows both counters.
    #[instrument(skip(self), fields(part_id = %part_id))]
    pub async fn receive(
        &self,
        part_id: Uuid,
        quantity: i32,
        performed_by: Option<Uuid>,
        reason: Option<String>,
    ) -> Result<part::Model, ServiceError> {
        if quantity <= 0 {
            return Err(ServiceError::ValidationError(
                "Received quantity must be greater than 0".into(),
            ));
        }

        let updated = self
            .db
            .transaction::<_, part::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let current = load_part(txn, part_id).await?;
                    let new_available = current.available_quantity + quantity;
                    let new_total = current.total_quantity + quantity;
                    let new_status = if current.status == PartStatus::Borrowed {
                        PartStatus::Available
                    } else {
                        current.status
                    };

                    update_part_guarded(
                        txn,
                        &current,
                        part::ActiveModel {
                            available_quantity: Set(new_available),
                            total_quantity: Set(new_total),
                            status: Set(new_status),
                            ..Default::default()
                        },
                    )
                    .await?;

                    record_transaction(
                        txn,
                        current.id,
                        TransactionType::Add,
                        quantity,
                        current.available_quantity,
                        new_available,
                        performed_by,
                        reason.unwrap_or_else(|| "Stock received".into()),
                        None,
                    )
                    .await?;

                    let mut updated = current;
                    updated.available_quantity = new_available;
                    updated.total_quantity = new_total;
                    updated.status = new_status;
                    updated.version += 1;
                    Ok(updated)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(part_id = %part_id, quantity, "Stock received");
        Ok(updated)
    }

    /// Applies a signed correction to both counters, e.g. after a shelf
    /// count. The quantity invariant is enforced before anything is written.
    #[instrument(skip(self), fields(part_id = %part_id))]
    pub async fn adjust(
        &self,
        part_id: Uuid,
        delta: i32,
        performed_by: Option<Uuid>,
        reason: String,
    ) -> Result<part::Model, ServiceError> {
        if delta == 0 {
            return Err(ServiceError::ValidationError(
                "Adjustment delta must not be 0".into(),
            ));
        }
        if reason.trim().is_empty() {
            return Err(ServiceError::ValidationError(
                "Adjustment reason is required".into(),
            ));
        }

        let reason_for_txn = reason.clone();
        let updated = self
            .db
            .transaction::<_, part::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let current = load_part(txn, part_id).await?;
                    let new_available = current.available_quantity + delta;
                    let new_total = current.total_quantity + delta;
                    if new_available < 0 || new_total < 0 || new_available > new_total {
                        return Err(ServiceError::ValidationError(format!(
                            "Adjustment of {} would leave part '{}' with {} of {} units",
                            delta, current.part_number, new_available, new_total
                        )));
                    }

                    update_part_guarded(
                        txn,
                        &current,
                        part::ActiveModel {
                            available_quantity: Set(new_available),
                            total_quantity: Set(new_total),
                            ..Default::default()
                        },
                    )
                    .await?;

                    record_transaction(
                        txn,
                        current.id,
                        TransactionType::Adjustment,
                        delta,
                        current.available_quantity,
                        new_available,
                        performed_by,
                        reason_for_txn,
                        None,
                    )
                    .await?;

                    let mut updated = current;
                    updated.available_quantity = new_available;
                    updated.total_quantity = new_total;
                    updated.version += 1;
                    Ok(updated)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        self.event_sender
            .send(Event::InventoryAdjusted {
                part_id,
                old_quantity: updated.available_quantity - delta,
                new_quantity: updated.available_quantity,
                reason,
            })
            .await
            .map_err(ServiceError::EventError)?;

        self.notify_if_low_stock(&updated).await?;
        Ok(updated)
    }

    /// Marks a part repaired: condition back to good, circulation restored.
    #[instrument(skip(self), fields(part_id = %part_id))]
    pub async fn mark_repaired(
        &self,
        part_id: Uuid,
        performed_by: Option<Uuid>,
        notes: Option<String>,
    ) -> Result<part::Model, ServiceError> {
        let updated = self
            .db
            .transaction::<_, part::Model, ServiceError>(move |txn| {
                Box::pin(async move {
                    let current = load_part(txn, part_id).await?;
                    if current.condition.is_lendable() {
                        return Err(ServiceError::PreconditionFailed(format!(
                            "Part '{}' is not awaiting repair",
                            current.part_number
                        )));
                    }

                    let new_status = if current.available_quantity > 0 {
                        PartStatus::Available
                    } else {
                        PartStatus::Borrowed
                    };

                    update_part_guarded(
                        txn,
                        &current,
                        part::ActiveModel {
                            condition: Set(PartCondition::Good),
                            status: Set(new_status),
                            ..Default::default()
                        },
                    )
                    .await?;

                    record_transaction(
                        txn,
                        current.id,
                        TransactionType::Repair,
                        0,
                        current.available_quantity,
                        current.available_quantity,
                        performed_by,
                        notes.unwrap_or_else(|| "Repaired and restored to circulation".into()),
                        None,
                    )
                    .await?;

                    let mut updated = current;
                    updated.condition = PartCondition::Good;
                    updated.status = new_status;
                    updated.version += 1;
                    Ok(updated)
                })
            })
            .await
            .map_err(ServiceError::from)?;

        info!(part_id = %part_id, "Part repaired");
        Ok(updated)
    }

    /// Parts at or below their minimum stock threshold.
    pub async fn low_stock_parts(&self) -> Result<Vec<part::Model>, ServiceError> {
        let parts = part::Entity::find()
            .filter(part::Column::IsActive.eq(true))
            .filter(
                Expr::col(part::Column::AvailableQuantity)
                    .lte(Expr::col(part::Column::MinimumStock)),
            )
            .order_by_asc(part::Column::AvailableQuantity)
            .all(&*self.db)
            .await?;
        Ok(parts)
    }

    /// The audit trail for one part, newest first.
    pub async fn list_transactions(
        &self,
        part_id: Uuid,
        page: u64,
        limit: u64,
    ) -> Result<(Vec<inventory_transaction::Model>, u64), ServiceError> {
        let paginator = inventory_transaction::Entity::find()
            .filter(inventory_transaction::Column::PartId.eq(part_id))
            .order_by_desc(inventory_transaction::Column::CreatedAt)
            .paginate(&*self.db, limit);

        let total = paginator.num_items().await?;
        let transactions = paginator.fetch_page(page.saturating_sub(1)).await?;
        Ok((transactions, total))
    }

    pub(crate) async fn notify_if_low_stock(&self, part: &part::Model) -> Result<(), ServiceError> {
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
        Ok(())
    }
}
