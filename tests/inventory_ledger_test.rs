mod common;

use sea_orm::{ColumnTrait, EntityTrait, QueryFilter};
use uuid::Uuid;

use borrowdesk_api::{
    entities::inventory_transaction::{self, TransactionType},
    entities::part::{PartCondition, PartStatus},
    errors::ServiceError,
    services::inventory::{release, reserve},
};

use common::TestApp;

async fn transactions_of_type(
    app: &TestApp,
    part_id: Uuid,
    transaction_type: TransactionType,
) -> Vec<inventory_transaction::Model> {
    inventory_transaction::Entity::find()
        .filter(inventory_transaction::Column::PartId.eq(part_id))
        .filter(inventory_transaction::Column::TransactionType.eq(transaction_type))
        .all(&*app.db)
        .await
        .expect("load transactions")
}

#[tokio::test]
async fn part_creation_records_initial_intake() {
    let app = TestApp::new().await;
    let part = app.seed_part("IC-NE555", 8, 2).await;

    assert_eq!(part.available_quantity, 8);
    assert_eq!(part.total_quantity, 8);
    assert_eq!(part.status, PartStatus::Available);

    let adds = transactions_of_type(&app, part.id, TransactionType::Add).await;
    assert_eq!(adds.len(), 1);
    assert_eq!(adds[0].quantity, 8);
    assert_eq!(adds[0].previous_quantity, 0);
    assert_eq!(adds[0].new_quantity, 8);
}

#[tokio::test]
async fn duplicate_part_number_conflicts() {
    let app = TestApp::new().await;
    app.seed_part("REG-LM317", 3, 1).await;

    let category_id = app.seed_category().await;
    let err = app
        .services
        .parts
        .create(borrowdesk_api::services::parts::NewPart {
            name_en: "Voltage regulator".into(),
            name_ar: "منظم جهد".into(),
            description_en: String::new(),
            description_ar: String::new(),
            category_id,
            part_number: "REG-LM317".into(),
            manufacturer: None,
            model: None,
            total_quantity: 3,
            minimum_stock: None,
            condition: PartCondition::Excellent,
            storage_location: None,
            purchase_price: None,
            notes: None,
            added_by: None,
        })
        .await
        .expect_err("duplicate part number must fail");
    assert!(matches!(err, ServiceError::Conflict(_)));
}

#[tokio::test]
async fn reserve_drains_stock_and_flips_status_at_zero() {
    let app = TestApp::new().await;
    let part = app.seed_part("SEN-PIR", 2, 0).await;

    reserve(&*app.db, part.id, 1, None, None)
        .await
        .expect("reserve one");
    let after_one = app.reload_part(part.id).await;
    assert_eq!(after_one.available_quantity, 1);
    assert_eq!(after_one.status, PartStatus::Available);

    reserve(&*app.db, part.id, 1, None, None)
        .await
        .expect("reserve the last unit");
    let drained = app.reload_part(part.id).await;
    assert_eq!(drained.available_quantity, 0);
    assert_eq!(drained.status, PartStatus::Borrowed);

    // Drained part is no longer borrowable at all
    let err = reserve(&*app.db, part.id, 1, None, None)
        .await
        .expect_err("nothing left to reserve");
    assert!(matches!(err, ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn reserve_refuses_non_lendable_condition() {
    let app = TestApp::new().await;
    let part = app.seed_part("WIRE-SPOOL", 5, 1).await;

    // Damage the whole holding: release an out-of-order observation
    reserve(&*app.db, part.id, 1, None, None)
        .await
        .expect("reserve");
    release(&*app.db, part.id, 1, PartCondition::OutOfOrder, None, None)
        .await
        .expect("release damaged");

    let err = reserve(&*app.db, part.id, 1, None, None)
        .await
        .expect_err("maintenance parts are not lendable");
    assert!(matches!(err, ServiceError::InsufficientStock(_)));
}

#[tokio::test]
async fn release_caps_available_at_total() {
    let app = TestApp::new().await;
    let part = app.seed_part("BAT-9V", 5, 1).await;

    reserve(&*app.db, part.id, 2, None, None)
        .await
        .expect("reserve two");

    // An over-release (e.g. double hand-back report) cannot exceed total
    let updated = release(&*app.db, part.id, 5, PartCondition::Excellent, None, None)
        .await
        .expect("release");
    assert_eq!(updated.available_quantity, 5);
    assert_eq!(updated.total_quantity, 5);

    let returns = transactions_of_type(&app, part.id, TransactionType::Return).await;
    assert_eq!(returns.len(), 1);
    // The audit row records the applied delta, not the requested one
    assert_eq!(returns[0].quantity, 2);
    assert_eq!(returns[0].previous_quantity, 3);
    assert_eq!(returns[0].new_quantity, 5);
}

#[tokio::test]
async fn receive_grows_both_counters() {
    let app = TestApp::new().await;
    let part = app.seed_part("CON-USB-C", 2, 1).await;

    let updated = app
        .services
        .inventory
        .receive(part.id, 3, None, Some("Restock order #1182".into()))
        .await
        .expect("receive stock");
    assert_eq!(updated.total_quantity, 5);
    assert_eq!(updated.available_quantity, 5);

    let adds = transactions_of_type(&app, part.id, TransactionType::Add).await;
    assert_eq!(adds.len(), 2);
}

#[tokio::test]
async fn adjust_enforces_quantity_invariant() {
    let app = TestApp::new().await;
    let part = app.seed_part("FUSE-2A", 4, 1).await;

    let err = app
        .services
        .inventory
        .adjust(part.id, -5, None, "Shelf count".into())
        .await
        .expect_err("cannot adjust below zero");
    assert!(matches!(err, ServiceError::ValidationError(_)));
    assert_eq!(app.reload_part(part.id).await.available_quantity, 4);

    let updated = app
        .services
        .inventory
        .adjust(part.id, -1, None, "One unit written off after shelf count".into())
        .await
        .expect("adjust down by one");
    assert_eq!(updated.available_quantity, 3);
    assert_eq!(updated.total_quantity, 3);

    let adjustments = transactions_of_type(&app, part.id, TransactionType::Adjustment).await;
    assert_eq!(adjustments.len(), 1);
    assert_eq!(adjustments[0].quantity, -1);
}

#[tokio::test]
async fn repair_restores_condition_and_circulation() {
    let app = TestApp::new().await;
    let part = app.seed_part("AMP-LM386", 3, 1).await;

    reserve(&*app.db, part.id, 1, None, None)
        .await
        .expect("reserve");
    release(&*app.db, part.id, 1, PartCondition::OutOfOrder, None, None)
        .await
        .expect("release out of order");

    let broken = app.reload_part(part.id).await;
    assert_eq!(broken.condition, PartCondition::OutOfOrder);
    assert_eq!(broken.status, PartStatus::Maintenance);

    let repaired = app
        .services
        .inventory
        .mark_repaired(part.id, None, None)
        .await
        .expect("repair");
    assert_eq!(repaired.condition, PartCondition::Good);
    assert_eq!(repaired.status, PartStatus::Available);

    let repairs = transactions_of_type(&app, part.id, TransactionType::Repair).await;
    assert_eq!(repairs.len(), 1);

    // A healthy part is not repairable again
    let err = app
        .services
        .inventory
        .mark_repaired(part.id, None, None)
        .await
        .expect_err("nothing to repair");
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));
}

#[tokio::test]
async fn low_stock_query_finds_parts_at_threshold() {
    let app = TestApp::new().await;
    let scarce = app.seed_part("XTAL-16MHZ", 4, 2).await;
    let healthy = app.seed_part("HDR-40PIN", 10, 2).await;

    reserve(&*app.db, scarce.id, 2, None, None)
        .await
        .expect("drain to threshold");

    let low = app
        .services
        .inventory
        .low_stock_parts()
        .await
        .expect("low stock query");
    assert!(low.iter().any(|part| part.id == scarce.id));
    assert!(low.iter().all(|part| part.id != healthy.id));
}

#[tokio::test]
async fn transaction_log_paginates_newest_first() {
    let app = TestApp::new().await;
    let part = app.seed_part("DIO-1N4148", 10, 1).await;

    reserve(&*app.db, part.id, 2, None, None)
        .await
        .expect("reserve");
    release(&*app.db, part.id, 2, PartCondition::Excellent, None, None)
        .await
        .expect("release");

    let (page, total) = app
        .services
        .inventory
        .list_transactions(part.id, 1, 2)
        .await
        .expect("list transactions");
    // add + borrow + return
    assert_eq!(total, 3);
    assert_eq!(page.len(), 2);
}
