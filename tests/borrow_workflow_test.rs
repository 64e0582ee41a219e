mod common;

use chrono::{Duration, Utc};
use rstest::rstest;
use sea_orm::{ActiveModelTrait, ColumnTrait, EntityTrait, QueryFilter, Set};
use uuid::Uuid;

use borrowdesk_api::{
    entities::borrow_record::RecordCondition,
    entities::borrow_request::{self, RequestStatus},
    entities::inventory_transaction::{self, TransactionType},
    entities::part::{PartCondition, PartStatus},
    entities::request_history::{self, HistoryAction},
    errors::ServiceError,
    services::requests::{ItemReturn, NewBorrowItem, NewBorrowRequest},
};

use common::TestApp;

fn new_request(requester_id: Uuid, items: Vec<NewBorrowItem>) -> NewBorrowRequest {
    NewBorrowRequest {
        requester_id,
        purpose: "Embedded systems course project".into(),
        expected_return_date: Utc::now().date_naive() + Duration::days(14),
        urgency: Default::default(),
        requester_notes: None,
        items,
    }
}

fn linked_item(part: &borrowdesk_api::entities::part::Model, quantity: i32) -> NewBorrowItem {
    NewBorrowItem {
        part_id: Some(part.id),
        part_name: part.name_en.clone(),
        part_number: part.part_number.clone(),
        part_description: String::new(),
        quantity,
        unit_cost: None,
        condition: RecordCondition::Excellent,
        serial_numbers: vec![],
    }
}

async fn history_actions(app: &TestApp, request_id: Uuid) -> Vec<HistoryAction> {
    request_history::Entity::find()
        .filter(request_history::Column::RequestId.eq(request_id))
        .all(&*app.db)
        .await
        .expect("load history")
        .into_iter()
        .map(|row| row.action)
        .collect()
}

async fn borrow_transactions(app: &TestApp, part_id: Uuid) -> Vec<inventory_transaction::Model> {
    inventory_transaction::Entity::find()
        .filter(inventory_transaction::Column::PartId.eq(part_id))
        .all(&*app.db)
        .await
        .expect("load transactions")
}

#[tokio::test]
async fn submit_creates_request_records_and_history() {
    let app = TestApp::new().await;
    let part = app.seed_part("ARD-UNO-R3", 5, 1).await;
    let requester = Uuid::new_v4();

    let unlinked = NewBorrowItem {
        part_id: None,
        part_name: "Custom shield".into(),
        part_number: String::new(),
        part_description: "Hand-soldered prototype".into(),
        quantity: 1,
        unit_cost: None,
        condition: RecordCondition::Good,
        serial_numbers: vec![],
    };
    let request = app
        .services
        .requests
        .submit(new_request(requester, vec![linked_item(&part, 2), unlinked]))
        .await
        .expect("submit request");

    assert_eq!(request.status, RequestStatus::Submitted);
    assert_eq!(request.requester_id, requester);

    let details = app
        .services
        .requests
        .get_details(request.id)
        .await
        .expect("load details");
    assert_eq!(details.records.len(), 2);
    assert_eq!(
        history_actions(&app, request.id).await,
        vec![HistoryAction::Created, HistoryAction::Submitted]
    );

    // Submission alone must not touch stock
    assert_eq!(app.reload_part(part.id).await.available_quantity, 5);
}

#[tokio::test]
async fn approve_reserves_stock_and_logs_exactly_once() {
    let app = TestApp::new().await;
    let part = app.seed_part("SEN-HCSR04", 5, 1).await;
    let requester = Uuid::new_v4();
    let approver = Uuid::new_v4();

    let request = app
        .services
        .requests
        .submit(new_request(requester, vec![linked_item(&part, 2)]))
        .await
        .expect("submit request");

    let approved = app
        .services
        .requests
        .approve(request.id, approver)
        .await
        .expect("approve request");

    assert_eq!(approved.status, RequestStatus::Approved);
    assert_eq!(approved.approved_by, Some(approver));
    assert!(approved.approval_date.is_some());

    let reloaded = app.reload_part(part.id).await;
    assert_eq!(reloaded.available_quantity, 3);

    let borrows: Vec<_> = borrow_transactions(&app, part.id)
        .await
        .into_iter()
        .filter(|txn| txn.transaction_type == TransactionType::Borrow)
        .collect();
    assert_eq!(borrows.len(), 1);
    assert_eq!(borrows[0].quantity, -2);
    assert_eq!(borrows[0].previous_quantity, 5);
    assert_eq!(borrows[0].new_quantity, 3);
    assert_eq!(borrows[0].reference_id, Some(request.id));

    let approvals = history_actions(&app, request.id)
        .await
        .into_iter()
        .filter(|action| *action == HistoryAction::Approved)
        .count();
    assert_eq!(approvals, 1);
}

#[tokio::test]
async fn approve_with_insufficient_stock_rolls_everything_back() {
    let app = TestApp::new().await;
    let part = app.seed_part("RES-KIT-220", 10, 1).await;

    // Bring the shelf down to 3 of 10
    borrowdesk_api::services::inventory::reserve(&*app.db, part.id, 7, None, None)
        .await
        .expect("reserve 7 units");
    assert_eq!(app.reload_part(part.id).await.available_quantity, 3);

    let request = app
        .services
        .requests
        .submit(new_request(Uuid::new_v4(), vec![linked_item(&part, 5)]))
        .await
        .expect("submit request");
    let transactions_before = borrow_transactions(&app, part.id).await.len();
    let history_before = history_actions(&app, request.id).await.len();

    let err = app
        .services
        .requests
        .approve(request.id, Uuid::new_v4())
        .await
        .expect_err("approval must fail");
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    // Nothing moved: quantity, status, audit trail all unchanged
    assert_eq!(app.reload_part(part.id).await.available_quantity, 3);
    let request = borrow_request::Entity::find_by_id(request.id)
        .one(&*app.db)
        .await
        .expect("query request")
        .expect("request exists");
    assert_eq!(request.status, RequestStatus::Submitted);
    assert_eq!(
        borrow_transactions(&app, part.id).await.len(),
        transactions_before
    );
    assert_eq!(history_actions(&app, request.id).await.len(), history_before);
}

#[tokio::test]
async fn partial_reservation_failure_releases_nothing() {
    let app = TestApp::new().await;
    let plenty = app.seed_part("LED-KIT-RGB", 10, 1).await;
    let scarce = app.seed_part("LCD-1602", 1, 1).await;

    let request = app
        .services
        .requests
        .submit(new_request(
            Uuid::new_v4(),
            vec![linked_item(&plenty, 4), linked_item(&scarce, 2)],
        ))
        .await
        .expect("submit request");

    let err = app
        .services
        .requests
        .approve(request.id, Uuid::new_v4())
        .await
        .expect_err("approval must fail on the second item");
    assert!(matches!(err, ServiceError::InsufficientStock(_)));

    // The first item's reservation was rolled back with the transaction
    assert_eq!(app.reload_part(plenty.id).await.available_quantity, 10);
    assert_eq!(app.reload_part(scarce.id).await.available_quantity, 1);
}

#[tokio::test]
async fn reject_requires_reason_and_writes_no_history_without_one() {
    let app = TestApp::new().await;
    let part = app.seed_part("SRV-SG90", 3, 1).await;
    let request = app
        .services
        .requests
        .submit(new_request(Uuid::new_v4(), vec![linked_item(&part, 1)]))
        .await
        .expect("submit request");
    let history_before = history_actions(&app, request.id).await.len();

    let err = app
        .services
        .requests
        .reject(request.id, Uuid::new_v4(), "   ".into())
        .await
        .expect_err("blank reason must fail");
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));
    assert_eq!(history_actions(&app, request.id).await.len(), history_before);

    let rejected = app
        .services
        .requests
        .reject(request.id, Uuid::new_v4(), "Parts reserved for finals week".into())
        .await
        .expect("reject with reason");
    assert_eq!(rejected.status, RequestStatus::Rejected);
    assert_eq!(
        rejected.rejection_reason.as_deref(),
        Some("Parts reserved for finals week")
    );
}

#[rstest]
#[case::cancelled(RequestStatus::Cancelled)]
#[case::rejected(RequestStatus::Rejected)]
#[tokio::test]
async fn terminal_requests_refuse_every_transition(#[case] terminal: RequestStatus) {
    let app = TestApp::new().await;
    let part = app.seed_part("CAP-100UF", 4, 1).await;
    let request = app
        .services
        .requests
        .submit(new_request(Uuid::new_v4(), vec![linked_item(&part, 1)]))
        .await
        .expect("submit request");

    match terminal {
        RequestStatus::Cancelled => {
            app.services
                .requests
                .cancel(request.id, request.requester_id, None)
                .await
                .expect("cancel");
        }
        RequestStatus::Rejected => {
            app.services
                .requests
                .reject(request.id, Uuid::new_v4(), "No longer stocked".into())
                .await
                .expect("reject");
        }
        other => panic!("not a terminal fixture: {:?}", other),
    }

    let actor = Uuid::new_v4();
    let approve_err = app
        .services
        .requests
        .approve(request.id, actor)
        .await
        .expect_err("approve must fail");
    assert!(matches!(approve_err, ServiceError::InvalidTransition { .. }));

    let cancel_err = app
        .services
        .requests
        .cancel(request.id, actor, None)
        .await
        .expect_err("cancel must fail");
    assert!(matches!(cancel_err, ServiceError::InvalidTransition { .. }));

    let return_err = app
        .services
        .requests
        .mark_returned(request.id, actor, vec![])
        .await
        .expect_err("return must fail");
    assert!(matches!(return_err, ServiceError::InvalidTransition { .. }));
}

#[tokio::test]
async fn cancel_after_approval_fails_precondition() {
    let app = TestApp::new().await;
    let part = app.seed_part("MTR-DC-6V", 4, 1).await;
    let request = app
        .services
        .requests
        .submit(new_request(Uuid::new_v4(), vec![linked_item(&part, 1)]))
        .await
        .expect("submit request");
    app.services
        .requests
        .approve(request.id, Uuid::new_v4())
        .await
        .expect("approve");

    let err = app
        .services
        .requests
        .cancel(request.id, request.requester_id, Some("changed my mind".into()))
        .await
        .expect_err("cancel after approval must fail");
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));
}

#[tokio::test]
async fn borrow_and_return_round_trip_restores_stock_exactly() {
    let app = TestApp::new().await;
    let part = app.seed_part("BRD-FULL", 5, 1).await;
    let requester = Uuid::new_v4();
    let staff = Uuid::new_v4();

    let request = app
        .services
        .requests
        .submit(new_request(requester, vec![linked_item(&part, 2)]))
        .await
        .expect("submit");
    app.services
        .requests
        .approve(request.id, staff)
        .await
        .expect("approve");
    assert_eq!(app.reload_part(part.id).await.available_quantity, 3);

    let borrowed = app
        .services
        .requests
        .mark_borrowed(request.id, staff)
        .await
        .expect("mark borrowed");
    assert_eq!(borrowed.status, RequestStatus::Borrowed);
    assert!(borrowed.borrowed_date.is_some());

    let returned = app
        .services
        .requests
        .mark_returned(request.id, staff, vec![])
        .await
        .expect("mark returned");
    assert_eq!(returned.status, RequestStatus::Returned);
    assert!(returned.actual_return_date.is_some());

    let reloaded = app.reload_part(part.id).await;
    assert_eq!(reloaded.available_quantity, 5);
    assert_eq!(reloaded.status, PartStatus::Available);
    assert_eq!(reloaded.condition, PartCondition::Excellent);
}

#[tokio::test]
async fn damaged_return_updates_part_and_writes_second_transaction() {
    let app = TestApp::new().await;
    let part = app.seed_part("PSU-BENCH", 2, 0).await;
    let staff = Uuid::new_v4();

    let request = app
        .services
        .requests
        .submit(new_request(Uuid::new_v4(), vec![linked_item(&part, 1)]))
        .await
        .expect("submit");
    app.services
        .requests
        .approve(request.id, staff)
        .await
        .expect("approve");
    app.services
        .requests
        .mark_borrowed(request.id, staff)
        .await
        .expect("borrow");

    let details = app
        .services
        .requests
        .get_details(request.id)
        .await
        .expect("details");
    let record_id = details.records[0].id;

    app.services
        .requests
        .mark_returned(
            request.id,
            staff,
            vec![ItemReturn {
                record_id,
                condition: RecordCondition::OutOfOrder,
                damage_description: Some("Output stage blown".into()),
                replacement_cost: None,
            }],
        )
        .await
        .expect("return damaged");

    let reloaded = app.reload_part(part.id).await;
    assert_eq!(reloaded.condition, PartCondition::OutOfOrder);
    assert_eq!(reloaded.status, PartStatus::Maintenance);
    assert_eq!(reloaded.available_quantity, 2);

    let types: Vec<_> = borrow_transactions(&app, part.id)
        .await
        .into_iter()
        .map(|txn| txn.transaction_type)
        .collect();
    assert!(types.contains(&TransactionType::Return));
    assert!(types.contains(&TransactionType::Damaged));

    let details = app
        .services
        .requests
        .get_details(request.id)
        .await
        .expect("details");
    assert_eq!(
        details.records[0].condition_returned,
        Some(RecordCondition::OutOfOrder)
    );
    assert_eq!(
        details.records[0].damage_description.as_deref(),
        Some("Output stage blown")
    );
}

#[tokio::test]
async fn overdue_flow_flags_and_then_accepts_return() {
    let app = TestApp::new().await;
    let part = app.seed_part("OSC-PROBE", 3, 1).await;
    let staff = Uuid::new_v4();

    let request = app
        .services
        .requests
        .submit(new_request(Uuid::new_v4(), vec![linked_item(&part, 1)]))
        .await
        .expect("submit");
    app.services
        .requests
        .approve(request.id, staff)
        .await
        .expect("approve");
    app.services
        .requests
        .mark_borrowed(request.id, staff)
        .await
        .expect("borrow");

    // Not yet past due: the precondition holds the transition back
    let err = app
        .services
        .requests
        .mark_overdue(request.id, staff)
        .await
        .expect_err("not overdue yet");
    assert!(matches!(err, ServiceError::PreconditionFailed(_)));

    // Age the loan past its expected return date
    let stale = borrow_request::Entity::find_by_id(request.id)
        .one(&*app.db)
        .await
        .expect("query request")
        .expect("request exists");
    let mut stale: borrow_request::ActiveModel = stale.into();
    stale.expected_return_date = Set(Utc::now().date_naive() - Duration::days(2));
    stale.update(&*app.db).await.expect("age request");

    let overdue = app
        .services
        .requests
        .mark_overdue(request.id, staff)
        .await
        .expect("mark overdue");
    assert_eq!(overdue.status, RequestStatus::Overdue);

    let listed = app
        .services
        .requests
        .list_overdue()
        .await
        .expect("list overdue");
    // Listing targets borrowed requests awaiting the flag; this one is flagged already
    assert!(listed.iter().all(|req| req.id != request.id));

    let returned = app
        .services
        .requests
        .mark_returned(request.id, staff, vec![])
        .await
        .expect("return overdue loan");
    assert_eq!(returned.status, RequestStatus::Returned);
    assert_eq!(app.reload_part(part.id).await.available_quantity, 3);
}

#[rstest]
#[case::too_soon(0)]
#[case::too_far(120)]
#[tokio::test]
async fn submit_rejects_return_dates_outside_policy(#[case] days_ahead: i64) {
    let app = TestApp::new().await;
    let part = app.seed_part("JMP-WIRES", 5, 1).await;

    let mut request = new_request(Uuid::new_v4(), vec![linked_item(&part, 1)]);
    request.expected_return_date = Utc::now().date_naive() + Duration::days(days_ahead);

    let err = app
        .services
        .requests
        .submit(request)
        .await
        .expect_err("out-of-window date must fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));

    // Nothing persisted
    let (requests, total) = app
        .services
        .requests
        .list(Default::default(), 1, 10)
        .await
        .expect("list");
    assert_eq!(total, 0);
    assert!(requests.is_empty());
}

#[tokio::test]
async fn submit_rejects_duplicate_line_items() {
    let app = TestApp::new().await;
    let part = app.seed_part("TMP-DHT22", 5, 1).await;

    let err = app
        .services
        .requests
        .submit(new_request(
            Uuid::new_v4(),
            vec![linked_item(&part, 1), linked_item(&part, 2)],
        ))
        .await
        .expect_err("duplicate items must fail");
    assert!(matches!(err, ServiceError::ValidationError(_)));
}

#[tokio::test]
async fn draft_flow_submits_later_and_filters_by_status() {
    let app = TestApp::new().await;
    let part = app.seed_part("POT-10K", 5, 1).await;
    let requester = Uuid::new_v4();

    let draft = app
        .services
        .requests
        .create_draft(new_request(requester, vec![linked_item(&part, 1)]))
        .await
        .expect("create draft");
    assert_eq!(draft.status, RequestStatus::Draft);
    assert_eq!(
        history_actions(&app, draft.id).await,
        vec![HistoryAction::Created]
    );

    // Draft is not in the approval queue yet
    let err = app
        .services
        .requests
        .approve(draft.id, Uuid::new_v4())
        .await
        .expect_err("draft cannot be approved");
    assert!(matches!(err, ServiceError::InvalidTransition { .. }));

    let submitted = app
        .services
        .requests
        .submit_draft(draft.id, requester)
        .await
        .expect("submit draft");
    assert_eq!(submitted.status, RequestStatus::Submitted);

    let filter = borrowdesk_api::services::requests::RequestFilter {
        requester_id: Some(requester),
        status: Some(RequestStatus::Submitted),
        ..Default::default()
    };
    let (requests, total) = app
        .services
        .requests
        .list(filter, 1, 10)
        .await
        .expect("list submitted");
    assert_eq!(total, 1);
    assert_eq!(requests[0].id, draft.id);

    let stats = app
        .services
        .requests
        .stats(Some(requester))
        .await
        .expect("stats");
    assert_eq!(stats.total, 1);
    assert_eq!(stats.submitted, 1);
}
