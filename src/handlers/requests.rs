use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post},
    Router,
};
use chrono::{DateTime, Utc};
use serde::Deserialize;
use uuid::Uuid;

use crate::{
    entities::borrow_request::{self, RequestStatus},
    services::requests::{ItemReturn, NewBorrowRequest, RequestDetails, RequestFilter, RequestStats},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_request).get(list_requests))
        .route("/overdue", get(list_overdue))
        .route("/due-soon", get(list_due_soon))
        .route("/stats", get(request_stats))
        .route("/:id", get(get_request))
        .route("/:id/submit", post(submit_draft))
        .route("/:id/approve", post(approve_request))
        .route("/:id/reject", post(reject_request))
        .route("/:id/borrow", post(mark_borrowed))
        .route("/:id/return", post(mark_returned))
        .route("/:id/overdue", post(mark_overdue))
        .route("/:id/damaged", post(mark_damaged))
        .route("/:id/cancel", post(cancel_request))
        .route("/:id/notes", post(add_note))
}

#[derive(Debug, Deserialize)]
pub struct CreateRequestPayload {
    #[serde(flatten)]
    pub request: NewBorrowRequest,
    /// Create as a draft instead of submitting straight away.
    #[serde(default)]
    pub draft: bool,
}

#[derive(Debug, Deserialize)]
pub struct ActorPayload {
    pub actor_id: Uuid,
}

#[derive(Debug, Deserialize)]
pub struct RejectPayload {
    pub actor_id: Uuid,
    pub reason: String,
}

#[derive(Debug, Deserialize)]
pub struct ReturnPayload {
    pub actor_id: Uuid,
    #[serde(default)]
    pub items: Vec<ItemReturn>,
}

#[derive(Debug, Deserialize)]
pub struct DamagedPayload {
    pub actor_id: Uuid,
    pub notes: String,
}

#[derive(Debug, Deserialize)]
pub struct CancelPayload {
    pub actor_id: Uuid,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct NotePayload {
    pub actor_id: Uuid,
    pub note: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RequestListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub requester_id: Option<Uuid>,
    pub status: Option<RequestStatus>,
    pub created_after: Option<DateTime<Utc>>,
    pub created_before: Option<DateTime<Utc>>,
}

#[derive(Debug, Deserialize, Default)]
pub struct StatsQuery {
    pub requester_id: Option<Uuid>,
}

async fn create_request(
    State(state): State<AppState>,
    Json(payload): Json<CreateRequestPayload>,
) -> ApiResult<borrow_request::Model> {
    let service = &state.services.requests;
    let created = if payload.draft {
        service.create_draft(payload.request).await?
    } else {
        service.submit(payload.request).await?
    };
    Ok(Json(ApiResponse::success(created)))
}

async fn list_requests(
    State(state): State<AppState>,
    Query(query): Query<RequestListQuery>,
) -> ApiResult<PaginatedResponse<borrow_request::Model>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(state.config.api_default_page_size)
        .clamp(1, state.config.api_max_page_size);

    let filter = RequestFilter {
        requester_id: query.requester_id,
        status: query.status,
        created_after: query.created_after,
        created_before: query.created_before,
    };
    let (items, total) = state.services.requests.list(filter, page, limit).await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

async fn get_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<RequestDetails> {
    let details = state.services.requests.get_details(id).await?;
    Ok(Json(ApiResponse::success(details)))
}

async fn list_overdue(State(state): State<AppState>) -> ApiResult<Vec<borrow_request::Model>> {
    let requests = state.services.requests.list_overdue().await?;
    Ok(Json(ApiResponse::success(requests)))
}

async fn list_due_soon(State(state): State<AppState>) -> ApiResult<Vec<borrow_request::Model>> {
    let requests = state.services.requests.list_due_soon().await?;
    Ok(Json(ApiResponse::success(requests)))
}

async fn request_stats(
    State(state): State<AppState>,
    Query(query): Query<StatsQuery>,
) -> ApiResult<RequestStats> {
    let stats = state.services.requests.stats(query.requester_id).await?;
    Ok(Json(ApiResponse::success(stats)))
}

async fn submit_draft(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorPayload>,
) -> ApiResult<borrow_request::Model> {
    let updated = state
        .services
        .requests
        .submit_draft(id, payload.actor_id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn approve_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorPayload>,
) -> ApiResult<borrow_request::Model> {
    let updated = state
        .services
        .requests
        .approve(id, payload.actor_id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn reject_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RejectPayload>,
) -> ApiResult<borrow_request::Model> {
    let updated = state
        .services
        .requests
        .reject(id, payload.actor_id, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn mark_borrowed(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorPayload>,
) -> ApiResult<borrow_request::Model> {
    let updated = state
        .services
        .requests
        .mark_borrowed(id, payload.actor_id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn mark_returned(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReturnPayload>,
) -> ApiResult<borrow_request::Model> {
    let updated = state
        .services
        .requests
        .mark_returned(id, payload.actor_id, payload.items)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn mark_overdue(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ActorPayload>,
) -> ApiResult<borrow_request::Model> {
    let updated = state
        .services
        .requests
        .mark_overdue(id, payload.actor_id)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn mark_damaged(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<DamagedPayload>,
) -> ApiResult<borrow_request::Model> {
    let updated = state
        .services
        .requests
        .mark_damaged(id, payload.actor_id, payload.notes)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn cancel_request(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<CancelPayload>,
) -> ApiResult<borrow_request::Model> {
    let updated = state
        .services
        .requests
        .cancel(id, payload.actor_id, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn add_note(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<NotePayload>,
) -> ApiResult<()> {
    state
        .services
        .requests
        .add_note(id, payload.actor_id, payload.note)
        .await?;
    Ok(Json(ApiResponse::message("Note added")))
}
