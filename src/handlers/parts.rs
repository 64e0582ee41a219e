use axum::{
    extract::{Path, Query, State},
    response::Json,
    routing::{get, post, put},
    Router,
};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::{
    entities::inventory_transaction,
    entities::part::{self, PartCondition, PartStatus},
    localization::Locale,
    services::parts::{NewPart, PartFilter, PartUpdate},
    ApiResponse, ApiResult, AppState, PaginatedResponse,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_part).get(list_parts))
        .route("/low-stock", get(low_stock_parts))
        .route("/:id", get(get_part).put(update_part))
        .route("/:id/receive", post(receive_stock))
        .route("/:id/adjust", post(adjust_stock))
        .route("/:id/repair", put(mark_repaired))
        .route("/:id/transactions", get(list_transactions))
}

#[derive(Debug, Deserialize, Default)]
pub struct PartListQuery {
    pub page: Option<u64>,
    pub limit: Option<u64>,
    pub search: Option<String>,
    pub category_id: Option<Uuid>,
    pub status: Option<PartStatus>,
    pub condition: Option<PartCondition>,
    /// Display language for resolved names; defaults to English.
    pub locale: Option<Locale>,
}

#[derive(Debug, Deserialize, Default)]
pub struct LocaleQuery {
    pub locale: Option<Locale>,
}

#[derive(Debug, Serialize)]
pub struct PartSummary {
    pub id: Uuid,
    pub name: String,
    pub part_number: String,
    pub category_id: Uuid,
    pub total_quantity: i32,
    pub available_quantity: i32,
    pub minimum_stock: i32,
    pub condition: PartCondition,
    pub status: PartStatus,
    pub is_low_stock: bool,
    pub is_borrowable: bool,
}

impl PartSummary {
    fn from_model(model: &part::Model, locale: Locale) -> Self {
        Self {
            id: model.id,
            name: model.name().get(locale).to_string(),
            part_number: model.part_number.clone(),
            category_id: model.category_id,
            total_quantity: model.total_quantity,
            available_quantity: model.available_quantity,
            minimum_stock: model.minimum_stock,
            condition: model.condition,
            status: model.status,
            is_low_stock: model.is_low_stock(),
            is_borrowable: model.is_borrowable(),
        }
    }
}

#[derive(Debug, Deserialize)]
pub struct ReceivePayload {
    pub quantity: i32,
    pub actor_id: Option<Uuid>,
    pub reason: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct AdjustPayload {
    pub delta: i32,
    pub actor_id: Option<Uuid>,
    pub reason: String,
}

#[derive(Debug, Deserialize, Default)]
pub struct RepairPayload {
    pub actor_id: Option<Uuid>,
    pub notes: Option<String>,
}

async fn create_part(
    State(state): State<AppState>,
    Json(payload): Json<NewPart>,
) -> ApiResult<part::Model> {
    let created = state.services.parts.create(payload).await?;
    Ok(Json(ApiResponse::success(created)))
}

async fn list_parts(
    State(state): State<AppState>,
    Query(query): Query<PartListQuery>,
) -> ApiResult<PaginatedResponse<PartSummary>> {
    let page = query.page.unwrap_or(1).max(1);
    let limit = query
        .limit
        .unwrap_or(state.config.api_default_page_size)
        .clamp(1, state.config.api_max_page_size);
    let locale = query.locale.unwrap_or_default();

    let filter = PartFilter {
        search: query.search,
        category_id: query.category_id,
        status: query.status,
        condition: query.condition,
    };
    let (items, total) = state.services.parts.list(filter, page, limit).await?;
    let items = items
        .iter()
        .map(|model| PartSummary::from_model(model, locale))
        .collect();
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}

async fn get_part(State(state): State<AppState>, Path(id): Path<Uuid>) -> ApiResult<part::Model> {
    let found = state.services.parts.get(id).await?;
    Ok(Json(ApiResponse::success(found)))
}

async fn update_part(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<PartUpdate>,
) -> ApiResult<part::Model> {
    let updated = state.services.parts.update(id, payload).await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn low_stock_parts(
    State(state): State<AppState>,
    Query(query): Query<LocaleQuery>,
) -> ApiResult<Vec<PartSummary>> {
    let locale = query.locale.unwrap_or_default();
    let parts = state.services.inventory.low_stock_parts().await?;
    let parts = parts
        .iter()
        .map(|model| PartSummary::from_model(model, locale))
        .collect();
    Ok(Json(ApiResponse::success(parts)))
}

async fn receive_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<ReceivePayload>,
) -> ApiResult<part::Model> {
    let updated = state
        .services
        .inventory
        .receive(id, payload.quantity, payload.actor_id, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn adjust_stock(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<AdjustPayload>,
) -> ApiResult<part::Model> {
    let updated = state
        .services
        .inventory
        .adjust(id, payload.delta, payload.actor_id, payload.reason)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn mark_repaired(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Json(payload): Json<RepairPayload>,
) -> ApiResult<part::Model> {
    let updated = state
        .services
        .inventory
        .mark_repaired(id, payload.actor_id, payload.notes)
        .await?;
    Ok(Json(ApiResponse::success(updated)))
}

async fn list_transactions(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
    Query(query): Query<crate::ListQuery>,
) -> ApiResult<PaginatedResponse<inventory_transaction::Model>> {
    let page = query.page.max(1);
    let limit = query.limit.clamp(1, state.config.api_max_page_size);
    let (items, total) = state
        .services
        .inventory
        .list_transactions(id, page, limit)
        .await?;
    Ok(Json(ApiResponse::success(PaginatedResponse::new(
        items, total, page, limit,
    ))))
}
