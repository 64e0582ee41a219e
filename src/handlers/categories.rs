use axum::{
    extract::{Path, State},
    response::Json,
    routing::{get, post},
    Router,
};
use uuid::Uuid;

use crate::{
    entities::category, services::categories::NewCategory, ApiResponse, ApiResult, AppState,
};

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/", post(create_category).get(list_categories))
        .route("/:id", get(get_category))
}

async fn create_category(
    State(state): State<AppState>,
    Json(payload): Json<NewCategory>,
) -> ApiResult<category::Model> {
    let created = state.services.categories.create(payload).await?;
    Ok(Json(ApiResponse::success(created)))
}

async fn list_categories(State(state): State<AppState>) -> ApiResult<Vec<category::Model>> {
    let categories = state.services.categories.list_active().await?;
    Ok(Json(ApiResponse::success(categories)))
}

async fn get_category(
    State(state): State<AppState>,
    Path(id): Path<Uuid>,
) -> ApiResult<category::Model> {
    let found = state.services.categories.get(id).await?;
    Ok(Json(ApiResponse::success(found)))
}
