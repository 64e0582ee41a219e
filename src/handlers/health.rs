use axum::{
    extract::State,
    http::{header, StatusCode},
    response::{IntoResponse, Json},
    routing::get,
    Router,
};
use prometheus::{Encoder, TextEncoder};
use serde::Serialize;
use tracing::error;

use crate::{db, AppState};

#[derive(Debug, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum ComponentStatus {
    Up,
    Down,
}

#[derive(Debug, Serialize)]
pub struct HealthResponse {
    pub status: ComponentStatus,
    pub version: &'static str,
    pub database: ComponentStatus,
    pub timestamp: String,
}

pub fn routes() -> Router<AppState> {
    Router::new()
        .route("/health", get(health))
        .route("/metrics", get(metrics))
}

async fn health(State(state): State<AppState>) -> impl IntoResponse {
    let database = match db::check_connection(&state.db).await {
        Ok(()) => ComponentStatus::Up,
        Err(e) => {
            error!("Database health check failed: {}", e);
            ComponentStatus::Down
        }
    };

    let (status, overall) = match database {
        ComponentStatus::Up => (StatusCode::OK, ComponentStatus::Up),
        ComponentStatus::Down => (StatusCode::SERVICE_UNAVAILABLE, ComponentStatus::Down),
    };

    (
        status,
        Json(HealthResponse {
            status: overall,
            version: env!("CARGO_PKG_VERSION"),
            database,
            timestamp: chrono::Utc::now().to_rfc3339(),
        }),
    )
}

async fn metrics() -> impl IntoResponse {
    let metric_families = prometheus::gather();
    let mut buffer = Vec::new();
    let encoder = TextEncoder::new();
    if let Err(e) = encoder.encode(&metric_families, &mut buffer) {
        error!("Failed to encode metrics: {}", e);
        return (StatusCode::INTERNAL_SERVER_ERROR, String::new()).into_response();
    }

    (
        StatusCode::OK,
        [(header::CONTENT_TYPE, encoder.format_type().to_string())],
        buffer,
    )
        .into_response()
}
