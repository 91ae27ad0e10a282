use crate::api::AppState;
use axum::{extract::State, http::StatusCode, response::IntoResponse, routing::get, Json, Router};
use serde_json::json;
use std::sync::Arc;

pub fn health_routes() -> Router<Arc<AppState>> {
    Router::new().route("/health", get(health))
}

pub fn root_routes() -> Router<Arc<AppState>> {
    Router::new().route("/", get(root))
}

async fn health(State(state): State<Arc<AppState>>) -> impl IntoResponse {
    let db_ok = state.collaborators.gateway.get_task(uuid::Uuid::nil()).await;
    let db_reachable = !matches!(db_ok, Err(crate::error::AppError::StoreUnavailable(_)));

    let status = if db_reachable { StatusCode::OK } else { StatusCode::SERVICE_UNAVAILABLE };
    let body = json!({
        "status": if db_reachable { "healthy" } else { "degraded" },
        "version": env!("CARGO_PKG_VERSION"),
        "services": {
            "database": db_reachable,
        },
    });

    (status, Json(body))
}

async fn root() -> impl IntoResponse {
    Json(json!({
        "service": "dub-streamer",
        "version": env!("CARGO_PKG_VERSION"),
    }))
}
