use axum::{Json, extract::State, http::StatusCode};
use serde_json::{Value, json};
use tracing::warn;

use crate::infra::app_state::AppState;

pub async fn root_handler() -> Json<Value> {
    Json(json!({
        "service": "mousetrap",
        "version": env!("CARGO_PKG_VERSION"),
        "routes": [
            "GET /health",
            "GET /api/tasks",
            "GET /api/tasks/{filePath}",
            "POST /api/tasks",
        ],
    }))
}

/// 200 when the scan engine passes its health probe, 500 otherwise.
pub async fn health_handler(
    State(state): State<AppState>,
) -> (StatusCode, Json<Value>) {
    let timestamp = chrono::Utc::now().to_rfc3339();
    match state.engine.health_check().await {
        Ok(true) => (
            StatusCode::OK,
            Json(json!({ "status": "healthy", "timestamp": timestamp })),
        ),
        Ok(false) => {
            warn!("health check: scan engine failed validation");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "unhealthy",
                    "reason": "scan engine failed validation",
                    "timestamp": timestamp,
                })),
            )
        }
        Err(e) => {
            warn!(error = %e, "health check: scan engine unreachable");
            (
                StatusCode::INTERNAL_SERVER_ERROR,
                Json(json!({
                    "status": "unhealthy",
                    "reason": e.to_string(),
                    "timestamp": timestamp,
                })),
            )
        }
    }
}
