use axum::{
    Json,
    body::Bytes,
    extract::{Path, State},
};
use mousetrap_core::orchestration::{IngestOutcome, OrchestratorSnapshot, parse_message};
use mousetrap_model::{ErrorCode, Task};
use tracing::info;

use crate::errors::{AppError, AppResult};
use crate::infra::app_state::AppState;

/// `GET /api/tasks`: the in-flight task plus every SCANNING and PENDING row.
pub async fn list_tasks_handler(
    State(state): State<AppState>,
) -> AppResult<Json<OrchestratorSnapshot>> {
    Ok(Json(state.orchestrator.snapshot().await?))
}

/// `GET /api/tasks/{*file_path}`
pub async fn get_task_handler(
    State(state): State<AppState>,
    Path(file_path): Path<String>,
) -> AppResult<Json<Task>> {
    state
        .store
        .get(&file_path)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::not_found(format!("no task for {file_path}")))
}

/// `POST /api/tasks` with `{filePath, notifyChannels?}`.
///
/// Same validation as a queue message. No notification is sent when the
/// file is missing; the caller gets a 422 instead.
pub async fn create_task_handler(
    State(state): State<AppState>,
    body: Bytes,
) -> AppResult<Json<Task>> {
    let raw = std::str::from_utf8(&body)
        .map_err(|_| AppError::bad_request("request body is not UTF-8"))?;
    let request = parse_message(raw)?;

    match state.pipeline.register(request).await? {
        IngestOutcome::Created(task) => {
            info!(file = %task.file_path, step = "api_create", success = true, "task registered");
            Ok(Json(task))
        }
        IngestOutcome::FileMissing(_) => {
            Err(AppError::unprocessable(ErrorCode::FileNotExist))
        }
    }
}
