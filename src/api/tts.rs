use crate::api::AppState;
use crate::error::{AppError, Result};
use crate::models::TaskStatus;
use crate::pipeline::run_complete_tts_pipeline;
use axum::{
    extract::{Path, State},
    http::StatusCode,
    routing::{get, post},
    Json, Router,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use uuid::Uuid;

pub fn tts_routes() -> Router<Arc<AppState>> {
    Router::new()
        .route("/start_tts", post(start_tts))
        .route("/task/:id/status", get(task_status))
}

#[derive(Debug, Deserialize)]
struct StartTtsRequest {
    task_id: Uuid,
}

#[derive(Debug, Serialize)]
struct StartTtsResponse {
    status: &'static str,
    task_id: Uuid,
}

/// Kicks off `run_complete_tts_pipeline` in the background and returns
/// immediately. The task row itself is the source of truth for progress;
/// this endpoint only validates the task exists before detaching the work.
async fn start_tts(
    State(state): State<Arc<AppState>>,
    Json(req): Json<StartTtsRequest>,
) -> Result<(StatusCode, Json<StartTtsResponse>)> {
    state.collaborators.gateway.get_task(req.task_id).await?;

    let collaborators = state.collaborators.clone();
    let task_id = req.task_id;
    tokio::spawn(async move {
        if let Err(e) = run_complete_tts_pipeline(collaborators, task_id).await {
            tracing::error!("task {task_id} failed: {e}");
        }
    });

    Ok((StatusCode::ACCEPTED, Json(StartTtsResponse { status: "processing", task_id: req.task_id })))
}

#[derive(Debug, Serialize)]
struct TaskStatusResponse {
    task_id: Uuid,
    status: TaskStatus,
    hls_playlist_url: Option<String>,
    error_message: Option<String>,
}

async fn task_status(
    State(state): State<Arc<AppState>>,
    Path(id): Path<Uuid>,
) -> Result<Json<TaskStatusResponse>> {
    let task = state.collaborators.gateway.get_task(id).await.map_err(|e| match e {
        AppError::NotFound(_) => AppError::NotFound(id.to_string()),
        other => other,
    })?;

    let hls_playlist_url = matches!(task.status, TaskStatus::Processing | TaskStatus::Completed)
        .then(|| format!("hls/{id}/playlist.m3u8"));

    Ok(Json(TaskStatusResponse {
        task_id: task.id,
        status: task.status,
        hls_playlist_url,
        error_message: task.error_message,
    }))
}
