//! Task API handlers.

use axum::{
    extract::{rejection::JsonRejection, Path, Query, State},
    http::StatusCode,
    Json,
};
use serde::{Deserialize, Serialize};
use std::sync::Arc;
use reelpress_core::{
    CleanupResult, Disposition, SubmitRequest, SubmitResponse, TaskDetail, TaskStatus,
    TaskSummary,
};

use super::error::ApiError;
use super::middleware::AuthUser;
use crate::state::AppState;

// ============================================================================
// Request/Response Types
// ============================================================================

/// Query parameters for listing tasks
#[derive(Debug, Deserialize)]
pub struct ListTasksParams {
    /// Filter by derived status, e.g. `COMPLETED`
    pub status: Option<String>,
    /// Maximum number of tasks to return (default 20, max 100)
    pub limit: Option<usize>,
}

/// Response for listing tasks
#[derive(Debug, Serialize)]
pub struct ListTasksResponse {
    pub tasks: Vec<TaskSummary>,
    pub count: usize,
}

/// Request body for the cleanup endpoint
#[derive(Debug, Deserialize)]
pub struct CleanupBody {
    pub action: Disposition,
}

fn json_body<T>(body: Result<Json<T>, JsonRejection>) -> Result<T, ApiError> {
    body.map(|Json(value)| value)
        .map_err(|rejection| ApiError::validation(rejection.body_text()))
}

// ============================================================================
// Handlers
// ============================================================================

/// Submit a manifest; responds with one upload URL per file.
pub async fn submit_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    body: Result<Json<SubmitRequest>, JsonRejection>,
) -> Result<(StatusCode, Json<SubmitResponse>), ApiError> {
    let request = json_body(body)?;
    let response = state.coordinator().submit(&user_id, request).await?;
    Ok((StatusCode::CREATED, Json(response)))
}

pub async fn list_tasks(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Query(params): Query<ListTasksParams>,
) -> Result<Json<ListTasksResponse>, ApiError> {
    let status = match params.status.as_deref() {
        Some(raw) => Some(
            TaskStatus::parse(&raw.to_ascii_uppercase())
                .ok_or_else(|| ApiError::validation(format!("unknown status {:?}", raw)))?,
        ),
        None => None,
    };

    let tasks = state.coordinator().list(&user_id, status, params.limit)?;
    Ok(Json(ListTasksResponse {
        count: tasks.len(),
        tasks,
    }))
}

pub async fn get_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<String>,
) -> Result<Json<TaskDetail>, ApiError> {
    Ok(Json(state.coordinator().status(&user_id, &task_id)?))
}

/// Begin processing once the sources are uploaded.
pub async fn start_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<String>,
) -> Result<(StatusCode, Json<TaskDetail>), ApiError> {
    let detail = state.coordinator().start(&user_id, &task_id).await?;
    Ok((StatusCode::ACCEPTED, Json(detail)))
}

pub async fn cancel_task(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path(task_id): Path<String>,
) -> Result<Json<TaskDetail>, ApiError> {
    Ok(Json(state.coordinator().cancel(&user_id, &task_id).await?))
}

/// Record that a completed output was downloaded or should be discarded.
pub async fn cleanup_file(
    State(state): State<Arc<AppState>>,
    AuthUser(user_id): AuthUser,
    Path((task_id, file_id)): Path<(String, String)>,
    body: Result<Json<CleanupBody>, JsonRejection>,
) -> Result<Json<CleanupResult>, ApiError> {
    let body = json_body(body)?;
    let result = state
        .cleanup()
        .cleanup(&user_id, &task_id, &file_id, body.action)
        .await?;
    Ok(Json(result))
}
