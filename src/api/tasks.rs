//! Task CRUD handlers.

use std::sync::Arc;

use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::Json;
use serde::Deserialize;
use serde_json::{json, Value};

use crate::models::task::{NewTask, TaskSummary, TaskUpdate, TaskWithConversations};
use crate::persistence::task_repo::TaskRepo;
use crate::{AppError, Result};

use super::AppState;

const DEFAULT_PAGE_SIZE: i64 = 100;

/// Pagination parameters for `GET /tasks`.
#[derive(Debug, Deserialize)]
pub struct ListParams {
    /// Rows to skip.
    #[serde(default)]
    pub skip: i64,
    /// Maximum rows to return.
    #[serde(default = "default_limit")]
    pub limit: i64,
}

fn default_limit() -> i64 {
    DEFAULT_PAGE_SIZE
}

pub(crate) fn task_not_found() -> AppError {
    AppError::NotFound("Task not found".into())
}

/// `POST /tasks`
///
/// # Errors
///
/// Returns `AppError::Validation` for bad input or `AppError::Db` on store failure.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Json(input): Json<NewTask>,
) -> Result<(StatusCode, Json<TaskWithConversations>)> {
    let created = TaskRepo::new(Arc::clone(&state.db)).create(&input).await?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /tasks?skip=&limit=`
///
/// # Errors
///
/// Returns `AppError::Db` on store failure.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Query(params): Query<ListParams>,
) -> Result<Json<Vec<TaskSummary>>> {
    let tasks = TaskRepo::new(Arc::clone(&state.db))
        .list(params.skip, params.limit)
        .await?;
    Ok(Json(tasks))
}

/// `GET /tasks/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` if the task does not exist.
pub async fn get(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<TaskWithConversations>> {
    TaskRepo::new(Arc::clone(&state.db))
        .get_with_conversations(id)
        .await?
        .map(Json)
        .ok_or_else(task_not_found)
}

/// `PUT /tasks/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` if the task does not exist or
/// `AppError::Validation` for bad input.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(update): Json<TaskUpdate>,
) -> Result<Json<TaskWithConversations>> {
    TaskRepo::new(Arc::clone(&state.db))
        .update(id, &update)
        .await?
        .map(Json)
        .ok_or_else(task_not_found)
}

/// `DELETE /tasks/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` if the task does not exist.
pub async fn delete(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
) -> Result<Json<Value>> {
    if TaskRepo::new(Arc::clone(&state.db)).delete(id).await? {
        Ok(Json(json!({ "message": "Task deleted successfully" })))
    } else {
        Err(task_not_found())
    }
}
