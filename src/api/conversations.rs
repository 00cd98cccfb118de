//! Conversation handlers.

use std::sync::Arc;

use axum::extract::{Path, State};
use axum::http::StatusCode;
use axum::Json;

use crate::models::conversation::{Conversation, ConversationUpdate, NewConversation};
use crate::persistence::conversation_repo::ConversationRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::{AppError, Result};

use super::tasks::task_not_found;
use super::AppState;

/// `POST /tasks/{id}/conversations`
///
/// # Errors
///
/// Returns `AppError::NotFound` if the task does not exist or
/// `AppError::Validation` for empty content.
pub async fn create(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
    Json(input): Json<NewConversation>,
) -> Result<(StatusCode, Json<Conversation>)> {
    let created = ConversationRepo::new(Arc::clone(&state.db))
        .create(task_id, &input)
        .await
        .map_err(|err| match err {
            AppError::NotFound(_) => task_not_found(),
            other => other,
        })?;
    Ok((StatusCode::CREATED, Json(created)))
}

/// `GET /tasks/{id}/conversations`
///
/// # Errors
///
/// Returns `AppError::NotFound` if the task does not exist.
pub async fn list(
    State(state): State<Arc<AppState>>,
    Path(task_id): Path<i64>,
) -> Result<Json<Vec<Conversation>>> {
    if TaskRepo::new(Arc::clone(&state.db))
        .get_by_id(task_id)
        .await?
        .is_none()
    {
        return Err(task_not_found());
    }

    let conversations = ConversationRepo::new(Arc::clone(&state.db))
        .list_for_task(task_id)
        .await?;
    Ok(Json(conversations))
}

/// `PUT /conversations/{id}`
///
/// # Errors
///
/// Returns `AppError::NotFound` if the conversation does not exist.
pub async fn update(
    State(state): State<Arc<AppState>>,
    Path(id): Path<i64>,
    Json(update): Json<ConversationUpdate>,
) -> Result<Json<Conversation>> {
    ConversationRepo::new(Arc::clone(&state.db))
        .update(id, &update)
        .await?
        .map(Json)
        .ok_or_else(|| AppError::NotFound("Conversation not found".into()))
}
