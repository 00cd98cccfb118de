//! Conversation repository for `SQLite` persistence.

use std::sync::Arc;

use chrono::Utc;
use sqlx::{QueryBuilder, Sqlite};

use crate::models::conversation::{
    Conversation, ConversationStatus, ConversationUpdate, NewConversation,
};
use crate::{AppError, Result};

use super::db::Database;
use super::{format_ts, parse_ts};

/// Repository wrapper around `SQLite` for conversation records.
#[derive(Clone)]
pub struct ConversationRepo {
    db: Arc<Database>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct ConversationRow {
    id: i64,
    task_id: i64,
    content: String,
    status: String,
    created_at: String,
    updated_at: String,
}

impl ConversationRow {
    fn into_conversation(self) -> Result<Conversation> {
        Ok(Conversation {
            id: self.id,
            task_id: self.task_id,
            content: self.content,
            status: parse_conversation_status(&self.status)?,
            created_at: parse_ts(&self.created_at, "created_at")?,
            updated_at: parse_ts(&self.updated_at, "updated_at")?,
        })
    }
}

pub(crate) fn parse_conversation_status(s: &str) -> Result<ConversationStatus> {
    match s {
        "active" => Ok(ConversationStatus::Active),
        "processed" => Ok(ConversationStatus::Processed),
        "archived" => Ok(ConversationStatus::Archived),
        other => Err(AppError::Db(format!("invalid conversation status: {other}"))),
    }
}

pub(crate) fn conversation_status_str(s: ConversationStatus) -> &'static str {
    match s {
        ConversationStatus::Active => "active",
        ConversationStatus::Processed => "processed",
        ConversationStatus::Archived => "archived",
    }
}

pub(crate) fn validate_content(content: &str) -> Result<()> {
    if content.trim().is_empty() {
        return Err(AppError::Validation(
            "conversation content must not be empty".into(),
        ));
    }
    Ok(())
}

impl ConversationRepo {
    /// Create a new repository instance.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self { db }
    }

    /// Insert a conversation under an existing task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for empty content, `AppError::NotFound`
    /// if the task does not exist, or `AppError::Db` if the insert fails.
    pub async fn create(&self, task_id: i64, input: &NewConversation) -> Result<Conversation> {
        validate_content(&input.content)?;

        // The write lock is held from the existence check through the
        // insert, so a concurrent delete cannot slip in between.
        let mut tx = self.db.begin_with("BEGIN IMMEDIATE").await?;

        let exists: Option<i64> = sqlx::query_scalar("SELECT id FROM tasks WHERE id = ?1")
            .bind(task_id)
            .fetch_optional(&mut *tx)
            .await?;
        if exists.is_none() {
            return Err(AppError::NotFound(format!("task {task_id} not found")));
        }

        let now = format_ts(Utc::now());
        let id = sqlx::query(
            "INSERT INTO conversations (task_id, content, status, created_at, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?4)",
        )
        .bind(task_id)
        .bind(&input.content)
        .bind(conversation_status_str(input.status))
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        let row: ConversationRow = sqlx::query_as("SELECT * FROM conversations WHERE id = ?1")
            .bind(id)
            .fetch_one(&mut *tx)
            .await?;
        tx.commit().await?;

        row.into_conversation()
    }

    /// Retrieve a conversation by identifier.
    ///
    /// Returns `Ok(None)` if the conversation does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Conversation>> {
        let row: Option<ConversationRow> =
            sqlx::query_as("SELECT * FROM conversations WHERE id = ?1")
                .bind(id)
                .fetch_optional(self.db.as_ref())
                .await?;

        row.map(ConversationRow::into_conversation).transpose()
    }

    /// List all conversations for a task in creation order.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list_for_task(&self, task_id: i64) -> Result<Vec<Conversation>> {
        let rows: Vec<ConversationRow> = sqlx::query_as(
            "SELECT * FROM conversations WHERE task_id = ?1 ORDER BY created_at ASC, id ASC",
        )
        .bind(task_id)
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter()
            .map(ConversationRow::into_conversation)
            .collect()
    }

    /// Apply the fields present in `update` and bump `updated_at`.
    ///
    /// Returns `Ok(None)` if the conversation does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for empty content or `AppError::Db`
    /// if the update fails.
    pub async fn update(
        &self,
        id: i64,
        update: &ConversationUpdate,
    ) -> Result<Option<Conversation>> {
        if let Some(content) = &update.content {
            validate_content(content)?;
        }

        let mut query: QueryBuilder<'_, Sqlite> =
            QueryBuilder::new("UPDATE conversations SET updated_at = ");
        query.push_bind(format_ts(Utc::now()));
        if let Some(content) = &update.content {
            query.push(", content = ").push_bind(content.clone());
        }
        if let Some(status) = update.status {
            query
                .push(", status = ")
                .push_bind(conversation_status_str(status));
        }
        query.push(" WHERE id = ").push_bind(id);

        let result = query.build().execute(self.db.as_ref()).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }

        self.get_by_id(id).await
    }

    /// Set `status` on every conversation of a task, regardless of the
    /// previous status. Returns the number of rows touched.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn update_status_for_task(
        &self,
        task_id: i64,
        status: ConversationStatus,
    ) -> Result<u64> {
        let result = sqlx::query(
            "UPDATE conversations SET status = ?1, updated_at = ?2 WHERE task_id = ?3",
        )
        .bind(conversation_status_str(status))
        .bind(format_ts(Utc::now()))
        .bind(task_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected())
    }

    /// Total number of conversations.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM conversations")
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(count)
    }
}
