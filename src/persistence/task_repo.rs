//! Task repository for `SQLite` persistence.
//!
//! Besides plain CRUD this repository owns the guarded lifecycle
//! transitions used by the worker pool: [`claim_next_pending`],
//! [`complete`] and [`fail`]. Every transition is a single guarded
//! `UPDATE`, so correctness across processes rests on `SQLite` write
//! locking and never on in-memory state.
//!
//! [`claim_next_pending`]: TaskRepo::claim_next_pending
//! [`complete`]: TaskRepo::complete
//! [`fail`]: TaskRepo::fail

use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use sqlx::{QueryBuilder, Sqlite};
use tracing::{debug, info};

use crate::models::task::{NewTask, Task, TaskStatus, TaskSummary, TaskUpdate, TaskWithConversations};
use crate::{AppError, Result};

use super::conversation_repo::{conversation_status_str, validate_content, ConversationRepo};
use super::db::Database;
use super::{format_ts, parse_ts};

const MAX_TITLE_LEN: usize = 255;
const MAX_PAGE_SIZE: i64 = 1000;

/// Repository wrapper around `SQLite` for task records.
#[derive(Clone)]
pub struct TaskRepo {
    db: Arc<Database>,
    stale_claim_after: Option<Duration>,
}

/// Internal row struct for `SQLite` deserialization.
#[derive(sqlx::FromRow)]
struct TaskRow {
    id: i64,
    title: String,
    description: Option<String>,
    status: String,
    created_at: String,
    updated_at: String,
    processed_at: Option<String>,
    processing_instance_id: Option<String>,
}

impl TaskRow {
    fn into_task(self) -> Result<Task> {
        let processed_at = self
            .processed_at
            .as_deref()
            .map(|raw| parse_ts(raw, "processed_at"))
            .transpose()?;

        Ok(Task {
            id: self.id,
            title: self.title,
            description: self.description,
            status: parse_task_status(&self.status)?,
            created_at: parse_ts(&self.created_at, "created_at")?,
            updated_at: parse_ts(&self.updated_at, "updated_at")?,
            processed_at,
            processing_instance_id: self.processing_instance_id,
        })
    }
}

#[derive(sqlx::FromRow)]
struct TaskSummaryRow {
    id: i64,
    title: String,
    status: String,
    created_at: String,
    conversation_count: i64,
}

impl TaskSummaryRow {
    fn into_summary(self) -> Result<TaskSummary> {
        Ok(TaskSummary {
            id: self.id,
            title: self.title,
            status: parse_task_status(&self.status)?,
            created_at: parse_ts(&self.created_at, "created_at")?,
            conversation_count: self.conversation_count,
        })
    }
}

fn parse_task_status(s: &str) -> Result<TaskStatus> {
    match s {
        "pending" => Ok(TaskStatus::Pending),
        "processing" => Ok(TaskStatus::Processing),
        "completed" => Ok(TaskStatus::Completed),
        "failed" => Ok(TaskStatus::Failed),
        other => Err(AppError::Db(format!("invalid task status: {other}"))),
    }
}

fn task_status_str(s: TaskStatus) -> &'static str {
    match s {
        TaskStatus::Pending => "pending",
        TaskStatus::Processing => "processing",
        TaskStatus::Completed => "completed",
        TaskStatus::Failed => "failed",
    }
}

fn claim_result(task_id: i64, flipped: bool) -> Option<i64> {
    if flipped {
        Some(task_id)
    } else {
        debug!(task_id, "claim race lost");
        None
    }
}

fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(AppError::Validation("task title must not be empty".into()));
    }
    if title.chars().count() > MAX_TITLE_LEN {
        return Err(AppError::Validation(format!(
            "task title must be at most {MAX_TITLE_LEN} characters"
        )));
    }
    Ok(())
}

impl TaskRepo {
    /// Create a new repository instance. Claims never expire.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            db,
            stale_claim_after: None,
        }
    }

    /// Allow [`claim_next_pending`](Self::claim_next_pending) to reclaim
    /// `processing` tasks whose claim is older than `bound`.
    #[must_use]
    pub fn with_stale_claim_after(mut self, bound: Option<Duration>) -> Self {
        self.stale_claim_after = bound;
        self
    }

    /// Insert a `pending` task and its initial conversations atomically.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an invalid title or empty
    /// conversation content, or `AppError::Db` if the insert fails.
    pub async fn create(&self, input: &NewTask) -> Result<TaskWithConversations> {
        validate_title(&input.title)?;
        for conversation in &input.conversations {
            validate_content(&conversation.content)?;
        }

        let now = format_ts(Utc::now());
        let mut tx = self.db.begin().await?;

        let task_id = sqlx::query(
            "INSERT INTO tasks (title, description, status, created_at, updated_at)
             VALUES (?1, ?2, 'pending', ?3, ?3)",
        )
        .bind(&input.title)
        .bind(&input.description)
        .bind(&now)
        .execute(&mut *tx)
        .await?
        .last_insert_rowid();

        for conversation in &input.conversations {
            sqlx::query(
                "INSERT INTO conversations (task_id, content, status, created_at, updated_at)
                 VALUES (?1, ?2, ?3, ?4, ?4)",
            )
            .bind(task_id)
            .bind(&conversation.content)
            .bind(conversation_status_str(conversation.status))
            .bind(&now)
            .execute(&mut *tx)
            .await?;
        }

        tx.commit().await?;
        debug!(task_id, conversations = input.conversations.len(), "task created");

        self.get_with_conversations(task_id)
            .await?
            .ok_or_else(|| AppError::Db("failed to create task".into()))
    }

    /// Retrieve a task by identifier.
    ///
    /// Returns `Ok(None)` if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn get_by_id(&self, id: i64) -> Result<Option<Task>> {
        let row: Option<TaskRow> = sqlx::query_as("SELECT * FROM tasks WHERE id = ?1")
            .bind(id)
            .fetch_optional(self.db.as_ref())
            .await?;

        row.map(TaskRow::into_task).transpose()
    }

    /// Retrieve a task together with its conversations.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if either query fails.
    pub async fn get_with_conversations(&self, id: i64) -> Result<Option<TaskWithConversations>> {
        let Some(task) = self.get_by_id(id).await? else {
            return Ok(None);
        };
        let conversations = ConversationRepo::new(Arc::clone(&self.db))
            .list_for_task(id)
            .await?;

        Ok(Some(TaskWithConversations {
            task,
            conversations,
        }))
    }

    /// List task summaries, newest first.
    ///
    /// `limit` is clamped to `1..=1000`; a negative `skip` is treated as 0.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn list(&self, skip: i64, limit: i64) -> Result<Vec<TaskSummary>> {
        let rows: Vec<TaskSummaryRow> = sqlx::query_as(
            "SELECT t.id, t.title, t.status, t.created_at,
                    COUNT(c.id) AS conversation_count
             FROM tasks t
             LEFT JOIN conversations c ON c.task_id = t.id
             GROUP BY t.id
             ORDER BY t.created_at DESC, t.id DESC
             LIMIT ?1 OFFSET ?2",
        )
        .bind(limit.clamp(1, MAX_PAGE_SIZE))
        .bind(skip.max(0))
        .fetch_all(self.db.as_ref())
        .await?;

        rows.into_iter().map(TaskSummaryRow::into_summary).collect()
    }

    /// Apply the fields present in `update` and bump `updated_at`.
    ///
    /// Returns `Ok(None)` if the task does not exist.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Validation` for an invalid title or `AppError::Db`
    /// if the update fails.
    pub async fn update(&self, id: i64, update: &TaskUpdate) -> Result<Option<TaskWithConversations>> {
        if let Some(title) = &update.title {
            validate_title(title)?;
        }

        let mut query: QueryBuilder<'_, Sqlite> = QueryBuilder::new("UPDATE tasks SET updated_at = ");
        query.push_bind(format_ts(Utc::now()));
        if let Some(title) = &update.title {
            query.push(", title = ").push_bind(title.clone());
        }
        if let Some(description) = &update.description {
            query.push(", description = ").push_bind(description.clone());
        }
        if let Some(status) = update.status {
            query.push(", status = ").push_bind(task_status_str(status));
        }
        query.push(" WHERE id = ").push_bind(id);

        let result = query.build().execute(self.db.as_ref()).await?;
        if result.rows_affected() == 0 {
            return Ok(None);
        }
        if let Some(status) = update.status {
            info!(task_id = id, status = task_status_str(status), "task status set externally");
        }

        self.get_with_conversations(id).await
    }

    /// Delete a task and, by cascade, its conversations.
    ///
    /// Returns whether a task was deleted.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the delete fails.
    pub async fn delete(&self, id: i64) -> Result<bool> {
        let result = sqlx::query("DELETE FROM tasks WHERE id = ?1")
            .bind(id)
            .execute(self.db.as_ref())
            .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Atomically select the oldest `pending` task and mark it `processing`
    /// under `instance_id`.
    ///
    /// The write lock is taken (`BEGIN IMMEDIATE`) before the candidate is
    /// read, so no other claimant can observe or flip the same row until
    /// this transaction commits. The flip is still guarded on the status
    /// it was selected with; zero affected rows is a lost race and yields
    /// `Ok(None)`.
    ///
    /// With a stale-claim bound configured, a `processing` task whose claim
    /// is older than the bound becomes a candidate once no `pending` task
    /// remains.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the transaction fails.
    pub async fn claim_next_pending(&self, instance_id: &str) -> Result<Option<i64>> {
        let now = Utc::now();
        let now_s = format_ts(now);
        let mut tx = self.db.begin_with("BEGIN IMMEDIATE").await?;

        let pending: Option<i64> = sqlx::query_scalar(
            "SELECT id FROM tasks WHERE status = 'pending'
             ORDER BY created_at ASC, id ASC LIMIT 1",
        )
        .fetch_optional(&mut *tx)
        .await?;

        let claimed = if let Some(task_id) = pending {
            let flipped = sqlx::query(
                "UPDATE tasks
                 SET status = 'processing', processing_instance_id = ?1, updated_at = ?2
                 WHERE id = ?3 AND status = 'pending'",
            )
            .bind(instance_id)
            .bind(&now_s)
            .bind(task_id)
            .execute(&mut *tx)
            .await?
            .rows_affected()
                == 1;
            claim_result(task_id, flipped)
        } else if let Some(cutoff) = self.stale_cutoff(now) {
            let stale: Option<(i64, String)> = sqlx::query_as(
                "SELECT id, updated_at FROM tasks
                 WHERE status = 'processing' AND updated_at < ?1
                 ORDER BY updated_at ASC, id ASC LIMIT 1",
            )
            .bind(format_ts(cutoff))
            .fetch_optional(&mut *tx)
            .await?;

            match stale {
                Some((task_id, claimed_at)) => {
                    let reclaimed = sqlx::query(
                        "UPDATE tasks
                         SET processing_instance_id = ?1, updated_at = ?2
                         WHERE id = ?3 AND status = 'processing' AND updated_at = ?4",
                    )
                    .bind(instance_id)
                    .bind(&now_s)
                    .bind(task_id)
                    .bind(&claimed_at)
                    .execute(&mut *tx)
                    .await?
                    .rows_affected()
                        == 1;
                    if reclaimed {
                        info!(task_id, instance_id, %claimed_at, "reclaimed stale task");
                    }
                    claim_result(task_id, reclaimed)
                }
                None => None,
            }
        } else {
            None
        };

        tx.commit().await?;
        Ok(claimed)
    }

    /// Transition `processing → completed` and stamp `processed_at`, only if
    /// `instance_id` still owns the task.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn complete(&self, task_id: i64, instance_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks
             SET status = 'completed', processed_at = ?1, updated_at = ?1
             WHERE id = ?2 AND processing_instance_id = ?3 AND status = 'processing'",
        )
        .bind(format_ts(Utc::now()))
        .bind(task_id)
        .bind(instance_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Transition `processing → failed`, only if `instance_id` still owns
    /// the task. `processed_at` is left unset.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the update fails.
    pub async fn fail(&self, task_id: i64, instance_id: &str) -> Result<bool> {
        let result = sqlx::query(
            "UPDATE tasks
             SET status = 'failed', updated_at = ?1
             WHERE id = ?2 AND processing_instance_id = ?3 AND status = 'processing'",
        )
        .bind(format_ts(Utc::now()))
        .bind(task_id)
        .bind(instance_id)
        .execute(self.db.as_ref())
        .await?;

        Ok(result.rows_affected() > 0)
    }

    /// Number of tasks per status. Statuses with no tasks are absent.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_by_status(&self) -> Result<HashMap<TaskStatus, i64>> {
        let rows: Vec<(String, i64)> =
            sqlx::query_as("SELECT status, COUNT(*) FROM tasks GROUP BY status")
                .fetch_all(self.db.as_ref())
                .await?;

        rows.into_iter()
            .map(|(status, count)| Ok((parse_task_status(&status)?, count)))
            .collect()
    }

    /// Number of completed tasks per owning instance.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn completed_by_instance(&self) -> Result<HashMap<String, i64>> {
        let rows: Vec<(String, i64)> = sqlx::query_as(
            "SELECT processing_instance_id, COUNT(*) FROM tasks
             WHERE status = 'completed' AND processing_instance_id IS NOT NULL
             GROUP BY processing_instance_id",
        )
        .fetch_all(self.db.as_ref())
        .await?;

        Ok(rows.into_iter().collect())
    }

    /// Number of tasks created at or after `since`.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count_created_since(&self, since: DateTime<Utc>) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks WHERE created_at >= ?1")
            .bind(format_ts(since))
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(count)
    }

    /// Total number of tasks.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Db` if the query fails.
    pub async fn count(&self) -> Result<i64> {
        let count: i64 = sqlx::query_scalar("SELECT COUNT(*) FROM tasks")
            .fetch_one(self.db.as_ref())
            .await?;
        Ok(count)
    }

    /// Oldest `updated_at` a claim may carry before it counts as stale.
    ///
    /// A bound reaching back past the representable range means no claim
    /// can be stale yet.
    fn stale_cutoff(&self, now: DateTime<Utc>) -> Option<DateTime<Utc>> {
        let bound = chrono::Duration::from_std(self.stale_claim_after?).ok()?;
        now.checked_sub_signed(bound)
    }
}
