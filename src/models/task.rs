//! Task model, inputs and partial updates.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use super::conversation::{Conversation, NewConversation};
use super::double_option;

/// Lifecycle status for a task.
///
/// `pending → processing → {completed, failed}`; the last two are terminal
/// for the worker pool.
#[derive(Debug, Clone, Copy, Serialize, Deserialize, PartialEq, Eq, Hash)]
#[serde(rename_all = "snake_case")]
pub enum TaskStatus {
    /// Waiting to be claimed by a worker instance.
    Pending,
    /// Claimed and owned by exactly one worker instance.
    Processing,
    /// Processed successfully by its owner.
    Completed,
    /// Processing raised a fault; not retried automatically.
    Failed,
}

/// Task domain entity persisted in `SQLite`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Task {
    /// Unique record identifier.
    pub id: i64,
    /// Short human-readable title.
    pub title: String,
    /// Optional longer description.
    pub description: Option<String>,
    /// Current lifecycle status.
    pub status: TaskStatus,
    /// Creation timestamp; drives FIFO claim order.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
    /// Set when the owning instance completes the task.
    pub processed_at: Option<DateTime<Utc>>,
    /// Worker instance that currently owns (or last owned) the task.
    pub processing_instance_id: Option<String>,
}

/// A task together with its conversations, ordered by creation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskWithConversations {
    /// The task record.
    #[serde(flatten)]
    pub task: Task,
    /// Conversations owned by the task.
    pub conversations: Vec<Conversation>,
}

/// Listing row returned by the task index.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskSummary {
    /// Task identifier.
    pub id: i64,
    /// Task title.
    pub title: String,
    /// Current status.
    pub status: TaskStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Number of conversations attached to the task.
    pub conversation_count: i64,
}

/// Input for creating a task with optional initial conversations.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewTask {
    /// Task title; must be non-empty.
    pub title: String,
    /// Optional description.
    #[serde(default)]
    pub description: Option<String>,
    /// Conversations created alongside the task.
    #[serde(default)]
    pub conversations: Vec<NewConversation>,
}

impl NewTask {
    /// Construct a task input without conversations.
    #[must_use]
    pub fn new(title: impl Into<String>) -> Self {
        Self {
            title: title.into(),
            description: None,
            conversations: Vec::new(),
        }
    }

    /// Attach an initial conversation.
    #[must_use]
    pub fn with_conversation(mut self, conversation: NewConversation) -> Self {
        self.conversations.push(conversation);
        self
    }
}

/// Partial task update; absent fields are left untouched.
///
/// `description` distinguishes "absent" (`None`) from "clear it"
/// (`Some(None)`).
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct TaskUpdate {
    /// New title.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub title: Option<String>,
    /// New description, or explicit null to clear it.
    #[serde(
        default,
        deserialize_with = "double_option",
        skip_serializing_if = "Option::is_none"
    )]
    pub description: Option<Option<String>>,
    /// New status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<TaskStatus>,
}
