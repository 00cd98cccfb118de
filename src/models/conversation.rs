//! Conversation model attached to tasks.

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// Status of a single conversation.
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum ConversationStatus {
    /// Default for newly created conversations.
    #[default]
    Active,
    /// Set in bulk once the owning task has been processed.
    Processed,
    /// Retired by an external caller.
    Archived,
}

/// Conversation domain entity persisted in `SQLite`.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct Conversation {
    /// Unique record identifier.
    pub id: i64,
    /// Owning task; deleting the task deletes the conversation.
    pub task_id: i64,
    /// Conversation body.
    pub content: String,
    /// Current status.
    pub status: ConversationStatus,
    /// Creation timestamp.
    pub created_at: DateTime<Utc>,
    /// Last mutation timestamp.
    pub updated_at: DateTime<Utc>,
}

/// Input for creating a conversation.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct NewConversation {
    /// Conversation body; must be non-empty.
    pub content: String,
    /// Initial status, `active` when omitted.
    #[serde(default)]
    pub status: ConversationStatus,
}

impl NewConversation {
    /// Construct an `active` conversation input.
    #[must_use]
    pub fn new(content: impl Into<String>) -> Self {
        Self {
            content: content.into(),
            status: ConversationStatus::Active,
        }
    }
}

/// Partial conversation update; absent fields are left untouched.
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq, Eq)]
pub struct ConversationUpdate {
    /// New content.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
    /// New status.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub status: Option<ConversationStatus>,
}
