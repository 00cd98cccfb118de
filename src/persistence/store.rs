//! Store abstraction consumed by the worker pool.
//!
//! The [`TaskStore`] trait is the only shared state between worker
//! instances. Every method is atomic with respect to persisted state;
//! instances never coordinate in memory.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use crate::models::conversation::ConversationStatus;
use crate::Result;

use super::conversation_repo::ConversationRepo;
use super::db::Database;
use super::task_repo::TaskRepo;

/// Boxed future returned by [`TaskStore`] methods.
pub type StoreFuture<'a, T> = Pin<Box<dyn Future<Output = Result<T>> + Send + 'a>>;

/// Lifecycle transitions the worker pool relies on.
pub trait TaskStore: Send + Sync {
    /// Claim the oldest pending task for `instance_id`.
    ///
    /// Returns `Ok(None)` when nothing is pending or the race was lost.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn claim_next_pending<'a>(&'a self, instance_id: &'a str) -> StoreFuture<'a, Option<i64>>;

    /// `processing → completed`, guarded on ownership.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn complete<'a>(&'a self, task_id: i64, instance_id: &'a str) -> StoreFuture<'a, bool>;

    /// `processing → failed`, guarded on ownership.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn fail<'a>(&'a self, task_id: i64, instance_id: &'a str) -> StoreFuture<'a, bool>;

    /// Unconditionally set `status` on every conversation of `task_id`.
    ///
    /// # Errors
    ///
    /// Returns an error if the store is unreachable.
    fn update_conversations_status(
        &self,
        task_id: i64,
        status: ConversationStatus,
    ) -> StoreFuture<'_, u64>;
}

/// [`TaskStore`] backed by the `SQLite` repositories.
#[derive(Clone)]
pub struct SqliteTaskStore {
    tasks: TaskRepo,
    conversations: ConversationRepo,
}

impl SqliteTaskStore {
    /// Build a store over `db`. Claims never expire.
    #[must_use]
    pub fn new(db: Arc<Database>) -> Self {
        Self {
            tasks: TaskRepo::new(Arc::clone(&db)),
            conversations: ConversationRepo::new(db),
        }
    }

    /// Enable stale-claim recovery with the given bound.
    #[must_use]
    pub fn with_stale_claim_after(mut self, bound: Option<Duration>) -> Self {
        self.tasks = self.tasks.with_stale_claim_after(bound);
        self
    }
}

impl TaskStore for SqliteTaskStore {
    fn claim_next_pending<'a>(&'a self, instance_id: &'a str) -> StoreFuture<'a, Option<i64>> {
        Box::pin(self.tasks.claim_next_pending(instance_id))
    }

    fn complete<'a>(&'a self, task_id: i64, instance_id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(self.tasks.complete(task_id, instance_id))
    }

    fn fail<'a>(&'a self, task_id: i64, instance_id: &'a str) -> StoreFuture<'a, bool> {
        Box::pin(self.tasks.fail(task_id, instance_id))
    }

    fn update_conversations_status(
        &self,
        task_id: i64,
        status: ConversationStatus,
    ) -> StoreFuture<'_, u64> {
        Box::pin(self.conversations.update_status_for_task(task_id, status))
    }
}
