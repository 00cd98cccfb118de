//! Processing callback invoked once a task has been claimed.

use std::future::Future;
use std::pin::Pin;
use std::sync::Arc;
use std::time::Duration;

use tracing::info;

use crate::models::conversation::ConversationStatus;
use crate::persistence::store::TaskStore;
use crate::Result;

/// Unit of work executed for a claimed task.
///
/// Implementations perform their side effects and then either return
/// `Ok(())` or an error. There is no partial-completion signal and no
/// internal retry; the worker marks the task `completed` or `failed`
/// based solely on the result.
pub trait TaskProcessor: Send + Sync {
    /// Process the task identified by `task_id`.
    ///
    /// # Errors
    ///
    /// Any error marks the task `failed`.
    fn process(&self, task_id: i64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>>;
}

/// Default processor: waits a fixed delay standing in for real work, then
/// marks every conversation of the task `processed`.
#[derive(Clone)]
pub struct SimulatedProcessor {
    store: Arc<dyn TaskStore>,
    duration: Duration,
}

impl SimulatedProcessor {
    /// Create a processor that sleeps for `duration` per task.
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>, duration: Duration) -> Self {
        Self { store, duration }
    }
}

impl TaskProcessor for SimulatedProcessor {
    fn process(&self, task_id: i64) -> Pin<Box<dyn Future<Output = Result<()>> + Send + '_>> {
        Box::pin(async move {
            tokio::time::sleep(self.duration).await;

            let count = self
                .store
                .update_conversations_status(task_id, ConversationStatus::Processed)
                .await?;
            info!(task_id, count, "conversations marked processed");
            Ok(())
        })
    }
}
