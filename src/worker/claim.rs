//! Claim protocol: how an instance obtains exclusive ownership of a task.

use std::sync::Arc;

use crate::persistence::store::TaskStore;
use crate::Result;

/// Sequencing wrapper over [`TaskStore::claim_next_pending`].
///
/// Holds no state of its own; mutual exclusion comes entirely from the
/// store's atomic claim.
#[derive(Clone)]
pub struct ClaimProtocol {
    store: Arc<dyn TaskStore>,
}

impl ClaimProtocol {
    /// Create a claim protocol over `store`.
    #[must_use]
    pub fn new(store: Arc<dyn TaskStore>) -> Self {
        Self { store }
    }

    /// Try to claim the oldest pending task for `instance_id`.
    ///
    /// `Ok(None)` covers both an empty queue and a lost race; neither is a
    /// failure.
    ///
    /// # Errors
    ///
    /// Returns the store error if the claim could not be attempted.
    pub async fn claim(&self, instance_id: &str) -> Result<Option<i64>> {
        self.store.claim_next_pending(instance_id).await
    }
}
