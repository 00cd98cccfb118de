//! Per-instance worker loop.
//!
//! The loop claims a task, runs the [`TaskProcessor`], then applies the
//! guarded `complete`/`fail` transition. With nothing to claim it waits
//! the idle interval; on a store fault it waits the longer error backoff.
//!
//! Stopping is cooperative. [`Worker::stop`] cancels a token that is
//! checked at the top of every iteration and cuts idle/backoff waits
//! short. A task already claimed always runs to `completed` or `failed`
//! before the loop exits. A panicking processor counts as a processing
//! fault, so the task is marked `failed` and the loop carries on.

use std::any::Any;
use std::panic::AssertUnwindSafe;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use std::time::Duration;

use futures_util::FutureExt;
use tokio::task::JoinHandle;
use tokio_util::sync::CancellationToken;
use tracing::{debug, error, info, info_span, warn, Instrument};
use uuid::Uuid;

use crate::config::WorkerSettings;
use crate::persistence::store::TaskStore;
use crate::{AppError, Result};

use super::claim::ClaimProtocol;
use super::processor::TaskProcessor;

/// Timing knobs for a single worker loop.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct WorkerConfig {
    /// Wait after finding no pending task.
    pub poll_interval: Duration,
    /// Wait after a loop-level fault.
    pub error_backoff: Duration,
}

impl Default for WorkerConfig {
    fn default() -> Self {
        Self::from(&WorkerSettings::default())
    }
}

impl From<&WorkerSettings> for WorkerConfig {
    fn from(settings: &WorkerSettings) -> Self {
        Self {
            poll_interval: settings.poll_interval(),
            error_backoff: settings.error_backoff(),
        }
    }
}

/// What happened to a claimed task.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum TaskOutcome {
    /// Processor succeeded and this instance marked the task `completed`.
    Completed,
    /// Processor failed; a `failed` transition was attempted.
    Failed,
    /// Processor succeeded but the task was no longer owned by this instance.
    OwnershipLost,
}

/// Read-only view of a worker's identity and run state.
#[derive(Debug, Clone)]
pub struct WorkerProbe {
    instance_id: String,
    running: Arc<AtomicBool>,
}

impl WorkerProbe {
    /// Ownership token written to claimed tasks.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Whether the loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }
}

/// A single worker instance.
pub struct Worker {
    instance_id: String,
    claims: ClaimProtocol,
    store: Arc<dyn TaskStore>,
    processor: Arc<dyn TaskProcessor>,
    config: WorkerConfig,
    stop: CancellationToken,
    running: Arc<AtomicBool>,
}

impl Worker {
    /// Construct a worker with a fresh random instance id.
    #[must_use]
    pub fn new(
        store: Arc<dyn TaskStore>,
        processor: Arc<dyn TaskProcessor>,
        config: WorkerConfig,
    ) -> Self {
        Self::with_instance_id(Uuid::new_v4().to_string(), store, processor, config)
    }

    /// Construct a worker with a caller-chosen instance id.
    #[must_use]
    pub fn with_instance_id(
        instance_id: String,
        store: Arc<dyn TaskStore>,
        processor: Arc<dyn TaskProcessor>,
        config: WorkerConfig,
    ) -> Self {
        Self {
            instance_id,
            claims: ClaimProtocol::new(Arc::clone(&store)),
            store,
            processor,
            config,
            stop: CancellationToken::new(),
            running: Arc::new(AtomicBool::new(false)),
        }
    }

    /// Ownership token written to claimed tasks.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        &self.instance_id
    }

    /// Whether the loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.running.load(Ordering::SeqCst)
    }

    /// Cheap cloneable view for status reporting.
    #[must_use]
    pub fn probe(&self) -> WorkerProbe {
        WorkerProbe {
            instance_id: self.instance_id.clone(),
            running: Arc::clone(&self.running),
        }
    }

    /// Request a cooperative stop. No new task is claimed afterwards.
    pub fn stop(&self) {
        info!(instance_id = %self.instance_id, "stopping worker");
        self.stop.cancel();
    }

    /// Run the loop until [`stop`](Self::stop) is called.
    ///
    /// Never returns an error; every fault is contained within an iteration.
    pub async fn start(&self) {
        let span = info_span!("worker", instance_id = %self.instance_id);
        self.run_loop().instrument(span).await;
    }

    /// Move the worker onto the tokio runtime.
    #[must_use]
    pub fn spawn(self) -> WorkerHandle {
        let probe = self.probe();
        let stop = self.stop.clone();
        let join = tokio::spawn(async move { self.start().await });

        WorkerHandle { probe, stop, join }
    }

    /// One claim attempt plus, if a task was claimed, its processing.
    ///
    /// Returns `Ok(None)` when nothing was claimed.
    ///
    /// # Errors
    ///
    /// Returns the store error if the claim or the `complete` transition
    /// could not be attempted.
    pub async fn run_once(&self) -> Result<Option<(i64, TaskOutcome)>> {
        let Some(task_id) = self.claims.claim(&self.instance_id).await? else {
            return Ok(None);
        };
        info!(task_id, "claimed task");

        let outcome = self.process(task_id).await?;
        Ok(Some((task_id, outcome)))
    }

    async fn run_loop(&self) {
        info!("worker started");
        self.running.store(true, Ordering::SeqCst);

        while !self.stop.is_cancelled() {
            match self.run_once().await {
                Ok(Some(_)) => {}
                Ok(None) => {
                    debug!("no pending task");
                    self.pause(self.config.poll_interval).await;
                }
                Err(err) => {
                    error!(%err, "worker loop fault, backing off");
                    self.pause(self.config.error_backoff).await;
                }
            }
        }

        self.running.store(false, Ordering::SeqCst);
        info!("worker stopped");
    }

    async fn process(&self, task_id: i64) -> Result<TaskOutcome> {
        let result = AssertUnwindSafe(self.processor.process(task_id))
            .catch_unwind()
            .await
            .unwrap_or_else(|payload| {
                Err(AppError::Processing(format!(
                    "processor panicked: {}",
                    panic_message(payload.as_ref())
                )))
            });

        match result {
            Ok(()) => {
                if self.store.complete(task_id, &self.instance_id).await? {
                    info!(task_id, "task completed");
                    Ok(TaskOutcome::Completed)
                } else {
                    error!(task_id, "task no longer owned by this instance; completion not applied");
                    Ok(TaskOutcome::OwnershipLost)
                }
            }
            Err(err) => {
                warn!(task_id, %err, "task processing failed");
                match self.store.fail(task_id, &self.instance_id).await {
                    Ok(true) => info!(task_id, "task marked failed"),
                    Ok(false) => {
                        error!(task_id, "task no longer owned by this instance; failure not applied");
                    }
                    Err(err) => error!(task_id, %err, "could not mark task failed"),
                }
                Ok(TaskOutcome::Failed)
            }
        }
    }

    async fn pause(&self, duration: Duration) {
        tokio::select! {
            () = self.stop.cancelled() => {}
            () = tokio::time::sleep(duration) => {}
        }
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> &str {
    if let Some(msg) = payload.downcast_ref::<&str>() {
        msg
    } else if let Some(msg) = payload.downcast_ref::<String>() {
        msg
    } else {
        "unknown panic"
    }
}

/// Handle to a spawned [`Worker`].
pub struct WorkerHandle {
    probe: WorkerProbe,
    stop: CancellationToken,
    join: JoinHandle<()>,
}

impl WorkerHandle {
    /// Ownership token of the spawned worker.
    #[must_use]
    pub fn instance_id(&self) -> &str {
        self.probe.instance_id()
    }

    /// Whether the loop is currently running.
    #[must_use]
    pub fn is_running(&self) -> bool {
        self.probe.is_running()
    }

    /// Cloneable status view.
    #[must_use]
    pub fn probe(&self) -> WorkerProbe {
        self.probe.clone()
    }

    /// Request a cooperative stop.
    pub fn stop(&self) {
        info!(instance_id = %self.probe.instance_id, "stopping worker");
        self.stop.cancel();
    }

    /// Wait for the loop to exit, including any in-flight task.
    pub async fn join(self) {
        if let Err(err) = self.join.await {
            error!(instance_id = %self.probe.instance_id, %err, "worker task panicked");
        }
    }
}
