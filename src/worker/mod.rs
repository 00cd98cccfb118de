//! Worker pool: claim protocol, processing callback and the per-instance loop.
//!
//! Each [`Worker`] is an independent, single-threaded loop identified by a
//! random instance id. Instances share nothing but the
//! [`TaskStore`](crate::persistence::store::TaskStore); any number of them
//! may run in one process or across processes.

pub mod claim;
pub mod processor;
pub mod runner;

pub use claim::ClaimProtocol;
pub use processor::{SimulatedProcessor, TaskProcessor};
pub use runner::{TaskOutcome, Worker, WorkerConfig, WorkerHandle, WorkerProbe};
