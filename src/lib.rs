#![forbid(unsafe_code)]

//! `tasklane`: distributed task claiming over a shared `SQLite` store.
//!
//! Any number of [`worker::Worker`] instances, in one process or many,
//! claim pending tasks from the same database, process them and record
//! the outcome. Correctness rests on the store's guarded transitions
//! alone; instances share no memory.

pub mod api;
pub mod config;
pub mod errors;
pub mod models;
pub mod persistence;
pub mod worker;

pub use config::GlobalConfig;
pub use errors::{AppError, Result};
