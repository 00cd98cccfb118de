//! Health, status, metrics and info probes.

use std::collections::HashMap;
use std::sync::Arc;

use axum::extract::State;
use axum::Json;
use chrono::{DateTime, Utc};
use serde::Serialize;
use serde_json::{json, Value};
use tracing::error;

use crate::models::task::TaskStatus;
use crate::persistence::conversation_repo::ConversationRepo;
use crate::persistence::task_repo::TaskRepo;
use crate::Result;

use super::AppState;

/// Liveness probe for a single worker in this process.
#[derive(Debug, Serialize)]
pub struct WorkerStatus {
    /// Worker ownership token.
    pub instance_id: String,
    /// Whether the loop is running.
    pub running: bool,
}

/// Task statistics served by `GET /metrics`.
#[derive(Debug, Serialize)]
pub struct Metrics {
    /// Task count per status.
    pub task_counts: HashMap<TaskStatus, i64>,
    /// Completed task count per owning instance.
    pub instance_processing_stats: HashMap<String, i64>,
    /// Tasks created during the last hour.
    pub recent_tasks_1h: i64,
    /// When the snapshot was taken.
    pub timestamp: DateTime<Utc>,
}

/// `GET /health`
pub async fn health() -> &'static str {
    "ok"
}

/// `GET /health/detailed`: database reachability and table sizes.
///
/// Always answers 200; an unreachable database is reported in the body.
pub async fn detailed(State(state): State<Arc<AppState>>) -> Json<Value> {
    let database = match database_counts(&state).await {
        Ok((tasks, conversations)) => json!({
            "status": "healthy",
            "total_tasks": tasks,
            "total_conversations": conversations,
            "timestamp": Utc::now(),
        }),
        Err(err) => {
            error!(%err, "database health check failed");
            json!({
                "status": "unhealthy",
                "error": err.to_string(),
                "timestamp": Utc::now(),
            })
        }
    };

    Json(json!({
        "service": "healthy",
        "database": database,
        "application": app_info(&state),
    }))
}

/// `GET /status`: workers running in this process.
pub async fn status(State(state): State<Arc<AppState>>) -> Json<Value> {
    let workers: Vec<WorkerStatus> = state
        .workers
        .iter()
        .map(|probe| WorkerStatus {
            instance_id: probe.instance_id().to_owned(),
            running: probe.is_running(),
        })
        .collect();

    Json(json!({
        "status": "running",
        "workers": workers,
    }))
}

/// `GET /metrics`
///
/// # Errors
///
/// Returns `AppError::Db` if a statistics query fails.
pub async fn metrics(State(state): State<Arc<AppState>>) -> Result<Json<Metrics>> {
    let repo = TaskRepo::new(Arc::clone(&state.db));
    let now = Utc::now();

    Ok(Json(Metrics {
        task_counts: repo.count_by_status().await?,
        instance_processing_stats: repo.completed_by_instance().await?,
        recent_tasks_1h: repo
            .count_created_since(now - chrono::Duration::hours(1))
            .await?,
        timestamp: now,
    }))
}

/// `GET /info`
pub async fn info(State(state): State<Arc<AppState>>) -> Json<Value> {
    Json(app_info(&state))
}

async fn database_counts(state: &AppState) -> Result<(i64, i64)> {
    sqlx::query("SELECT 1").execute(state.db.as_ref()).await?;
    let tasks = TaskRepo::new(Arc::clone(&state.db)).count().await?;
    let conversations = ConversationRepo::new(Arc::clone(&state.db)).count().await?;
    Ok((tasks, conversations))
}

fn app_info(state: &AppState) -> Value {
    let worker = &state.config.worker;
    json!({
        "name": env!("CARGO_PKG_NAME"),
        "version": env!("CARGO_PKG_VERSION"),
        "environment": state.config.environment,
        "worker_instances": state.workers.len(),
        "worker_poll_interval_ms": worker.poll_interval_ms,
        "worker_error_backoff_ms": worker.error_backoff_ms,
        "task_processing_ms": worker.processing_ms,
        "stale_claim_after_seconds": worker.stale_claim_after_seconds,
    })
}
