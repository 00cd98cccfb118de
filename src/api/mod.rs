//! HTTP task API.
//!
//! Thin axum handlers over the repositories plus health, status and
//! metrics probes, behind a configurable CORS layer. The worker pool
//! does not depend on this module.

pub mod conversations;
pub mod cors;
pub mod error;
pub mod health;
pub mod tasks;

use std::net::SocketAddr;
use std::sync::Arc;

use axum::routing::{get, put};
use axum::Router;
use tokio::net::TcpListener;
use tokio_util::sync::CancellationToken;
use tracing::info;

use crate::config::GlobalConfig;
use crate::persistence::db::Database;
use crate::worker::WorkerProbe;
use crate::{AppError, Result};

/// Shared state handed to every request handler.
pub struct AppState {
    /// Loaded configuration.
    pub config: Arc<GlobalConfig>,
    /// Shared database pool.
    pub db: Arc<Database>,
    /// Status views of the workers running in this process.
    pub workers: Vec<WorkerProbe>,
}

/// Build the API router.
pub fn router(state: Arc<AppState>) -> Router {
    let cors = cors::build_cors_layer(&state.config.cors);

    Router::new()
        .route("/tasks", get(tasks::list).post(tasks::create))
        .route(
            "/tasks/{id}",
            get(tasks::get).put(tasks::update).delete(tasks::delete),
        )
        .route(
            "/tasks/{id}/conversations",
            get(conversations::list).post(conversations::create),
        )
        .route("/conversations/{id}", put(conversations::update))
        .route("/health", get(health::health))
        .route("/health/detailed", get(health::detailed))
        .route("/status", get(health::status))
        .route("/metrics", get(health::metrics))
        .route("/info", get(health::info))
        .layer(cors)
        .with_state(state)
}

/// Bind the API listener on `config.bind_address:config.http_port`.
///
/// # Errors
///
/// Returns `AppError::Config` if the address is invalid or cannot be bound.
pub async fn bind(config: &GlobalConfig) -> Result<TcpListener> {
    let addr: SocketAddr = format!("{}:{}", config.bind_address, config.http_port)
        .parse()
        .map_err(|err| AppError::Config(format!("invalid bind address: {err}")))?;
    TcpListener::bind(addr)
        .await
        .map_err(|err| AppError::Config(format!("failed to bind {addr}: {err}")))
}

/// Serve the API on `listener` until `ct` is cancelled.
///
/// # Errors
///
/// Returns `AppError::Io` if the server fails.
pub async fn serve(state: Arc<AppState>, listener: TcpListener, ct: CancellationToken) -> Result<()> {
    let addr = listener.local_addr()?;
    info!(%addr, "task API listening");

    axum::serve(listener, router(state))
        .with_graceful_shutdown(async move { ct.cancelled().await })
        .await?;

    info!("task API stopped");
    Ok(())
}
