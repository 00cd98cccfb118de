#![forbid(unsafe_code)]

//! `tasklane`: task API and worker pool binary.
//!
//! Bootstraps configuration and the shared database, starts the configured
//! number of worker loops, and serves the HTTP task API until Ctrl-C or
//! SIGTERM.

use std::path::PathBuf;
use std::sync::Arc;

use clap::{Parser, ValueEnum};
use tokio_util::sync::CancellationToken;
use tracing::{error, info};
use tracing_subscriber::{fmt, EnvFilter};

use tasklane::api::{self, AppState};
use tasklane::config::GlobalConfig;
use tasklane::persistence::db;
use tasklane::persistence::store::{SqliteTaskStore, TaskStore};
use tasklane::worker::{SimulatedProcessor, TaskProcessor, Worker, WorkerConfig, WorkerHandle};
use tasklane::{AppError, Result};

#[derive(Debug, Copy, Clone, Eq, PartialEq, ValueEnum)]
enum LogFormat {
    Text,
    Json,
}

#[derive(Debug, Parser)]
#[command(name = "tasklane", about = "Distributed task worker and API", version, long_about = None)]
struct Cli {
    /// Path to the TOML configuration file.
    #[arg(long)]
    config: PathBuf,

    /// Log output format (text or json).
    #[arg(long, value_enum, default_value_t = LogFormat::Text)]
    log_format: LogFormat,

    /// Override the number of worker loops started by this process.
    #[arg(long)]
    workers: Option<u32>,
}

fn main() -> Result<()> {
    let args = Cli::parse();
    init_tracing(args.log_format)?;
    info!("tasklane bootstrap");

    tokio::runtime::Builder::new_multi_thread()
        .enable_all()
        .build()
        .map_err(|err| AppError::Config(format!("failed to build tokio runtime: {err}")))?
        .block_on(run(args))
}

async fn run(args: Cli) -> Result<()> {
    // ── Load configuration ──────────────────────────────
    let mut config = GlobalConfig::load_from_path(&args.config)?;
    if let Some(workers) = args.workers {
        if workers == 0 {
            return Err(AppError::Config("--workers must be greater than zero".into()));
        }
        config.worker.instances = workers;
    }
    let config = Arc::new(config);
    info!(db_path = %config.db_path().display(), "configuration loaded");

    // ── Initialize database ─────────────────────────────
    let db = Arc::new(db::connect(config.db_path()).await?);
    info!("database connected");

    // ── Start workers ───────────────────────────────────
    let store: Arc<dyn TaskStore> = Arc::new(
        SqliteTaskStore::new(Arc::clone(&db))
            .with_stale_claim_after(config.worker.stale_claim_after()),
    );
    let processor: Arc<dyn TaskProcessor> = Arc::new(SimulatedProcessor::new(
        Arc::clone(&store),
        config.worker.processing_time(),
    ));
    let worker_config = WorkerConfig::from(&config.worker);

    let workers: Vec<WorkerHandle> = (0..config.worker.instances)
        .map(|_| Worker::new(Arc::clone(&store), Arc::clone(&processor), worker_config).spawn())
        .collect();
    for handle in &workers {
        info!(instance_id = handle.instance_id(), "worker spawned");
    }

    // ── Start HTTP API ──────────────────────────────────
    let state = Arc::new(AppState {
        config: Arc::clone(&config),
        db,
        workers: workers.iter().map(WorkerHandle::probe).collect(),
    });
    let listener = api::bind(&config).await?;
    let ct = CancellationToken::new();
    let api_ct = ct.clone();
    let api_handle = tokio::spawn(async move {
        if let Err(err) = api::serve(state, listener, api_ct).await {
            error!(%err, "task API failed");
        }
    });

    info!("tasklane ready");

    // ── Wait for shutdown signal ────────────────────────
    shutdown_signal().await;
    info!("shutdown signal received");

    // Workers finish any in-flight task before exiting.
    for handle in &workers {
        handle.stop();
    }
    for handle in workers {
        handle.join().await;
    }

    ct.cancel();
    let _ = api_handle.await;
    info!("tasklane shut down");

    Ok(())
}

async fn shutdown_signal() {
    let ctrl_c = tokio::signal::ctrl_c();

    #[cfg(unix)]
    {
        match tokio::signal::unix::signal(tokio::signal::unix::SignalKind::terminate()) {
            Ok(mut sigterm) => {
                tokio::select! {
                    _ = ctrl_c => {}
                    _ = sigterm.recv() => {}
                }
            }
            Err(err) => {
                tracing::warn!(%err, "failed to register SIGTERM handler, using ctrl-c only");
                let _ = ctrl_c.await;
            }
        }
    }

    #[cfg(not(unix))]
    {
        if let Err(err) = ctrl_c.await {
            tracing::error!(%err, "ctrl-c signal handler failed");
        }
    }
}

fn init_tracing(log_format: LogFormat) -> Result<()> {
    let env_filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new("info"));
    let subscriber = fmt().with_env_filter(env_filter);

    match log_format {
        LogFormat::Text => subscriber
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
        LogFormat::Json => subscriber
            .json()
            .try_init()
            .map_err(|err| AppError::Config(format!("failed to init tracing: {err}")))?,
    }

    Ok(())
}
