//! Global configuration parsing and validation.

use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use axum::http::{HeaderName, HeaderValue, Method};
use serde::Deserialize;

use crate::{AppError, Result};

/// Worker pool settings consumed by each [`Worker`](crate::worker::Worker).
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct WorkerSettings {
    /// Number of worker loops started by this process.
    #[serde(default = "default_instances")]
    pub instances: u32,
    /// Wait after finding no pending task.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
    /// Wait after a loop-level fault (store unreachable, etc.).
    #[serde(default = "default_error_backoff_ms")]
    pub error_backoff_ms: u64,
    /// Simulated processing duration per task.
    #[serde(default = "default_processing_ms")]
    pub processing_ms: u64,
    /// Age after which a `processing` task may be reclaimed by another
    /// instance. Absent means claims never expire.
    #[serde(default)]
    pub stale_claim_after_seconds: Option<u64>,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            instances: default_instances(),
            poll_interval_ms: default_poll_interval_ms(),
            error_backoff_ms: default_error_backoff_ms(),
            processing_ms: default_processing_ms(),
            stale_claim_after_seconds: None,
        }
    }
}

impl WorkerSettings {
    /// Idle-poll interval as a [`Duration`].
    #[must_use]
    pub fn poll_interval(&self) -> Duration {
        Duration::from_millis(self.poll_interval_ms)
    }

    /// Error-backoff interval as a [`Duration`].
    #[must_use]
    pub fn error_backoff(&self) -> Duration {
        Duration::from_millis(self.error_backoff_ms)
    }

    /// Simulated processing duration as a [`Duration`].
    #[must_use]
    pub fn processing_time(&self) -> Duration {
        Duration::from_millis(self.processing_ms)
    }

    /// Stale-claim bound, if reclaiming is enabled.
    #[must_use]
    pub fn stale_claim_after(&self) -> Option<Duration> {
        self.stale_claim_after_seconds.map(Duration::from_secs)
    }
}

/// Upper bound for `worker.stale_claim_after_seconds` (one year).
pub const MAX_STALE_CLAIM_AFTER_SECONDS: u64 = 365 * 24 * 60 * 60;

fn default_instances() -> u32 {
    1
}

fn default_poll_interval_ms() -> u64 {
    5000
}

fn default_error_backoff_ms() -> u64 {
    10_000
}

fn default_processing_ms() -> u64 {
    6500
}

/// Cross-origin policy applied to the task API.
///
/// A list containing `"*"` allows any value for that field.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct CorsSettings {
    /// Allowed request origins.
    #[serde(default = "wildcard")]
    pub origins: Vec<String>,
    /// Whether browsers may send credentials.
    #[serde(default = "default_allow_credentials")]
    pub allow_credentials: bool,
    /// Allowed request methods.
    #[serde(default = "wildcard")]
    pub allow_methods: Vec<String>,
    /// Allowed request headers.
    #[serde(default = "wildcard")]
    pub allow_headers: Vec<String>,
}

impl Default for CorsSettings {
    fn default() -> Self {
        Self {
            origins: wildcard(),
            allow_credentials: default_allow_credentials(),
            allow_methods: wildcard(),
            allow_headers: wildcard(),
        }
    }
}

impl CorsSettings {
    fn validate(&self) -> Result<()> {
        for origin in self.origins.iter().filter(|o| !is_wildcard(o)) {
            HeaderValue::from_str(origin)
                .map_err(|_| AppError::Config(format!("invalid cors origin: {origin}")))?;
        }
        for method in self.allow_methods.iter().filter(|m| !is_wildcard(m)) {
            Method::from_bytes(method.as_bytes())
                .map_err(|_| AppError::Config(format!("invalid cors method: {method}")))?;
        }
        for header in self.allow_headers.iter().filter(|h| !is_wildcard(h)) {
            HeaderName::from_bytes(header.as_bytes())
                .map_err(|_| AppError::Config(format!("invalid cors header: {header}")))?;
        }
        Ok(())
    }
}

/// Whether a CORS list entry means "anything".
pub(crate) fn is_wildcard(entry: &str) -> bool {
    entry == "*"
}

fn wildcard() -> Vec<String> {
    vec!["*".to_owned()]
}

fn default_allow_credentials() -> bool {
    true
}

fn default_http_port() -> u16 {
    8000
}

fn default_bind_address() -> String {
    "127.0.0.1".into()
}

fn default_environment() -> String {
    "development".into()
}

/// Global configuration parsed from `config.toml`.
#[derive(Debug, Clone, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub struct GlobalConfig {
    /// Path to the shared `SQLite` database file.
    pub db_path: PathBuf,
    /// HTTP port for the task API.
    #[serde(default = "default_http_port")]
    pub http_port: u16,
    /// Interface the task API binds to.
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    /// Free-form deployment label reported by `/info`.
    #[serde(default = "default_environment")]
    pub environment: String,
    /// Worker pool settings.
    #[serde(default)]
    pub worker: WorkerSettings,
    /// Cross-origin policy for the task API.
    #[serde(default)]
    pub cors: CorsSettings,
}

impl GlobalConfig {
    /// Load and validate configuration from a TOML file path.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if the file cannot be read or contains
    /// invalid TOML, or if validation fails.
    pub fn load_from_path(path: impl AsRef<Path>) -> Result<Self> {
        let raw = fs::read_to_string(path)
            .map_err(|err| AppError::Config(format!("failed to read config: {err}")))?;
        Self::from_toml_str(&raw)
    }

    /// Parse configuration from a TOML string.
    ///
    /// # Errors
    ///
    /// Returns `AppError::Config` if parsing or validation fails.
    pub fn from_toml_str(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    /// Path of the database file.
    #[must_use]
    pub fn db_path(&self) -> &Path {
        &self.db_path
    }

    fn validate(&self) -> Result<()> {
        if self.db_path.as_os_str().is_empty() {
            return Err(AppError::Config("db_path must not be empty".into()));
        }

        if self.worker.instances == 0 {
            return Err(AppError::Config(
                "worker.instances must be greater than zero".into(),
            ));
        }

        if self.worker.poll_interval_ms == 0 {
            return Err(AppError::Config(
                "worker.poll_interval_ms must be greater than zero".into(),
            ));
        }

        if self.worker.error_backoff_ms == 0 {
            return Err(AppError::Config(
                "worker.error_backoff_ms must be greater than zero".into(),
            ));
        }

        if let Some(seconds) = self.worker.stale_claim_after_seconds {
            if seconds == 0 || seconds > MAX_STALE_CLAIM_AFTER_SECONDS {
                return Err(AppError::Config(format!(
                    "worker.stale_claim_after_seconds must be between 1 and {MAX_STALE_CLAIM_AFTER_SECONDS}"
                )));
            }
        }

        self.cors.validate()
    }
}
