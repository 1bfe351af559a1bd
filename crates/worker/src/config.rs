//! Worker configuration
//!
//! Loads configuration from `SYNCLINE_*` environment variables, applies
//! defaults, and validates the operational constraints before anything is
//! wired up.
//!
//! ## Environment Variables
//! - `SYNCLINE_BASE_URL`: API base URL (required)
//! - `SYNCLINE_EMAIL`: login identity (required)
//! - `SYNCLINE_PASSWORD`: login secret (required)
//! - `SYNCLINE_FETCH_TIMEOUT_MS`: page-fetch deadline (default 5000)
//! - `SYNCLINE_SYNC_TIMEOUT_MS`: per-record sync deadline (default 5000)
//! - `SYNCLINE_MAX_PARALLEL`: concurrent record syncs, 1..=10 (default 5)
//! - `SYNCLINE_PAGE_SIZE`: records per collection page (default 50)
//! - `SYNCLINE_RETRY_MAX_ATTEMPTS`: attempts per call, 1..=20 (default 5)
//! - `SYNCLINE_RETRY_BASE_DELAY_MS`: first backoff delay (default 1000)
//! - `SYNCLINE_RETRY_MAX_DELAY_MS`: backoff cap (default 16000)
//! - `SYNCLINE_RETRY_JITTER_MS`: jitter half-width (default 250)
//! - `SYNCLINE_RATE_CAPACITY`: admissions per window (default 10)
//! - `SYNCLINE_RATE_WINDOW_MS`: rolling window (default 60000)
//! - `SYNCLINE_DB_PATH`: SQLite path; unset runs against the in-memory store
//! - `SYNCLINE_LOG_LEVEL`: tracing filter (default "info")
//! - `SYNCLINE_LOG_FORMAT`: "pretty" or "json" (default "pretty")

use std::path::PathBuf;
use std::str::FromStr;
use std::time::Duration;

use syncline_common::resilience::RetryConfig;

use crate::error::SyncError;

/// Log output format
#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum LogFormat {
    #[default]
    Pretty,
    Json,
}

impl FromStr for LogFormat {
    type Err = SyncError;

    fn from_str(value: &str) -> Result<Self, Self::Err> {
        match value.to_ascii_lowercase().as_str() {
            "pretty" => Ok(Self::Pretty),
            "json" => Ok(Self::Json),
            other => Err(SyncError::Config(format!(
                "invalid log format '{other}' (expected 'pretty' or 'json')"
            ))),
        }
    }
}

/// Fully validated worker configuration
#[derive(Debug, Clone)]
pub struct WorkerConfig {
    pub base_url: String,
    pub email: String,
    pub password: String,
    pub fetch_timeout: Duration,
    pub sync_timeout: Duration,
    pub max_parallel: usize,
    pub page_size: u32,
    pub retry_max_attempts: u32,
    pub retry_base_delay: Duration,
    pub retry_max_delay: Duration,
    pub retry_jitter: Duration,
    pub rate_capacity: usize,
    pub rate_window: Duration,
    pub db_path: Option<PathBuf>,
    pub log_level: String,
    pub log_format: LogFormat,
}

impl WorkerConfig {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    /// Returns `SyncError::Config` when a required variable is missing, a
    /// value fails to parse, or a constraint is violated.
    pub fn from_env() -> Result<Self, SyncError> {
        let config = Self {
            base_url: required("SYNCLINE_BASE_URL")?,
            email: required("SYNCLINE_EMAIL")?,
            password: required("SYNCLINE_PASSWORD")?,
            fetch_timeout: Duration::from_millis(parsed("SYNCLINE_FETCH_TIMEOUT_MS", 5000)?),
            sync_timeout: Duration::from_millis(parsed("SYNCLINE_SYNC_TIMEOUT_MS", 5000)?),
            max_parallel: parsed("SYNCLINE_MAX_PARALLEL", 5)?,
            page_size: parsed("SYNCLINE_PAGE_SIZE", 50)?,
            retry_max_attempts: parsed("SYNCLINE_RETRY_MAX_ATTEMPTS", 5)?,
            retry_base_delay: Duration::from_millis(parsed("SYNCLINE_RETRY_BASE_DELAY_MS", 1000)?),
            retry_max_delay: Duration::from_millis(parsed("SYNCLINE_RETRY_MAX_DELAY_MS", 16_000)?),
            retry_jitter: Duration::from_millis(parsed("SYNCLINE_RETRY_JITTER_MS", 250)?),
            rate_capacity: parsed("SYNCLINE_RATE_CAPACITY", 10)?,
            rate_window: Duration::from_millis(parsed("SYNCLINE_RATE_WINDOW_MS", 60_000)?),
            db_path: std::env::var("SYNCLINE_DB_PATH").ok().map(PathBuf::from),
            log_level: std::env::var("SYNCLINE_LOG_LEVEL").unwrap_or_else(|_| "info".to_string()),
            log_format: std::env::var("SYNCLINE_LOG_FORMAT")
                .map(|v| v.parse())
                .unwrap_or(Ok(LogFormat::default()))?,
        };

        config.validate()?;
        Ok(config)
    }

    /// Check the operational constraints.
    pub fn validate(&self) -> Result<(), SyncError> {
        if self.base_url.is_empty() {
            return Err(SyncError::Config("base_url must not be empty".to_string()));
        }
        if !(1..=10).contains(&self.max_parallel) {
            return Err(SyncError::Config(format!(
                "max_parallel must be between 1 and 10, got {}",
                self.max_parallel
            )));
        }
        if !(1..=20).contains(&self.retry_max_attempts) {
            return Err(SyncError::Config(format!(
                "retry_max_attempts must be between 1 and 20, got {}",
                self.retry_max_attempts
            )));
        }
        if self.retry_base_delay > self.retry_max_delay {
            return Err(SyncError::Config(format!(
                "retry_base_delay ({:?}) cannot exceed retry_max_delay ({:?})",
                self.retry_base_delay, self.retry_max_delay
            )));
        }
        if self.rate_capacity == 0 {
            return Err(SyncError::Config("rate_capacity must be at least 1".to_string()));
        }
        if self.page_size == 0 {
            return Err(SyncError::Config("page_size must be at least 1".to_string()));
        }
        Ok(())
    }

    /// Retry policy for the typed API surface.
    pub fn retry_config(&self) -> RetryConfig {
        RetryConfig {
            max_attempts: self.retry_max_attempts,
            base_delay: self.retry_base_delay,
            max_delay: self.retry_max_delay,
            jitter: self.retry_jitter,
        }
    }
}

fn required(name: &str) -> Result<String, SyncError> {
    std::env::var(name)
        .map_err(|_| SyncError::Config(format!("missing required environment variable {name}")))
}

fn parsed<T>(name: &str, default: T) -> Result<T, SyncError>
where
    T: FromStr,
    T::Err: std::fmt::Display,
{
    match std::env::var(name) {
        Ok(value) => value
            .parse()
            .map_err(|e| SyncError::Config(format!("invalid value for {name}: {e}"))),
        Err(_) => Ok(default),
    }
}
