//! Error taxonomy for sync operations
//!
//! Every outbound call funnels into [`SyncError`]. Each variant knows whether
//! it is retryable and whether the server supplied a delay hint, which is all
//! the retry engine needs to drive backoff decisions.

use std::time::Duration;

use thiserror::Error;

use syncline_common::resilience::{RetryDecision, RetryError, RetryPolicy};

/// Categories of sync errors for retry logic and log labels
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SyncErrorKind {
    /// Credential acquisition was rejected by the auth endpoint
    Authentication,
    /// A bearer token was rejected upstream (401)
    CredentialExpired,
    /// Rate limited by the upstream API (429)
    RateLimited,
    /// Upstream temporarily unavailable (503)
    ServiceUnavailable,
    /// A per-call deadline elapsed
    Timeout,
    /// Transport-level connectivity failure
    Network,
    /// Unclassified non-2xx API response
    Api,
    /// Persistence layer failure
    Database,
    /// The retry budget was exhausted
    RetriesExhausted,
    /// Invalid configuration detected at startup
    Config,
    /// Per-call input or response validation failure
    Validation,
    /// The operation was cancelled before completion
    Cancelled,
    /// Bugs and invariant violations
    Internal,
}

impl SyncErrorKind {
    /// Stable label suitable for metrics and structured logging.
    pub fn label(&self) -> &'static str {
        match self {
            Self::Authentication => "authentication",
            Self::CredentialExpired => "credential_expired",
            Self::RateLimited => "rate_limited",
            Self::ServiceUnavailable => "service_unavailable",
            Self::Timeout => "timeout",
            Self::Network => "network",
            Self::Api => "api",
            Self::Database => "database",
            Self::RetriesExhausted => "retries_exhausted",
            Self::Config => "config",
            Self::Validation => "validation",
            Self::Cancelled => "cancelled",
            Self::Internal => "internal",
        }
    }
}

/// Sync operation errors
#[derive(Debug, Clone, Error)]
pub enum SyncError {
    /// The authentication endpoint rejected the configured credentials.
    ///
    /// `retryable` is true only for a 401 from the login endpoint, which is
    /// worth retrying during acquisition; other 4xx rejections are final.
    #[error("authentication failed: {message}")]
    AuthenticationFailed { message: String, retryable: bool },

    /// A bearer token was rejected upstream; the next attempt re-acquires.
    #[error("access credential expired or rejected upstream")]
    CredentialExpired,

    /// Upstream asked us to back off.
    #[error("rate limited by upstream (retry after {retry_after_secs}s)")]
    RateLimited { retry_after_secs: u64 },

    /// Upstream is temporarily unavailable.
    #[error("upstream service unavailable")]
    ServiceUnavailable { retry_after_secs: Option<u64> },

    /// A per-call deadline elapsed before the transport produced a response.
    #[error("operation '{operation}' timed out after {duration:?}")]
    Timeout { operation: String, duration: Duration },

    /// Transport-level connectivity failure.
    #[error("network failure: {message}")]
    NetworkFailure { message: String },

    /// Unclassified non-2xx response from the API.
    #[error("api request failed with status {status}: {message}")]
    ApiFailure { status: u16, message: String },

    /// Persistence layer failure while saving a record.
    #[error("database error: {0}")]
    Database(String),

    /// The retry budget was exhausted; wraps the last attempt's error.
    #[error("all {attempts} attempts exhausted: {source}")]
    MaxRetriesExceeded { attempts: u32, source: Box<SyncError> },

    /// Invalid configuration detected at startup.
    #[error("configuration error: {0}")]
    Config(String),

    /// Per-call input or response validation failure.
    #[error("validation error: {0}")]
    Validation(String),

    /// The operation was cancelled before completion.
    #[error("operation cancelled")]
    Cancelled,

    /// Bugs and invariant violations that should not normally occur.
    #[error("internal error: {0}")]
    Internal(String),
}

impl SyncError {
    /// The error's category.
    pub fn kind(&self) -> SyncErrorKind {
        match self {
            Self::AuthenticationFailed { .. } => SyncErrorKind::Authentication,
            Self::CredentialExpired => SyncErrorKind::CredentialExpired,
            Self::RateLimited { .. } => SyncErrorKind::RateLimited,
            Self::ServiceUnavailable { .. } => SyncErrorKind::ServiceUnavailable,
            Self::Timeout { .. } => SyncErrorKind::Timeout,
            Self::NetworkFailure { .. } => SyncErrorKind::Network,
            Self::ApiFailure { .. } => SyncErrorKind::Api,
            Self::Database(_) => SyncErrorKind::Database,
            Self::MaxRetriesExceeded { .. } => SyncErrorKind::RetriesExhausted,
            Self::Config(_) => SyncErrorKind::Config,
            Self::Validation(_) => SyncErrorKind::Validation,
            Self::Cancelled => SyncErrorKind::Cancelled,
            Self::Internal(_) => SyncErrorKind::Internal,
        }
    }

    /// Whether another attempt may succeed.
    pub fn is_retryable(&self) -> bool {
        match self {
            Self::CredentialExpired
            | Self::RateLimited { .. }
            | Self::ServiceUnavailable { .. }
            | Self::Timeout { .. }
            | Self::NetworkFailure { .. } => true,
            Self::AuthenticationFailed { retryable, .. } => *retryable,
            _ => false,
        }
    }

    /// Server-supplied delay hint, when the response carried one.
    pub fn retry_after(&self) -> Option<Duration> {
        match self {
            Self::RateLimited { retry_after_secs } => {
                Some(Duration::from_secs(*retry_after_secs))
            }
            Self::ServiceUnavailable { retry_after_secs } => {
                retry_after_secs.map(Duration::from_secs)
            }
            _ => None,
        }
    }
}

/// Retry policy driven by [`SyncError`] classification.
///
/// Server hints override exponential backoff; non-retryable kinds stop the
/// loop immediately.
#[derive(Debug, Clone, Copy, Default)]
pub struct SyncRetryPolicy;

impl RetryPolicy<SyncError> for SyncRetryPolicy {
    fn should_retry(&self, error: &SyncError, _attempt: u32) -> RetryDecision {
        if !error.is_retryable() {
            return RetryDecision::Stop;
        }
        match error.retry_after() {
            Some(hint) => RetryDecision::RetryAfter(hint),
            None => RetryDecision::Retry,
        }
    }
}

impl From<RetryError<SyncError>> for SyncError {
    fn from(err: RetryError<SyncError>) -> Self {
        match err {
            RetryError::Exhausted { attempts, source } => {
                Self::MaxRetriesExceeded { attempts, source: Box::new(source) }
            }
            RetryError::Aborted { source } => source,
            RetryError::InvalidConfiguration { message } => Self::Config(message),
        }
    }
}

/// Result type alias for sync operations
pub type Result<T> = std::result::Result<T, SyncError>;
