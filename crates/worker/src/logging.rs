//! Structured logging initialization
//!
//! Retries log at WARN, terminal failures at ERROR, flow at DEBUG. The
//! filter string comes from configuration and follows the usual `EnvFilter`
//! syntax (`info`, `syncline=debug`, ...).

use tracing_subscriber::EnvFilter;

use crate::config::LogFormat;

/// Initialize the global tracing subscriber.
///
/// Safe to call once per process; later calls are ignored so tests that
/// share a process do not panic.
pub fn init(level: &str, format: LogFormat) {
    let filter = EnvFilter::try_new(level).unwrap_or_else(|_| EnvFilter::new("info"));

    let result = match format {
        LogFormat::Pretty => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_target(false)
            .try_init(),
        LogFormat::Json => tracing_subscriber::fmt()
            .with_env_filter(filter)
            .json()
            .try_init(),
    };

    if result.is_err() {
        tracing::debug!("tracing subscriber already initialized");
    }
}
