//! Syncline worker entry point
//!
//! Loads configuration, wires the pipeline together, runs a full sync, and
//! exits 0 only when every record synced successfully.

use std::process::ExitCode;
use std::sync::Arc;

use tracing::{error, info, warn};

use syncline::sync::{MemoryRecordStore, RecordStore, SqliteRecordStore};
use syncline::{
    logging, ApiClient, ApiClientConfig, AuthConfig, CredentialManager, ReqwestTransport,
    SyncEngine, SyncEngineConfig, SyncError, SyncReport, WorkerConfig,
};
use syncline_common::queue::TaskQueue;
use syncline_common::resilience::SlidingWindowLimiter;

#[tokio::main]
async fn main() -> ExitCode {
    // Load .env before reading configuration; absence is fine.
    let _ = dotenvy::dotenv();

    let config = match WorkerConfig::from_env() {
        Ok(config) => config,
        Err(error) => {
            eprintln!("configuration error: {error}");
            return ExitCode::from(1);
        }
    };

    logging::init(&config.log_level, config.log_format);
    info!(base_url = %config.base_url, "syncline worker starting");

    match run(config).await {
        Ok(report) if report.is_success() => {
            info!(summary = %report.summary(), "sync completed");
            ExitCode::SUCCESS
        }
        Ok(report) => {
            error!(summary = %report.summary(), "sync completed with failures");
            for (record_id, message) in report.failures() {
                error!(record_id = %record_id, error = %message, "record failed");
            }
            ExitCode::from(1)
        }
        Err(error) => {
            error!(error = %error, "sync run failed");
            ExitCode::from(1)
        }
    }
}

/// Wire the pipeline together and run a full sync.
async fn run(config: WorkerConfig) -> Result<SyncReport, SyncError> {
    let transport = Arc::new(ReqwestTransport::new(config.fetch_timeout)?);

    let credentials = Arc::new(CredentialManager::new(
        transport.clone(),
        AuthConfig::new(config.base_url.clone(), config.email.clone(), config.password.clone()),
    ));

    let limiter = Arc::new(
        SlidingWindowLimiter::new(config.rate_capacity, config.rate_window)
            .map_err(|e| SyncError::Config(e.to_string()))?,
    );

    let queue = Arc::new(
        TaskQueue::new(config.max_parallel).map_err(|e| SyncError::Config(e.to_string()))?,
    );

    let client = Arc::new(ApiClient::new(
        transport,
        credentials,
        limiter,
        ApiClientConfig {
            base_url: config.base_url.clone(),
            timeout: config.fetch_timeout,
            retry: config.retry_config(),
        },
    ));

    let store: Arc<dyn RecordStore> = match &config.db_path {
        Some(path) => Arc::new(SqliteRecordStore::open(path)?),
        None => {
            warn!("no database path configured; running against the in-memory store");
            Arc::new(MemoryRecordStore::new())
        }
    };

    let engine = SyncEngine::new(
        client,
        store,
        queue,
        SyncEngineConfig {
            page_size: config.page_size,
            sync_timeout: Some(config.sync_timeout),
        },
    );

    engine.run().await
}
