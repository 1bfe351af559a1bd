//! Sync orchestrator
//!
//! Fetches the full paginated collection sequentially, fans one sync task per
//! record out over the bounded task queue, and aggregates per-record results
//! into a run report. Pagination failures propagate; per-record failures are
//! captured into their results and never escape the queue boundary.

use std::sync::Arc;
use std::time::Instant;

use chrono::Utc;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

use syncline_common::queue::{TaskError, TaskQueue};

use crate::api::{ApiClient, RequestOptions};
use crate::error::SyncError;
use crate::transport::HttpMethod;

use super::store::RecordStore;
use super::types::{RecordPage, RecordSyncResult, RemoteRecord, SyncReport, SyncResponse};

/// Configuration for the sync engine
#[derive(Debug, Clone)]
pub struct SyncEngineConfig {
    /// Records requested per collection page
    pub page_size: u32,
    /// Per-call deadline for record sync requests; `None` uses the client
    /// default
    pub sync_timeout: Option<std::time::Duration>,
}

impl Default for SyncEngineConfig {
    fn default() -> Self {
        Self { page_size: 50, sync_timeout: None }
    }
}

/// Orchestrates a full synchronization run
pub struct SyncEngine {
    client: Arc<ApiClient>,
    store: Arc<dyn RecordStore>,
    queue: Arc<TaskQueue>,
    config: SyncEngineConfig,
}

impl SyncEngine {
    pub fn new(
        client: Arc<ApiClient>,
        store: Arc<dyn RecordStore>,
        queue: Arc<TaskQueue>,
        config: SyncEngineConfig,
    ) -> Self {
        Self { client, store, queue, config }
    }

    /// Run a full sync: fetch every page, sync every record, report.
    ///
    /// # Errors
    /// Propagates pagination failures; per-record failures are folded into
    /// the report instead.
    pub async fn run(&self) -> Result<SyncReport, SyncError> {
        let run_id = Uuid::new_v4().to_string();
        let started_at = Utc::now();
        info!(run_id = %run_id, "sync run starting");

        let records = self.fetch_all_records().await?;
        let total = records.len();
        info!(run_id = %run_id, total, "record collection fetched");

        let mut pending = Vec::with_capacity(total);
        for record in records {
            let client = Arc::clone(&self.client);
            let store = Arc::clone(&self.store);
            let sync_timeout = self.config.sync_timeout;
            let record_id = record.id.clone();

            let handle = self
                .queue
                .submit(0, async move {
                    Ok::<_, SyncError>(sync_record(client, store, record, sync_timeout).await)
                })
                .await;
            pending.push((record_id, handle));
        }

        let mut results = Vec::with_capacity(total);
        for (record_id, handle) in pending {
            match handle.join().await {
                Ok(result) => results.push(result),
                // sync_record never returns Err, so this only covers tasks
                // purged before they started.
                Err(err) => {
                    warn!(record_id = %record_id, error = %err, "sync task did not complete");
                    let outcome = match err {
                        TaskError::Cancelled => SyncError::Cancelled,
                        TaskError::Failed { source } => source,
                    };
                    results.push(RecordSyncResult {
                        record_id,
                        outcome: Err(outcome),
                        retries: 0,
                        duration: std::time::Duration::ZERO,
                    });
                }
            }
        }

        self.queue.await_idle().await;

        let succeeded = results.iter().filter(|r| r.succeeded()).count();
        let failed = results.len() - succeeded;
        let retries = results.iter().map(|r| r.retries).sum();

        let report = SyncReport {
            run_id,
            started_at,
            finished_at: Utc::now(),
            total,
            succeeded,
            failed,
            retries,
            results,
        };

        let stats = self.queue.stats();
        info!(
            run_id = %report.run_id,
            succeeded = report.succeeded,
            failed = report.failed,
            retries = report.retries,
            queue_completed = stats.completed,
            "sync run finished"
        );

        Ok(report)
    }

    /// Fetch pages sequentially starting at page 1 while `has_more` holds.
    async fn fetch_all_records(&self) -> Result<Vec<RemoteRecord>, SyncError> {
        let mut records = Vec::new();
        let mut page = 1u32;

        loop {
            let path =
                format!("/api/records?page={}&per_page={}", page, self.config.page_size);
            let fetched: RecordPage = self.client.get(&path).await?;

            debug!(page, count = fetched.data.len(), "page fetched");
            records.extend(fetched.data);

            if !fetched.pagination.has_more {
                break;
            }
            page += 1;
        }

        Ok(records)
    }
}

/// Sync one record: call the per-record endpoint, then persist.
///
/// All failures are captured into the returned result.
async fn sync_record(
    client: Arc<ApiClient>,
    store: Arc<dyn RecordStore>,
    record: RemoteRecord,
    sync_timeout: Option<std::time::Duration>,
) -> RecordSyncResult {
    let started = Instant::now();
    let path = format!("/api/records/{}/sync", record.id);
    let options = RequestOptions { priority: 0, timeout: sync_timeout };

    let call = client
        .request_with_outcome::<SyncResponse, ()>(HttpMethod::Post, &path, None, options)
        .await;

    let outcome = match call.value {
        Ok(response) if response.success => store.save(&record).await,
        Ok(response) => {
            let message =
                response.message.unwrap_or_else(|| "sync rejected by upstream".to_string());
            Err(SyncError::Validation(message))
        }
        Err(error) => Err(error),
    };

    if let Err(error) = &outcome {
        error!(
            record_id = %record.id,
            error_kind = error.kind().label(),
            error = %error,
            "record sync failed"
        );
    } else {
        debug!(record_id = %record.id, retries = call.retries, "record synced");
    }

    RecordSyncResult {
        record_id: record.id,
        outcome,
        retries: call.retries,
        duration: started.elapsed(),
    }
}
