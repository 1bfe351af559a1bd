//! Wire and report types for record synchronization

use std::time::Duration;

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::error::SyncError;

/// A record as returned by the collection endpoint.
///
/// Only the identifier is interpreted; the remaining payload is carried
/// opaquely and persisted as-is.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RemoteRecord {
    pub id: String,
    #[serde(flatten)]
    pub payload: serde_json::Map<String, serde_json::Value>,
}

/// One page of the record collection.
#[derive(Debug, Clone, Deserialize)]
pub struct RecordPage {
    pub data: Vec<RemoteRecord>,
    pub pagination: PageInfo,
}

/// Pagination envelope.
#[derive(Debug, Clone, Deserialize)]
pub struct PageInfo {
    pub page: u32,
    pub per_page: u32,
    pub total: u64,
    pub has_more: bool,
}

/// Response of the per-record sync endpoint.
#[derive(Debug, Clone, Deserialize)]
pub struct SyncResponse {
    pub success: bool,
    pub record_id: String,
    pub synced_at: String,
    #[serde(default)]
    pub message: Option<String>,
}

/// Outcome of syncing a single record. Immutable once produced.
#[derive(Debug)]
pub struct RecordSyncResult {
    pub record_id: String,
    pub outcome: Result<(), SyncError>,
    /// Retries consumed by the record's API call
    pub retries: u32,
    /// Wall-clock duration of the record's sync task
    pub duration: Duration,
}

impl RecordSyncResult {
    pub fn succeeded(&self) -> bool {
        self.outcome.is_ok()
    }
}

/// Aggregate report for a sync run.
#[derive(Debug)]
pub struct SyncReport {
    pub run_id: String,
    pub started_at: DateTime<Utc>,
    pub finished_at: DateTime<Utc>,
    pub total: usize,
    pub succeeded: usize,
    pub failed: usize,
    /// Retries consumed across all records
    pub retries: u32,
    pub results: Vec<RecordSyncResult>,
}

impl SyncReport {
    /// Whether every record synced successfully.
    pub fn is_success(&self) -> bool {
        self.failed == 0
    }

    /// Failing record ids with their error messages.
    pub fn failures(&self) -> Vec<(String, String)> {
        self.results
            .iter()
            .filter_map(|result| {
                result
                    .outcome
                    .as_ref()
                    .err()
                    .map(|error| (result.record_id.clone(), error.to_string()))
            })
            .collect()
    }

    /// Human-readable one-line summary.
    pub fn summary(&self) -> String {
        let elapsed = self.finished_at - self.started_at;
        format!(
            "synced {}/{} records ({} failed, {} retries) in {}ms",
            self.succeeded,
            self.total,
            self.failed,
            self.retries,
            elapsed.num_milliseconds()
        )
    }
}
