//! End-to-end orchestrator tests against the scripted transport and the
//! in-memory record store.

mod support;

use std::sync::Arc;
use std::time::Duration;

use syncline::sync::{MemoryRecordStore, RecordStore, SyncEngine, SyncEngineConfig};
use syncline::{
    ApiClient, ApiClientConfig, AuthConfig, CredentialManager, SyncErrorKind,
};
use syncline_common::queue::TaskQueue;
use syncline_common::resilience::{RetryConfig, SlidingWindowLimiter};

use support::{ok_json, status, status_with_header, MockTransport};

fn fast_retry() -> RetryConfig {
    RetryConfig {
        max_attempts: 3,
        base_delay: Duration::from_millis(10),
        max_delay: Duration::from_millis(40),
        jitter: Duration::ZERO,
    }
}

fn build_engine(
    transport: Arc<MockTransport>,
    store: Arc<dyn RecordStore>,
) -> SyncEngine {
    let mut auth_config = AuthConfig::new(
        "https://api.example.com".to_string(),
        "worker@example.com".to_string(),
        "secret".to_string(),
    );
    auth_config.retry = fast_retry();

    let credentials = Arc::new(CredentialManager::new(transport.clone(), auth_config));
    let limiter = Arc::new(SlidingWindowLimiter::new(100, Duration::from_secs(60)).unwrap());
    let queue = Arc::new(TaskQueue::new(3).unwrap());

    let client = Arc::new(ApiClient::new(
        transport,
        credentials,
        limiter,
        ApiClientConfig {
            base_url: "https://api.example.com".to_string(),
            timeout: Duration::from_millis(5000),
            retry: fast_retry(),
        },
    ));

    SyncEngine::new(
        client,
        store,
        queue,
        SyncEngineConfig { page_size: 2, sync_timeout: None },
    )
}

fn page_one() -> String {
    r#"{
        "data": [
            {"id": "rec-1", "name": "alpha"},
            {"id": "rec-2", "name": "beta"}
        ],
        "pagination": {"page": 1, "per_page": 2, "total": 3, "has_more": true}
    }"#
    .to_string()
}

fn page_two() -> String {
    r#"{
        "data": [{"id": "rec-3", "name": "gamma"}],
        "pagination": {"page": 2, "per_page": 2, "total": 3, "has_more": false}
    }"#
    .to_string()
}

fn sync_ok(record_id: &str) -> String {
    format!(
        r#"{{"success": true, "record_id": "{record_id}", "synced_at": "2025-06-01T00:00:00Z"}}"#
    )
}

fn sync_rejected(record_id: &str, message: &str) -> String {
    format!(
        r#"{{"success": false, "record_id": "{record_id}", "synced_at": "2025-06-01T00:00:00Z", "message": "{message}"}}"#
    )
}

/// Full run: two pages fetched sequentially, every record synced and
/// persisted, report reflects the totals.
#[tokio::test]
async fn syncs_all_records_across_pages() {
    let transport = Arc::new(MockTransport::new());
    transport.on_login();
    transport.on("page1", |r| r.url.contains("page=1&"), vec![ok_json(page_one())]);
    transport.on("page2", |r| r.url.contains("page=2&"), vec![ok_json(page_two())]);
    for record_id in ["rec-1", "rec-2", "rec-3"] {
        transport.on(
            record_id,
            {
                let needle = format!("/api/records/{record_id}/sync");
                move |r: &syncline::TransportRequest| r.url.contains(&needle)
            },
            vec![ok_json(sync_ok(record_id))],
        );
    }

    let store = Arc::new(MemoryRecordStore::new());
    let engine = build_engine(transport.clone(), store.clone());

    let report = engine.run().await.unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 3);
    assert_eq!(report.failed, 0);
    assert!(report.is_success());
    assert_eq!(report.retries, 0);

    assert_eq!(store.len(), 3);
    assert!(store.contains("rec-1"));
    assert!(store.contains("rec-3"));
    assert_eq!(transport.hits("page1"), 1);
    assert_eq!(transport.hits("page2"), 1);
}

/// Per-record failures are folded into the report; a transiently failing
/// record retries to success and its retries are counted.
#[tokio::test]
async fn record_failures_stay_inside_the_report() {
    let transport = Arc::new(MockTransport::new());
    transport.on_login();
    transport.on("page1", |r| r.url.contains("page=1&"), vec![ok_json(page_one())]);
    transport.on("page2", |r| r.url.contains("page=2&"), vec![ok_json(page_two())]);

    // rec-1: clean success.
    transport.on(
        "rec-1",
        |r| r.url.contains("/api/records/rec-1/sync"),
        vec![ok_json(sync_ok("rec-1"))],
    );
    // rec-2: one 503 (immediate-retry hint), then success.
    transport.on(
        "rec-2",
        |r| r.url.contains("/api/records/rec-2/sync"),
        vec![status_with_header(503, "Retry-After", "0"), ok_json(sync_ok("rec-2"))],
    );
    // rec-3: upstream rejects the sync outright.
    transport.on(
        "rec-3",
        |r| r.url.contains("/api/records/rec-3/sync"),
        vec![ok_json(sync_rejected("rec-3", "record is locked"))],
    );

    let store = Arc::new(MemoryRecordStore::new());
    let engine = build_engine(transport.clone(), store.clone());

    let report = engine.run().await.unwrap();

    assert_eq!(report.total, 3);
    assert_eq!(report.succeeded, 2);
    assert_eq!(report.failed, 1);
    assert!(!report.is_success());
    assert_eq!(report.retries, 1);

    let failures = report.failures();
    assert_eq!(failures.len(), 1);
    assert_eq!(failures[0].0, "rec-3");
    assert!(failures[0].1.contains("record is locked"));

    // Rejected records are not persisted.
    assert_eq!(store.len(), 2);
    assert!(!store.contains("rec-3"));
    assert_eq!(transport.hits("rec-2"), 2);
}

/// Pagination failures propagate to the caller instead of being folded into
/// per-record results.
#[tokio::test]
async fn pagination_failure_propagates() {
    let transport = Arc::new(MockTransport::new());
    transport.on_login();
    transport.on(
        "page1",
        |r| r.url.contains("page=1&"),
        vec![status(500, r#"{"error": {"code": "boom", "message": "collection offline"}}"#)],
    );

    let store = Arc::new(MemoryRecordStore::new());
    let engine = build_engine(transport.clone(), store.clone());

    let error = engine.run().await.unwrap_err();
    assert_eq!(error.kind(), SyncErrorKind::Api);
    assert_eq!(store.len(), 0);
}

/// A failing save surfaces as a database failure in the record's result.
#[tokio::test]
async fn save_failure_marks_record_failed() {
    struct FailingStore;

    #[async_trait::async_trait]
    impl RecordStore for FailingStore {
        async fn save(
            &self,
            _record: &syncline::sync::RemoteRecord,
        ) -> Result<(), syncline::SyncError> {
            Err(syncline::SyncError::Database("disk full".to_string()))
        }
    }

    let transport = Arc::new(MockTransport::new());
    transport.on_login();
    transport.on(
        "page1",
        |r| r.url.contains("page=1&"),
        vec![ok_json(
            r#"{
                "data": [{"id": "rec-1", "name": "alpha"}],
                "pagination": {"page": 1, "per_page": 2, "total": 1, "has_more": false}
            }"#,
        )],
    );
    transport.on(
        "rec-1",
        |r| r.url.contains("/api/records/rec-1/sync"),
        vec![ok_json(sync_ok("rec-1"))],
    );

    let engine = build_engine(transport.clone(), Arc::new(FailingStore));
    let report = engine.run().await.unwrap();

    assert_eq!(report.failed, 1);
    let failures = report.failures();
    assert!(failures[0].1.contains("disk full"));
    assert_eq!(report.results[0].outcome.as_ref().unwrap_err().kind(), SyncErrorKind::Database);
}
