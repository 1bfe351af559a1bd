//! Syncline - resilient record-synchronization worker
//!
//! Pulls a paginated collection of records from a remote HTTP API and
//! persists each record to a relational store. Every outbound call traverses
//! the request pipeline: retry engine, sliding-window rate limiter,
//! credential manager, then the injectable transport.
//!
//! The concurrency and resilience primitives live in `syncline-common`; this
//! crate supplies the domain: the error taxonomy, the transport contract and
//! its reqwest implementation, credential acquisition, the typed API client,
//! and the orchestrator that fans per-record work across the task queue.

#![forbid(unsafe_code)]
#![warn(rust_2018_idioms)]
#![warn(clippy::all, clippy::perf, clippy::complexity, clippy::suspicious)]

pub mod api;
pub mod auth;
pub mod config;
pub mod error;
pub mod logging;
pub mod sync;
pub mod transport;

pub use api::{ApiClient, ApiClientConfig, CallOutcome, RequestOptions};
pub use auth::{AccessToken, AuthConfig, CredentialManager};
pub use config::{LogFormat, WorkerConfig};
pub use error::{SyncError, SyncErrorKind, SyncRetryPolicy};
pub use sync::{
    MemoryRecordStore, RecordStore, SqliteRecordStore, SyncEngine, SyncEngineConfig, SyncReport,
};
pub use transport::{
    HttpMethod, ReqwestTransport, Transport, TransportRequest, TransportResponse,
};
