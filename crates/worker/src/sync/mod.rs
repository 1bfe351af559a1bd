//! Record synchronization
//!
//! The orchestration layer: wire types for the record collection API,
//! the persistence trait, and the engine that fans per-record work out
//! across the task queue.

pub mod engine;
pub mod store;
pub mod types;

pub use engine::{SyncEngine, SyncEngineConfig};
pub use store::{MemoryRecordStore, RecordStore, SqliteRecordStore};
pub use types::{PageInfo, RecordPage, RecordSyncResult, RemoteRecord, SyncReport, SyncResponse};
