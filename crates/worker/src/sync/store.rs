//! Record persistence
//!
//! The engine only needs an opaque "save record" function; [`RecordStore`]
//! is that seam. [`SqliteRecordStore`] is the production implementation;
//! [`MemoryRecordStore`] backs tests and dry runs.

use std::collections::HashMap;
use std::path::Path;
use std::sync::{Arc, Mutex, MutexGuard};

use async_trait::async_trait;
use chrono::Utc;
use rusqlite::{params, Connection};
use tracing::{debug, warn};

use crate::error::SyncError;

use super::types::RemoteRecord;

/// Opaque persistence seam for synced records.
#[async_trait]
pub trait RecordStore: Send + Sync {
    /// Persist one record; replaces any prior version of the same id.
    async fn save(&self, record: &RemoteRecord) -> Result<(), SyncError>;
}

/// SQLite-backed record store.
///
/// The connection is owned behind a mutex and every statement runs on the
/// blocking pool, keeping the async executor free of file I/O.
pub struct SqliteRecordStore {
    connection: Arc<Mutex<Connection>>,
}

impl SqliteRecordStore {
    /// Open (or create) the database at `path` and ensure the schema exists.
    pub fn open(path: &Path) -> Result<Self, SyncError> {
        let connection = Connection::open(path)
            .map_err(|e| SyncError::Database(format!("failed to open database: {e}")))?;
        Self::from_connection(connection)
    }

    /// Open an in-memory database. Useful in tests.
    pub fn open_in_memory() -> Result<Self, SyncError> {
        let connection = Connection::open_in_memory()
            .map_err(|e| SyncError::Database(format!("failed to open database: {e}")))?;
        Self::from_connection(connection)
    }

    fn from_connection(connection: Connection) -> Result<Self, SyncError> {
        connection
            .execute_batch(
                "CREATE TABLE IF NOT EXISTS records (
                    id TEXT PRIMARY KEY,
                    payload TEXT NOT NULL,
                    synced_at TEXT NOT NULL
                );",
            )
            .map_err(|e| SyncError::Database(format!("failed to create schema: {e}")))?;

        Ok(Self { connection: Arc::new(Mutex::new(connection)) })
    }

    /// Number of persisted records.
    pub fn record_count(&self) -> Result<u64, SyncError> {
        let connection = self.lock_connection();
        connection
            .query_row("SELECT COUNT(*) FROM records", [], |row| row.get::<_, i64>(0))
            .map(|count| count.max(0) as u64)
            .map_err(|e| SyncError::Database(format!("failed to count records: {e}")))
    }

    fn lock_connection(&self) -> MutexGuard<'_, Connection> {
        match self.connection.lock() {
            Ok(guard) => guard,
            Err(poisoned) => {
                warn!("record store connection lock poisoned");
                poisoned.into_inner()
            }
        }
    }
}

#[async_trait]
impl RecordStore for SqliteRecordStore {
    async fn save(&self, record: &RemoteRecord) -> Result<(), SyncError> {
        let connection = Arc::clone(&self.connection);
        let id = record.id.clone();
        let payload = serde_json::to_string(&record.payload)
            .map_err(|e| SyncError::Database(format!("failed to serialize payload: {e}")))?;
        let synced_at = Utc::now().to_rfc3339();

        tokio::task::spawn_blocking(move || {
            let connection = match connection.lock() {
                Ok(guard) => guard,
                Err(poisoned) => poisoned.into_inner(),
            };
            connection
                .execute(
                    "INSERT OR REPLACE INTO records (id, payload, synced_at)
                     VALUES (?1, ?2, ?3)",
                    params![id, payload, synced_at],
                )
                .map(|_| ())
                .map_err(|e| SyncError::Database(format!("failed to save record: {e}")))
        })
        .await
        .map_err(|e| SyncError::Internal(format!("blocking save task failed: {e}")))??;

        debug!(record_id = %record.id, "record persisted");
        Ok(())
    }
}

/// In-memory record store for tests and dry runs.
#[derive(Debug, Default)]
pub struct MemoryRecordStore {
    records: Mutex<HashMap<String, serde_json::Map<String, serde_json::Value>>>,
}

impl MemoryRecordStore {
    pub fn new() -> Self {
        Self::default()
    }

    /// Number of stored records.
    pub fn len(&self) -> usize {
        self.lock_records().len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    /// Whether a record with the given id was saved.
    pub fn contains(&self, id: &str) -> bool {
        self.lock_records().contains_key(id)
    }

    fn lock_records(
        &self,
    ) -> MutexGuard<'_, HashMap<String, serde_json::Map<String, serde_json::Value>>> {
        match self.records.lock() {
            Ok(guard) => guard,
            Err(poisoned) => poisoned.into_inner(),
        }
    }
}

#[async_trait]
impl RecordStore for MemoryRecordStore {
    async fn save(&self, record: &RemoteRecord) -> Result<(), SyncError> {
        self.lock_records().insert(record.id.clone(), record.payload.clone());
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    //! Unit tests for the record stores.
    use super::*;

    fn record(id: &str) -> RemoteRecord {
        let mut payload = serde_json::Map::new();
        payload.insert("name".to_string(), serde_json::Value::String(format!("record {id}")));
        RemoteRecord { id: id.to_string(), payload }
    }

    /// Validates `SqliteRecordStore::save` behavior for the persist and
    /// replace scenario.
    ///
    /// Assertions:
    /// - Confirms saved records are counted.
    /// - Confirms re-saving the same id does not duplicate.
    #[tokio::test]
    async fn sqlite_store_saves_and_replaces() {
        let store = SqliteRecordStore::open_in_memory().unwrap();

        store.save(&record("a")).await.unwrap();
        store.save(&record("b")).await.unwrap();
        store.save(&record("a")).await.unwrap();

        assert_eq!(store.record_count().unwrap(), 2);
    }

    /// Validates `SqliteRecordStore::open` behavior for the on-disk database
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms records survive reopening the same file.
    #[tokio::test]
    async fn sqlite_store_persists_to_disk() {
        let dir = tempfile::tempdir().unwrap();
        let path = dir.path().join("records.db");

        {
            let store = SqliteRecordStore::open(&path).unwrap();
            store.save(&record("durable")).await.unwrap();
        }

        let reopened = SqliteRecordStore::open(&path).unwrap();
        assert_eq!(reopened.record_count().unwrap(), 1);
    }

    /// Validates `MemoryRecordStore::save` behavior for the bookkeeping
    /// scenario.
    ///
    /// Assertions:
    /// - Confirms membership and length reflect saves.
    #[tokio::test]
    async fn memory_store_tracks_saves() {
        let store = MemoryRecordStore::new();
        assert!(store.is_empty());

        store.save(&record("x")).await.unwrap();
        store.save(&record("y")).await.unwrap();

        assert_eq!(store.len(), 2);
        assert!(store.contains("x"));
        assert!(!store.contains("z"));
    }
}
