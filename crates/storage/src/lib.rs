//! # DocSentry Storage
//!
//! Persistence for indexed documents, operation history, and scan results,
//! behind one backend contract with two interchangeable implementations:
//!
//! - [`SqliteStorage`]: embedded relational store, the zero-dependency
//!   default.
//! - [`RedisStorage`]: remote key-value store for larger corpora and
//!   multi-instance deployments.
//!
//! Both pool their connections through `r2d2`, expose identical health and
//! pool-occupancy telemetry, guarantee atomic overwrite-by-path, and never
//! return partial records.
//!
//! The trait is synchronous; callers on the async side wrap calls in
//! `spawn_blocking`.

mod error;
mod record;
mod redis_store;
mod sqlite_store;

pub use error::{Result, StorageError};
pub use record::{CorpusRecord, NewDocument, NewScanResult, StoredDocument};
pub use redis_store::RedisStorage;
pub use sqlite_store::SqliteStorage;

use docsentry_protocol::{
    IndexedFileMeta, OperationKind, OperationSnapshot, PoolStatus, ScanResultView,
    StorageBackendKind, StorageConfig, StorageHealth,
};
use docsentry_similarity::SparseVector;
use std::sync::Arc;

/// Backend contract. Identical semantics across implementations; the engine
/// only ever talks to `Arc<dyn StorageBackend>`.
pub trait StorageBackend: Send + Sync {
    fn kind(&self) -> StorageBackendKind;

    /// Insert or overwrite the document stored at `doc.path`.
    ///
    /// Overwrite-by-path is atomic: a concurrent reader sees the old record
    /// or the new one, never a mix. Returns the record id (reused when the
    /// path already existed on SQLite).
    fn upsert_document(&self, doc: &NewDocument) -> Result<i64>;

    fn document_by_path(&self, path: &str) -> Result<Option<StoredDocument>>;

    /// Listing view for the UI surface; blobs are not loaded.
    fn list_documents(&self) -> Result<Vec<IndexedFileMeta>>;

    /// Bulk-fetch of every record's id, fingerprint, vector, and term
    /// counts: the scan-time corpus and the refit input.
    fn fetch_corpus(&self) -> Result<Vec<CorpusRecord>>;

    /// Replace stored vectors after a vocabulary refit.
    fn rewrite_vectors(&self, updates: &[(i64, SparseVector)]) -> Result<()>;

    /// Delete the given ids, or everything when `ids` is `None`.
    /// Returns the number of records removed.
    fn delete_documents(&self, ids: Option<&[i64]>) -> Result<u64>;

    fn count_documents(&self) -> Result<u64>;

    /// Insert or update an operation record keyed by its id.
    fn put_operation(&self, snapshot: &OperationSnapshot) -> Result<()>;

    fn get_operation(&self, id: &str) -> Result<Option<OperationSnapshot>>;

    /// Operation history, newest first, optionally filtered by kind.
    fn list_operations(&self, kind: Option<OperationKind>) -> Result<Vec<OperationSnapshot>>;

    fn add_scan_result(&self, result: &NewScanResult) -> Result<i64>;

    /// Results for one scan, joined with matched-document metadata where
    /// the matched record still exists.
    fn scan_results(&self, scan_id: &str) -> Result<Vec<ScanResultView>>;

    fn count_scan_results(&self) -> Result<u64>;

    fn count_distinct_scans(&self) -> Result<u64>;

    /// Reachability probe with round-trip latency. Never errors: an
    /// unreachable backend reports `reachable = false` with detail.
    fn health(&self) -> StorageHealth;

    /// Current connection pool occupancy.
    fn pool_status(&self) -> PoolStatus;
}

/// Build the backend selected by `config`.
///
/// Connectivity is verified before the handle is returned, so activation
/// can fail closed: callers keep their previous backend when this errors.
pub fn connect(config: &StorageConfig) -> Result<Arc<dyn StorageBackend>> {
    let backend: Arc<dyn StorageBackend> = match config.backend {
        StorageBackendKind::Sqlite => {
            Arc::new(SqliteStorage::open(&config.sqlite, &config.pool)?)
        }
        StorageBackendKind::Redis => Arc::new(RedisStorage::open(&config.redis, &config.pool)?),
    };

    let health = backend.health();
    if !health.reachable {
        return Err(StorageError::Connection(
            health
                .detail
                .unwrap_or_else(|| format!("{} backend unreachable", backend.kind())),
        ));
    }
    Ok(backend)
}
