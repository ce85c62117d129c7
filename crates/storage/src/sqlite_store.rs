use crate::error::{Result, StorageError};
use crate::record::{CorpusRecord, NewDocument, NewScanResult, StoredDocument};
use crate::StorageBackend;
use chrono::{DateTime, SecondsFormat, Utc};
use docsentry_protocol::{
    IndexedFileMeta, MatchKind, OperationKind, OperationSnapshot, PoolConfig, PoolStatus,
    ScanResultView, SkipCounts, SqliteConfig, StorageBackendKind, StorageHealth,
};
use docsentry_similarity::{SparseVector, TermCounts};
use r2d2_sqlite::SqliteConnectionManager;
use rusqlite::{params, params_from_iter, OptionalExtension};
use serde::de::DeserializeOwned;
use std::path::Path;
use std::time::{Duration, Instant};

const SCHEMA: &str = r"
CREATE TABLE IF NOT EXISTS indexed_files (
    id INTEGER PRIMARY KEY,
    path TEXT NOT NULL UNIQUE,
    filename TEXT NOT NULL,
    size_bytes INTEGER NOT NULL,
    fingerprint TEXT NOT NULL,
    vector BLOB,
    term_counts BLOB,
    last_modified REAL NOT NULL,
    indexed_at TEXT NOT NULL
);

CREATE TABLE IF NOT EXISTS operations (
    id TEXT PRIMARY KEY,
    kind TEXT NOT NULL,
    directory TEXT NOT NULL,
    status TEXT NOT NULL,
    total_files INTEGER NOT NULL DEFAULT 0,
    files_processed INTEGER NOT NULL DEFAULT 0,
    files_indexed INTEGER NOT NULL DEFAULT 0,
    files_skipped INTEGER NOT NULL DEFAULT 0,
    skip_counts TEXT NOT NULL DEFAULT '{}',
    matches_found INTEGER NOT NULL DEFAULT 0,
    current_file TEXT NOT NULL DEFAULT '',
    error_message TEXT,
    started_at TEXT NOT NULL,
    completed_at TEXT
);

CREATE TABLE IF NOT EXISTS scan_results (
    id INTEGER PRIMARY KEY,
    scan_id TEXT NOT NULL,
    file_path TEXT NOT NULL,
    match_kind TEXT NOT NULL,
    score REAL NOT NULL,
    matched_file_id INTEGER NOT NULL,
    created_at TEXT NOT NULL
);

CREATE INDEX IF NOT EXISTS idx_indexed_files_fingerprint ON indexed_files(fingerprint);
CREATE INDEX IF NOT EXISTS idx_indexed_files_filename ON indexed_files(filename);
CREATE INDEX IF NOT EXISTS idx_scan_results_scan_id ON scan_results(scan_id);
CREATE INDEX IF NOT EXISTS idx_operations_kind ON operations(kind);
";

/// Embedded relational backend over a pooled SQLite database.
pub struct SqliteStorage {
    pool: r2d2::Pool<SqliteConnectionManager>,
}

impl SqliteStorage {
    /// Open (creating if needed) the database at `config.path`.
    pub fn open(config: &SqliteConfig, pool_config: &PoolConfig) -> Result<Self> {
        if let Some(parent) = Path::new(&config.path).parent() {
            if !parent.as_os_str().is_empty() {
                std::fs::create_dir_all(parent)
                    .map_err(|e| StorageError::Connection(e.to_string()))?;
            }
        }

        let manager = SqliteConnectionManager::file(&config.path).with_init(|conn| {
            conn.execute_batch("PRAGMA journal_mode=WAL; PRAGMA synchronous=NORMAL;")
        });
        let pool = r2d2::Pool::builder()
            .max_size(pool_config.max_connections)
            .min_idle(Some(pool_config.min_idle))
            .connection_timeout(Duration::from_secs(pool_config.connection_timeout_secs))
            .max_lifetime(Some(Duration::from_secs(pool_config.max_lifetime_secs)))
            .test_on_check_out(pool_config.test_on_checkout)
            .build(manager)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        pool.get()?.execute_batch(SCHEMA)?;
        log::info!("sqlite storage ready at {}", config.path);
        Ok(Self { pool })
    }
}

fn encode_blob<T: serde::Serialize>(value: Option<&T>) -> Result<Option<Vec<u8>>> {
    value.map(bincode::serialize).transpose().map_err(Into::into)
}

fn decode_blob<T: DeserializeOwned>(bytes: Option<Vec<u8>>) -> Result<Option<T>> {
    bytes
        .map(|b| bincode::deserialize(&b))
        .transpose()
        .map_err(Into::into)
}

fn to_timestamp(ts: DateTime<Utc>) -> String {
    ts.to_rfc3339_opts(SecondsFormat::Micros, true)
}

fn parse_timestamp(s: &str) -> DateTime<Utc> {
    DateTime::parse_from_rfc3339(s)
        .map(|dt| dt.with_timezone(&Utc))
        .unwrap_or_default()
}

/// Round-trip a snake_case enum through its serde string form.
fn parse_tag<T: DeserializeOwned>(s: String) -> Result<T> {
    Ok(serde_json::from_value(serde_json::Value::String(s))?)
}

impl StorageBackend for SqliteStorage {
    fn kind(&self) -> StorageBackendKind {
        StorageBackendKind::Sqlite
    }

    fn upsert_document(&self, doc: &NewDocument) -> Result<i64> {
        let conn = self.pool.get()?;
        let id = conn.query_row(
            "INSERT INTO indexed_files
                 (path, filename, size_bytes, fingerprint, vector, term_counts, last_modified, indexed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8)
             ON CONFLICT(path) DO UPDATE SET
                 filename = excluded.filename,
                 size_bytes = excluded.size_bytes,
                 fingerprint = excluded.fingerprint,
                 vector = excluded.vector,
                 term_counts = excluded.term_counts,
                 last_modified = excluded.last_modified,
                 indexed_at = excluded.indexed_at
             RETURNING id",
            params![
                doc.path,
                doc.filename,
                doc.size_bytes,
                doc.fingerprint,
                encode_blob(doc.vector.as_ref())?,
                encode_blob(doc.term_counts.as_ref())?,
                doc.last_modified,
                to_timestamp(Utc::now()),
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn document_by_path(&self, path: &str) -> Result<Option<StoredDocument>> {
        let conn = self.pool.get()?;
        let row = conn
            .query_row(
                "SELECT id, path, filename, size_bytes, fingerprint, vector, term_counts,
                        last_modified, indexed_at
                 FROM indexed_files WHERE path = ?1",
                params![path],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, String>(2)?,
                        row.get::<_, u64>(3)?,
                        row.get::<_, String>(4)?,
                        row.get::<_, Option<Vec<u8>>>(5)?,
                        row.get::<_, Option<Vec<u8>>>(6)?,
                        row.get::<_, f64>(7)?,
                        row.get::<_, String>(8)?,
                    ))
                },
            )
            .optional()?;

        row.map(
            |(id, path, filename, size_bytes, fingerprint, vector, term_counts, last_modified, indexed_at)| {
                Ok(StoredDocument {
                    id,
                    path,
                    filename,
                    size_bytes,
                    fingerprint,
                    vector: decode_blob::<SparseVector>(vector)?,
                    term_counts: decode_blob::<TermCounts>(term_counts)?,
                    last_modified,
                    indexed_at: parse_timestamp(&indexed_at),
                })
            },
        )
        .transpose()
    }

    fn list_documents(&self) -> Result<Vec<IndexedFileMeta>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, path, filename, size_bytes, fingerprint, vector IS NOT NULL, indexed_at
             FROM indexed_files ORDER BY path",
        )?;
        let rows = stmt.query_map([], |row| {
            Ok(IndexedFileMeta {
                id: row.get(0)?,
                path: row.get(1)?,
                filename: row.get(2)?,
                size_bytes: row.get(3)?,
                fingerprint: row.get(4)?,
                has_vector: row.get(5)?,
                indexed_at: parse_timestamp(&row.get::<_, String>(6)?),
            })
        })?;
        rows.collect::<rusqlite::Result<Vec<_>>>().map_err(Into::into)
    }

    fn fetch_corpus(&self) -> Result<Vec<CorpusRecord>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, fingerprint, vector, term_counts FROM indexed_files ORDER BY id",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, Option<Vec<u8>>>(2)?,
                    row.get::<_, Option<Vec<u8>>>(3)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(|(id, fingerprint, vector, term_counts)| {
                Ok(CorpusRecord {
                    id,
                    fingerprint,
                    vector: decode_blob::<SparseVector>(vector)?,
                    term_counts: decode_blob::<TermCounts>(term_counts)?,
                })
            })
            .collect()
    }

    fn rewrite_vectors(&self, updates: &[(i64, SparseVector)]) -> Result<()> {
        let mut conn = self.pool.get()?;
        let tx = conn.transaction()?;
        {
            let mut stmt = tx.prepare("UPDATE indexed_files SET vector = ?1 WHERE id = ?2")?;
            for (id, vector) in updates {
                stmt.execute(params![bincode::serialize(vector)?, id])?;
            }
        }
        tx.commit()?;
        Ok(())
    }

    fn delete_documents(&self, ids: Option<&[i64]>) -> Result<u64> {
        let conn = self.pool.get()?;
        let deleted = match ids {
            None => conn.execute("DELETE FROM indexed_files", [])?,
            Some(ids) if ids.is_empty() => 0,
            Some(ids) => {
                let placeholders = vec!["?"; ids.len()].join(", ");
                conn.execute(
                    &format!("DELETE FROM indexed_files WHERE id IN ({placeholders})"),
                    params_from_iter(ids.iter()),
                )?
            }
        };
        Ok(deleted as u64)
    }

    fn count_documents(&self) -> Result<u64> {
        let conn = self.pool.get()?;
        let count: u64 = conn.query_row("SELECT COUNT(*) FROM indexed_files", [], |row| {
            row.get(0)
        })?;
        Ok(count)
    }

    fn put_operation(&self, snapshot: &OperationSnapshot) -> Result<()> {
        let conn = self.pool.get()?;
        conn.execute(
            "INSERT OR REPLACE INTO operations
                 (id, kind, directory, status, total_files, files_processed, files_indexed,
                  files_skipped, skip_counts, matches_found, current_file, error_message,
                  started_at, completed_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7, ?8, ?9, ?10, ?11, ?12, ?13, ?14)",
            params![
                snapshot.id,
                snapshot.kind.as_str(),
                snapshot.directory,
                snapshot.status.as_str(),
                snapshot.total_files,
                snapshot.files_processed,
                snapshot.files_indexed,
                snapshot.files_skipped,
                serde_json::to_string(&snapshot.skip_counts)?,
                snapshot.matches_found,
                snapshot.current_file,
                snapshot.error_message,
                to_timestamp(snapshot.started_at),
                snapshot.completed_at.map(to_timestamp),
            ],
        )?;
        Ok(())
    }

    fn get_operation(&self, id: &str) -> Result<Option<OperationSnapshot>> {
        let ops = self.list_operations(None)?;
        Ok(ops.into_iter().find(|op| op.id == id))
    }

    fn list_operations(&self, kind: Option<OperationKind>) -> Result<Vec<OperationSnapshot>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT id, kind, directory, status, total_files, files_processed, files_indexed,
                    files_skipped, skip_counts, matches_found, current_file, error_message,
                    started_at, completed_at
             FROM operations ORDER BY started_at DESC",
        )?;
        let rows = stmt
            .query_map([], |row| {
                Ok((
                    row.get::<_, String>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, u64>(4)?,
                    row.get::<_, u64>(5)?,
                    row.get::<_, u64>(6)?,
                    row.get::<_, u64>(7)?,
                    row.get::<_, String>(8)?,
                    row.get::<_, u64>(9)?,
                    row.get::<_, String>(10)?,
                    row.get::<_, Option<String>>(11)?,
                    row.get::<_, String>(12)?,
                    row.get::<_, Option<String>>(13)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        let mut out = Vec::with_capacity(rows.len());
        for (
            id,
            op_kind,
            directory,
            status,
            total_files,
            files_processed,
            files_indexed,
            files_skipped,
            skip_counts,
            matches_found,
            current_file,
            error_message,
            started_at,
            completed_at,
        ) in rows
        {
            let op_kind: OperationKind = parse_tag(op_kind)?;
            if kind.is_some() && kind != Some(op_kind) {
                continue;
            }
            out.push(OperationSnapshot {
                id,
                kind: op_kind,
                directory,
                status: parse_tag(status)?,
                total_files,
                files_processed,
                files_indexed,
                files_skipped,
                skip_counts: serde_json::from_str::<SkipCounts>(&skip_counts)?,
                matches_found,
                current_file,
                started_at: parse_timestamp(&started_at),
                completed_at: completed_at.as_deref().map(parse_timestamp),
                error_message,
            });
        }
        Ok(out)
    }

    fn add_scan_result(&self, result: &NewScanResult) -> Result<i64> {
        let conn = self.pool.get()?;
        let id = conn.query_row(
            "INSERT INTO scan_results
                 (scan_id, file_path, match_kind, score, matched_file_id, created_at)
             VALUES (?1, ?2, ?3, ?4, ?5, ?6)
             RETURNING id",
            params![
                result.scan_id,
                result.file_path,
                result.match_kind.as_str(),
                result.score,
                result.matched_file_id,
                to_timestamp(Utc::now()),
            ],
            |row| row.get(0),
        )?;
        Ok(id)
    }

    fn scan_results(&self, scan_id: &str) -> Result<Vec<ScanResultView>> {
        let conn = self.pool.get()?;
        let mut stmt = conn.prepare(
            "SELECT r.id, r.scan_id, r.file_path, r.match_kind, r.score, r.matched_file_id,
                    f.path, f.filename, r.created_at
             FROM scan_results r
             LEFT JOIN indexed_files f ON f.id = r.matched_file_id
             WHERE r.scan_id = ?1
             ORDER BY r.score DESC, r.id",
        )?;
        let rows = stmt
            .query_map(params![scan_id], |row| {
                Ok((
                    row.get::<_, i64>(0)?,
                    row.get::<_, String>(1)?,
                    row.get::<_, String>(2)?,
                    row.get::<_, String>(3)?,
                    row.get::<_, f64>(4)?,
                    row.get::<_, i64>(5)?,
                    row.get::<_, Option<String>>(6)?,
                    row.get::<_, Option<String>>(7)?,
                    row.get::<_, String>(8)?,
                ))
            })?
            .collect::<rusqlite::Result<Vec<_>>>()?;

        rows.into_iter()
            .map(
                |(id, scan_id, file_path, match_kind, score, matched_file_id, matched_path, matched_name, created_at)| {
                    Ok(ScanResultView {
                        id,
                        scan_id,
                        file_path,
                        match_kind: parse_tag::<MatchKind>(match_kind)?,
                        score,
                        matched_file_id,
                        matched_file_path: matched_path,
                        matched_file_name: matched_name,
                        created_at: parse_timestamp(&created_at),
                    })
                },
            )
            .collect()
    }

    fn count_scan_results(&self) -> Result<u64> {
        let conn = self.pool.get()?;
        let count: u64 =
            conn.query_row("SELECT COUNT(*) FROM scan_results", [], |row| row.get(0))?;
        Ok(count)
    }

    fn count_distinct_scans(&self) -> Result<u64> {
        let conn = self.pool.get()?;
        let count: u64 = conn.query_row(
            "SELECT COUNT(DISTINCT scan_id) FROM scan_results",
            [],
            |row| row.get(0),
        )?;
        Ok(count)
    }

    fn health(&self) -> StorageHealth {
        let start = Instant::now();
        let probe = self
            .pool
            .get()
            .map_err(StorageError::from)
            .and_then(|conn| {
                conn.query_row("SELECT 1", [], |row| row.get::<_, i64>(0))
                    .map_err(StorageError::from)
            });
        match probe {
            Ok(_) => StorageHealth {
                backend: StorageBackendKind::Sqlite,
                reachable: true,
                latency_ms: Some(start.elapsed().as_secs_f64() * 1000.0),
                detail: None,
            },
            Err(e) => StorageHealth {
                backend: StorageBackendKind::Sqlite,
                reachable: false,
                latency_ms: None,
                detail: Some(e.to_string()),
            },
        }
    }

    fn pool_status(&self) -> PoolStatus {
        let state = self.pool.state();
        PoolStatus {
            active: state.connections - state.idle_connections,
            idle: state.idle_connections,
            max: self.pool.max_size(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use docsentry_protocol::OperationStatus;
    use docsentry_similarity::term_counts;
    use pretty_assertions::assert_eq;

    fn open_temp() -> (tempfile::TempDir, SqliteStorage) {
        let dir = tempfile::tempdir().unwrap();
        let config = SqliteConfig {
            path: dir.path().join("test.db").to_string_lossy().into_owned(),
        };
        let storage = SqliteStorage::open(&config, &PoolConfig::default()).unwrap();
        (dir, storage)
    }

    fn sample_doc(path: &str, fingerprint: &str) -> NewDocument {
        NewDocument {
            path: path.to_string(),
            filename: path.rsplit('/').next().unwrap().to_string(),
            size_bytes: 100,
            fingerprint: fingerprint.to_string(),
            vector: Some(SparseVector::from_weights(vec![(0, 1.0), (3, 2.0)])),
            term_counts: Some(term_counts("alpha beta gamma", 1, 1)),
            last_modified: 1_700_000_000.0,
        }
    }

    #[test]
    fn upsert_is_overwrite_by_path() {
        let (_dir, storage) = open_temp();

        let first = storage.upsert_document(&sample_doc("/a/doc.txt", "fp-1")).unwrap();
        let second = storage.upsert_document(&sample_doc("/a/doc.txt", "fp-2")).unwrap();
        assert_eq!(first, second);
        assert_eq!(storage.count_documents().unwrap(), 1);

        let stored = storage.document_by_path("/a/doc.txt").unwrap().unwrap();
        assert_eq!(stored.fingerprint, "fp-2");
        assert!(stored.vector.is_some());
        assert!(stored.term_counts.is_some());
    }

    #[test]
    fn corpus_fetch_round_trips_blobs() {
        let (_dir, storage) = open_temp();
        let doc = sample_doc("/a/doc.txt", "fp-1");
        let id = storage.upsert_document(&doc).unwrap();

        let corpus = storage.fetch_corpus().unwrap();
        assert_eq!(corpus.len(), 1);
        assert_eq!(corpus[0].id, id);
        assert_eq!(corpus[0].vector, doc.vector);
        assert_eq!(corpus[0].term_counts, doc.term_counts);
    }

    #[test]
    fn rewrite_vectors_replaces_blobs() {
        let (_dir, storage) = open_temp();
        let id = storage.upsert_document(&sample_doc("/a/doc.txt", "fp-1")).unwrap();

        let replacement = SparseVector::from_weights(vec![(9, 1.0)]);
        storage.rewrite_vectors(&[(id, replacement.clone())]).unwrap();

        let corpus = storage.fetch_corpus().unwrap();
        assert_eq!(corpus[0].vector.as_ref(), Some(&replacement));
    }

    #[test]
    fn delete_by_ids_and_purge_all() {
        let (_dir, storage) = open_temp();
        let a = storage.upsert_document(&sample_doc("/a/1.txt", "fp-1")).unwrap();
        storage.upsert_document(&sample_doc("/a/2.txt", "fp-2")).unwrap();
        storage.upsert_document(&sample_doc("/a/3.txt", "fp-3")).unwrap();

        assert_eq!(storage.delete_documents(Some(&[a])).unwrap(), 1);
        assert_eq!(storage.count_documents().unwrap(), 2);
        assert_eq!(storage.delete_documents(None).unwrap(), 2);
        assert_eq!(storage.count_documents().unwrap(), 0);
    }

    #[test]
    fn operations_round_trip_with_kind_filter() {
        let (_dir, storage) = open_temp();

        let mut index_op =
            OperationSnapshot::new("op-index".into(), OperationKind::Index, "/src".into());
        index_op.status = OperationStatus::Completed;
        index_op.total_files = 10;
        index_op.files_indexed = 8;
        index_op.files_skipped = 2;
        index_op.skip_counts = SkipCounts {
            ignored: 1,
            unchanged: 1,
            ..SkipCounts::default()
        };
        storage.put_operation(&index_op).unwrap();

        let scan_op = OperationSnapshot::new("op-scan".into(), OperationKind::Scan, "/dst".into());
        storage.put_operation(&scan_op).unwrap();

        let from_store = storage.get_operation("op-index").unwrap().unwrap();
        assert_eq!(from_store.status, OperationStatus::Completed);
        assert_eq!(from_store.skip_counts.ignored, 1);

        let only_scans = storage.list_operations(Some(OperationKind::Scan)).unwrap();
        assert_eq!(only_scans.len(), 1);
        assert_eq!(only_scans[0].id, "op-scan");

        // Updating by id replaces, never duplicates.
        index_op.files_indexed = 9;
        storage.put_operation(&index_op).unwrap();
        assert_eq!(storage.list_operations(None).unwrap().len(), 2);
    }

    #[test]
    fn scan_results_join_matched_documents() {
        let (_dir, storage) = open_temp();
        let id = storage.upsert_document(&sample_doc("/src/orig.txt", "fp-1")).unwrap();

        storage
            .add_scan_result(&NewScanResult {
                scan_id: "scan-1".into(),
                file_path: "/dst/copy.txt".into(),
                match_kind: MatchKind::Exact,
                score: 1.0,
                matched_file_id: id,
            })
            .unwrap();

        let results = storage.scan_results("scan-1").unwrap();
        assert_eq!(results.len(), 1);
        assert_eq!(results[0].match_kind, MatchKind::Exact);
        assert_eq!(results[0].matched_file_path.as_deref(), Some("/src/orig.txt"));
        assert_eq!(results[0].matched_file_name.as_deref(), Some("orig.txt"));

        assert_eq!(storage.count_scan_results().unwrap(), 1);
        assert_eq!(storage.count_distinct_scans().unwrap(), 1);
        assert!(storage.scan_results("other").unwrap().is_empty());
    }

    #[test]
    fn health_and_pool_telemetry() {
        let (_dir, storage) = open_temp();
        let health = storage.health();
        assert!(health.reachable);
        assert!(health.latency_ms.is_some());

        let pool = storage.pool_status();
        assert_eq!(pool.max, PoolConfig::default().max_connections);
        assert!(pool.idle >= 1);
    }
}
