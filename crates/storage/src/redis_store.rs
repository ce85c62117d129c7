use crate::error::{Result, StorageError};
use crate::record::{CorpusRecord, NewDocument, NewScanResult, StoredDocument};
use crate::StorageBackend;
use chrono::{DateTime, Utc};
use docsentry_protocol::{
    IndexedFileMeta, MatchKind, OperationKind, OperationSnapshot, PoolConfig, PoolStatus,
    RedisConfig, ScanResultView, StorageBackendKind, StorageHealth,
};
use docsentry_similarity::SparseVector;
use redis::Commands;
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::time::{Duration, Instant};

// Key layout, everything under one prefix:
//   docsentry:seq:file            id sequence for documents
//   docsentry:seq:result          id sequence for scan results
//   docsentry:file:<id>           bincode StoredDocument
//   docsentry:paths               hash: path -> id
//   docsentry:op:<id>             json OperationSnapshot
//   docsentry:ops                 set of operation ids
//   docsentry:result:<id>         json scan result
//   docsentry:scan:<scan_id>      set of result ids
//   docsentry:scans               set of scan ids
const PREFIX: &str = "docsentry";

fn file_key(id: i64) -> String {
    format!("{PREFIX}:file:{id}")
}

fn op_key(id: &str) -> String {
    format!("{PREFIX}:op:{id}")
}

fn result_key(id: i64) -> String {
    format!("{PREFIX}:result:{id}")
}

fn scan_key(scan_id: &str) -> String {
    format!("{PREFIX}:scan:{scan_id}")
}

fn paths_key() -> String {
    format!("{PREFIX}:paths")
}

#[derive(Debug, Serialize, Deserialize)]
struct RedisScanResult {
    id: i64,
    scan_id: String,
    file_path: String,
    match_kind: MatchKind,
    score: f64,
    matched_file_id: i64,
    created_at: DateTime<Utc>,
}

/// Remote key-value backend over a pooled Redis client.
pub struct RedisStorage {
    pool: r2d2::Pool<redis::Client>,
}

impl RedisStorage {
    /// Connect to the configured server and build the connection pool.
    ///
    /// Pool construction performs the initial connection, so an unreachable
    /// server fails here rather than on first use.
    pub fn open(config: &RedisConfig, pool_config: &PoolConfig) -> Result<Self> {
        let client = redis::Client::open(config.url())
            .map_err(|e| StorageError::Connection(e.to_string()))?;
        let pool = r2d2::Pool::builder()
            .max_size(pool_config.max_connections)
            .min_idle(Some(pool_config.min_idle))
            .connection_timeout(Duration::from_secs(pool_config.connection_timeout_secs))
            .max_lifetime(Some(Duration::from_secs(pool_config.max_lifetime_secs)))
            .test_on_check_out(pool_config.test_on_checkout)
            .build(client)
            .map_err(|e| StorageError::Connection(e.to_string()))?;

        log::info!("redis storage ready at {}:{}", config.host, config.port);
        Ok(Self { pool })
    }

    fn document(&self, conn: &mut r2d2::PooledConnection<redis::Client>, id: i64) -> Result<Option<StoredDocument>> {
        let bytes: Option<Vec<u8>> = conn.get(file_key(id))?;
        bytes
            .map(|b| bincode::deserialize::<StoredDocument>(&b).map_err(Into::into))
            .transpose()
    }

    /// All `(path, id)` pairs currently indexed.
    fn path_index(&self, conn: &mut r2d2::PooledConnection<redis::Client>) -> Result<Vec<(String, i64)>> {
        let map: HashMap<String, i64> = conn.hgetall(paths_key())?;
        Ok(map.into_iter().collect())
    }
}

impl StorageBackend for RedisStorage {
    fn kind(&self) -> StorageBackendKind {
        StorageBackendKind::Redis
    }

    fn upsert_document(&self, doc: &NewDocument) -> Result<i64> {
        let mut conn = self.pool.get()?;

        let existing: Option<i64> = conn.hget(paths_key(), &doc.path)?;
        let id = match existing {
            Some(id) => id,
            None => conn.incr(format!("{PREFIX}:seq:file"), 1)?,
        };

        let stored = StoredDocument {
            id,
            path: doc.path.clone(),
            filename: doc.filename.clone(),
            size_bytes: doc.size_bytes,
            fingerprint: doc.fingerprint.clone(),
            vector: doc.vector.clone(),
            term_counts: doc.term_counts.clone(),
            last_modified: doc.last_modified,
            indexed_at: Utc::now(),
        };
        let bytes = bincode::serialize(&stored)?;

        // Record write and path-index update land together.
        redis::pipe()
            .atomic()
            .set(file_key(id), bytes)
            .hset(paths_key(), &doc.path, id)
            .query::<()>(&mut *conn)?;
        Ok(id)
    }

    fn document_by_path(&self, path: &str) -> Result<Option<StoredDocument>> {
        let mut conn = self.pool.get()?;
        let id: Option<i64> = conn.hget(paths_key(), path)?;
        match id {
            Some(id) => self.document(&mut conn, id),
            None => Ok(None),
        }
    }

    fn list_documents(&self) -> Result<Vec<IndexedFileMeta>> {
        let mut conn = self.pool.get()?;
        let mut out = Vec::new();
        for (_, id) in self.path_index(&mut conn)? {
            if let Some(doc) = self.document(&mut conn, id)? {
                out.push(IndexedFileMeta {
                    id: doc.id,
                    path: doc.path,
                    filename: doc.filename,
                    size_bytes: doc.size_bytes,
                    fingerprint: doc.fingerprint,
                    has_vector: doc.vector.is_some(),
                    indexed_at: doc.indexed_at,
                });
            }
        }
        out.sort_by(|a, b| a.path.cmp(&b.path));
        Ok(out)
    }

    fn fetch_corpus(&self) -> Result<Vec<CorpusRecord>> {
        let mut conn = self.pool.get()?;
        let mut out = Vec::new();
        for (_, id) in self.path_index(&mut conn)? {
            if let Some(doc) = self.document(&mut conn, id)? {
                out.push(CorpusRecord {
                    id: doc.id,
                    fingerprint: doc.fingerprint,
                    vector: doc.vector,
                    term_counts: doc.term_counts,
                });
            }
        }
        out.sort_by_key(|r| r.id);
        Ok(out)
    }

    fn rewrite_vectors(&self, updates: &[(i64, SparseVector)]) -> Result<()> {
        let mut conn = self.pool.get()?;
        for (id, vector) in updates {
            let Some(mut doc) = self.document(&mut conn, *id)? else {
                continue;
            };
            doc.vector = Some(vector.clone());
            let _: () = conn.set(file_key(*id), bincode::serialize(&doc)?)?;
        }
        Ok(())
    }

    fn delete_documents(&self, ids: Option<&[i64]>) -> Result<u64> {
        let mut conn = self.pool.get()?;
        let targets: Vec<(String, i64)> = match ids {
            None => self.path_index(&mut conn)?,
            Some(ids) => {
                let mut found = Vec::with_capacity(ids.len());
                for id in ids {
                    if let Some(doc) = self.document(&mut conn, *id)? {
                        found.push((doc.path, *id));
                    }
                }
                found
            }
        };

        let mut deleted = 0u64;
        for (path, id) in targets {
            let removed: i64 = conn.del(file_key(id))?;
            let _: () = conn.hdel(paths_key(), &path)?;
            deleted += removed as u64;
        }
        Ok(deleted)
    }

    fn count_documents(&self) -> Result<u64> {
        let mut conn = self.pool.get()?;
        let count: u64 = conn.hlen(paths_key())?;
        Ok(count)
    }

    fn put_operation(&self, snapshot: &OperationSnapshot) -> Result<()> {
        let mut conn = self.pool.get()?;
        let json = serde_json::to_string(snapshot)?;
        redis::pipe()
            .atomic()
            .set(op_key(&snapshot.id), json)
            .sadd(format!("{PREFIX}:ops"), &snapshot.id)
            .query::<()>(&mut *conn)?;
        Ok(())
    }

    fn get_operation(&self, id: &str) -> Result<Option<OperationSnapshot>> {
        let mut conn = self.pool.get()?;
        let json: Option<String> = conn.get(op_key(id))?;
        json.map(|j| serde_json::from_str(&j).map_err(Into::into))
            .transpose()
    }

    fn list_operations(&self, kind: Option<OperationKind>) -> Result<Vec<OperationSnapshot>> {
        let mut conn = self.pool.get()?;
        let ids: Vec<String> = conn.smembers(format!("{PREFIX}:ops"))?;

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let json: Option<String> = conn.get(op_key(&id))?;
            let Some(json) = json else { continue };
            let snapshot: OperationSnapshot = serde_json::from_str(&json)?;
            if kind.is_some() && kind != Some(snapshot.kind) {
                continue;
            }
            out.push(snapshot);
        }
        out.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(out)
    }

    fn add_scan_result(&self, result: &NewScanResult) -> Result<i64> {
        let mut conn = self.pool.get()?;
        let id: i64 = conn.incr(format!("{PREFIX}:seq:result"), 1)?;
        let record = RedisScanResult {
            id,
            scan_id: result.scan_id.clone(),
            file_path: result.file_path.clone(),
            match_kind: result.match_kind,
            score: result.score,
            matched_file_id: result.matched_file_id,
            created_at: Utc::now(),
        };
        redis::pipe()
            .atomic()
            .set(result_key(id), serde_json::to_string(&record)?)
            .sadd(scan_key(&result.scan_id), id)
            .sadd(format!("{PREFIX}:scans"), &result.scan_id)
            .query::<()>(&mut *conn)?;
        Ok(id)
    }

    fn scan_results(&self, scan_id: &str) -> Result<Vec<ScanResultView>> {
        let mut conn = self.pool.get()?;
        let ids: Vec<i64> = conn.smembers(scan_key(scan_id))?;

        let mut out = Vec::with_capacity(ids.len());
        for id in ids {
            let json: Option<String> = conn.get(result_key(id))?;
            let Some(json) = json else { continue };
            let record: RedisScanResult = serde_json::from_str(&json)?;
            let matched = self.document(&mut conn, record.matched_file_id)?;
            out.push(ScanResultView {
                id: record.id,
                scan_id: record.scan_id,
                file_path: record.file_path,
                match_kind: record.match_kind,
                score: record.score,
                matched_file_id: record.matched_file_id,
                matched_file_path: matched.as_ref().map(|d| d.path.clone()),
                matched_file_name: matched.map(|d| d.filename),
                created_at: record.created_at,
            });
        }
        out.sort_by(|a, b| {
            b.score
                .partial_cmp(&a.score)
                .unwrap_or(std::cmp::Ordering::Equal)
                .then(a.id.cmp(&b.id))
        });
        Ok(out)
    }

    fn count_scan_results(&self) -> Result<u64> {
        let mut conn = self.pool.get()?;
        let scan_ids: Vec<String> = conn.smembers(format!("{PREFIX}:scans"))?;
        let mut total = 0u64;
        for scan_id in scan_ids {
            let count: u64 = conn.scard(scan_key(&scan_id))?;
            total += count;
        }
        Ok(total)
    }

    fn count_distinct_scans(&self) -> Result<u64> {
        let mut conn = self.pool.get()?;
        let count: u64 = conn.scard(format!("{PREFIX}:scans"))?;
        Ok(count)
    }

    fn health(&self) -> StorageHealth {
        let start = Instant::now();
        let probe = self.pool.get().map_err(StorageError::from).and_then(|mut conn| {
            redis::cmd("PING")
                .query::<String>(&mut *conn)
                .map_err(StorageError::from)
        });
        match probe {
            Ok(_) => StorageHealth {
                backend: StorageBackendKind::Redis,
                reachable: true,
                latency_ms: Some(start.elapsed().as_secs_f64() * 1000.0),
                detail: None,
            },
            Err(e) => StorageHealth {
                backend: StorageBackendKind::Redis,
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
    use pretty_assertions::assert_eq;

    // Server-backed behavior is covered by the shared contract through the
    // engine tests when a Redis instance is available; here we pin the key
    // layout, which the stored data format depends on.

    #[test]
    fn key_layout_is_stable() {
        assert_eq!(file_key(7), "docsentry:file:7");
        assert_eq!(op_key("abc"), "docsentry:op:abc");
        assert_eq!(result_key(3), "docsentry:result:3");
        assert_eq!(scan_key("s-1"), "docsentry:scan:s-1");
        assert_eq!(paths_key(), "docsentry:paths");
    }

    #[test]
    fn scan_result_record_round_trips_as_json() {
        let record = RedisScanResult {
            id: 1,
            scan_id: "scan".into(),
            file_path: "/dst/a.txt".into(),
            match_kind: MatchKind::Similarity,
            score: 0.72,
            matched_file_id: 9,
            created_at: Utc::now(),
        };
        let json = serde_json::to_string(&record).unwrap();
        let back: RedisScanResult = serde_json::from_str(&json).unwrap();
        assert_eq!(back.id, 1);
        assert_eq!(back.match_kind, MatchKind::Similarity);
        assert_eq!(back.matched_file_id, 9);
    }

    #[test]
    fn unreachable_server_fails_closed() {
        // Port 1 is never a Redis server; pool construction must error
        // rather than hand back a dead backend.
        let config = RedisConfig {
            host: "127.0.0.1".into(),
            port: 1,
            ..RedisConfig::default()
        };
        let pool = PoolConfig {
            connection_timeout_secs: 1,
            min_idle: 1,
            ..PoolConfig::default()
        };
        assert!(RedisStorage::open(&config, &pool).is_err());
    }
}
