use chrono::{DateTime, Utc};
use docsentry_protocol::MatchKind;
use docsentry_similarity::{SparseVector, TermCounts};
use serde::{Deserialize, Serialize};

/// Document fields supplied by the indexing pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NewDocument {
    /// Absolute path; the storage uniqueness key.
    pub path: String,
    pub filename: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the raw bytes.
    pub fingerprint: String,
    /// Absent for files that are not comparable (binary, too short).
    pub vector: Option<SparseVector>,
    /// Raw n-gram histogram; the refit input.
    pub term_counts: Option<TermCounts>,
    /// Filesystem mtime, seconds since the epoch.
    pub last_modified: f64,
}

/// One persisted indexed document.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StoredDocument {
    pub id: i64,
    pub path: String,
    pub filename: String,
    pub size_bytes: u64,
    pub fingerprint: String,
    pub vector: Option<SparseVector>,
    pub term_counts: Option<TermCounts>,
    pub last_modified: f64,
    pub indexed_at: DateTime<Utc>,
}

/// The slice of a stored document the matcher and the refit need.
#[derive(Debug, Clone, PartialEq)]
pub struct CorpusRecord {
    pub id: i64,
    pub fingerprint: String,
    pub vector: Option<SparseVector>,
    pub term_counts: Option<TermCounts>,
}

/// Scan match fields supplied by the scan pipeline.
#[derive(Debug, Clone, PartialEq)]
pub struct NewScanResult {
    pub scan_id: String,
    pub file_path: String,
    pub match_kind: MatchKind,
    pub score: f64,
    pub matched_file_id: i64,
}
