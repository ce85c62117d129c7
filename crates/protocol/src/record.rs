use crate::config::StorageBackendKind;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// How a scanned file matched an indexed document.
///
/// `Exact` is reported either for identical raw bytes (fingerprint equality)
/// or for a cosine score at or above the exact-match threshold.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum MatchKind {
    Exact,
    HighConfidence,
    Similarity,
}

impl MatchKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Exact => "exact",
            Self::HighConfidence => "high_confidence",
            Self::Similarity => "similarity",
        }
    }
}

impl fmt::Display for MatchKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for MatchKind {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "exact" => Ok(Self::Exact),
            "high_confidence" => Ok(Self::HighConfidence),
            "similarity" => Ok(Self::Similarity),
            other => Err(format!("unknown match kind: {other}")),
        }
    }
}

/// Listing view of one indexed document (blobs excluded).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct IndexedFileMeta {
    pub id: i64,
    pub path: String,
    pub filename: String,
    pub size_bytes: u64,
    /// Hex SHA-256 of the file's raw bytes.
    pub fingerprint: String,
    /// Whether a term vector is stored for this document.
    pub has_vector: bool,
    pub indexed_at: DateTime<Utc>,
}

/// One match found during a scan, joined with the matched document's
/// metadata for display.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ScanResultView {
    pub id: i64,
    pub scan_id: String,
    /// Path of the scanned file that matched.
    pub file_path: String,
    pub match_kind: MatchKind,
    /// Score in `[0, 1]`; always `1.0` for fingerprint matches.
    pub score: f64,
    pub matched_file_id: i64,
    pub matched_file_path: Option<String>,
    pub matched_file_name: Option<String>,
    pub created_at: DateTime<Utc>,
}

/// Storage backend reachability probe.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageHealth {
    pub backend: StorageBackendKind,
    pub reachable: bool,
    /// Round-trip latency of the probe query, when reachable.
    pub latency_ms: Option<f64>,
    pub detail: Option<String>,
}

/// Connection pool occupancy.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct PoolStatus {
    pub active: u32,
    pub idle: u32,
    pub max: u32,
}

/// Aggregate counters for the dashboard surface.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineStats {
    pub indexed_files: u64,
    /// Completed index operations.
    pub index_operations: u64,
    /// Sum of `files_indexed` across completed index operations.
    pub total_files_indexed: u64,
    pub scans_performed: u64,
    pub matches_recorded: u64,
    pub active_backend: StorageBackendKind,
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn match_kind_round_trips_through_str() {
        for kind in [MatchKind::Exact, MatchKind::HighConfidence, MatchKind::Similarity] {
            assert_eq!(kind.as_str().parse::<MatchKind>(), Ok(kind));
        }
    }

    #[test]
    fn match_kind_serializes_snake_case() {
        let json = serde_json::to_string(&MatchKind::HighConfidence).unwrap();
        assert_eq!(json, "\"high_confidence\"");
    }
}
