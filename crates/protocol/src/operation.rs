use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;

/// Filename patterns excluded from every walk until the operator changes
/// the set.
pub const DEFAULT_IGNORE_PATTERNS: &[&str] = &[".DS_Store", "Thumbs.db", "*.tmp"];

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationKind {
    Index,
    Scan,
}

impl OperationKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Index => "index",
            Self::Scan => "scan",
        }
    }
}

impl fmt::Display for OperationKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Lifecycle states shared by index and scan operations.
///
/// ```text
/// queued ──> counting ──> processing | scanning ──> completed
///                │               │
///                ├───> error <───┤
///                └──> stopped <──┘
/// ```
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum OperationStatus {
    Queued,
    Counting,
    Processing,
    Scanning,
    Completed,
    Stopped,
    Error,
}

impl OperationStatus {
    /// Terminal states never transition again; their snapshots are frozen.
    #[must_use]
    pub const fn is_terminal(self) -> bool {
        matches!(self, Self::Completed | Self::Stopped | Self::Error)
    }

    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Queued => "queued",
            Self::Counting => "counting",
            Self::Processing => "processing",
            Self::Scanning => "scanning",
            Self::Completed => "completed",
            Self::Stopped => "stopped",
            Self::Error => "error",
        }
    }
}

impl fmt::Display for OperationStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Breakdown of skipped files by cause.
///
/// "Ignored" (filename matched the ignore set) is kept apart from extraction
/// faults so operators can tell policy skips from broken documents.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct SkipCounts {
    pub ignored: u64,
    /// Already indexed and unmodified since (index operations only).
    pub unchanged: u64,
    pub extraction_failed: u64,
    pub read_failed: u64,
}

impl SkipCounts {
    #[must_use]
    pub const fn total(&self) -> u64 {
        self.ignored + self.unchanged + self.extraction_failed + self.read_failed
    }
}

/// Point-in-time view of one operation, served identically by the pull
/// (snapshot) and push (subscription) paths.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct OperationSnapshot {
    pub id: String,
    pub kind: OperationKind,
    pub directory: String,
    pub status: OperationStatus,
    pub total_files: u64,
    pub files_processed: u64,
    /// Index operations: documents written to storage.
    pub files_indexed: u64,
    pub files_skipped: u64,
    pub skip_counts: SkipCounts,
    /// Scan operations: matches recorded so far.
    pub matches_found: u64,
    pub current_file: String,
    pub started_at: DateTime<Utc>,
    pub completed_at: Option<DateTime<Utc>>,
    pub error_message: Option<String>,
}

impl OperationSnapshot {
    #[must_use]
    pub fn new(id: String, kind: OperationKind, directory: String) -> Self {
        Self {
            id,
            kind,
            directory,
            status: OperationStatus::Queued,
            total_files: 0,
            files_processed: 0,
            files_indexed: 0,
            files_skipped: 0,
            skip_counts: SkipCounts::default(),
            matches_found: 0,
            current_file: String::new(),
            started_at: Utc::now(),
            completed_at: None,
            error_message: None,
        }
    }

    /// Percentage of files processed, `0.0` before counting finishes.
    #[must_use]
    #[allow(clippy::cast_precision_loss)]
    pub fn progress_percent(&self) -> f32 {
        if self.total_files == 0 {
            return 0.0;
        }
        (self.files_processed as f32 / self.total_files as f32) * 100.0
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use pretty_assertions::assert_eq;

    #[test]
    fn terminal_states() {
        assert!(OperationStatus::Completed.is_terminal());
        assert!(OperationStatus::Stopped.is_terminal());
        assert!(OperationStatus::Error.is_terminal());
        assert!(!OperationStatus::Queued.is_terminal());
        assert!(!OperationStatus::Counting.is_terminal());
        assert!(!OperationStatus::Processing.is_terminal());
        assert!(!OperationStatus::Scanning.is_terminal());
    }

    #[test]
    fn progress_percent_handles_empty_directory() {
        let snap = OperationSnapshot::new("op".into(), OperationKind::Index, "/tmp".into());
        assert_eq!(snap.progress_percent(), 0.0);
    }

    #[test]
    fn progress_percent_is_processed_over_total() {
        let mut snap = OperationSnapshot::new("op".into(), OperationKind::Scan, "/tmp".into());
        snap.total_files = 200;
        snap.files_processed = 50;
        assert_eq!(snap.progress_percent(), 25.0);
    }

    #[test]
    fn skip_counts_total_sums_all_causes() {
        let counts = SkipCounts {
            ignored: 1,
            unchanged: 2,
            extraction_failed: 3,
            read_failed: 4,
        };
        assert_eq!(counts.total(), 10);
    }
}
