//! # DocSentry Protocol
//!
//! Shared data model for the DocSentry duplicate-detection engine: match
//! classifications, operation lifecycle snapshots, and the similarity /
//! threading / storage configuration types with their validation rules and
//! sensitivity presets.
//!
//! This crate is a leaf: every other DocSentry crate depends on it, so it
//! carries only plain data and the invariants those types enforce.

mod config;
mod operation;
mod record;

pub use config::{
    ConfigError, PoolConfig, RedisConfig, SensitivityLevel, SimilarityConfig,
    SimilarityConfigPatch, SqliteConfig, StorageBackendKind, StorageConfig, ThreadingConfig,
};
pub use operation::{
    OperationKind, OperationSnapshot, OperationStatus, SkipCounts, DEFAULT_IGNORE_PATTERNS,
};
pub use record::{EngineStats, IndexedFileMeta, MatchKind, PoolStatus, ScanResultView, StorageHealth};
