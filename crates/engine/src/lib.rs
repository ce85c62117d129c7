//! # DocSentry Engine
//!
//! The operation lifecycle manager and public facade of DocSentry: index
//! jobs that fingerprint and vectorize a trusted corpus, scan jobs that
//! compare arbitrary directories against it, live progress with push and
//! pull delivery, and the owned configuration store.
//!
//! ## Pipeline
//!
//! ```text
//! Directory
//!     │
//!     ├──> Walker (ignore patterns applied)
//!     │      └─> File list
//!     │
//!     ├──> Worker pool (extract + vectorize, bounded fan-out)
//!     │      └─> Per-file outcomes
//!     │
//!     └──> Storage writes + progress fan-out (single writer per operation)
//! ```
//!
//! ## Example
//!
//! ```no_run
//! use docsentry_engine::{Engine, EngineSettings};
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let engine = Engine::new(EngineSettings::default(), None).await?;
//!
//!     let index_id = engine.start_index("/srv/trusted-corpus").await?;
//!     // ... wait for completion, then sweep a suspect share:
//!     let scan_id = engine.start_scan("/mnt/outbound").await?;
//!     let results = engine.scan_results(&scan_id).await?;
//!     println!("{} matches", results.len());
//!     Ok(())
//! }
//! ```

mod config;
mod engine;
mod error;
mod ignore;
mod ops;
mod progress;
mod walker;
mod worker;

pub use config::{ConfigStore, EngineSettings};
pub use engine::Engine;
pub use error::{EngineError, Result};
pub use ignore::IgnorePatterns;

// The types callers handle day to day, re-exported so the engine crate is
// usable on its own.
pub use docsentry_protocol::{
    EngineStats, MatchKind, OperationKind, OperationSnapshot, OperationStatus, PoolStatus,
    ScanResultView, SensitivityLevel, SimilarityConfig, SimilarityConfigPatch, StorageBackendKind,
    StorageConfig, StorageHealth, ThreadingConfig,
};
pub use docsentry_protocol::IndexedFileMeta;
