use crate::config::{ConfigStore, EngineSettings};
use crate::error::{EngineError, Result};
use crate::ignore::IgnorePatterns;
use crate::ops::{run_index, run_scan, OperationContext};
use crate::progress::ProgressStore;
use docsentry_protocol::{
    EngineStats, IndexedFileMeta, OperationKind, OperationSnapshot, OperationStatus, PoolStatus,
    ScanResultView, SensitivityLevel, SimilarityConfig, SimilarityConfigPatch, StorageConfig,
    StorageHealth, ThreadingConfig,
};
use docsentry_similarity::{TermCounts, Vocabulary};
use docsentry_storage::{connect, StorageBackend, StorageError};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::sync::{Arc, RwLock};
use tokio::sync::broadcast;
use uuid::Uuid;

pub(crate) struct EngineInner {
    pub(crate) config: ConfigStore,
    storage: RwLock<Arc<dyn StorageBackend>>,
    vocabulary: RwLock<Arc<Vocabulary>>,
    pub(crate) progress: ProgressStore,
}

impl EngineInner {
    pub(crate) fn storage(&self) -> Arc<dyn StorageBackend> {
        Arc::clone(&self.storage.read().expect("storage handle poisoned"))
    }

    fn swap_storage(&self, backend: Arc<dyn StorageBackend>) {
        *self.storage.write().expect("storage handle poisoned") = backend;
    }

    pub(crate) fn vocabulary(&self) -> Arc<Vocabulary> {
        Arc::clone(&self.vocabulary.read().expect("vocabulary handle poisoned"))
    }

    pub(crate) fn swap_vocabulary(&self, vocabulary: Arc<Vocabulary>) {
        *self.vocabulary.write().expect("vocabulary handle poisoned") = vocabulary;
    }
}

/// The DocSentry core facade: index and scan lifecycle, configuration
/// surface, storage selection, and progress delivery.
///
/// Cheap to clone; all clones share one engine.
#[derive(Clone)]
pub struct Engine {
    inner: Arc<EngineInner>,
}

impl Engine {
    /// Build an engine from explicit settings.
    ///
    /// Pass a `config_path` to persist configuration mutations as TOML;
    /// `None` keeps them in memory. Storage connectivity is verified and,
    /// when the index is non-empty, the vocabulary is rebuilt from stored
    /// term counts so scans work across process restarts.
    pub async fn new(settings: EngineSettings, config_path: Option<PathBuf>) -> Result<Self> {
        let config = match config_path {
            Some(path) => ConfigStore::create(path, settings)?,
            None => ConfigStore::in_memory(settings)?,
        };
        Self::with_config_store(config).await
    }

    /// Build an engine from a TOML configuration file (created with
    /// defaults when missing).
    pub async fn from_config_file(path: impl AsRef<Path>) -> Result<Self> {
        Self::with_config_store(ConfigStore::load(path)?).await
    }

    async fn with_config_store(config: ConfigStore) -> Result<Self> {
        let storage_config = config.storage();
        let storage =
            tokio::task::spawn_blocking(move || connect(&storage_config))
                .await
                .map_err(|e| StorageError::Connection(format!("storage task failed: {e}")))??;

        let engine = Self {
            inner: Arc::new(EngineInner {
                config,
                storage: RwLock::new(storage),
                vocabulary: RwLock::new(Arc::new(Vocabulary::empty())),
                progress: ProgressStore::new(),
            }),
        };
        engine.rebuild_vocabulary().await?;
        Ok(engine)
    }

    /// Fit the vocabulary from stored term counts (startup, backend switch).
    async fn rebuild_vocabulary(&self) -> Result<()> {
        let storage = self.inner.storage();
        let config = self.inner.config.similarity();
        let version = self.inner.vocabulary().version() + 1;

        let vocabulary = tokio::task::spawn_blocking(move || -> std::result::Result<Option<Vocabulary>, StorageError> {
            let corpus = storage.fetch_corpus()?;
            if corpus.is_empty() {
                return Ok(None);
            }
            let documents: Vec<&TermCounts> =
                corpus.iter().filter_map(|r| r.term_counts.as_ref()).collect();
            let vocabulary = Vocabulary::fit(&documents, &config, version);
            let updates = corpus
                .iter()
                .filter_map(|r| {
                    r.term_counts
                        .as_ref()
                        .map(|tc| (r.id, vocabulary.transform(tc)))
                })
                .collect::<Vec<_>>();
            storage.rewrite_vectors(&updates)?;
            Ok(Some(vocabulary))
        })
        .await
        .map_err(|e| StorageError::Connection(format!("vocabulary task failed: {e}")))??;

        if let Some(vocabulary) = vocabulary {
            log::info!(
                "vocabulary rebuilt: v{}, {} terms",
                vocabulary.version(),
                vocabulary.len()
            );
            self.inner.swap_vocabulary(Arc::new(vocabulary));
        }
        Ok(())
    }

    // -- operations ---------------------------------------------------------

    async fn start_operation(&self, kind: OperationKind, directory: &str) -> Result<String> {
        let directory = validate_directory(directory)?;
        let settings = self.inner.config.settings();
        let ignore = Arc::new(IgnorePatterns::compile(&settings.ignore_patterns)?);

        let id = Uuid::new_v4().to_string();
        let snapshot =
            self.inner
                .progress
                .create(&id, kind, directory.display().to_string());

        let storage = self.inner.storage();
        let queued = snapshot.clone();
        tokio::task::spawn_blocking(move || storage.put_operation(&queued))
            .await
            .map_err(|e| StorageError::Connection(format!("storage task failed: {e}")))??;

        let ctx = OperationContext {
            inner: Arc::clone(&self.inner),
            id: id.clone(),
            directory,
            similarity: settings.similarity,
            threading: settings.threading,
            ignore,
            storage: self.inner.storage(),
        };
        match kind {
            OperationKind::Index => {
                tokio::spawn(run_index(ctx));
            }
            OperationKind::Scan => {
                tokio::spawn(run_scan(ctx));
            }
        }
        log::info!("{kind} operation {id} started");
        Ok(id)
    }

    /// Start indexing a source-of-truth directory. Returns the operation id.
    pub async fn start_index(&self, directory: impl AsRef<str>) -> Result<String> {
        self.start_operation(OperationKind::Index, directory.as_ref())
            .await
    }

    /// Start scanning a target directory against the index.
    pub async fn start_scan(&self, directory: impl AsRef<str>) -> Result<String> {
        self.start_operation(OperationKind::Scan, directory.as_ref())
            .await
    }

    async fn operation_progress(
        &self,
        kind: OperationKind,
        id: &str,
    ) -> Result<Option<OperationSnapshot>> {
        if let Some(snapshot) = self.inner.progress.snapshot(id) {
            return Ok((snapshot.kind == kind).then_some(snapshot));
        }
        // Fall back to persisted history (operations from earlier runs).
        let storage = self.inner.storage();
        let id = id.to_string();
        let stored = tokio::task::spawn_blocking(move || storage.get_operation(&id))
            .await
            .map_err(|e| StorageError::Connection(format!("storage task failed: {e}")))??;
        Ok(stored.filter(|s| s.kind == kind))
    }

    pub async fn index_progress(&self, id: &str) -> Result<Option<OperationSnapshot>> {
        self.operation_progress(OperationKind::Index, id).await
    }

    pub async fn scan_progress(&self, id: &str) -> Result<Option<OperationSnapshot>> {
        self.operation_progress(OperationKind::Scan, id).await
    }

    fn stop_operation(&self, kind: OperationKind, id: &str) -> Result<()> {
        match self.inner.progress.snapshot(id) {
            Some(snapshot) if snapshot.kind == kind => {
                self.inner.progress.request_stop(id);
                Ok(())
            }
            _ => Err(EngineError::UnknownOperation(id.to_string())),
        }
    }

    /// Request cancellation; the in-flight batch finishes, queued files are
    /// discarded.
    pub fn stop_index(&self, id: &str) -> Result<()> {
        self.stop_operation(OperationKind::Index, id)
    }

    pub fn stop_scan(&self, id: &str) -> Result<()> {
        self.stop_operation(OperationKind::Scan, id)
    }

    async fn list_operations(&self, kind: OperationKind) -> Result<Vec<OperationSnapshot>> {
        let storage = self.inner.storage();
        let stored = tokio::task::spawn_blocking(move || storage.list_operations(Some(kind)))
            .await
            .map_err(|e| StorageError::Connection(format!("storage task failed: {e}")))??;

        // Live snapshots override their persisted (possibly older) rows.
        let live: HashMap<String, OperationSnapshot> = self
            .inner
            .progress
            .list(Some(kind))
            .into_iter()
            .map(|s| (s.id.clone(), s))
            .collect();
        let mut merged: Vec<OperationSnapshot> = stored
            .into_iter()
            .map(|s| live.get(&s.id).cloned().unwrap_or(s))
            .collect();
        merged.sort_by(|a, b| b.started_at.cmp(&a.started_at));
        Ok(merged)
    }

    pub async fn list_index_operations(&self) -> Result<Vec<OperationSnapshot>> {
        self.list_operations(OperationKind::Index).await
    }

    pub async fn list_scans(&self) -> Result<Vec<OperationSnapshot>> {
        self.list_operations(OperationKind::Scan).await
    }

    /// Matches recorded by a scan, best scores first.
    pub async fn scan_results(&self, scan_id: &str) -> Result<Vec<ScanResultView>> {
        let storage = self.inner.storage();
        let scan_id = scan_id.to_string();
        let results = tokio::task::spawn_blocking(move || storage.scan_results(&scan_id))
            .await
            .map_err(|e| StorageError::Connection(format!("storage task failed: {e}")))??;
        Ok(results)
    }

    /// Subscribe to push progress for one operation. The payload mirrors
    /// the pull snapshot exactly.
    #[must_use]
    pub fn subscribe(&self, id: &str) -> Option<broadcast::Receiver<OperationSnapshot>> {
        self.inner.progress.subscribe(id)
    }

    // -- indexed files ------------------------------------------------------

    pub async fn list_indexed_files(&self) -> Result<Vec<IndexedFileMeta>> {
        let storage = self.inner.storage();
        let files = tokio::task::spawn_blocking(move || storage.list_documents())
            .await
            .map_err(|e| StorageError::Connection(format!("storage task failed: {e}")))??;
        Ok(files)
    }

    /// Delete specific indexed files, or purge the whole index with `None`.
    pub async fn delete_indexed_files(&self, ids: Option<Vec<i64>>) -> Result<u64> {
        let storage = self.inner.storage();
        let deleted =
            tokio::task::spawn_blocking(move || storage.delete_documents(ids.as_deref()))
                .await
                .map_err(|e| StorageError::Connection(format!("storage task failed: {e}")))??;
        log::info!("deleted {deleted} indexed files");
        Ok(deleted)
    }

    pub async fn stats(&self) -> Result<EngineStats> {
        let storage = self.inner.storage();
        let stats = tokio::task::spawn_blocking(move || -> std::result::Result<EngineStats, StorageError> {
            let index_ops = storage.list_operations(Some(OperationKind::Index))?;
            let completed: Vec<_> = index_ops
                .iter()
                .filter(|op| op.status == OperationStatus::Completed)
                .collect();
            Ok(EngineStats {
                indexed_files: storage.count_documents()?,
                index_operations: completed.len() as u64,
                total_files_indexed: completed.iter().map(|op| op.files_indexed).sum(),
                scans_performed: storage.count_distinct_scans()?,
                matches_recorded: storage.count_scan_results()?,
                active_backend: storage.kind(),
            })
        })
        .await
        .map_err(|e| StorageError::Connection(format!("storage task failed: {e}")))??;
        Ok(stats)
    }

    // -- configuration ------------------------------------------------------

    #[must_use]
    pub fn similarity_config(&self) -> SimilarityConfig {
        self.inner.config.similarity()
    }

    pub fn update_similarity_config(
        &self,
        patch: &SimilarityConfigPatch,
    ) -> Result<SimilarityConfig> {
        self.inner.config.update_similarity(patch)
    }

    pub fn apply_preset(&self, level: SensitivityLevel) -> Result<SimilarityConfig> {
        self.inner.config.apply_preset(level)
    }

    pub fn reset_similarity_config(&self) -> Result<SimilarityConfig> {
        self.inner.config.reset_similarity()
    }

    #[must_use]
    pub fn threading_config(&self) -> ThreadingConfig {
        self.inner.config.threading()
    }

    pub fn update_threading_config(&self, config: ThreadingConfig) -> Result<ThreadingConfig> {
        self.inner.config.update_threading(config)
    }

    #[must_use]
    pub fn storage_config(&self) -> StorageConfig {
        self.inner.config.storage()
    }

    /// Switch the active storage backend.
    ///
    /// The candidate is built and health-checked first; on any failure the
    /// previous backend stays active and the error is returned (fail
    /// closed). On success the old pool is released once in-flight
    /// operations holding it finish.
    pub async fn update_storage_config(&self, config: StorageConfig) -> Result<StorageConfig> {
        config.validate()?;

        let candidate_config = config.clone();
        let backend = tokio::task::spawn_blocking(move || connect(&candidate_config))
            .await
            .map_err(|e| StorageError::Connection(format!("storage task failed: {e}")))??;

        self.inner.config.set_storage(config.clone())?;
        self.inner.swap_storage(backend);
        self.rebuild_vocabulary().await?;
        log::info!("storage backend switched to {}", config.backend);
        Ok(config)
    }

    /// Probe a candidate storage configuration without activating it.
    pub async fn test_storage(&self, config: StorageConfig) -> StorageHealth {
        let backend_kind = config.backend;
        let probe = tokio::task::spawn_blocking(move || connect(&config).map(|b| b.health())).await;
        match probe {
            Ok(Ok(health)) => health,
            Ok(Err(e)) => StorageHealth {
                backend: backend_kind,
                reachable: false,
                latency_ms: None,
                detail: Some(e.to_string()),
            },
            Err(e) => StorageHealth {
                backend: backend_kind,
                reachable: false,
                latency_ms: None,
                detail: Some(format!("storage task failed: {e}")),
            },
        }
    }

    pub async fn storage_health(&self) -> StorageHealth {
        let storage = self.inner.storage();
        let backend = storage.kind();
        tokio::task::spawn_blocking(move || storage.health())
            .await
            .unwrap_or_else(|e| StorageHealth {
                backend,
                reachable: false,
                latency_ms: None,
                detail: Some(format!("storage task failed: {e}")),
            })
    }

    #[must_use]
    pub fn pool_status(&self) -> PoolStatus {
        self.inner.storage().pool_status()
    }

    // -- ignore patterns ----------------------------------------------------

    #[must_use]
    pub fn ignore_patterns(&self) -> Vec<String> {
        self.inner.config.ignore_patterns()
    }

    pub fn set_ignore_patterns(&self, patterns: Vec<String>) -> Result<Vec<String>> {
        self.inner.config.set_ignore_patterns(patterns)
    }

    pub fn add_ignore_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        self.inner.config.add_ignore_pattern(pattern)
    }

    /// Returns the remaining patterns and whether the pattern was present.
    pub fn remove_ignore_pattern(&self, pattern: &str) -> Result<(Vec<String>, bool)> {
        self.inner.config.remove_ignore_pattern(pattern)
    }

    pub fn reset_ignore_patterns(&self) -> Result<Vec<String>> {
        self.inner.config.reset_ignore_patterns()
    }
}

/// Reject paths that cannot name a scannable directory before any
/// operation record is created.
fn validate_directory(path: &str) -> Result<PathBuf> {
    if path.is_empty() {
        return Err(EngineError::InvalidPath("path is empty".to_string()));
    }
    if path.contains('\0') {
        return Err(EngineError::InvalidPath(
            "path contains a NUL byte".to_string(),
        ));
    }
    let canonical = std::fs::canonicalize(path)
        .map_err(|_| EngineError::PathNotFound(path.to_string()))?;
    if !canonical.is_dir() {
        return Err(EngineError::InvalidPath(format!(
            "not a directory: {path}"
        )));
    }
    std::fs::read_dir(&canonical)
        .map_err(|e| EngineError::PathNotReadable(format!("{path}: {e}")))?;
    Ok(canonical)
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn empty_and_nul_paths_are_invalid() {
        assert!(matches!(
            validate_directory(""),
            Err(EngineError::InvalidPath(_))
        ));
        assert!(matches!(
            validate_directory("/tmp/\0evil"),
            Err(EngineError::InvalidPath(_))
        ));
    }

    #[test]
    fn missing_path_is_not_found() {
        assert!(matches!(
            validate_directory("/definitely/not/here"),
            Err(EngineError::PathNotFound(_))
        ));
    }

    #[test]
    fn file_is_not_a_directory() {
        let dir = tempfile::tempdir().unwrap();
        let file = dir.path().join("f.txt");
        std::fs::write(&file, "x").unwrap();
        assert!(matches!(
            validate_directory(file.to_str().unwrap()),
            Err(EngineError::InvalidPath(_))
        ));
    }

    #[test]
    fn readable_directory_canonicalizes() {
        let dir = tempfile::tempdir().unwrap();
        let out = validate_directory(dir.path().to_str().unwrap()).unwrap();
        assert!(out.is_absolute());
    }
}
