use crate::error::Result;
use crate::ignore::IgnorePatterns;
use docsentry_protocol::{
    SensitivityLevel, SimilarityConfig, SimilarityConfigPatch, StorageConfig, ThreadingConfig,
    DEFAULT_IGNORE_PATTERNS,
};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::sync::RwLock;

/// Everything the engine is configured by, as persisted to disk.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct EngineSettings {
    // Plain values first so the TOML rendering stays valid.
    pub ignore_patterns: Vec<String>,
    pub similarity: SimilarityConfig,
    pub threading: ThreadingConfig,
    pub storage: StorageConfig,
}

impl Default for EngineSettings {
    fn default() -> Self {
        Self {
            ignore_patterns: DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(ToString::to_string)
                .collect(),
            similarity: SimilarityConfig::default(),
            threading: ThreadingConfig::default(),
            storage: StorageConfig::default(),
        }
    }
}

impl EngineSettings {
    pub fn validate(&self) -> Result<()> {
        self.similarity.validate()?;
        self.threading.validate()?;
        self.storage.validate()?;
        IgnorePatterns::compile(&self.ignore_patterns)?;
        Ok(())
    }
}

/// Owned configuration store with TOML persistence.
///
/// Every mutation validates the candidate first and writes it to disk before
/// committing to memory, so a rejected or unpersistable update leaves the
/// active configuration untouched. Operations snapshot the settings they
/// need at start time; mutations only affect operations started afterwards.
pub struct ConfigStore {
    settings: RwLock<EngineSettings>,
    path: Option<PathBuf>,
}

impl ConfigStore {
    /// In-memory store (tests, embedded use); nothing is persisted.
    pub fn in_memory(settings: EngineSettings) -> Result<Self> {
        settings.validate()?;
        Ok(Self {
            settings: RwLock::new(settings),
            path: None,
        })
    }

    /// Start from explicit settings and persist them (and all later
    /// mutations) to `path`.
    pub fn create(path: impl AsRef<Path>, settings: EngineSettings) -> Result<Self> {
        settings.validate()?;
        let store = Self {
            settings: RwLock::new(settings.clone()),
            path: Some(path.as_ref().to_path_buf()),
        };
        store.commit(settings)?;
        Ok(store)
    }

    /// Load from a TOML file, falling back to defaults when it does not
    /// exist yet. Later mutations are persisted back to the same file.
    pub fn load(path: impl AsRef<Path>) -> Result<Self> {
        let path = path.as_ref().to_path_buf();
        let settings = if path.exists() {
            let raw = std::fs::read_to_string(&path)?;
            toml::from_str(&raw)?
        } else {
            EngineSettings::default()
        };
        settings.validate()?;
        Ok(Self {
            settings: RwLock::new(settings),
            path: Some(path),
        })
    }

    fn read(&self) -> EngineSettings {
        self.settings.read().expect("config store poisoned").clone()
    }

    /// Persist then commit. TOML serialization of a validated config cannot
    /// fail structurally, so errors here are I/O.
    fn commit(&self, next: EngineSettings) -> Result<()> {
        if let Some(path) = &self.path {
            let rendered = toml::to_string_pretty(&next)
                .map_err(|e| std::io::Error::new(std::io::ErrorKind::InvalidData, e))?;
            std::fs::write(path, rendered)?;
        }
        *self.settings.write().expect("config store poisoned") = next;
        Ok(())
    }

    #[must_use]
    pub fn settings(&self) -> EngineSettings {
        self.read()
    }

    #[must_use]
    pub fn similarity(&self) -> SimilarityConfig {
        self.read().similarity
    }

    #[must_use]
    pub fn threading(&self) -> ThreadingConfig {
        self.read().threading
    }

    #[must_use]
    pub fn storage(&self) -> StorageConfig {
        self.read().storage
    }

    #[must_use]
    pub fn ignore_patterns(&self) -> Vec<String> {
        self.read().ignore_patterns
    }

    pub fn update_similarity(&self, patch: &SimilarityConfigPatch) -> Result<SimilarityConfig> {
        let mut next = self.read();
        next.similarity = next.similarity.apply_patch(patch)?;
        let updated = next.similarity.clone();
        self.commit(next)?;
        Ok(updated)
    }

    pub fn apply_preset(&self, level: SensitivityLevel) -> Result<SimilarityConfig> {
        let mut next = self.read();
        next.similarity = SimilarityConfig::from_preset(level);
        next.similarity.validate()?;
        let updated = next.similarity.clone();
        self.commit(next)?;
        Ok(updated)
    }

    pub fn reset_similarity(&self) -> Result<SimilarityConfig> {
        let mut next = self.read();
        next.similarity = SimilarityConfig::default();
        let updated = next.similarity.clone();
        self.commit(next)?;
        Ok(updated)
    }

    pub fn update_threading(&self, threading: ThreadingConfig) -> Result<ThreadingConfig> {
        threading.validate()?;
        let mut next = self.read();
        next.threading = threading;
        self.commit(next)?;
        Ok(threading)
    }

    /// Record a storage config that the engine has already activated.
    pub fn set_storage(&self, storage: StorageConfig) -> Result<()> {
        storage.validate()?;
        let mut next = self.read();
        next.storage = storage;
        self.commit(next)
    }

    pub fn set_ignore_patterns(&self, patterns: Vec<String>) -> Result<Vec<String>> {
        IgnorePatterns::compile(&patterns)?;
        let mut next = self.read();
        next.ignore_patterns = patterns.clone();
        self.commit(next)?;
        Ok(patterns)
    }

    pub fn add_ignore_pattern(&self, pattern: &str) -> Result<Vec<String>> {
        let mut patterns = self.ignore_patterns();
        if !patterns.iter().any(|p| p == pattern) {
            patterns.push(pattern.to_string());
        }
        self.set_ignore_patterns(patterns)
    }

    /// Remove one pattern; `true` when it was present.
    pub fn remove_ignore_pattern(&self, pattern: &str) -> Result<(Vec<String>, bool)> {
        let mut patterns = self.ignore_patterns();
        let before = patterns.len();
        patterns.retain(|p| p != pattern);
        let removed = patterns.len() != before;
        let patterns = self.set_ignore_patterns(patterns)?;
        Ok((patterns, removed))
    }

    pub fn reset_ignore_patterns(&self) -> Result<Vec<String>> {
        self.set_ignore_patterns(
            DEFAULT_IGNORE_PATTERNS
                .iter()
                .map(ToString::to_string)
                .collect(),
        )
    }
}
