use serde::{Deserialize, Serialize};
use std::fmt;
use thiserror::Error;

#[derive(Error, Debug, Clone, PartialEq)]
pub enum ConfigError {
    #[error(
        "threshold ordering violated: exact ({exact}) >= high confidence ({high}) >= similarity ({similarity}) required"
    )]
    ThresholdOrder {
        exact: f64,
        high: f64,
        similarity: f64,
    },

    #[error("{field} must be within [0, 1], got {value}")]
    ThresholdRange { field: &'static str, value: f64 },

    #[error("n-gram range invalid: min {min}, max {max}")]
    NgramRange { min: usize, max: usize },

    #[error("{field} must be at least {min}, got {value}")]
    TooSmall {
        field: &'static str,
        min: usize,
        value: usize,
    },

    #[error("{field} must not be empty")]
    Empty { field: &'static str },

    #[error("pool min_idle ({min_idle}) exceeds max_connections ({max})")]
    PoolShape { min_idle: u32, max: u32 },
}

/// Named threshold bundles offered instead of manual tuning.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SensitivityLevel {
    /// High thresholds: fewer matches, fewer false positives.
    Low,
    Medium,
    /// Low thresholds: catches more derivatives, more false positives.
    High,
    Custom,
}

impl SensitivityLevel {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Low => "low",
            Self::Medium => "medium",
            Self::High => "high",
            Self::Custom => "custom",
        }
    }
}

impl fmt::Display for SensitivityLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl std::str::FromStr for SensitivityLevel {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s {
            "low" => Ok(Self::Low),
            "medium" => Ok(Self::Medium),
            "high" => Ok(Self::High),
            "custom" => Ok(Self::Custom),
            other => Err(format!("unknown sensitivity level: {other}")),
        }
    }
}

/// Similarity matching and vectorization parameters.
///
/// Invariant, enforced by [`SimilarityConfig::validate`]:
/// `exact_match_threshold >= high_confidence_threshold >= similarity_threshold`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfig {
    pub sensitivity_level: SensitivityLevel,

    /// Minimum cosine score to report any match.
    pub similarity_threshold: f64,
    /// Score above which a match is reported as high confidence.
    pub high_confidence_threshold: f64,
    /// Score above which a vector match is reported as exact.
    pub exact_match_threshold: f64,

    /// Word n-gram range used by the vectorizer.
    pub ngram_min: usize,
    pub ngram_max: usize,
    /// Vocabulary cap: only this many terms become vector dimensions.
    pub n_features: usize,

    /// Files whose extracted text is shorter than this are fingerprinted
    /// but never vectorized.
    pub min_content_length: usize,
    /// Similarity-tier matches require at least two independent indexed
    /// documents above the threshold.
    pub require_multiple_matches: bool,
}

impl Default for SimilarityConfig {
    fn default() -> Self {
        Self {
            sensitivity_level: SensitivityLevel::Medium,
            similarity_threshold: 0.65,
            high_confidence_threshold: 0.85,
            exact_match_threshold: 0.98,
            ngram_min: 1,
            ngram_max: 3,
            n_features: 8192,
            min_content_length: 50,
            require_multiple_matches: true,
        }
    }
}

impl SimilarityConfig {
    /// Build the configuration a named preset stands for.
    ///
    /// `Custom` (and `Medium`) return the defaults with the level recorded.
    #[must_use]
    pub fn from_preset(level: SensitivityLevel) -> Self {
        match level {
            SensitivityLevel::Low => Self {
                sensitivity_level: level,
                similarity_threshold: 0.80,
                high_confidence_threshold: 0.92,
                ngram_min: 2,
                ngram_max: 4,
                require_multiple_matches: true,
                ..Self::default()
            },
            SensitivityLevel::High => Self {
                sensitivity_level: level,
                similarity_threshold: 0.50,
                high_confidence_threshold: 0.75,
                ngram_min: 1,
                ngram_max: 2,
                require_multiple_matches: false,
                ..Self::default()
            },
            SensitivityLevel::Medium | SensitivityLevel::Custom => Self {
                sensitivity_level: level,
                ..Self::default()
            },
        }
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        for (field, value) in [
            ("similarity_threshold", self.similarity_threshold),
            ("high_confidence_threshold", self.high_confidence_threshold),
            ("exact_match_threshold", self.exact_match_threshold),
        ] {
            if !(0.0..=1.0).contains(&value) {
                return Err(ConfigError::ThresholdRange { field, value });
            }
        }
        if self.exact_match_threshold < self.high_confidence_threshold
            || self.high_confidence_threshold < self.similarity_threshold
        {
            return Err(ConfigError::ThresholdOrder {
                exact: self.exact_match_threshold,
                high: self.high_confidence_threshold,
                similarity: self.similarity_threshold,
            });
        }
        if self.ngram_min == 0 || self.ngram_min > self.ngram_max {
            return Err(ConfigError::NgramRange {
                min: self.ngram_min,
                max: self.ngram_max,
            });
        }
        if self.n_features == 0 {
            return Err(ConfigError::TooSmall {
                field: "n_features",
                min: 1,
                value: self.n_features,
            });
        }
        Ok(())
    }

    /// Apply a partial update, returning the validated successor config.
    ///
    /// Selecting a non-custom preset replaces the whole config with that
    /// preset before field overrides apply; manually changing the similarity
    /// or high-confidence threshold flips the level to `Custom`.
    pub fn apply_patch(&self, patch: &SimilarityConfigPatch) -> Result<Self, ConfigError> {
        let mut next = match patch.sensitivity_level {
            Some(level) if level != SensitivityLevel::Custom => Self::from_preset(level),
            Some(level) => {
                let mut cfg = self.clone();
                cfg.sensitivity_level = level;
                cfg
            }
            None => self.clone(),
        };

        if let Some(v) = patch.similarity_threshold {
            next.similarity_threshold = v;
            next.sensitivity_level = SensitivityLevel::Custom;
        }
        if let Some(v) = patch.high_confidence_threshold {
            next.high_confidence_threshold = v;
            next.sensitivity_level = SensitivityLevel::Custom;
        }
        if let Some(v) = patch.exact_match_threshold {
            next.exact_match_threshold = v;
        }
        if let Some(v) = patch.ngram_min {
            next.ngram_min = v;
        }
        if let Some(v) = patch.ngram_max {
            next.ngram_max = v;
        }
        if let Some(v) = patch.n_features {
            next.n_features = v;
        }
        if let Some(v) = patch.min_content_length {
            next.min_content_length = v;
        }
        if let Some(v) = patch.require_multiple_matches {
            next.require_multiple_matches = v;
        }

        next.validate()?;
        Ok(next)
    }
}

/// Partial similarity-config update; `None` fields keep their current value.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SimilarityConfigPatch {
    pub sensitivity_level: Option<SensitivityLevel>,
    pub similarity_threshold: Option<f64>,
    pub high_confidence_threshold: Option<f64>,
    pub exact_match_threshold: Option<f64>,
    pub ngram_min: Option<usize>,
    pub ngram_max: Option<usize>,
    pub n_features: Option<usize>,
    pub min_content_length: Option<usize>,
    pub require_multiple_matches: Option<bool>,
}

/// Worker pool parameters for index and scan operations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct ThreadingConfig {
    /// Off means strictly sequential processing.
    pub enabled: bool,
    pub max_workers: usize,
    /// Files per progress-reporting unit.
    pub batch_size: usize,
}

impl Default for ThreadingConfig {
    fn default() -> Self {
        Self {
            enabled: false,
            max_workers: 4,
            batch_size: 50,
        }
    }
}

impl ThreadingConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.max_workers == 0 {
            return Err(ConfigError::TooSmall {
                field: "max_workers",
                min: 1,
                value: self.max_workers,
            });
        }
        if self.batch_size == 0 {
            return Err(ConfigError::TooSmall {
                field: "batch_size",
                min: 1,
                value: self.batch_size,
            });
        }
        Ok(())
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StorageBackendKind {
    Sqlite,
    Redis,
}

impl StorageBackendKind {
    #[must_use]
    pub const fn as_str(self) -> &'static str {
        match self {
            Self::Sqlite => "sqlite",
            Self::Redis => "redis",
        }
    }
}

impl fmt::Display for StorageBackendKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct SqliteConfig {
    /// Database file path; created on first use.
    pub path: String,
}

impl Default for SqliteConfig {
    fn default() -> Self {
        Self {
            path: "docsentry.db".to_string(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct RedisConfig {
    pub host: String,
    pub port: u16,
    pub db: i64,
    pub password: Option<String>,
}

impl Default for RedisConfig {
    fn default() -> Self {
        Self {
            host: "localhost".to_string(),
            port: 6379,
            db: 0,
            password: None,
        }
    }
}

impl RedisConfig {
    /// Connection URL in the form `redis://[:password@]host:port/db`.
    #[must_use]
    pub fn url(&self) -> String {
        match &self.password {
            Some(password) => format!(
                "redis://:{}@{}:{}/{}",
                password, self.host, self.port, self.db
            ),
            None => format!("redis://{}:{}/{}", self.host, self.port, self.db),
        }
    }
}

/// Connection pool shape, shared by both backends.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct PoolConfig {
    pub max_connections: u32,
    pub min_idle: u32,
    /// Seconds to wait for a connection checkout before surfacing a
    /// storage fault.
    pub connection_timeout_secs: u64,
    /// Connections older than this are recycled.
    pub max_lifetime_secs: u64,
    /// Probe liveness before handing a connection out.
    pub test_on_checkout: bool,
}

impl Default for PoolConfig {
    fn default() -> Self {
        Self {
            max_connections: 10,
            min_idle: 1,
            connection_timeout_secs: 10,
            max_lifetime_secs: 1800,
            test_on_checkout: true,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    pub backend: StorageBackendKind,
    pub sqlite: SqliteConfig,
    pub redis: RedisConfig,
    pub pool: PoolConfig,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            backend: StorageBackendKind::Sqlite,
            sqlite: SqliteConfig::default(),
            redis: RedisConfig::default(),
            pool: PoolConfig::default(),
        }
    }
}

impl StorageConfig {
    pub fn validate(&self) -> Result<(), ConfigError> {
        match self.backend {
            StorageBackendKind::Sqlite => {
                if self.sqlite.path.is_empty() {
                    return Err(ConfigError::Empty {
                        field: "sqlite.path",
                    });
                }
            }
            StorageBackendKind::Redis => {
                if self.redis.host.is_empty() {
                    return Err(ConfigError::Empty { field: "redis.host" });
                }
            }
        }
        if self.pool.max_connections == 0 {
            return Err(ConfigError::TooSmall {
                field: "pool.max_connections",
                min: 1,
                value: 0,
            });
        }
        if self.pool.min_idle > self.pool.max_connections {
            return Err(ConfigError::PoolShape {
                min_idle: self.pool.min_idle,
                max: self.pool.max_connections,
            });
        }
        Ok(())
    }
}
