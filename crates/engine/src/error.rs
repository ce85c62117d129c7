use thiserror::Error;

pub type Result<T> = std::result::Result<T, EngineError>;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("invalid path: {0}")]
    InvalidPath(String),

    #[error("path not found: {0}")]
    PathNotFound(String),

    #[error("path not readable: {0}")]
    PathNotReadable(String),

    #[error("unknown operation: {0}")]
    UnknownOperation(String),

    #[error("invalid ignore pattern: {0}")]
    InvalidPattern(String),

    #[error("configuration error: {0}")]
    Config(#[from] docsentry_protocol::ConfigError),

    #[error("storage error: {0}")]
    Storage(#[from] docsentry_storage::StorageError),

    #[error("configuration persistence failed: {0}")]
    Persist(#[from] std::io::Error),

    #[error("configuration file invalid: {0}")]
    ConfigFile(#[from] toml::de::Error),
}
