use thiserror::Error;

pub type Result<T> = std::result::Result<T, StorageError>;

#[derive(Error, Debug)]
pub enum StorageError {
    #[error("storage connection failed: {0}")]
    Connection(String),

    /// Checkout timed out or the pool is poisoned; surfaces as a fault for
    /// the owning operation rather than a silent retry.
    #[error("connection pool: {0}")]
    Pool(#[from] r2d2::Error),

    #[error("sqlite: {0}")]
    Sqlite(#[from] rusqlite::Error),

    #[error("redis: {0}")]
    Redis(#[from] redis::RedisError),

    #[error("blob encoding: {0}")]
    Blob(#[from] bincode::Error),

    #[error("record encoding: {0}")]
    Record(#[from] serde_json::Error),
}
