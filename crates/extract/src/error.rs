use thiserror::Error;

pub type Result<T> = std::result::Result<T, ExtractError>;

#[derive(Error, Debug)]
pub enum ExtractError {
    #[error("unsupported format: {0}")]
    UnsupportedFormat(String),

    #[error("corrupt document {path}: {detail}")]
    CorruptDocument { path: String, detail: String },

    #[error("read failure: {0}")]
    ReadFailure(#[from] std::io::Error),
}

impl ExtractError {
    #[must_use]
    pub fn corrupt(path: impl Into<String>, detail: impl ToString) -> Self {
        Self::CorruptDocument {
            path: path.into(),
            detail: detail.to_string(),
        }
    }
}
