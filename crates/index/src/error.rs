//! Index error types.

use thiserror::Error;

/// Index operation errors.
#[derive(Debug, Error)]
pub enum IndexError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid name: {0}")]
    InvalidName(String),

    #[error("database error: {0}")]
    Database(#[from] sqlx::Error),

    #[error("tree error: {0}")]
    Tree(#[from] sled::Error),

    #[error("corrupt row: {0}")]
    Corrupt(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

/// Result type for index operations.
pub type IndexResult<T> = std::result::Result<T, IndexError>;
