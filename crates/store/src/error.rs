//! Binary store error types.

use darkroom_index::IndexError;
use thiserror::Error;

/// Binary store operation errors.
#[derive(Debug, Error)]
pub enum StoreError {
    #[error("binary not found: {0}")]
    NotFound(String),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    #[error("index error: {0}")]
    Index(IndexError),

    #[error("invalid digest: {0}")]
    InvalidDigest(String),
}

impl From<IndexError> for StoreError {
    fn from(e: IndexError) -> Self {
        // The index is authoritative: its NotFound is the store's NotFound.
        match e {
            IndexError::NotFound(what) => StoreError::NotFound(what),
            other => StoreError::Index(other),
        }
    }
}

impl From<darkroom_core::Error> for StoreError {
    fn from(e: darkroom_core::Error) -> Self {
        StoreError::InvalidDigest(e.to_string())
    }
}

/// Result type for binary store operations.
pub type StoreResult<T> = std::result::Result<T, StoreError>;
