//! Content store error types.

use darkroom_index::IndexError;
use darkroom_store::StoreError;
use thiserror::Error;

/// Content store operation errors.
#[derive(Debug, Error)]
pub enum ContentError {
    #[error("content not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("store error: {0}")]
    Store(StoreError),

    #[error("index error: {0}")]
    Index(IndexError),

    #[error("metadata encoding error: {0}")]
    Meta(#[from] serde_json::Error),
}

impl From<StoreError> for ContentError {
    fn from(e: StoreError) -> Self {
        match e {
            StoreError::NotFound(what) => ContentError::NotFound(what),
            other => ContentError::Store(other),
        }
    }
}

impl From<IndexError> for ContentError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::NotFound(what) => ContentError::NotFound(what),
            other => ContentError::Index(other),
        }
    }
}

/// Result type for content store operations.
pub type ContentResult<T> = std::result::Result<T, ContentError>;
