//! Cache error types.

use darkroom_content::ContentError;
use darkroom_index::IndexError;
use thiserror::Error;

/// Cache operation errors.
#[derive(Debug, Error)]
pub enum CacheError {
    #[error("not found: {0}")]
    NotFound(String),

    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    #[error("serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("content error: {0}")]
    Content(ContentError),

    #[error("index error: {0}")]
    Index(IndexError),

    #[error("{failed} of {total} invalidations failed")]
    Partial { failed: usize, total: usize },
}

impl From<ContentError> for CacheError {
    fn from(e: ContentError) -> Self {
        match e {
            ContentError::NotFound(what) => CacheError::NotFound(what),
            other => CacheError::Content(other),
        }
    }
}

impl From<IndexError> for CacheError {
    fn from(e: IndexError) -> Self {
        match e {
            IndexError::NotFound(what) => CacheError::NotFound(what),
            other => CacheError::Index(other),
        }
    }
}

/// Result type for cache operations.
pub type CacheResult<T> = std::result::Result<T, CacheError>;
