//! Content entry repository: path to digest bindings.

use crate::error::IndexResult;
use crate::models::ContentRow;
use async_trait::async_trait;

/// Repository for content entries.
///
/// Reference counting is not this repo's job: the content store keeps
/// descriptor counts correct as paths are bound and rebound, this repo only
/// records the binding itself.
#[async_trait]
pub trait ContentRepo: Send + Sync {
    /// Get a content entry by path.
    async fn get_content(&self, path: &str) -> IndexResult<Option<ContentRow>>;

    /// Insert or replace the entry for a path.
    async fn put_content(&self, row: &ContentRow) -> IndexResult<()>;

    /// Delete the entry for a path. Fails with `NotFound` if absent.
    async fn delete_content(&self, path: &str) -> IndexResult<()>;

    /// Check whether a path has an entry.
    async fn content_exists(&self, path: &str) -> IndexResult<bool>;
}
