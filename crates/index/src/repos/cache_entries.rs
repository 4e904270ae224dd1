//! Cache entry repository: expiring key/value rows, one table per cache.

use crate::error::IndexResult;
use crate::models::{CacheEntryRow, CacheStats};
use async_trait::async_trait;
use time::OffsetDateTime;

/// Repository for cache entries.
///
/// Each cache instance is addressed by its logical name; the backend maps the
/// name to a dedicated table (`<name>_cache`) or tree. Names are validated
/// against `[a-z0-9_]` before they ever reach a query string.
#[async_trait]
pub trait CacheEntryRepo: Send + Sync {
    /// Create the table/tree for a cache instance if it does not exist.
    async fn ensure_cache(&self, cache: &str) -> IndexResult<()>;

    /// Get an entry by key. Expiry is not evaluated here; lazy expiry is the
    /// cache layer's concern.
    async fn get_entry(&self, cache: &str, key: &str) -> IndexResult<Option<CacheEntryRow>>;

    /// Insert or replace an entry.
    async fn put_entry(&self, cache: &str, row: &CacheEntryRow) -> IndexResult<()>;

    /// Update an entry's access time. Missing rows are a no-op.
    async fn touch_entry(
        &self,
        cache: &str,
        key: &str,
        accessed_at: OffsetDateTime,
    ) -> IndexResult<()>;

    /// Delete an entry. Returns whether a row existed.
    async fn delete_entry(&self, cache: &str, key: &str) -> IndexResult<bool>;

    /// Select up to `limit` entries with `expires_at < now`.
    async fn select_expired(
        &self,
        cache: &str,
        now: OffsetDateTime,
        limit: u32,
    ) -> IndexResult<Vec<CacheEntryRow>>;

    /// Select up to `limit` entries with `accessed_at < cutoff`.
    async fn select_idle(
        &self,
        cache: &str,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> IndexResult<Vec<CacheEntryRow>>;

    /// Select up to `limit` entries ordered by `accessed_at` ascending,
    /// ties broken by larger `size_bytes` first (shed the most space per
    /// deletion).
    async fn select_least_recent(&self, cache: &str, limit: u32)
        -> IndexResult<Vec<CacheEntryRow>>;

    /// Get entry count and total byte size for a cache instance.
    async fn cache_stats(&self, cache: &str) -> IndexResult<CacheStats>;
}
