//! Byte-content cache: the content store composed with cache eviction.

use crate::error::{CacheError, CacheResult};
use crate::policy::{effective_expiry, is_expired, SweepStats, SweepTarget};
use async_trait::async_trait;
use darkroom_content::{Content, ContentError, ContentStore};
use darkroom_core::CachePolicy;
use darkroom_index::{CacheEntryRow, CacheStats, ContentIndex};
use darkroom_store::ByteStream;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// A cache specialized for byte content.
///
/// Cache keys double as content store paths, so cached bytes are
/// deduplicated like any other content. Capacity is bounded by total byte
/// size rather than entry count, and every eviction releases the underlying
/// bytes through the content store's reference-counted delete.
pub struct ContentCache {
    name: String,
    content: ContentStore,
    index: Arc<dyn ContentIndex>,
    policy: CachePolicy,
}

impl ContentCache {
    /// Create a content cache, ensuring its entry table exists.
    pub async fn new(
        name: &str,
        content: ContentStore,
        index: Arc<dyn ContentIndex>,
        policy: CachePolicy,
    ) -> CacheResult<Self> {
        index.ensure_cache(name).await?;
        Ok(Self {
            name: name.to_string(),
            content,
            index,
            policy,
        })
    }

    /// The cache's logical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Store a byte stream under `key`.
    #[instrument(skip(self, stream), fields(cache = %self.name))]
    pub async fn put_stream(
        &self,
        key: &str,
        stream: ByteStream,
        expires: Option<OffsetDateTime>,
    ) -> CacheResult<Content> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("empty key".to_string()));
        }

        let content = self.content.write(key, None, stream).await?;
        let now = OffsetDateTime::now_utc();
        let row = CacheEntryRow {
            cache_key: key.to_string(),
            value: None,
            size_bytes: content.attributes().binary.size,
            accessed_at: now,
            expires_at: effective_expiry(&self.policy, expires, now),
        };
        self.index.put_entry(&self.name, &row).await?;
        Ok(content)
    }

    /// Look up cached content, treating expired rows as absent.
    ///
    /// The returned handle opens its byte stream lazily. Reading refreshes
    /// the access time best-effort.
    #[instrument(skip(self), fields(cache = %self.name))]
    pub async fn get_if_present(&self, key: &str) -> CacheResult<Option<Content>> {
        let row = match self.index.get_entry(&self.name, key).await? {
            Some(row) => row,
            None => return Ok(None),
        };

        let now = OffsetDateTime::now_utc();
        if is_expired(&row, now) {
            return Ok(None);
        }

        if let Err(e) = self.index.touch_entry(&self.name, key, now).await {
            tracing::debug!(cache = %self.name, key, error = %e, "access-time touch failed");
        }

        match self.content.read(key).await {
            Ok(content) => Ok(Some(content)),
            Err(ContentError::NotFound(_)) => {
                // Row without content: drop the stale row and report a miss.
                tracing::warn!(cache = %self.name, key, "cache row without content, dropping");
                let _ = self.index.delete_entry(&self.name, key).await;
                Ok(None)
            }
            Err(e) => Err(e.into()),
        }
    }

    /// Promote one cached entry to a second key without copying bytes.
    ///
    /// Used for redirect caching: the target shares the source's binary via
    /// a reference-count increment. The source's access time is touched; an
    /// expired-but-unswept source is still copyable, and both keys remain
    /// subject to normal eviction.
    #[instrument(skip(self), fields(cache = %self.name))]
    pub async fn copy(
        &self,
        source: &str,
        target: &str,
        expires: Option<OffsetDateTime>,
    ) -> CacheResult<Content> {
        let row = match self.index.get_entry(&self.name, source).await? {
            Some(row) => row,
            None => return Err(CacheError::NotFound(format!("cache key {source}"))),
        };

        let now = OffsetDateTime::now_utc();
        if let Err(e) = self.index.touch_entry(&self.name, source, now).await {
            tracing::debug!(cache = %self.name, key = source, error = %e, "access-time touch failed");
        }

        let content = self.content.copy(source, target, None).await?;
        let target_row = CacheEntryRow {
            cache_key: target.to_string(),
            value: None,
            size_bytes: row.size_bytes,
            accessed_at: now,
            expires_at: effective_expiry(&self.policy, expires, now),
        };
        self.index.put_entry(&self.name, &target_row).await?;
        Ok(content)
    }

    /// Remove a single entry, releasing its bytes through the content
    /// store. Removing an absent key is a no-op.
    pub async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.index.delete_entry(&self.name, key).await?;
        match self.content.delete(key).await {
            Ok(()) => Ok(()),
            Err(ContentError::NotFound(_)) => Ok(()),
            Err(e) => Err(e.into()),
        }
    }

    /// Remove many entries. One failed key does not stop the others; the
    /// aggregate fails if any individual invalidation failed.
    pub async fn invalidate_all(&self, keys: &[&str]) -> CacheResult<()> {
        let mut failed = 0;
        for key in keys {
            if let Err(e) = self.invalidate(key).await {
                tracing::warn!(cache = %self.name, key, error = %e, "invalidation failed");
                failed += 1;
            }
        }
        if failed > 0 {
            return Err(CacheError::Partial {
                failed,
                total: keys.len(),
            });
        }
        Ok(())
    }

    /// Entry count and total byte size.
    pub async fn stats(&self) -> CacheResult<CacheStats> {
        Ok(self.index.cache_stats(&self.name).await?)
    }

    async fn evict(&self, key: &str, stats: &mut SweepStats) -> bool {
        match self.invalidate(key).await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(cache = %self.name, key, error = %e, "eviction failed");
                stats.errors += 1;
                false
            }
        }
    }

    /// Run the three eviction passes, each bounded to the policy's batch
    /// size. Every evicted key also releases its bytes through the content
    /// store's reference-counted delete.
    #[instrument(skip(self), fields(cache = %self.name))]
    pub async fn clean_up(&self) -> CacheResult<SweepStats> {
        let mut stats = SweepStats::default();
        let batch = self.policy.batch_size;
        let now = OffsetDateTime::now_utc();

        // Pass 1: absolute expiry.
        for row in self.index.select_expired(&self.name, now, batch).await? {
            if self.evict(&row.cache_key, &mut stats).await {
                stats.expired += 1;
            }
        }

        // Pass 2: capacity eviction by total byte size, oldest-accessed
        // first, larger entries first on ties.
        if let Some(limit) = self.policy.size {
            let mut total = self.index.cache_stats(&self.name).await?.total_bytes;
            if total > limit {
                let candidates = self.index.select_least_recent(&self.name, batch).await?;
                for row in candidates {
                    if total <= limit {
                        break;
                    }
                    if self.evict(&row.cache_key, &mut stats).await {
                        stats.evicted += 1;
                        total = total.saturating_sub(row.size_bytes as u64);
                    }
                }
            }
        }

        // Pass 3: idle expiry.
        if let Some(idle) = self.policy.expires_after_access() {
            let cutoff = now - idle;
            for row in self.index.select_idle(&self.name, cutoff, batch).await? {
                if self.evict(&row.cache_key, &mut stats).await {
                    stats.idle += 1;
                }
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl SweepTarget for ContentCache {
    fn name(&self) -> &str {
        &self.name
    }

    async fn clean_up(&self) -> CacheResult<SweepStats> {
        ContentCache::clean_up(self).await
    }
}
