//! Generic expiring cache for opaque serializable values.

use crate::error::{CacheError, CacheResult};
use crate::policy::{effective_expiry, is_expired, SweepStats, SweepTarget};
use async_trait::async_trait;
use darkroom_core::CachePolicy;
use darkroom_index::{CacheEntryRow, CacheStats, ContentIndex};
use serde::de::DeserializeOwned;
use serde::Serialize;
use std::marker::PhantomData;
use std::sync::Arc;
use time::OffsetDateTime;
use tracing::instrument;

/// An expiring key/value cache over an index-backed entry table.
///
/// Values are serialized as JSON bytes. Capacity is bounded by entry count;
/// eviction runs in [`Cache::clean_up`], scheduled by the owning process and
/// safe to call on demand.
pub struct Cache<V> {
    name: String,
    index: Arc<dyn ContentIndex>,
    policy: CachePolicy,
    _marker: PhantomData<fn() -> V>,
}

impl<V> Cache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    /// Create a cache, ensuring its entry table exists.
    pub async fn new(
        name: &str,
        index: Arc<dyn ContentIndex>,
        policy: CachePolicy,
    ) -> CacheResult<Self> {
        index.ensure_cache(name).await?;
        Ok(Self {
            name: name.to_string(),
            index,
            policy,
            _marker: PhantomData,
        })
    }

    /// The cache's logical name.
    pub fn name(&self) -> &str {
        &self.name
    }

    /// Look up a value, treating expired rows as absent.
    ///
    /// Reading refreshes the entry's access time best-effort: a failed touch
    /// is logged, never surfaced.
    #[instrument(skip(self), fields(cache = %self.name))]
    pub async fn get_if_present(&self, key: &str) -> CacheResult<Option<V>> {
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

        let raw = row.value.ok_or_else(|| {
            CacheError::InvalidArgument(format!("entry {key} has no inline value"))
        })?;
        Ok(Some(serde_json::from_slice(&raw)?))
    }

    /// Store a value.
    ///
    /// A configured write-TTL overrides `expires`; otherwise the caller's
    /// deadline (or none, meaning never) is stored as-is.
    #[instrument(skip(self, value), fields(cache = %self.name))]
    pub async fn put(
        &self,
        key: &str,
        value: &V,
        expires: Option<OffsetDateTime>,
    ) -> CacheResult<()> {
        if key.is_empty() {
            return Err(CacheError::InvalidArgument("empty key".to_string()));
        }

        let bytes = serde_json::to_vec(value)?;
        let now = OffsetDateTime::now_utc();
        let row = CacheEntryRow {
            cache_key: key.to_string(),
            size_bytes: bytes.len() as i64,
            value: Some(bytes),
            accessed_at: now,
            expires_at: effective_expiry(&self.policy, expires, now),
        };
        self.index.put_entry(&self.name, &row).await?;
        Ok(())
    }

    /// Remove a single entry. Removing an absent key is a no-op.
    pub async fn invalidate(&self, key: &str) -> CacheResult<()> {
        self.index.delete_entry(&self.name, key).await?;
        Ok(())
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

    async fn remove_counted(&self, key: &str, stats: &mut SweepStats) -> bool {
        match self.index.delete_entry(&self.name, key).await {
            Ok(existed) => existed,
            Err(e) => {
                tracing::warn!(cache = %self.name, key, error = %e, "eviction failed");
                stats.errors += 1;
                false
            }
        }
    }

    /// Run the three eviction passes, each bounded to the policy's batch
    /// size. A large backlog converges over several runs rather than
    /// blocking one.
    #[instrument(skip(self), fields(cache = %self.name))]
    pub async fn clean_up(&self) -> CacheResult<SweepStats> {
        let mut stats = SweepStats::default();
        let batch = self.policy.batch_size;
        let now = OffsetDateTime::now_utc();

        // Pass 1: absolute expiry.
        for row in self.index.select_expired(&self.name, now, batch).await? {
            if self.remove_counted(&row.cache_key, &mut stats).await {
                stats.expired += 1;
            }
        }

        // Pass 2: capacity eviction, oldest-accessed first. Size is the row
        // count for this cache.
        if let Some(limit) = self.policy.size {
            let total = self.index.cache_stats(&self.name).await?.entries;
            if total > limit {
                let over = (total - limit).min(batch as u64) as u32;
                for row in self.index.select_least_recent(&self.name, over).await? {
                    if self.remove_counted(&row.cache_key, &mut stats).await {
                        stats.evicted += 1;
                    }
                }
            }
        }

        // Pass 3: idle expiry.
        if let Some(idle) = self.policy.expires_after_access() {
            let cutoff = now - idle;
            for row in self.index.select_idle(&self.name, cutoff, batch).await? {
                if self.remove_counted(&row.cache_key, &mut stats).await {
                    stats.idle += 1;
                }
            }
        }

        Ok(stats)
    }
}

#[async_trait]
impl<V> SweepTarget for Cache<V>
where
    V: Serialize + DeserializeOwned + Send + Sync,
{
    fn name(&self) -> &str {
        &self.name
    }

    async fn clean_up(&self) -> CacheResult<SweepStats> {
        Cache::clean_up(self).await
    }
}
