//! Expiry evaluation and sweep accounting shared by both caches.

use crate::error::CacheResult;
use async_trait::async_trait;
use darkroom_core::CachePolicy;
use darkroom_index::CacheEntryRow;
use serde::Serialize;
use time::OffsetDateTime;

/// Compute the stored expiry for a write.
///
/// A configured "expires after write" duration always wins over the caller's
/// deadline; without one, the caller's deadline (possibly none, meaning
/// never) is used as-is.
pub(crate) fn effective_expiry(
    policy: &CachePolicy,
    caller: Option<OffsetDateTime>,
    now: OffsetDateTime,
) -> Option<OffsetDateTime> {
    match policy.expires_after_write() {
        Some(ttl) => Some(now + ttl),
        None => caller,
    }
}

/// Lazy expiry check: a row whose deadline has passed is treated as absent
/// even when it has not been physically removed yet.
pub(crate) fn is_expired(row: &CacheEntryRow, now: OffsetDateTime) -> bool {
    matches!(row.expires_at, Some(expires) if expires < now)
}

/// Counters for one clean-up run.
#[derive(Debug, Clone, Copy, Default, Serialize)]
pub struct SweepStats {
    /// Rows removed by the absolute-expiry pass.
    pub expired: u64,
    /// Rows removed by the capacity pass.
    pub evicted: u64,
    /// Rows removed by the idle-expiry pass.
    pub idle: u64,
    /// Individual removals that failed; siblings proceed regardless.
    pub errors: u64,
}

impl SweepStats {
    /// Total rows removed across all passes.
    pub fn removed(&self) -> u64 {
        self.expired + self.evicted + self.idle
    }
}

/// A cache the periodic sweeper can clean.
#[async_trait]
pub trait SweepTarget: Send + Sync {
    /// The cache's logical name.
    fn name(&self) -> &str;

    /// Run one bounded clean-up: absolute expiry, capacity eviction, idle
    /// expiry, each limited to the policy's batch size.
    async fn clean_up(&self) -> CacheResult<SweepStats>;
}
