//! Expiring caches for darkroom.
//!
//! Two cache shapes share one contract and three eviction policies
//! (absolute expiry, idle expiry, capacity):
//! - [`Cache`] holds opaque serializable values, bounded by entry count
//! - [`ContentCache`] holds byte content through the content store, bounded
//!   by total byte size, with copy-on-cache promotion
//!
//! The [`Sweeper`] drives periodic clean-up over a [`CacheRegistry`] built
//! once at startup.

pub mod cache;
pub mod content_cache;
pub mod error;
pub mod policy;
pub mod registry;
pub mod sweeper;

pub use cache::Cache;
pub use content_cache::ContentCache;
pub use error::{CacheError, CacheResult};
pub use policy::{SweepStats, SweepTarget};
pub use registry::CacheRegistry;
pub use sweeper::Sweeper;
