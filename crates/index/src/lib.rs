//! Index abstraction and implementations for darkroom.
//!
//! This crate provides the bookkeeping data model:
//! - Digest descriptors with live reference counts
//! - Content entries binding caller-chosen paths to digests
//! - Cache entry tables with access/expiry timestamps
//!
//! Two interchangeable backends implement the same [`ContentIndex`] contract:
//! a relational one on SQLite and an embedded ordered-map one on sled.
//! Backend selection is configuration, never caller code.

pub mod error;
pub mod models;
pub mod repos;
pub mod sled_index;
pub mod store;

pub use error::{IndexError, IndexResult};
pub use models::{CacheEntryRow, CacheStats, ContentRow, DescriptorRow, DescriptorStats};
pub use repos::{CacheEntryRepo, ContentRepo, DescriptorRepo};
pub use sled_index::SledIndex;
pub use store::{ContentIndex, SqliteIndex};

use darkroom_core::config::IndexConfig;
use std::sync::Arc;

/// Create an index from configuration.
///
/// `name` is the logical store name used to derive table/tree names.
pub async fn from_config(config: &IndexConfig, name: &str) -> IndexResult<Arc<dyn ContentIndex>> {
    match config {
        IndexConfig::Sqlite { path } => {
            let index = SqliteIndex::new(path, name).await?;
            Ok(Arc::new(index) as Arc<dyn ContentIndex>)
        }
        IndexConfig::Sled { path } => {
            let index = SledIndex::open(path, name)?;
            Ok(Arc::new(index) as Arc<dyn ContentIndex>)
        }
    }
}
