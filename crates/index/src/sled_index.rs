//! Embedded ordered-map index backed by sled.
//!
//! One tree per role (`<name>_descriptors`, `<name>_content`, `<cache>_cache`),
//! rows encoded as JSON. Sled's transactional trees provide the same atomic
//! increment-or-insert contract as the SQLite backend's transactions.
//!
//! Eviction queries scan the cache tree and order in memory. Cache trees are
//! bounded by the very eviction those scans drive, so the scans stay small.

use crate::error::{IndexError, IndexResult};
use crate::models::{CacheEntryRow, CacheStats, ContentRow, DescriptorRow, DescriptorStats};
use crate::repos::{CacheEntryRepo, ContentRepo, DescriptorRepo};
use crate::store::{validate_name, ContentIndex};
use async_trait::async_trait;
use serde::de::DeserializeOwned;
use serde::Serialize;
use sled::transaction::{ConflictableTransactionError, TransactionError};
use std::path::Path;
use time::OffsetDateTime;

/// Sled-backed index.
pub struct SledIndex {
    db: sled::Db,
    descriptors: sled::Tree,
    content: sled::Tree,
}

impl SledIndex {
    /// Open (creating if missing) a sled index for the store named `name`.
    pub fn open(path: impl AsRef<Path>, name: &str) -> IndexResult<Self> {
        validate_name(name)?;
        let db = sled::open(path)?;
        let descriptors = db.open_tree(format!("{name}_descriptors"))?;
        let content = db.open_tree(format!("{name}_content"))?;
        tracing::debug!(name, "sled index ready");
        Ok(Self {
            db,
            descriptors,
            content,
        })
    }

    fn cache_tree(&self, cache: &str) -> IndexResult<sled::Tree> {
        validate_name(cache)?;
        Ok(self.db.open_tree(format!("{cache}_cache"))?)
    }

    /// Decode every row in a cache tree.
    fn scan_entries(tree: &sled::Tree) -> IndexResult<Vec<CacheEntryRow>> {
        let mut rows = Vec::new();
        for item in tree.iter() {
            let (_, raw) = item?;
            rows.push(decode::<CacheEntryRow>(&raw)?);
        }
        Ok(rows)
    }
}

fn encode<T: Serialize>(value: &T) -> Result<Vec<u8>, IndexError> {
    serde_json::to_vec(value).map_err(|e| IndexError::Corrupt(e.to_string()))
}

fn decode<T: DeserializeOwned>(raw: &[u8]) -> Result<T, IndexError> {
    serde_json::from_slice(raw).map_err(|e| IndexError::Corrupt(e.to_string()))
}

fn map_txn<T>(result: Result<T, TransactionError<IndexError>>) -> IndexResult<T> {
    result.map_err(|e| match e {
        TransactionError::Abort(e) => e,
        TransactionError::Storage(e) => IndexError::Tree(e),
    })
}

#[async_trait]
impl ContentIndex for SledIndex {
    async fn migrate(&self) -> IndexResult<()> {
        // Trees are created on open; just make sure the log is durable.
        self.db.flush()?;
        Ok(())
    }

    async fn health_check(&self) -> IndexResult<()> {
        self.db.flush()?;
        Ok(())
    }
}

#[async_trait]
impl DescriptorRepo for SledIndex {
    async fn create_descriptor(&self, descriptor: &DescriptorRow) -> IndexResult<i64> {
        let digest = descriptor.digest.clone();
        let template = DescriptorRow {
            ref_count: 1,
            ..descriptor.clone()
        };

        let result = self.descriptors.transaction(|t| {
            let count = match t.get(digest.as_bytes())? {
                Some(raw) => {
                    let mut row: DescriptorRow =
                        decode(&raw).map_err(ConflictableTransactionError::Abort)?;
                    row.ref_count += 1;
                    let encoded = encode(&row).map_err(ConflictableTransactionError::Abort)?;
                    t.insert(digest.as_bytes(), encoded)?;
                    row.ref_count
                }
                None => {
                    let encoded =
                        encode(&template).map_err(ConflictableTransactionError::Abort)?;
                    t.insert(digest.as_bytes(), encoded)?;
                    1
                }
            };
            Ok(count)
        });
        map_txn(result)
    }

    async fn duplicate_descriptor(&self, digest: &str) -> IndexResult<i64> {
        let result = self.descriptors.transaction(|t| {
            let raw = t.get(digest.as_bytes())?.ok_or_else(|| {
                ConflictableTransactionError::Abort(IndexError::NotFound(format!(
                    "digest {digest}"
                )))
            })?;
            let mut row: DescriptorRow =
                decode(&raw).map_err(ConflictableTransactionError::Abort)?;
            row.ref_count += 1;
            let encoded = encode(&row).map_err(ConflictableTransactionError::Abort)?;
            t.insert(digest.as_bytes(), encoded)?;
            Ok(row.ref_count)
        });
        map_txn(result)
    }

    async fn delete_descriptor(&self, digest: &str) -> IndexResult<i64> {
        let result = self.descriptors.transaction(|t| {
            let raw = t.get(digest.as_bytes())?.ok_or_else(|| {
                ConflictableTransactionError::Abort(IndexError::NotFound(format!(
                    "digest {digest}"
                )))
            })?;
            let mut row: DescriptorRow =
                decode(&raw).map_err(ConflictableTransactionError::Abort)?;
            if row.ref_count <= 1 {
                t.remove(digest.as_bytes())?;
                Ok(0)
            } else {
                row.ref_count -= 1;
                let encoded = encode(&row).map_err(ConflictableTransactionError::Abort)?;
                t.insert(digest.as_bytes(), encoded)?;
                Ok(row.ref_count)
            }
        });
        map_txn(result)
    }

    async fn read_descriptor(&self, digest: &str) -> IndexResult<DescriptorRow> {
        match self.descriptors.get(digest.as_bytes())? {
            Some(raw) => decode(&raw),
            None => Err(IndexError::NotFound(format!("digest {digest}"))),
        }
    }

    async fn descriptor_exists(&self, digest: &str) -> IndexResult<bool> {
        Ok(self.descriptors.contains_key(digest.as_bytes())?)
    }

    async fn descriptor_stats(&self) -> IndexResult<DescriptorStats> {
        let mut stats = DescriptorStats::default();
        for item in self.descriptors.iter() {
            let (_, raw) = item?;
            let row: DescriptorRow = decode(&raw)?;
            stats.count += 1;
            stats.total_size += row.size as u64;
        }
        Ok(stats)
    }
}

#[async_trait]
impl ContentRepo for SledIndex {
    async fn get_content(&self, path: &str) -> IndexResult<Option<ContentRow>> {
        match self.content.get(path.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put_content(&self, row: &ContentRow) -> IndexResult<()> {
        let encoded = encode(row)?;
        self.content.insert(row.path.as_bytes(), encoded)?;
        Ok(())
    }

    async fn delete_content(&self, path: &str) -> IndexResult<()> {
        match self.content.remove(path.as_bytes())? {
            Some(_) => Ok(()),
            None => Err(IndexError::NotFound(format!("path {path}"))),
        }
    }

    async fn content_exists(&self, path: &str) -> IndexResult<bool> {
        Ok(self.content.contains_key(path.as_bytes())?)
    }
}

#[async_trait]
impl CacheEntryRepo for SledIndex {
    async fn ensure_cache(&self, cache: &str) -> IndexResult<()> {
        self.cache_tree(cache)?;
        Ok(())
    }

    async fn get_entry(&self, cache: &str, key: &str) -> IndexResult<Option<CacheEntryRow>> {
        let tree = self.cache_tree(cache)?;
        match tree.get(key.as_bytes())? {
            Some(raw) => Ok(Some(decode(&raw)?)),
            None => Ok(None),
        }
    }

    async fn put_entry(&self, cache: &str, row: &CacheEntryRow) -> IndexResult<()> {
        let tree = self.cache_tree(cache)?;
        let encoded = encode(row)?;
        tree.insert(row.cache_key.as_bytes(), encoded)?;
        Ok(())
    }

    async fn touch_entry(
        &self,
        cache: &str,
        key: &str,
        accessed_at: OffsetDateTime,
    ) -> IndexResult<()> {
        let tree = self.cache_tree(cache)?;
        let result = tree.transaction(|t| {
            if let Some(raw) = t.get(key.as_bytes())? {
                let mut row: CacheEntryRow =
                    decode(&raw).map_err(ConflictableTransactionError::Abort)?;
                row.accessed_at = accessed_at;
                let encoded = encode(&row).map_err(ConflictableTransactionError::Abort)?;
                t.insert(key.as_bytes(), encoded)?;
            }
            Ok(())
        });
        map_txn(result)
    }

    async fn delete_entry(&self, cache: &str, key: &str) -> IndexResult<bool> {
        let tree = self.cache_tree(cache)?;
        Ok(tree.remove(key.as_bytes())?.is_some())
    }

    async fn select_expired(
        &self,
        cache: &str,
        now: OffsetDateTime,
        limit: u32,
    ) -> IndexResult<Vec<CacheEntryRow>> {
        let tree = self.cache_tree(cache)?;
        let mut rows: Vec<CacheEntryRow> = Self::scan_entries(&tree)?
            .into_iter()
            .filter(|row| matches!(row.expires_at, Some(expires) if expires < now))
            .collect();
        rows.sort_by_key(|row| row.expires_at);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn select_idle(
        &self,
        cache: &str,
        cutoff: OffsetDateTime,
        limit: u32,
    ) -> IndexResult<Vec<CacheEntryRow>> {
        let tree = self.cache_tree(cache)?;
        let mut rows: Vec<CacheEntryRow> = Self::scan_entries(&tree)?
            .into_iter()
            .filter(|row| row.accessed_at < cutoff)
            .collect();
        rows.sort_by_key(|row| row.accessed_at);
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn select_least_recent(
        &self,
        cache: &str,
        limit: u32,
    ) -> IndexResult<Vec<CacheEntryRow>> {
        let tree = self.cache_tree(cache)?;
        let mut rows = Self::scan_entries(&tree)?;
        rows.sort_by(|a, b| {
            a.accessed_at
                .cmp(&b.accessed_at)
                .then(b.size_bytes.cmp(&a.size_bytes))
        });
        rows.truncate(limit as usize);
        Ok(rows)
    }

    async fn cache_stats(&self, cache: &str) -> IndexResult<CacheStats> {
        let tree = self.cache_tree(cache)?;
        let mut stats = CacheStats::default();
        for row in Self::scan_entries(&tree)? {
            stats.entries += 1;
            stats.total_bytes += row.size_bytes as u64;
        }
        Ok(stats)
    }
}
