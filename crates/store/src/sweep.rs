//! Orphan sweep: temp-file and unindexed-blob cleanup.

use crate::error::StoreResult;
use crate::store::BinaryStore;
use std::path::PathBuf;
use std::time::{Duration, SystemTime};
use tokio::fs;
use tracing::instrument;

impl BinaryStore {
    /// Remove orphaned files: temp uploads older than `grace`, and committed
    /// blobs whose digest no longer has a descriptor row.
    ///
    /// The grace period makes the sweep safe against concurrent writes: an
    /// in-flight upload's temp file is younger than any reasonable grace, and
    /// a blob committed moments ago whose descriptor transaction is still in
    /// flight is likewise protected by its mtime.
    ///
    /// Returns the number of files removed.
    #[instrument(skip(self))]
    pub async fn sweep_orphans(&self, grace: Duration) -> StoreResult<u64> {
        let cutoff = SystemTime::now().checked_sub(grace);
        let cutoff = match cutoff {
            Some(cutoff) => cutoff,
            None => return Ok(0),
        };

        let mut removed = 0u64;

        // Pass 1: stale temp uploads.
        let mut entries = fs::read_dir(self.tmp_path()).await?;
        while let Some(entry) = entries.next_entry().await? {
            let file_type = entry.file_type().await?;
            if !file_type.is_file() {
                continue;
            }
            if older_than(&entry, cutoff).await && fs::remove_file(entry.path()).await.is_ok() {
                tracing::debug!(path = %entry.path().display(), "stale temp upload removed");
                removed += 1;
            }
        }

        // Pass 2: committed blobs without a descriptor. Walk the two shard
        // levels; the blob file name is its digest.
        let mut stack: Vec<PathBuf> = vec![self.base_path().to_path_buf()];
        while let Some(dir) = stack.pop() {
            let mut entries = fs::read_dir(&dir).await?;
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    stack.push(entry.path());
                    continue;
                }
                if !file_type.is_file() {
                    continue;
                }
                let digest = entry.file_name().to_string_lossy().to_string();
                if self.index().descriptor_exists(&digest).await? {
                    continue;
                }
                if older_than(&entry, cutoff).await && fs::remove_file(entry.path()).await.is_ok() {
                    tracing::debug!(digest = %digest, "orphaned blob removed");
                    removed += 1;
                }
            }
        }

        Ok(removed)
    }
}

async fn older_than(entry: &fs::DirEntry, cutoff: SystemTime) -> bool {
    match entry.metadata().await.and_then(|m| m.modified()) {
        Ok(modified) => modified < cutoff,
        // Unknown mtime: leave the file alone.
        Err(_) => false,
    }
}
