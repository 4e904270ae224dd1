//! Shared fixtures for cache integration tests.

use darkroom_content::ContentStore;
use darkroom_core::StorageConfig;
use darkroom_index::{ContentIndex, SqliteIndex};
use darkroom_store::BinaryStore;
use std::sync::Arc;

/// Open a content store plus its index in a scratch directory.
pub async fn test_stack(dir: &tempfile::TempDir) -> (ContentStore, Arc<dyn ContentIndex>) {
    let index: Arc<dyn ContentIndex> = Arc::new(
        SqliteIndex::new(dir.path().join("index.db"), "imgstore")
            .await
            .unwrap(),
    );
    let config = StorageConfig::rooted(dir.path().join("data"));
    let binaries = BinaryStore::new(index.clone(), &config).await.unwrap();
    (ContentStore::new(binaries, index.clone()), index)
}
