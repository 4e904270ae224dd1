//! Shared fixtures for index integration tests.

use darkroom_index::{ContentIndex, SledIndex, SqliteIndex};
use std::path::Path;
use std::sync::Arc;

pub const STORE_NAME: &str = "imgstore";

/// Open a SQLite index in a scratch directory.
pub async fn open_sqlite(dir: &Path) -> Arc<dyn ContentIndex> {
    let index = SqliteIndex::new(dir.join("index.db"), STORE_NAME)
        .await
        .expect("open sqlite index");
    Arc::new(index)
}

/// Open a sled index in a scratch directory.
pub fn open_sled(dir: &Path) -> Arc<dyn ContentIndex> {
    let index = SledIndex::open(dir.join("index.sled"), STORE_NAME).expect("open sled index");
    Arc::new(index)
}
