//! Integration tests for the content store: round trips, overwrite
//! semantics, refcounted copy, deletion.

use bytes::Bytes;
use darkroom_content::{ContentError, ContentStore};
use darkroom_core::StorageConfig;
use darkroom_index::{ContentIndex, SqliteIndex};
use darkroom_store::{stream_bytes, BinaryStore};
use futures::StreamExt;
use serde_json::json;
use std::sync::Arc;

async fn test_content_store(dir: &tempfile::TempDir) -> (ContentStore, Arc<dyn ContentIndex>) {
    let index: Arc<dyn ContentIndex> = Arc::new(
        SqliteIndex::new(dir.path().join("index.db"), "imgstore")
            .await
            .unwrap(),
    );
    let config = StorageConfig::rooted(dir.path().join("data"));
    let binaries = BinaryStore::new(index.clone(), &config).await.unwrap();
    (ContentStore::new(binaries, index.clone()), index)
}

async fn read_all(content: &darkroom_content::Content) -> Vec<u8> {
    let mut stream = content.open().await.unwrap();
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

#[tokio::test]
async fn test_write_read_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = test_content_store(&dir).await;

    let meta = json!({"width": 120, "height": 80});
    let data = Bytes::from("resized image bytes");
    store
        .write("thumb/cat/120x80", Some(meta.clone()), stream_bytes(data.clone()))
        .await
        .unwrap();

    let content = store.read("thumb/cat/120x80").await.unwrap();
    assert_eq!(content.meta(), Some(&meta));
    assert_eq!(read_all(&content).await, data);
}

#[tokio::test]
async fn test_overwrite_dereferences_old_digest() {
    let dir = tempfile::tempdir().unwrap();
    let (store, index) = test_content_store(&dir).await;

    let first = store
        .write("thumb/a", None, stream_bytes(Bytes::from("old bytes")))
        .await
        .unwrap();
    let old_digest = first.attributes().binary.digest;

    store
        .write("thumb/a", None, stream_bytes(Bytes::from("new bytes")))
        .await
        .unwrap();

    // Old digest fully released, new digest bound.
    assert!(!index.descriptor_exists(&old_digest.to_hex()).await.unwrap());
    let content = store.read("thumb/a").await.unwrap();
    assert_eq!(read_all(&content).await, b"new bytes");
}

#[tokio::test]
async fn test_overwrite_keeps_other_paths_on_shared_digest() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = test_content_store(&dir).await;

    // Two paths share one digest via dedup.
    let data = Bytes::from("shared bytes");
    store
        .write("thumb/a", None, stream_bytes(data.clone()))
        .await
        .unwrap();
    store
        .write("thumb/b", None, stream_bytes(data.clone()))
        .await
        .unwrap();

    // Overwriting one path must not disturb the other binding.
    store
        .write("thumb/a", None, stream_bytes(Bytes::from("different")))
        .await
        .unwrap();

    let content = store.read("thumb/b").await.unwrap();
    assert_eq!(read_all(&content).await, data);
}

#[tokio::test]
async fn test_overwrite_preserves_created_timestamp() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = test_content_store(&dir).await;

    let first = store
        .write("thumb/a", None, stream_bytes(Bytes::from("one")))
        .await
        .unwrap();
    let second = store
        .write("thumb/a", None, stream_bytes(Bytes::from("two")))
        .await
        .unwrap();

    assert_eq!(second.attributes().created, first.attributes().created);
    assert!(second.attributes().updated >= first.attributes().updated);
}

#[tokio::test]
async fn test_copy_shares_bytes_and_carries_meta() {
    let dir = tempfile::tempdir().unwrap();
    let (store, index) = test_content_store(&dir).await;

    let meta = json!({"source": "https://example.com/cat.png"});
    let original = store
        .write("orig", Some(meta.clone()), stream_bytes(Bytes::from("cat")))
        .await
        .unwrap();

    let copy = store.copy("orig", "alias", None).await.unwrap();
    assert_eq!(copy.meta(), Some(&meta));
    assert_eq!(
        copy.attributes().binary.digest,
        original.attributes().binary.digest
    );

    // One blob, two references.
    let row = index
        .read_descriptor(&original.attributes().binary.digest.to_hex())
        .await
        .unwrap();
    assert_eq!(row.ref_count, 2);

    // Replacement meta wins when supplied.
    let replaced = store
        .copy("orig", "alias2", Some(json!({"promoted": true})))
        .await
        .unwrap();
    assert_eq!(replaced.meta(), Some(&json!({"promoted": true})));
}

#[tokio::test]
async fn test_copy_rejects_self_and_missing_source() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = test_content_store(&dir).await;

    store
        .write("orig", None, stream_bytes(Bytes::from("x")))
        .await
        .unwrap();

    assert!(matches!(
        store.copy("orig", "orig", None).await,
        Err(ContentError::InvalidArgument(_))
    ));
    assert!(matches!(
        store.copy("missing", "target", None).await,
        Err(ContentError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_copy_over_existing_target_releases_old_binding() {
    let dir = tempfile::tempdir().unwrap();
    let (store, index) = test_content_store(&dir).await;

    store
        .write("src", None, stream_bytes(Bytes::from("wanted")))
        .await
        .unwrap();
    let old = store
        .write("dst", None, stream_bytes(Bytes::from("replaced")))
        .await
        .unwrap();
    let old_digest = old.attributes().binary.digest;

    store.copy("src", "dst", None).await.unwrap();

    assert!(!index.descriptor_exists(&old_digest.to_hex()).await.unwrap());
    let content = store.read("dst").await.unwrap();
    assert_eq!(read_all(&content).await, b"wanted");
}

#[tokio::test]
async fn test_delete_semantics() {
    let dir = tempfile::tempdir().unwrap();
    let (store, index) = test_content_store(&dir).await;

    let content = store
        .write("gone", None, stream_bytes(Bytes::from("bytes")))
        .await
        .unwrap();
    let digest = content.attributes().binary.digest;

    store.delete("gone").await.unwrap();
    assert!(!store.exists("gone").await.unwrap());
    assert!(!index.descriptor_exists(&digest.to_hex()).await.unwrap());

    assert!(matches!(
        store.delete("gone").await,
        Err(ContentError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_empty_path_rejected() {
    let dir = tempfile::tempdir().unwrap();
    let (store, _) = test_content_store(&dir).await;

    assert!(matches!(
        store.write("", None, stream_bytes(Bytes::from("x"))).await,
        Err(ContentError::InvalidArgument(_))
    ));
}
