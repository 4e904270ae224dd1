//! Integration tests for the content cache: byte-size capacity, refcounted
//! eviction, copy-on-cache promotion.

mod common;

use bytes::Bytes;
use common::test_stack;
use darkroom_cache::{CacheError, ContentCache};
use darkroom_core::CachePolicy;
use darkroom_store::stream_bytes;
use futures::StreamExt;
use time::{Duration, OffsetDateTime};

async fn read_all(content: &darkroom_content::Content) -> Vec<u8> {
    let mut stream = content.open().await.unwrap();
    let mut out = Vec::new();
    while let Some(chunk) = stream.next().await {
        out.extend_from_slice(&chunk.unwrap());
    }
    out
}

#[tokio::test]
async fn test_put_get_roundtrip() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;
    let cache = ContentCache::new("thumbs", content, index, CachePolicy::default())
        .await
        .unwrap();

    let data = Bytes::from("jpeg bytes");
    cache
        .put_stream("cat/120x80", stream_bytes(data.clone()), None)
        .await
        .unwrap();

    let hit = cache.get_if_present("cat/120x80").await.unwrap().unwrap();
    assert_eq!(read_all(&hit).await, data);
    assert!(cache.get_if_present("dog/120x80").await.unwrap().is_none());
}

#[tokio::test]
async fn test_expired_entry_is_a_miss() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;
    let cache = ContentCache::new("thumbs", content, index, CachePolicy::default())
        .await
        .unwrap();

    cache
        .put_stream(
            "dead",
            stream_bytes(Bytes::from("x")),
            Some(OffsetDateTime::now_utc() - Duration::milliseconds(1)),
        )
        .await
        .unwrap();

    assert!(cache.get_if_present("dead").await.unwrap().is_none());
}

#[tokio::test]
async fn test_capacity_eviction_by_byte_size() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;
    let policy = CachePolicy {
        size: Some(100),
        ..CachePolicy::default()
    };
    let cache = ContentCache::new("thumbs", content, index.clone(), policy)
        .await
        .unwrap();

    // Three 40-byte entries: 120 bytes total against a 100-byte limit.
    let now = OffsetDateTime::now_utc();
    for (i, key) in ["oldest", "middle", "newest"].iter().enumerate() {
        let data = Bytes::from(vec![i as u8; 40]);
        cache.put_stream(key, stream_bytes(data), None).await.unwrap();
        index
            .touch_entry("thumbs", key, now - Duration::hours(3 - i as i64))
            .await
            .unwrap();
    }

    let stats = cache.clean_up().await.unwrap();
    assert_eq!(stats.evicted, 1);

    // Under the limit, and exactly the least-recently-accessed entry went.
    let remaining = cache.stats().await.unwrap();
    assert!(remaining.total_bytes <= 100);
    assert!(cache.get_if_present("oldest").await.unwrap().is_none());
    assert!(cache.get_if_present("middle").await.unwrap().is_some());
    assert!(cache.get_if_present("newest").await.unwrap().is_some());
}

#[tokio::test]
async fn test_eviction_frees_bytes_through_refcount() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;
    let cache = ContentCache::new("thumbs", content.clone(), index.clone(), CachePolicy::default())
        .await
        .unwrap();

    let put = cache
        .put_stream(
            "gone",
            stream_bytes(Bytes::from("evict me")),
            Some(OffsetDateTime::now_utc() - Duration::seconds(1)),
        )
        .await
        .unwrap();
    let digest = put.attributes().binary.digest;

    let stats = cache.clean_up().await.unwrap();
    assert_eq!(stats.expired, 1);

    // Eviction released the content entry and, at refcount zero, the blob.
    assert!(!content.exists("gone").await.unwrap());
    assert!(!index.descriptor_exists(&digest.to_hex()).await.unwrap());
}

#[tokio::test]
async fn test_copy_on_cache_shares_bytes() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;
    let cache = ContentCache::new("thumbs", content, index.clone(), CachePolicy::default())
        .await
        .unwrap();

    let data = Bytes::from("redirect target bytes");
    let original = cache
        .put_stream("orig", stream_bytes(data.clone()), None)
        .await
        .unwrap();

    let promoted = cache.copy("orig", "redirect", None).await.unwrap();
    assert_eq!(
        promoted.attributes().binary.digest,
        original.attributes().binary.digest
    );

    // One blob, two references.
    let row = index
        .read_descriptor(&original.attributes().binary.digest.to_hex())
        .await
        .unwrap();
    assert_eq!(row.ref_count, 2);

    // The promoted key survives invalidation of its source.
    cache.invalidate("orig").await.unwrap();
    let hit = cache.get_if_present("redirect").await.unwrap().unwrap();
    assert_eq!(read_all(&hit).await, data);
}

#[tokio::test]
async fn test_copy_of_expired_source_is_allowed() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;
    let cache = ContentCache::new("thumbs", content, index, CachePolicy::default())
        .await
        .unwrap();

    // Expired but not yet swept: the bytes are still present.
    cache
        .put_stream(
            "expired",
            stream_bytes(Bytes::from("still here")),
            Some(OffsetDateTime::now_utc() - Duration::seconds(1)),
        )
        .await
        .unwrap();

    let promoted = cache
        .copy(
            "expired",
            "fresh",
            Some(OffsetDateTime::now_utc() + Duration::hours(1)),
        )
        .await
        .unwrap();
    assert_eq!(read_all(&promoted).await, b"still here");
    assert!(cache.get_if_present("fresh").await.unwrap().is_some());
}

#[tokio::test]
async fn test_copy_missing_source_fails() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;
    let cache = ContentCache::new("thumbs", content, index, CachePolicy::default())
        .await
        .unwrap();

    assert!(matches!(
        cache.copy("ghost", "target", None).await,
        Err(CacheError::NotFound(_))
    ));
}

#[tokio::test]
async fn test_invalidate_all_releases_content() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;
    let cache = ContentCache::new("thumbs", content.clone(), index, CachePolicy::default())
        .await
        .unwrap();

    cache
        .put_stream("a", stream_bytes(Bytes::from("aa")), None)
        .await
        .unwrap();
    cache
        .put_stream("b", stream_bytes(Bytes::from("bb")), None)
        .await
        .unwrap();

    cache.invalidate_all(&["a", "b", "ghost"]).await.unwrap();
    assert!(!content.exists("a").await.unwrap());
    assert!(!content.exists("b").await.unwrap());
    assert_eq!(cache.stats().await.unwrap().entries, 0);
}

#[tokio::test]
async fn test_idle_expiry_releases_content() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;
    let policy = CachePolicy {
        expires_after_access_secs: Some(3600),
        ..CachePolicy::default()
    };
    let cache = ContentCache::new("thumbs", content.clone(), index.clone(), policy)
        .await
        .unwrap();

    cache
        .put_stream("stale", stream_bytes(Bytes::from("old")), None)
        .await
        .unwrap();
    cache
        .put_stream("active", stream_bytes(Bytes::from("new")), None)
        .await
        .unwrap();
    index
        .touch_entry(
            "thumbs",
            "stale",
            OffsetDateTime::now_utc() - Duration::hours(2),
        )
        .await
        .unwrap();

    let stats = cache.clean_up().await.unwrap();
    assert_eq!(stats.idle, 1);
    assert!(!content.exists("stale").await.unwrap());
    assert!(content.exists("active").await.unwrap());
}
