//! Integration tests for the periodic sweeper and the cache registry.

mod common;

use bytes::Bytes;
use common::test_stack;
use darkroom_cache::{Cache, CacheRegistry, ContentCache, Sweeper};
use darkroom_core::CachePolicy;
use darkroom_store::stream_bytes;
use std::sync::Arc;
use std::time::Duration as StdDuration;
use time::{Duration, OffsetDateTime};

#[tokio::test]
async fn test_sweeper_evicts_expired_entries() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;

    let thumbs = Arc::new(
        ContentCache::new("thumbs", content.clone(), index.clone(), CachePolicy::default())
            .await
            .unwrap(),
    );
    let probes: Arc<Cache<String>> =
        Arc::new(Cache::new("probes", index.clone(), CachePolicy::default()).await.unwrap());

    thumbs
        .put_stream(
            "dead",
            stream_bytes(Bytes::from("x")),
            Some(OffsetDateTime::now_utc() - Duration::seconds(1)),
        )
        .await
        .unwrap();
    probes
        .put(
            "dead",
            &"value".to_string(),
            Some(OffsetDateTime::now_utc() - Duration::seconds(1)),
        )
        .await
        .unwrap();

    let mut registry = CacheRegistry::new();
    registry.register_content(thumbs.clone()).unwrap();
    registry.register(probes.clone()).unwrap();

    let sweeper = Sweeper::spawn(Arc::new(registry), StdDuration::from_millis(20));

    // Give the sweeper a couple of ticks.
    tokio::time::sleep(StdDuration::from_millis(200)).await;
    sweeper.shutdown().await;

    assert_eq!(thumbs.stats().await.unwrap().entries, 0);
    assert_eq!(probes.stats().await.unwrap().entries, 0);
    assert!(!content.exists("dead").await.unwrap());
}

#[tokio::test]
async fn test_registry_rejects_duplicate_names() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;

    let first = Arc::new(
        ContentCache::new("thumbs", content.clone(), index.clone(), CachePolicy::default())
            .await
            .unwrap(),
    );
    let second = Arc::new(
        ContentCache::new("thumbs", content, index, CachePolicy::default())
            .await
            .unwrap(),
    );

    let mut registry = CacheRegistry::new();
    registry.register_content(first).unwrap();
    assert!(registry.register_content(second).is_err());
}

#[tokio::test]
async fn test_registry_lookup() {
    let dir = tempfile::tempdir().unwrap();
    let (content, index) = test_stack(&dir).await;

    let thumbs = Arc::new(
        ContentCache::new("thumbs", content, index, CachePolicy::default())
            .await
            .unwrap(),
    );
    let mut registry = CacheRegistry::new();
    registry.register_content(thumbs).unwrap();

    assert!(registry.content_cache("thumbs").is_some());
    assert!(registry.content_cache("unknown").is_none());
    assert_eq!(registry.sweep_targets().len(), 1);
}
