use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use docchat_cache::{
    CacheClass, CacheConfig, CacheError, CacheKey, CacheLayer, CachePolicy, CacheStore,
    CacheTtlConfig, Fence, InMemoryCacheStore, Invalidation, MAX_ENTRY_TTL,
};
use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
struct ChatSummary {
    id: String,
    title: String,
}

fn summary(title: &str) -> ChatSummary {
    ChatSummary {
        id: "c1".to_string(),
        title: title.to_string(),
    }
}

fn layer() -> CacheLayer {
    CacheLayer::new(Arc::new(InMemoryCacheStore::new(64)), CachePolicy::default())
}

#[tokio::test]
async fn test_get_or_load_hits_after_first_load() {
    let cache = layer();
    let key = CacheKey::chat_metadata("c1");
    let counter = AtomicUsize::new(0);
    let loads = &counter;

    for _ in 0..3 {
        let value = cache
            .get_or_load(&key, || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(Some(summary("Reports")))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(summary("Reports")));
    }

    assert_eq!(counter.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_absent_results_are_not_cached() {
    let cache = layer();
    let key = CacheKey::chat_metadata("missing");
    let counter = AtomicUsize::new(0);
    let loads = &counter;

    for _ in 0..2 {
        let value: Option<ChatSummary> = cache
            .get_or_load(&key, || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(None)
            })
            .await
            .unwrap();
        assert!(value.is_none());
    }

    assert_eq!(counter.load(Ordering::SeqCst), 2);
}

#[tokio::test]
async fn test_absent_load_evicts_stale_value() {
    let cache = layer();
    let key = CacheKey::chat_metadata("c1");
    cache.put(&key, &summary("Old")).await;

    cache.invalidate(&key).await;
    let value: Option<ChatSummary> = cache
        .get_or_load(&key, || async { Ok::<_, String>(None) })
        .await
        .unwrap();

    assert!(value.is_none());
    assert!(cache.get::<ChatSummary>(&key).await.is_none());
}

#[tokio::test]
async fn test_loader_errors_propagate_and_nothing_is_cached() {
    let cache = layer();
    let key = CacheKey::message_history("c1");

    let err = cache
        .get_or_load::<ChatSummary, _, _, _>(&key, || async { Err("store down".to_string()) })
        .await
        .unwrap_err();
    assert_eq!(err, "store down");
    assert!(cache.get::<ChatSummary>(&key).await.is_none());
}

#[tokio::test]
async fn test_get_after_invalidate_misses() {
    let cache = layer();
    let key = CacheKey::chat_metadata("c1");
    cache.put(&key, &summary("Reports")).await;
    assert_eq!(cache.get(&key).await, Some(summary("Reports")));

    cache.invalidate(&key).await;
    assert!(cache.get::<ChatSummary>(&key).await.is_none());
}

#[tokio::test]
async fn test_invalidation_is_idempotent() {
    let cache = layer();
    let key = CacheKey::chat_list("u1");
    cache.put(&key, &vec![summary("A")]).await;

    cache.invalidate(&key).await;
    cache.invalidate(&key).await;
    cache.invalidate_all(CacheClass::ChatList, "u1").await;

    assert!(cache.get::<Vec<ChatSummary>>(&key).await.is_none());
}

#[tokio::test]
async fn test_invalidate_chat_drops_every_derived_entry() {
    let cache = layer();
    let metadata = CacheKey::chat_metadata("c1");
    let history = CacheKey::message_history("c1");
    let window = CacheKey::recent_context("c1", "turns=5");
    let list = CacheKey::chat_list("u1");
    let other_chat = CacheKey::chat_metadata("c2");

    cache.put(&metadata, &summary("A")).await;
    cache.put(&history, &vec!["m1".to_string()]).await;
    cache.put(&window, &vec!["m1".to_string()]).await;
    cache.put(&list, &vec![summary("A")]).await;
    cache.put(&other_chat, &summary("B")).await;

    cache.invalidate_chat("c1", Some("u1")).await;

    assert!(cache.get::<ChatSummary>(&metadata).await.is_none());
    assert!(cache.get::<Vec<String>>(&history).await.is_none());
    assert!(cache.get::<Vec<String>>(&window).await.is_none());
    assert!(cache.get::<Vec<ChatSummary>>(&list).await.is_none());
    assert_eq!(cache.get(&other_chat).await, Some(summary("B")));
}

#[tokio::test]
async fn test_load_racing_invalidation_is_not_installed() {
    let cache = layer();
    let key = CacheKey::message_history("c1");
    let writer = cache.clone();

    let value = cache
        .get_or_load(&key, || async move {
            // A write lands while the read is still loading
            writer.invalidate_chat("c1", None).await;
            Ok::<_, String>(Some(vec!["stale".to_string()]))
        })
        .await
        .unwrap();

    assert_eq!(value, Some(vec!["stale".to_string()]));
    assert!(cache.get::<Vec<String>>(&key).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_entries_expire_after_class_ttl() {
    let cache = layer();
    let window = CacheKey::recent_context("c1", "turns=5");
    let metadata = CacheKey::chat_metadata("c1");
    cache.put(&window, &vec!["m1".to_string()]).await;
    cache.put(&metadata, &summary("A")).await;

    tokio::time::advance(Duration::from_secs(599)).await;
    assert!(cache.get::<Vec<String>>(&window).await.is_some());

    tokio::time::advance(Duration::from_secs(2)).await;
    assert!(cache.get::<Vec<String>>(&window).await.is_none());
    // Metadata lives for an hour
    assert!(cache.get::<ChatSummary>(&metadata).await.is_some());

    tokio::time::advance(Duration::from_secs(3600)).await;
    assert!(cache.get::<ChatSummary>(&metadata).await.is_none());
}

#[tokio::test(start_paused = true)]
async fn test_huge_ttl_is_capped_instead_of_overflowing() {
    let config = CacheConfig {
        ttl: CacheTtlConfig {
            chat_metadata_secs: u64::MAX,
            ..CacheTtlConfig::default()
        },
        ..CacheConfig::default()
    };
    let cache = CacheLayer::from_config(&config);
    let key = CacheKey::chat_metadata("c1");
    let counter = AtomicUsize::new(0);
    let loads = &counter;

    for _ in 0..2 {
        let value = cache
            .get_or_load(&key, || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(Some(summary("A")))
            })
            .await
            .unwrap();
        assert_eq!(value, Some(summary("A")));
    }
    assert_eq!(counter.load(Ordering::SeqCst), 1);

    tokio::time::advance(MAX_ENTRY_TTL + Duration::from_secs(1)).await;
    assert!(cache.get::<ChatSummary>(&key).await.is_none());
}

#[tokio::test]
async fn test_undecodable_entry_is_treated_as_miss() {
    let cache = layer();
    let key = CacheKey::chat_metadata("c1");
    cache.put(&key, &"not a summary").await;

    assert!(cache.get::<ChatSummary>(&key).await.is_none());
    // The bad entry was dropped, not just skipped
    assert!(cache.get::<String>(&key).await.is_none());
}

#[tokio::test]
async fn test_disabled_cache_always_loads() {
    let cache = CacheLayer::disabled();
    let key = CacheKey::chat_metadata("c1");
    let counter = AtomicUsize::new(0);
    let loads = &counter;

    for _ in 0..2 {
        cache
            .get_or_load(&key, || async move {
                loads.fetch_add(1, Ordering::SeqCst);
                Ok::<_, String>(Some(summary("A")))
            })
            .await
            .unwrap();
    }

    assert_eq!(counter.load(Ordering::SeqCst), 2);
    assert!(!cache.is_enabled());
}

#[tokio::test]
async fn test_from_config_respects_enabled_flag() {
    let config = CacheConfig {
        enabled: false,
        ..CacheConfig::default()
    };
    let cache = CacheLayer::from_config(&config);
    let key = CacheKey::chat_metadata("c1");
    cache.put(&key, &summary("A")).await;
    assert!(cache.get::<ChatSummary>(&key).await.is_none());
}

/// Backend that fails every operation
#[derive(Default)]
struct FailingStore {
    clears: AtomicUsize,
}

#[async_trait]
impl CacheStore for FailingStore {
    async fn get(&self, _key: &CacheKey) -> docchat_cache::Result<Option<Vec<u8>>> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn fence(&self) -> docchat_cache::Result<Fence> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn put(
        &self,
        _key: &CacheKey,
        _value: Vec<u8>,
        _ttl: Duration,
        _fence: Option<Fence>,
    ) -> docchat_cache::Result<bool> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn invalidate(&self, _targets: &[Invalidation]) -> docchat_cache::Result<u64> {
        Err(CacheError::Backend("timeout".into()))
    }

    async fn health_check(&self) -> docchat_cache::Result<()> {
        Err(CacheError::Unavailable("connection refused".into()))
    }

    async fn clear(&self) -> docchat_cache::Result<()> {
        self.clears.fetch_add(1, Ordering::SeqCst);
        Err(CacheError::Backend("timeout".into()))
    }
}

#[tokio::test]
async fn test_failing_backend_falls_through_to_loader() {
    let backend = Arc::new(FailingStore::default());
    let cache = CacheLayer::new(backend.clone(), CachePolicy::default());
    let key = CacheKey::chat_metadata("c1");

    let value = cache
        .get_or_load(&key, || async { Ok::<_, String>(Some(summary("A"))) })
        .await
        .unwrap();
    assert_eq!(value, Some(summary("A")));

    cache.put(&key, &summary("B")).await;
    assert!(!cache.health_check().await);
}

#[tokio::test]
async fn test_failed_invalidation_flushes_backend() {
    let backend = Arc::new(FailingStore::default());
    let cache = CacheLayer::new(backend.clone(), CachePolicy::default());

    cache.invalidate_chat("c1", Some("u1")).await;

    assert_eq!(backend.clears.load(Ordering::SeqCst), 1);
}
