use std::future::Future;
use std::sync::Arc;

use serde::de::DeserializeOwned;
use serde::Serialize;

use crate::key::{CacheClass, CacheKey, Invalidation};
use crate::memory::InMemoryCacheStore;
use crate::policy::{CacheConfig, CachePolicy};
use crate::store::{CacheStore, Fence};

/// Typed, fail-open cache in front of the message store.
///
/// Backend errors never reach the caller: reads degrade to misses, writes are
/// skipped, and a failed invalidation falls back to flushing the backend.
#[derive(Clone)]
pub struct CacheLayer {
    store: Arc<dyn CacheStore>,
    policy: CachePolicy,
    enabled: bool,
}

impl CacheLayer {
    pub fn new(store: Arc<dyn CacheStore>, policy: CachePolicy) -> Self {
        Self {
            store,
            policy,
            enabled: true,
        }
    }

    /// In-memory cache built from configuration
    pub fn from_config(config: &CacheConfig) -> Self {
        Self {
            store: Arc::new(InMemoryCacheStore::new(config.max_entries)),
            policy: config.policy(),
            enabled: config.enabled,
        }
    }

    /// A cache that never stores anything; every read goes to the loader
    pub fn disabled() -> Self {
        Self {
            store: Arc::new(InMemoryCacheStore::default()),
            policy: CachePolicy::default(),
            enabled: false,
        }
    }

    pub fn policy(&self) -> &CachePolicy {
        &self.policy
    }

    pub fn is_enabled(&self) -> bool {
        self.enabled
    }

    pub async fn get<T: DeserializeOwned>(&self, key: &CacheKey) -> Option<T> {
        if !self.enabled {
            return None;
        }

        let bytes = match self.store.get(key).await {
            Ok(Some(bytes)) => bytes,
            Ok(None) => {
                tracing::debug!(key = %key, "Cache miss");
                return None;
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache read failed, bypassing cache");
                return None;
            }
        };

        match serde_json::from_slice(&bytes) {
            Ok(value) => {
                tracing::debug!(key = %key, "Cache hit");
                Some(value)
            }
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Undecodable cache entry, dropping it");
                self.invalidate(key).await;
                None
            }
        }
    }

    /// Store a value with its class TTL, replacing any previous entry
    pub async fn put<T: Serialize>(&self, key: &CacheKey, value: &T) {
        self.store_value(key, value, None).await;
    }

    async fn store_value<T: Serialize>(&self, key: &CacheKey, value: &T, fence: Option<Fence>) {
        if !self.enabled {
            return;
        }
        let bytes = match serde_json::to_vec(value) {
            Ok(bytes) => bytes,
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Failed to serialize cache value");
                return;
            }
        };
        let ttl = self.policy.ttl(key.class);
        if let Err(e) = self.store.put(key, bytes, ttl, fence).await {
            tracing::warn!(key = %key, error = %e, "Cache write failed, skipping");
        }
    }

    /// Read-through lookup.
    ///
    /// On a miss the loader is consulted and a present result is cached.
    /// Absent results are never cached. The fill is fenced, so if the key is
    /// invalidated while the loader runs the loaded value is not installed.
    pub async fn get_or_load<T, E, F, Fut>(&self, key: &CacheKey, loader: F) -> Result<Option<T>, E>
    where
        T: Serialize + DeserializeOwned,
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Option<T>, E>>,
    {
        if let Some(hit) = self.get(key).await {
            return Ok(Some(hit));
        }
        if !self.enabled {
            return loader().await;
        }

        let fence = match self.store.fence().await {
            Ok(fence) => Some(fence),
            Err(e) => {
                tracing::warn!(key = %key, error = %e, "Cache unavailable, loading from store only");
                return loader().await;
            }
        };

        let loaded = loader().await?;
        match &loaded {
            Some(value) => self.store_value(key, value, fence).await,
            None if self.policy.for_class(key.class).evict_on_absent => {
                self.invalidate(key).await;
            }
            None => {}
        }
        Ok(loaded)
    }

    pub async fn invalidate(&self, key: &CacheKey) {
        self.apply(vec![Invalidation::Key(key.clone())]).await;
    }

    /// Drop every entry of `class` for entity `id`
    pub async fn invalidate_all(&self, class: CacheClass, id: &str) {
        self.apply(vec![Invalidation::scope(class, id)]).await;
    }

    /// Drop everything derived from one chat in a single step: its metadata,
    /// history and context windows, plus the owner's chat list when known.
    pub async fn invalidate_chat(&self, chat_id: &str, owner_id: Option<&str>) {
        let mut targets = vec![
            Invalidation::scope(CacheClass::ChatMetadata, chat_id),
            Invalidation::scope(CacheClass::MessageHistory, chat_id),
            Invalidation::scope(CacheClass::RecentContext, chat_id),
        ];
        if let Some(owner_id) = owner_id {
            targets.push(Invalidation::scope(CacheClass::ChatList, owner_id));
        }
        self.apply(targets).await;
    }

    async fn apply(&self, targets: Vec<Invalidation>) {
        // Invalidate even when disabled so re-enabling never serves stale data
        match self.store.invalidate(&targets).await {
            Ok(removed) => {
                tracing::debug!(targets = targets.len(), removed, "Cache invalidated");
            }
            Err(e) => {
                tracing::error!(error = %e, "Cache invalidation failed, flushing cache");
                if let Err(e) = self.store.clear().await {
                    tracing::error!(error = %e, "Cache flush failed");
                }
            }
        }
    }

    pub async fn health_check(&self) -> bool {
        match self.store.health_check().await {
            Ok(()) => true,
            Err(e) => {
                tracing::warn!(error = %e, "Cache health check failed");
                false
            }
        }
    }

    pub async fn clear(&self) {
        if let Err(e) = self.store.clear().await {
            tracing::warn!(error = %e, "Cache clear failed");
        }
    }
}

impl Default for CacheLayer {
    fn default() -> Self {
        Self::from_config(&CacheConfig::default())
    }
}
