use std::num::NonZeroUsize;
use std::time::Duration;

use async_trait::async_trait;
use lru::LruCache;
use tokio::sync::Mutex;
use tokio::time::Instant;

use crate::error::Result;
use crate::key::{scope_of, CacheClass, CacheKey, Invalidation};
use crate::store::{CacheStore, Fence};

const DEFAULT_CACHE_CAPACITY: NonZeroUsize = match NonZeroUsize::new(1000) {
    Some(n) => n,
    None => unreachable!(),
};

/// Longest time an entry may live, whatever TTL the class is configured with
pub const MAX_ENTRY_TTL: Duration = Duration::from_secs(365 * 24 * 60 * 60);

#[derive(Debug, Clone)]
struct CacheEntry {
    data: Vec<u8>,
    class: CacheClass,
    id: String,
    expires_at: Instant,
}

impl CacheEntry {
    fn is_expired(&self) -> bool {
        Instant::now() >= self.expires_at
    }
}

struct State {
    entries: LruCache<String, CacheEntry>,
    /// Key or `class:id` scope -> sequence of its last invalidation
    tombstones: LruCache<String, u64>,
    /// Highest sequence ever evicted from `tombstones`; fences older than this
    /// can no longer be checked precisely and are rejected
    floor: u64,
    seq: u64,
}

impl State {
    fn record(&mut self, path: String, seq: u64) {
        if let Some((evicted, evicted_seq)) = self.tombstones.push(path.clone(), seq) {
            if evicted != path {
                self.floor = self.floor.max(evicted_seq);
            }
        }
    }

    fn invalidated_since(&self, key: &CacheKey, fence: Fence) -> bool {
        if fence.0 < self.floor {
            return true;
        }
        [key.to_string(), key.scope()]
            .iter()
            .filter_map(|path| self.tombstones.peek(path))
            .any(|&seq| seq > fence.0)
    }
}

/// In-memory cache with LRU eviction and lazy TTL expiry.
///
/// Entries, tombstones and the invalidation sequence share one lock, so an
/// invalidation and a racing fenced put are totally ordered.
pub struct InMemoryCacheStore {
    state: Mutex<State>,
}

impl InMemoryCacheStore {
    pub fn new(max_entries: usize) -> Self {
        let capacity = NonZeroUsize::new(max_entries).unwrap_or(DEFAULT_CACHE_CAPACITY);
        Self {
            state: Mutex::new(State {
                entries: LruCache::new(capacity),
                tombstones: LruCache::new(capacity),
                floor: 0,
                seq: 0,
            }),
        }
    }

    pub async fn len(&self) -> usize {
        self.state.lock().await.entries.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

impl Default for InMemoryCacheStore {
    fn default() -> Self {
        Self::new(DEFAULT_CACHE_CAPACITY.get())
    }
}

#[async_trait]
impl CacheStore for InMemoryCacheStore {
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>> {
        let path = key.to_string();
        let mut state = self.state.lock().await;

        let expired = match state.entries.get(&path) {
            Some(entry) if !entry.is_expired() => return Ok(Some(entry.data.clone())),
            Some(_) => true,
            None => false,
        };
        if expired {
            state.entries.pop(&path);
        }
        Ok(None)
    }

    async fn fence(&self) -> Result<Fence> {
        Ok(Fence(self.state.lock().await.seq))
    }

    async fn put(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        ttl: Duration,
        fence: Option<Fence>,
    ) -> Result<bool> {
        let mut state = self.state.lock().await;

        if let Some(fence) = fence {
            if state.invalidated_since(key, fence) {
                tracing::debug!(key = %key, "Discarding cache fill that raced an invalidation");
                return Ok(false);
            }
        }

        let now = Instant::now();
        let expires_at = now.checked_add(ttl.min(MAX_ENTRY_TTL)).unwrap_or(now);
        let entry = CacheEntry {
            data: value,
            class: key.class,
            id: key.id.clone(),
            expires_at,
        };
        state.entries.push(key.to_string(), entry);
        Ok(true)
    }

    async fn invalidate(&self, targets: &[Invalidation]) -> Result<u64> {
        let mut state = self.state.lock().await;
        state.seq += 1;
        let seq = state.seq;
        let mut removed = 0u64;

        for target in targets {
            match target {
                Invalidation::Key(key) => {
                    let path = key.to_string();
                    if state.entries.pop(&path).is_some() {
                        removed += 1;
                    }
                    state.record(path, seq);
                }
                Invalidation::Scope { class, id } => {
                    let doomed: Vec<String> = state
                        .entries
                        .iter()
                        .filter(|(_, entry)| entry.class == *class && entry.id == *id)
                        .map(|(path, _)| path.clone())
                        .collect();
                    for path in &doomed {
                        state.entries.pop(path);
                    }
                    removed += doomed.len() as u64;
                    state.record(scope_of(*class, id), seq);
                }
            }
        }

        Ok(removed)
    }

    async fn health_check(&self) -> Result<()> {
        Ok(())
    }

    async fn clear(&self) -> Result<()> {
        let mut state = self.state.lock().await;
        state.seq += 1;
        state.floor = state.seq;
        state.entries.clear();
        state.tombstones.clear();
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    const TTL: Duration = Duration::from_secs(60);

    #[tokio::test]
    async fn test_fenced_put_loses_to_later_invalidation() {
        let store = InMemoryCacheStore::new(16);
        let key = CacheKey::message_history("c1");

        let fence = store.fence().await.unwrap();
        store.invalidate(&[Invalidation::Key(key.clone())]).await.unwrap();

        let stored = store.put(&key, b"stale".to_vec(), TTL, Some(fence)).await.unwrap();
        assert!(!stored);
        assert!(store.get(&key).await.unwrap().is_none());
    }

    #[tokio::test]
    async fn test_scope_invalidation_fences_every_variant() {
        let store = InMemoryCacheStore::new(16);
        let five = CacheKey::recent_context("c1", "5");
        let ten = CacheKey::recent_context("c1", "10");

        let fence = store.fence().await.unwrap();
        store
            .invalidate(&[Invalidation::scope(CacheClass::RecentContext, "c1")])
            .await
            .unwrap();

        assert!(!store.put(&five, b"x".to_vec(), TTL, Some(fence)).await.unwrap());
        assert!(!store.put(&ten, b"x".to_vec(), TTL, Some(fence)).await.unwrap());

        let fresh = store.fence().await.unwrap();
        assert!(store.put(&five, b"y".to_vec(), TTL, Some(fresh)).await.unwrap());
    }

    #[tokio::test]
    async fn test_unrelated_invalidation_does_not_block_fill() {
        let store = InMemoryCacheStore::new(16);
        let key = CacheKey::chat_metadata("c1");

        let fence = store.fence().await.unwrap();
        store
            .invalidate(&[Invalidation::Key(CacheKey::chat_metadata("c2"))])
            .await
            .unwrap();

        assert!(store.put(&key, b"v".to_vec(), TTL, Some(fence)).await.unwrap());
        assert_eq!(store.get(&key).await.unwrap(), Some(b"v".to_vec()));
    }

    #[tokio::test]
    async fn test_evicted_tombstones_reject_old_fences() {
        let store = InMemoryCacheStore::new(2);
        let target = CacheKey::chat_metadata("target");

        let fence = store.fence().await.unwrap();
        store.invalidate(&[Invalidation::Key(target.clone())]).await.unwrap();
        // Push the target's tombstone out of the bounded tombstone list
        for i in 0..3 {
            let other = CacheKey::chat_metadata(&format!("other-{}", i));
            store.invalidate(&[Invalidation::Key(other)]).await.unwrap();
        }

        assert!(!store.put(&target, b"stale".to_vec(), TTL, Some(fence)).await.unwrap());
    }

    #[tokio::test]
    async fn test_clear_drops_entries_and_in_flight_fills() {
        let store = InMemoryCacheStore::new(16);
        let key = CacheKey::chat_list("u1");
        store.put(&key, b"v".to_vec(), TTL, None).await.unwrap();

        let fence = store.fence().await.unwrap();
        store.clear().await.unwrap();

        assert!(store.is_empty().await);
        assert!(!store.put(&key, b"v".to_vec(), TTL, Some(fence)).await.unwrap());
    }
}
