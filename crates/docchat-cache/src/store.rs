use std::time::Duration;

use async_trait::async_trait;

use crate::error::Result;
use crate::key::{CacheKey, Invalidation};

/// Invalidation sequence number observed before a read-through load.
///
/// A fenced put is discarded if any invalidation covering its key happened
/// after the fence was taken, so a value loaded before a write can never be
/// installed after that write's invalidation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, PartialOrd, Ord)]
pub struct Fence(pub u64);

/// Byte-level cache backend
#[async_trait]
pub trait CacheStore: Send + Sync {
    /// Fetch a value. Entries older than their TTL are reported absent.
    async fn get(&self, key: &CacheKey) -> Result<Option<Vec<u8>>>;

    /// Current invalidation sequence, taken before loading from the store
    async fn fence(&self) -> Result<Fence>;

    /// Store a value, replacing any previous one.
    ///
    /// With `Some(fence)` the write only lands if no invalidation of the key
    /// happened after the fence. Returns whether the value was stored.
    async fn put(
        &self,
        key: &CacheKey,
        value: Vec<u8>,
        ttl: Duration,
        fence: Option<Fence>,
    ) -> Result<bool>;

    /// Apply all invalidations as one step. Returns the number of entries removed.
    async fn invalidate(&self, targets: &[Invalidation]) -> Result<u64>;

    async fn health_check(&self) -> Result<()>;

    /// Remove every entry (used as a last resort when invalidation fails)
    async fn clear(&self) -> Result<()>;
}
