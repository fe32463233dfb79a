//! Read-through, write-invalidate cache for chat metadata, chat lists,
//! message histories and context windows.

pub mod error;
pub mod key;
pub mod layer;
pub mod memory;
pub mod policy;
pub mod store;

pub use error::{CacheError, Result};
pub use key::{CacheClass, CacheKey, Invalidation};
pub use layer::CacheLayer;
pub use memory::{InMemoryCacheStore, MAX_ENTRY_TTL};
pub use policy::{CacheConfig, CachePolicy, CacheTtlConfig, ClassPolicy};
pub use store::{CacheStore, Fence};
