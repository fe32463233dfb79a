use std::time::Duration;

use serde::Deserialize;

use crate::key::CacheClass;

pub const TTL_CHAT_METADATA_SECS: u64 = 60 * 60;
pub const TTL_CHAT_LIST_SECS: u64 = 15 * 60;
pub const TTL_MESSAGE_HISTORY_SECS: u64 = 30 * 60;
pub const TTL_RECENT_CONTEXT_SECS: u64 = 10 * 60;
pub const DEFAULT_CACHE_MAX_ENTRIES: usize = 10_000;

/// How one cache class behaves
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub struct ClassPolicy {
    pub ttl: Duration,
    /// Drop any cached value when a load comes back absent.
    /// Absent results themselves are never stored.
    pub evict_on_absent: bool,
}

impl ClassPolicy {
    pub fn new(ttl: Duration) -> Self {
        Self {
            ttl,
            evict_on_absent: true,
        }
    }
}

/// Mapping `class -> policy` consulted by the generic cache layer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct CachePolicy {
    chat_metadata: ClassPolicy,
    chat_list: ClassPolicy,
    message_history: ClassPolicy,
    recent_context: ClassPolicy,
}

impl CachePolicy {
    pub fn for_class(&self, class: CacheClass) -> &ClassPolicy {
        match class {
            CacheClass::ChatMetadata => &self.chat_metadata,
            CacheClass::ChatList => &self.chat_list,
            CacheClass::MessageHistory => &self.message_history,
            CacheClass::RecentContext => &self.recent_context,
        }
    }

    pub fn ttl(&self, class: CacheClass) -> Duration {
        self.for_class(class).ttl
    }

    pub fn with_class(mut self, class: CacheClass, policy: ClassPolicy) -> Self {
        match class {
            CacheClass::ChatMetadata => self.chat_metadata = policy,
            CacheClass::ChatList => self.chat_list = policy,
            CacheClass::MessageHistory => self.message_history = policy,
            CacheClass::RecentContext => self.recent_context = policy,
        }
        self
    }
}

impl Default for CachePolicy {
    fn default() -> Self {
        CacheTtlConfig::default().into()
    }
}

/// Cache TTL configuration per class, in seconds
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheTtlConfig {
    pub chat_metadata_secs: u64,
    pub chat_list_secs: u64,
    pub message_history_secs: u64,
    pub recent_context_secs: u64,
}

impl Default for CacheTtlConfig {
    fn default() -> Self {
        Self {
            chat_metadata_secs: TTL_CHAT_METADATA_SECS,
            chat_list_secs: TTL_CHAT_LIST_SECS,
            message_history_secs: TTL_MESSAGE_HISTORY_SECS,
            recent_context_secs: TTL_RECENT_CONTEXT_SECS,
        }
    }
}

impl From<CacheTtlConfig> for CachePolicy {
    fn from(ttl: CacheTtlConfig) -> Self {
        Self {
            chat_metadata: ClassPolicy::new(Duration::from_secs(ttl.chat_metadata_secs)),
            chat_list: ClassPolicy::new(Duration::from_secs(ttl.chat_list_secs)),
            message_history: ClassPolicy::new(Duration::from_secs(ttl.message_history_secs)),
            recent_context: ClassPolicy::new(Duration::from_secs(ttl.recent_context_secs)),
        }
    }
}

/// Cache configuration
#[derive(Debug, Clone, PartialEq, Eq, Deserialize)]
#[serde(default)]
pub struct CacheConfig {
    /// Turn the cache off entirely; every read goes to the store
    pub enabled: bool,
    /// Maximum number of entries held by the in-memory backend
    pub max_entries: usize,
    pub ttl: CacheTtlConfig,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            max_entries: DEFAULT_CACHE_MAX_ENTRIES,
            ttl: CacheTtlConfig::default(),
        }
    }
}

impl CacheConfig {
    pub fn policy(&self) -> CachePolicy {
        self.ttl.clone().into()
    }
}
