use std::borrow::Cow;
use std::fmt;

use serde::{Deserialize, Serialize};

/// Kind of data held in the cache. Each class has its own TTL.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum CacheClass {
    /// A single chat's metadata, keyed by chat id
    ChatMetadata,
    /// The chats of one owner, keyed by owner id
    ChatList,
    /// Full ordered history of a chat, keyed by chat id
    MessageHistory,
    /// Bounded context window of a chat, keyed by chat id
    RecentContext,
}

impl CacheClass {
    pub const ALL: [CacheClass; 4] = [
        CacheClass::ChatMetadata,
        CacheClass::ChatList,
        CacheClass::MessageHistory,
        CacheClass::RecentContext,
    ];

    pub fn as_str(&self) -> &'static str {
        match self {
            CacheClass::ChatMetadata => "chat_metadata",
            CacheClass::ChatList => "chat_list",
            CacheClass::MessageHistory => "message_history",
            CacheClass::RecentContext => "recent_context",
        }
    }
}

impl fmt::Display for CacheClass {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Logical cache key: class + entity id, with an optional variant for
/// several shapes of the same entity (e.g. context windows of different size).
#[derive(Debug, Clone, PartialEq, Eq, Hash)]
pub struct CacheKey {
    pub class: CacheClass,
    pub id: String,
    pub variant: Option<String>,
}

impl CacheKey {
    pub fn new(class: CacheClass, id: impl Into<String>) -> Self {
        Self {
            class,
            id: id.into(),
            variant: None,
        }
    }

    pub fn with_variant(mut self, variant: impl Into<String>) -> Self {
        self.variant = Some(variant.into());
        self
    }

    pub fn chat_metadata(chat_id: &str) -> Self {
        Self::new(CacheClass::ChatMetadata, chat_id)
    }

    pub fn chat_list(owner_id: &str) -> Self {
        Self::new(CacheClass::ChatList, owner_id)
    }

    pub fn message_history(chat_id: &str) -> Self {
        Self::new(CacheClass::MessageHistory, chat_id)
    }

    pub fn recent_context(chat_id: &str, variant: impl Into<String>) -> Self {
        Self::new(CacheClass::RecentContext, chat_id).with_variant(variant)
    }

    /// `class:id`, shared by every variant of this entity
    pub fn scope(&self) -> String {
        scope_of(self.class, &self.id)
    }
}

pub(crate) fn scope_of(class: CacheClass, id: &str) -> String {
    format!("{}:{}", class, escape_id(id))
}

/// `#` separates the variant, so ids escape it (and the escape character)
fn escape_id(id: &str) -> Cow<'_, str> {
    if id.contains(['#', '\\']) {
        Cow::Owned(id.replace('\\', "\\\\").replace('#', "\\#"))
    } else {
        Cow::Borrowed(id)
    }
}

impl fmt::Display for CacheKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match &self.variant {
            Some(variant) => write!(f, "{}#{}", self.scope(), variant),
            None => f.write_str(&self.scope()),
        }
    }
}

/// Something to drop from the cache
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum Invalidation {
    /// Exactly one key
    Key(CacheKey),
    /// Every key of `class` for entity `id`, all variants included
    Scope { class: CacheClass, id: String },
}

impl Invalidation {
    pub fn scope(class: CacheClass, id: impl Into<String>) -> Self {
        Invalidation::Scope {
            class,
            id: id.into(),
        }
    }
}
