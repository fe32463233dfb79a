pub mod dbs;
pub mod error;
pub mod locks;
pub mod memory;
pub mod store;

pub use docchat_types::{AssistantMetrics, Chat, ChatStatus, Message, MessageRole, NewMessage, Source};
pub use error::{PersistError, Result};
pub use locks::{ChatLockGuard, ChatLocks};
pub use memory::InMemoryMessageStore;
pub use store::{MessageStore, SortOrder};

#[cfg(feature = "mongodb")]
pub use dbs::mongo::MongoMessageStore;
