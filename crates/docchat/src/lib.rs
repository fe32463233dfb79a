//! # Docchat
//!
//! Conversation context and answer-cache engine for chatting with uploaded
//! documents.
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use docchat::prelude::*;
//! use std::sync::Arc;
//!
//! struct NoRetrieval;
//!
//! #[async_trait::async_trait]
//! impl Retriever for NoRetrieval {
//!     async fn retrieve(&self, _chat_id: &str, _question: &str) -> anyhow::Result<Vec<RetrievedExcerpt>> {
//!         Ok(Vec::new())
//!     }
//! }
//!
//! #[tokio::main]
//! async fn main() -> anyhow::Result<()> {
//!     let settings = Settings::load()?;
//!     init_logging(&settings.logging).ok();
//!
//!     let service = ChatServiceBuilder::new()
//!         .settings(settings)
//!         .retriever(Arc::new(NoRetrieval))
//!         .openai_generator()?
//!         .build()?;
//!
//!     let chat = service.create_chat("user-1", "Annual reports").await?;
//!     let answer = service
//!         .ask_question(&chat.id, "What was revenue in 2023?", None)
//!         .await?;
//!     println!("{:?} ({:?})", answer.content, answer.confidence_level);
//!
//!     Ok(())
//! }
//! ```
//!
//! ## Architecture
//!
//! - **`docchat-types`**: chats, messages, sources, answers and statistics
//! - **`docchat-persist`**: ordered message store (in-memory, MongoDB)
//! - **`docchat-cache`**: per-class TTL cache with fenced invalidation
//! - **`docchat-context`**: bounded context windows
//! - **`docchat-llm`**: retriever/generator seams and an OpenAI generator
//! - **`docchat-engine`**: answer assembly, statistics and `ChatService`

pub mod prelude;

pub use docchat_types::{
    Answer, AssistantMetrics, Chat, ChatStatistics, ChatStatus, ConfidenceLevel, Message,
    MessageRole, NewMessage, Source,
};

pub use docchat_persist::{InMemoryMessageStore, MessageStore, PersistError, SortOrder};

#[cfg(feature = "mongodb")]
pub use docchat_persist::MongoMessageStore;

pub use docchat_cache::{
    CacheClass, CacheConfig, CacheError, CacheKey, CacheLayer, CachePolicy, CacheStore,
    InMemoryCacheStore, Invalidation,
};

pub use docchat_context::{ContextBudget, ContextSelector, ContextWindow};

pub use docchat_llm::{
    GenerationRequest, Generator, GeneratorOutput, OpenAiGenerator, RetrievedExcerpt, Retriever,
};

pub use docchat_engine::{
    init_logging, AnswerAssembler, ChatService, ChatServiceBuilder, EngineError, Settings,
    StatisticsAggregator,
};
