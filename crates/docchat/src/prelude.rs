//! Prelude module for convenient imports
//!
//! Import everything you need with:
//! ```rust
//! use docchat::prelude::*;
//! ```

pub use crate::{
    init_logging, Answer, CacheLayer, Chat, ChatService, ChatServiceBuilder, ChatStatistics,
    ConfidenceLevel, EngineError, GenerationRequest, Generator, GeneratorOutput,
    InMemoryMessageStore, Message, MessageRole, MessageStore, OpenAiGenerator, RetrievedExcerpt,
    Retriever, Settings, Source,
};
