//! Conversation context and answer-cache engine.
//!
//! [`ChatService`] ties the pieces together: it selects prior turns, asks the
//! retriever and generator for an answer, assembles it with source attribution
//! and cost, persists the turns and keeps the cache coherent.

pub mod assembler;
pub mod builder;
pub mod config;
pub mod error;
pub mod service;
pub mod stats;
pub mod telemetry;

pub use assembler::{AnswerAssembler, AssembledAnswer};
pub use builder::ChatServiceBuilder;
pub use config::{
    AnswerConfig, ContextConfig, GeneratorConfig, LoggingConfig, Settings, StatsConfig,
};
pub use error::{EngineError, Result};
pub use service::ChatService;
pub use stats::StatisticsAggregator;
pub use telemetry::init_logging;
