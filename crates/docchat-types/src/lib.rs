pub mod answer;
pub mod chat;
pub mod message;
pub mod stats;

pub use answer::{Answer, ConfidenceLevel, HIGH_CONFIDENCE_THRESHOLD, MEDIUM_CONFIDENCE_THRESHOLD};
pub use chat::{Chat, ChatStatus};
pub use message::{AssistantMetrics, Message, MessageRole, NewMessage, Source};
pub use stats::ChatStatistics;
