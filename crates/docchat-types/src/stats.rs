use serde::{Deserialize, Serialize};

/// Usage, cost and quality metrics derived from a chat's history
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ChatStatistics {
    pub chat_id: String,
    pub total_messages: u64,
    pub user_messages: u64,
    pub assistant_messages: u64,
    pub total_tokens: u64,
    /// `None` when no answer has a measured response time
    pub average_response_time_ms: Option<f64>,
    /// `None` when no answer has a confidence score
    pub average_confidence: Option<f64>,
    pub low_confidence_answers: u64,
    pub slow_answers: u64,
    pub estimated_cost: f64,
}
