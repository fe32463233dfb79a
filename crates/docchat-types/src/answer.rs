use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use crate::message::Source;

/// Lower bound (inclusive) of the `medium` confidence bucket
pub const MEDIUM_CONFIDENCE_THRESHOLD: f64 = 0.5;
/// Lower bound (inclusive) of the `high` confidence bucket
pub const HIGH_CONFIDENCE_THRESHOLD: f64 = 0.8;

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ConfidenceLevel {
    Low,
    Medium,
    High,
    Unknown,
}

impl ConfidenceLevel {
    /// Bucket a confidence score. A missing score is `Unknown`, never a number.
    pub fn classify(confidence: Option<f64>) -> Self {
        match confidence {
            Some(score) if score.is_nan() => ConfidenceLevel::Unknown,
            Some(score) if score >= HIGH_CONFIDENCE_THRESHOLD => ConfidenceLevel::High,
            Some(score) if score >= MEDIUM_CONFIDENCE_THRESHOLD => ConfidenceLevel::Medium,
            Some(_) => ConfidenceLevel::Low,
            None => ConfidenceLevel::Unknown,
        }
    }
}

/// Client-facing result of asking a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Answer {
    pub success: bool,
    pub chat_id: String,
    pub question: String,
    /// Id of the persisted user turn, if it was recorded
    pub question_message_id: Option<String>,
    /// Id of the persisted assistant turn; `None` when generation failed
    pub answer_message_id: Option<String>,
    pub content: Option<String>,
    pub sources: Vec<Source>,
    pub primary_source: Option<Source>,
    pub confidence: Option<f64>,
    pub confidence_level: ConfidenceLevel,
    pub tokens_used: Option<u32>,
    pub response_time_ms: Option<u64>,
    pub estimated_cost: Option<f64>,
    pub error_message: Option<String>,
    pub answered_at: DateTime<Utc>,
}

impl Answer {
    /// Build a failed answer. Nothing from the generator is carried over.
    pub fn failure(
        chat_id: impl Into<String>,
        question: impl Into<String>,
        question_message_id: Option<String>,
        error_message: impl Into<String>,
    ) -> Self {
        Self {
            success: false,
            chat_id: chat_id.into(),
            question: question.into(),
            question_message_id,
            answer_message_id: None,
            content: None,
            sources: Vec::new(),
            primary_source: None,
            confidence: None,
            confidence_level: ConfidenceLevel::Unknown,
            tokens_used: None,
            response_time_ms: None,
            estimated_cost: None,
            error_message: Some(error_message.into()),
            answered_at: Utc::now(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_confidence_buckets() {
        assert_eq!(ConfidenceLevel::classify(Some(0.0)), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::classify(Some(0.49)), ConfidenceLevel::Low);
        assert_eq!(ConfidenceLevel::classify(Some(0.5)), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::classify(Some(0.79)), ConfidenceLevel::Medium);
        assert_eq!(ConfidenceLevel::classify(Some(0.80)), ConfidenceLevel::High);
        assert_eq!(ConfidenceLevel::classify(Some(1.0)), ConfidenceLevel::High);
    }

    #[test]
    fn test_missing_confidence_is_unknown() {
        assert_eq!(ConfidenceLevel::classify(None), ConfidenceLevel::Unknown);
        assert_eq!(ConfidenceLevel::classify(Some(f64::NAN)), ConfidenceLevel::Unknown);
    }

    #[test]
    fn test_failure_answer_has_no_generated_fields() {
        let answer = Answer::failure("chat-1", "why?", Some("m-1".to_string()), "timed out");

        assert!(!answer.success);
        assert_eq!(answer.error_message.as_deref(), Some("timed out"));
        assert!(answer.content.is_none());
        assert!(answer.answer_message_id.is_none());
        assert_eq!(answer.confidence_level, ConfidenceLevel::Unknown);
    }
}
