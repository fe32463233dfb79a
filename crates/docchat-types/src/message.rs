use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A persisted conversation turn
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub id: String,
    pub chat_id: String,
    /// Per-chat insertion sequence, used to break timestamp ties
    pub seq: u64,
    pub role: MessageRole,
    pub content: String,
    pub created_at: DateTime<Utc>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Only present on assistant messages
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AssistantMetrics>,
}

impl Message {
    pub fn is_assistant(&self) -> bool {
        self.role == MessageRole::Assistant
    }

    pub fn sources(&self) -> &[Source] {
        self.metrics
            .as_ref()
            .map(|m| m.sources.as_slice())
            .unwrap_or(&[])
    }

    /// Length of the content in characters, used for context budgets
    pub fn char_len(&self) -> usize {
        self.content.chars().count()
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    User,
    Assistant,
}

/// Usage metrics recorded for an assistant answer.
///
/// Every numeric field is optional: an unmeasured value stays `None` and is
/// excluded from aggregates instead of being counted as zero.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AssistantMetrics {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub tokens_used: Option<u32>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub response_time_ms: Option<u64>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub confidence: Option<f64>,
    #[serde(default)]
    pub sources: Vec<Source>,
}

/// A document citation attached to an answer
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Source {
    pub document_id: String,
    pub document_name: String,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub page_number: Option<u32>,
    pub relevance_score: f64,
    #[serde(default)]
    pub excerpt: String,
    #[serde(default)]
    pub is_primary: bool,
}

impl Source {
    pub fn new(
        document_id: impl Into<String>,
        document_name: impl Into<String>,
        relevance_score: f64,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            document_name: document_name.into(),
            page_number: None,
            relevance_score,
            excerpt: String::new(),
            is_primary: false,
        }
    }

    pub fn with_page(mut self, page: u32) -> Self {
        self.page_number = Some(page);
        self
    }

    pub fn with_excerpt(mut self, excerpt: impl Into<String>) -> Self {
        self.excerpt = excerpt.into();
        self
    }

    pub fn primary(mut self) -> Self {
        self.is_primary = true;
        self
    }
}

/// A turn before persistence. The store assigns id, sequence and timestamp.
#[derive(Debug, Clone, PartialEq)]
pub struct NewMessage {
    pub role: MessageRole,
    pub content: String,
    pub parent_id: Option<String>,
    pub metrics: Option<AssistantMetrics>,
}

impl NewMessage {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
            parent_id: None,
            metrics: None,
        }
    }

    pub fn assistant(content: impl Into<String>, metrics: AssistantMetrics) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
            parent_id: None,
            metrics: Some(metrics),
        }
    }

    pub fn with_parent(mut self, parent_id: impl Into<String>) -> Self {
        self.parent_id = Some(parent_id.into());
        self
    }
}
