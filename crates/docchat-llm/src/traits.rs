use anyhow::Result;
use async_trait::async_trait;
use docchat_types::{Message, Source};
use serde::{Deserialize, Serialize};

/// A passage of an uploaded document judged relevant to a question
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetrievedExcerpt {
    pub document_id: String,
    pub document_name: String,
    pub page_number: Option<u32>,
    /// Expected in [0, 1]; out-of-range scores are clamped during assembly
    pub relevance_score: f64,
    pub excerpt: String,
    /// Retriever's own choice of primary citation, used to break score ties
    #[serde(default)]
    pub is_primary: bool,
}

impl RetrievedExcerpt {
    pub fn new(
        document_id: impl Into<String>,
        document_name: impl Into<String>,
        relevance_score: f64,
        excerpt: impl Into<String>,
    ) -> Self {
        Self {
            document_id: document_id.into(),
            document_name: document_name.into(),
            page_number: None,
            relevance_score,
            excerpt: excerpt.into(),
            is_primary: false,
        }
    }

    pub fn with_page(mut self, page_number: u32) -> Self {
        self.page_number = Some(page_number);
        self
    }

    pub fn flagged_primary(mut self) -> Self {
        self.is_primary = true;
        self
    }
}

impl From<RetrievedExcerpt> for Source {
    fn from(excerpt: RetrievedExcerpt) -> Self {
        Source {
            document_id: excerpt.document_id,
            document_name: excerpt.document_name,
            page_number: excerpt.page_number,
            relevance_score: excerpt.relevance_score,
            excerpt: excerpt.excerpt,
            is_primary: excerpt.is_primary,
        }
    }
}

/// Everything the generator sees for one question
#[derive(Debug, Clone)]
pub struct GenerationRequest {
    pub chat_id: String,
    pub question: String,
    /// Prior turns, oldest first
    pub context: Vec<Message>,
    pub excerpts: Vec<RetrievedExcerpt>,
}

/// Raw generator result, before assembly
#[derive(Debug, Clone, PartialEq)]
pub struct GeneratorOutput {
    pub text: String,
    pub tokens_used: Option<u32>,
    pub latency_ms: Option<u64>,
    /// Self-reported confidence in [0, 1], when the backend provides one
    pub confidence: Option<f64>,
}

impl GeneratorOutput {
    pub fn new(text: impl Into<String>) -> Self {
        Self {
            text: text.into(),
            tokens_used: None,
            latency_ms: None,
            confidence: None,
        }
    }

    pub fn with_tokens(mut self, tokens_used: u32) -> Self {
        self.tokens_used = Some(tokens_used);
        self
    }

    pub fn with_latency_ms(mut self, latency_ms: u64) -> Self {
        self.latency_ms = Some(latency_ms);
        self
    }

    pub fn with_confidence(mut self, confidence: f64) -> Self {
        self.confidence = Some(confidence);
        self
    }
}

/// Finds document passages relevant to a question
#[async_trait]
pub trait Retriever: Send + Sync {
    /// May return an empty list when nothing in the chat's documents matches
    async fn retrieve(&self, chat_id: &str, question: &str) -> Result<Vec<RetrievedExcerpt>>;
}

/// Produces an answer from a question, prior turns and retrieved passages
#[async_trait]
pub trait Generator: Send + Sync {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratorOutput>;
}
