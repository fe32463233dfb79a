// OpenAI-compatible generator (HTTP direct, no SDK)

use std::time::Instant;

use anyhow::{Context, Result};
use async_trait::async_trait;
use docchat_types::MessageRole;
use reqwest::header::{HeaderMap, HeaderValue, AUTHORIZATION, CONTENT_TYPE};
use serde::Deserialize;
use serde_json::{json, Value};

use crate::traits::{GenerationRequest, Generator, GeneratorOutput};

pub const OPENAI_API_BASE: &str = "https://api.openai.com/v1";
pub const DEFAULT_MODEL: &str = "gpt-4o-mini";

const SYSTEM_PROMPT: &str = "You answer questions about the user's documents. \
Ground every answer in the excerpts below and say so when they do not contain the answer.";

/// `Generator` backed by a `/chat/completions` endpoint
pub struct OpenAiGenerator {
    http_client: reqwest::Client,
    base_url: String,
    model: String,
    temperature: Option<f32>,
    max_tokens: Option<u32>,
}

// Manual impl: the client's default headers carry the API key.
impl std::fmt::Debug for OpenAiGenerator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("OpenAiGenerator")
            .field("base_url", &self.base_url)
            .field("model", &self.model)
            .field("temperature", &self.temperature)
            .field("max_tokens", &self.max_tokens)
            .finish_non_exhaustive()
    }
}

impl OpenAiGenerator {
    pub fn new(api_key: impl Into<String>) -> Result<Self> {
        let api_key = api_key.into();

        let mut headers = HeaderMap::new();
        headers.insert(CONTENT_TYPE, HeaderValue::from_static("application/json"));
        headers.insert(
            AUTHORIZATION,
            HeaderValue::from_str(&format!("Bearer {}", api_key))
                .context("Invalid API key format")?,
        );

        let http_client = reqwest::Client::builder()
            .default_headers(headers)
            .build()
            .context("Failed to create HTTP client")?;

        Ok(Self {
            http_client,
            base_url: OPENAI_API_BASE.to_string(),
            model: DEFAULT_MODEL.to_string(),
            temperature: None,
            max_tokens: None,
        })
    }

    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    pub fn with_model(mut self, model: impl Into<String>) -> Self {
        self.model = model.into();
        self
    }

    pub fn with_temperature(mut self, temperature: f32) -> Self {
        self.temperature = Some(temperature);
        self
    }

    pub fn with_max_tokens(mut self, max_tokens: u32) -> Self {
        self.max_tokens = Some(max_tokens);
        self
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    fn build_messages(request: &GenerationRequest) -> Vec<Value> {
        let mut system = SYSTEM_PROMPT.to_string();
        if request.excerpts.is_empty() {
            system.push_str("\n\nNo relevant excerpts were found.");
        } else {
            system.push_str("\n\nExcerpts:");
            for (i, excerpt) in request.excerpts.iter().enumerate() {
                let page = excerpt
                    .page_number
                    .map(|p| format!(", page {}", p))
                    .unwrap_or_default();
                system.push_str(&format!(
                    "\n[{}] {}{}: {}",
                    i + 1,
                    excerpt.document_name,
                    page,
                    excerpt.excerpt
                ));
            }
        }

        let mut messages = Vec::with_capacity(request.context.len() + 2);
        messages.push(json!({ "role": "system", "content": system }));
        for turn in &request.context {
            let role = match turn.role {
                MessageRole::User => "user",
                MessageRole::Assistant => "assistant",
            };
            messages.push(json!({ "role": role, "content": turn.content }));
        }
        messages.push(json!({ "role": "user", "content": request.question }));
        messages
    }

    fn build_payload(&self, request: &GenerationRequest) -> Value {
        let mut payload = json!({
            "model": self.model,
            "messages": Self::build_messages(request),
            "stream": false,
        });

        if let Some(obj) = payload.as_object_mut() {
            if let Some(temperature) = self.temperature {
                obj.insert("temperature".to_string(), json!(temperature));
            }
            if let Some(max_tokens) = self.max_tokens {
                obj.insert("max_tokens".to_string(), json!(max_tokens));
            }
        }
        payload
    }
}

#[derive(Debug, Deserialize)]
struct ChatCompletionResponse {
    choices: Vec<ChatChoice>,
    usage: Option<ChatUsage>,
}

#[derive(Debug, Deserialize)]
struct ChatChoice {
    message: ChatChoiceMessage,
}

#[derive(Debug, Deserialize)]
struct ChatChoiceMessage {
    content: Option<String>,
}

#[derive(Debug, Deserialize)]
struct ChatUsage {
    total_tokens: u32,
}

#[async_trait]
impl Generator for OpenAiGenerator {
    async fn generate(&self, request: GenerationRequest) -> Result<GeneratorOutput> {
        let payload = self.build_payload(&request);
        let started = Instant::now();

        let response = self
            .http_client
            .post(format!("{}/chat/completions", self.base_url))
            .json(&payload)
            .send()
            .await
            .context("Failed to send request")?;

        if !response.status().is_success() {
            let status = response.status();
            let error_text = response.text().await.unwrap_or_default();
            anyhow::bail!("OpenAI API error ({}): {}", status, error_text);
        }

        let raw: ChatCompletionResponse = response
            .json()
            .await
            .context("Failed to parse response")?;
        let latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let text = raw
            .choices
            .into_iter()
            .next()
            .and_then(|choice| choice.message.content)
            .filter(|text| !text.trim().is_empty())
            .context("Response contained no answer text")?;

        tracing::debug!(
            chat_id = %request.chat_id,
            model = %self.model,
            latency_ms,
            "Generated answer"
        );

        Ok(GeneratorOutput {
            text,
            tokens_used: raw.usage.map(|usage| usage.total_tokens),
            latency_ms: Some(latency_ms),
            confidence: None,
        })
    }
}
