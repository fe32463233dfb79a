use std::sync::Arc;
use std::time::{Duration, Instant};

use chrono::{DateTime, Utc};
use docchat_cache::{CacheClass, CacheKey, CacheLayer};
use docchat_context::{ContextBudget, ContextSelector, ContextWindow};
use docchat_llm::{GenerationRequest, Generator, GeneratorOutput, RetrievedExcerpt, Retriever};
use docchat_persist::{MessageStore, SortOrder};
use docchat_types::{Answer, Chat, ChatStatistics, Message, NewMessage};

use crate::assembler::AnswerAssembler;
use crate::config::ContextConfig;
use crate::error::{EngineError, Result};
use crate::stats::StatisticsAggregator;

/// Question answering over a chat's documents and history.
///
/// Reads go through the cache; every write to a chat invalidates what was
/// derived from it before the call returns.
#[derive(Clone)]
pub struct ChatService {
    pub(crate) store: Arc<dyn MessageStore>,
    pub(crate) cache: CacheLayer,
    pub(crate) selector: ContextSelector,
    pub(crate) retriever: Arc<dyn Retriever>,
    pub(crate) generator: Arc<dyn Generator>,
    pub(crate) assembler: AnswerAssembler,
    pub(crate) aggregator: StatisticsAggregator,
    pub(crate) context: ContextConfig,
    pub(crate) generator_timeout: Duration,
}

impl ChatService {
    pub fn cache(&self) -> &CacheLayer {
        &self.cache
    }

    pub fn store(&self) -> &Arc<dyn MessageStore> {
        &self.store
    }

    /// Answer a question using the chat's documents and recent turns.
    ///
    /// The user turn is always persisted. A retriever or generator failure,
    /// including a timeout, yields `Answer { success: false, .. }` and no
    /// assistant turn. Unknown chats and invalid input are errors.
    pub async fn ask_question(
        &self,
        chat_id: &str,
        question: &str,
        max_context_turns: Option<usize>,
    ) -> Result<Answer> {
        if question.trim().is_empty() {
            return Err(EngineError::validation("question must not be empty"));
        }
        let budget = self.context.budget(max_context_turns);
        if budget.max_turns == 0 {
            return Err(EngineError::validation("max_context_turns must be at least 1"));
        }

        let chat = self.require_chat(chat_id).await?;
        if chat.is_archived() {
            return Err(EngineError::validation(format!(
                "chat {} is archived and does not accept questions",
                chat_id
            )));
        }

        // Prior turns only; the new question goes to the generator separately
        let context = self.context_window(chat_id, budget).await?;

        let question_message = self.store.append(chat_id, NewMessage::user(question)).await?;
        self.cache.invalidate_chat(chat_id, Some(chat.owner_id.as_str())).await;

        let started = Instant::now();
        let produced = tokio::time::timeout(
            self.generator_timeout,
            self.produce(chat_id, question, context.into_messages()),
        )
        .await;
        let measured_latency_ms = u64::try_from(started.elapsed().as_millis()).unwrap_or(u64::MAX);

        let (output, excerpts) = match produced {
            Ok(Ok(produced)) => produced,
            Ok(Err(err)) => {
                tracing::warn!(chat_id = %chat_id, error = %err, "Answer generation failed");
                return Ok(Answer::failure(
                    chat_id,
                    question,
                    Some(question_message.id),
                    err.to_string(),
                ));
            }
            Err(_) => {
                let err = EngineError::Upstream(format!(
                    "answer generation timed out after {} ms",
                    self.generator_timeout.as_millis()
                ));
                tracing::warn!(chat_id = %chat_id, error = %err, "Answer generation timed out");
                return Ok(Answer::failure(
                    chat_id,
                    question,
                    Some(question_message.id),
                    err.to_string(),
                ));
            }
        };

        let assembled = self.assembler.assemble(output, excerpts, measured_latency_ms);
        let reply = NewMessage::assistant(assembled.content.clone(), assembled.metrics())
            .with_parent(question_message.id.as_str());
        let appended = self.store.append(chat_id, reply).await;
        self.cache.invalidate_chat(chat_id, Some(chat.owner_id.as_str())).await;
        let answer_message = appended?;

        tracing::info!(
            chat_id = %chat_id,
            message_id = %answer_message.id,
            sources = assembled.sources.len(),
            confidence_level = ?assembled.confidence_level,
            tokens_used = ?assembled.tokens_used,
            "Question answered"
        );

        Ok(assembled.into_answer(chat_id, question, question_message.id, answer_message.id))
    }

    async fn produce(
        &self,
        chat_id: &str,
        question: &str,
        context: Vec<Message>,
    ) -> Result<(GeneratorOutput, Vec<RetrievedExcerpt>)> {
        let excerpts = self
            .retriever
            .retrieve(chat_id, question)
            .await
            .map_err(EngineError::upstream)?;
        tracing::debug!(chat_id = %chat_id, excerpts = excerpts.len(), "Retrieved excerpts");

        let request = GenerationRequest {
            chat_id: chat_id.to_string(),
            question: question.to_string(),
            context,
            excerpts: excerpts.clone(),
        };
        let output = self
            .generator
            .generate(request)
            .await
            .map_err(EngineError::upstream)?;

        if output.text.trim().is_empty() {
            return Err(EngineError::Upstream("generator returned an empty answer".to_string()));
        }
        Ok((output, excerpts))
    }

    async fn context_window(&self, chat_id: &str, budget: ContextBudget) -> Result<ContextWindow> {
        let key = CacheKey::recent_context(chat_id, budget.variant());
        let window = self
            .cache
            .get_or_load(&key, || async {
                self.selector.select_window(chat_id, budget).await.map(Some)
            })
            .await?;
        Ok(window.unwrap_or_default())
    }

    /// The newest `limit` messages, oldest first
    pub async fn get_recent_messages(&self, chat_id: &str, limit: usize) -> Result<Vec<Message>> {
        if limit == 0 {
            return Err(EngineError::validation("limit must be at least 1"));
        }
        let window = self.context_window(chat_id, ContextBudget::new(limit)).await?;
        Ok(window.into_messages())
    }

    /// Full ordered history of a chat
    pub async fn get_history(&self, chat_id: &str) -> Result<Vec<Message>> {
        let key = CacheKey::message_history(chat_id);
        let history = self
            .cache
            .get_or_load(&key, || async {
                self.store
                    .list_ordered(chat_id, SortOrder::Asc, None)
                    .await
                    .map(Some)
            })
            .await?;
        Ok(history.unwrap_or_default())
    }

    pub async fn get_statistics(&self, chat_id: &str) -> Result<ChatStatistics> {
        let history = self.get_history(chat_id).await?;
        Ok(self.aggregator.aggregate(chat_id, &history))
    }

    pub async fn get_message(&self, chat_id: &str, message_id: &str) -> Result<Message> {
        self.store
            .get_message(chat_id, message_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("message {}", message_id)))
    }

    /// The message and its ancestors, root first
    pub async fn thread_of(&self, chat_id: &str, message_id: &str) -> Result<Vec<Message>> {
        Ok(self.store.thread_of(chat_id, message_id).await?)
    }

    /// Recount the chat's messages against its counter
    pub async fn verify_counters(&self, chat_id: &str) -> Result<Chat> {
        Ok(self.store.verify_counters(chat_id).await?)
    }

    pub async fn create_chat(&self, owner_id: &str, title: &str) -> Result<Chat> {
        let chat = self.store.create_chat(owner_id, title).await?;
        self.cache.invalidate_all(CacheClass::ChatList, owner_id).await;
        tracing::info!(chat_id = %chat.id, owner_id = %owner_id, "Chat created");
        Ok(chat)
    }

    pub async fn get_chat(&self, chat_id: &str) -> Result<Chat> {
        let key = CacheKey::chat_metadata(chat_id);
        self.cache
            .get_or_load(&key, || self.store.get_chat(chat_id))
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("chat {}", chat_id)))
    }

    /// Chats of an owner, most recently active first
    pub async fn list_chats(
        &self,
        owner_id: &str,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Vec<Chat>> {
        let key = CacheKey::chat_list(owner_id).with_variant(format!(
            "limit={};skip={}",
            limit.map_or_else(|| "all".to_string(), |l| l.to_string()),
            skip.unwrap_or(0)
        ));
        let chats = self
            .cache
            .get_or_load(&key, || async {
                self.store.list_chats(owner_id, limit, skip).await.map(Some)
            })
            .await?;
        Ok(chats.unwrap_or_default())
    }

    pub async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<Chat> {
        let chat = self.store.rename_chat(chat_id, title).await?;
        self.cache.invalidate_chat(chat_id, Some(chat.owner_id.as_str())).await;
        Ok(chat)
    }

    pub async fn archive_chat(&self, chat_id: &str) -> Result<Chat> {
        let chat = self.store.archive_chat(chat_id).await?;
        self.cache.invalidate_chat(chat_id, Some(chat.owner_id.as_str())).await;
        tracing::info!(chat_id = %chat_id, "Chat archived");
        Ok(chat)
    }

    /// Delete a chat with all its messages
    pub async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let chat = self.require_chat(chat_id).await?;
        let deleted = self.store.delete_chat(chat_id).await;
        self.cache.invalidate_chat(chat_id, Some(chat.owner_id.as_str())).await;
        deleted?;
        tracing::info!(chat_id = %chat_id, "Chat deleted");
        Ok(())
    }

    pub async fn record_document_added(&self, chat_id: &str) -> Result<Chat> {
        self.adjust_documents(chat_id, 1).await
    }

    pub async fn record_document_removed(&self, chat_id: &str) -> Result<Chat> {
        self.adjust_documents(chat_id, -1).await
    }

    async fn adjust_documents(&self, chat_id: &str, delta: i32) -> Result<Chat> {
        let chat = self.store.adjust_document_count(chat_id, delta).await?;
        self.cache.invalidate_chat(chat_id, Some(chat.owner_id.as_str())).await;
        Ok(chat)
    }

    /// Retention: delete messages created before `cutoff`
    pub async fn purge_messages_older_than(
        &self,
        chat_id: &str,
        cutoff: DateTime<Utc>,
    ) -> Result<u64> {
        let chat = self.require_chat(chat_id).await?;
        let purged = self.store.delete_older_than(chat_id, cutoff).await;
        self.cache.invalidate_chat(chat_id, Some(chat.owner_id.as_str())).await;
        let purged = purged?;
        tracing::info!(chat_id = %chat_id, purged, "Purged old messages");
        Ok(purged)
    }

    pub async fn health_check(&self) -> bool {
        self.cache.health_check().await
    }

    /// Canonical chat state, bypassing the cache
    async fn require_chat(&self, chat_id: &str) -> Result<Chat> {
        self.store
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| EngineError::NotFound(format!("chat {}", chat_id)))
    }
}
