use std::collections::HashSet;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docchat_types::{Chat, Message, MessageRole, NewMessage};

use crate::error::{PersistError, Result};

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default)]
pub enum SortOrder {
    #[default]
    Asc,
    Desc,
}

/// Trait for durable conversation storage
///
/// The store is the source of truth for chats and their messages. Every
/// implementation must keep `Chat::message_count` equal to the number of stored
/// messages and must append atomically per chat: no reader may observe the
/// counter without the message, or the message without the counter.
#[async_trait]
pub trait MessageStore: Send + Sync {
    /// Create a new chat owned by `owner_id`
    async fn create_chat(&self, owner_id: &str, title: &str) -> Result<Chat>;

    /// Get a chat by ID
    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>>;

    /// List chats for an owner, most recently active first
    async fn list_chats(
        &self,
        owner_id: &str,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Vec<Chat>>;

    async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<Chat>;

    async fn archive_chat(&self, chat_id: &str) -> Result<Chat>;

    /// Delete a chat and every message it owns
    async fn delete_chat(&self, chat_id: &str) -> Result<()>;

    /// Add `delta` to the document counter. The counter never goes below zero.
    async fn adjust_document_count(&self, chat_id: &str, delta: i32) -> Result<Chat>;

    /// Append a turn, assigning id, sequence and creation time.
    ///
    /// Increments the chat's message counter and advances its last activity in
    /// the same atomic step.
    async fn append(&self, chat_id: &str, message: NewMessage) -> Result<Message>;

    /// Messages by creation time, ties broken by insertion order
    async fn list_ordered(
        &self,
        chat_id: &str,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Message>>;

    async fn get_message(&self, chat_id: &str, message_id: &str) -> Result<Option<Message>>;

    /// Count messages created at or after `cutoff`
    async fn count_since(&self, chat_id: &str, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Delete messages created before `cutoff`, returning how many were removed.
    /// The message counter is decremented by exactly that amount.
    async fn delete_older_than(&self, chat_id: &str, cutoff: DateTime<Utc>) -> Result<u64>;

    /// Recount the chat's messages and compare against its counter.
    ///
    /// A mismatch is never repaired here; it is logged and returned as
    /// `PersistError::Consistency`.
    async fn verify_counters(&self, chat_id: &str) -> Result<Chat> {
        let chat = self
            .get_chat(chat_id)
            .await?
            .ok_or_else(|| PersistError::ChatNotFound(chat_id.to_string()))?;
        let actual = self.list_ordered(chat_id, SortOrder::Asc, None).await?.len() as u64;

        if actual != chat.message_count {
            tracing::error!(
                chat_id = %chat_id,
                counter = chat.message_count,
                actual,
                "Message counter does not match stored messages"
            );
            return Err(PersistError::Consistency {
                chat_id: chat_id.to_string(),
                detail: format!(
                    "message_count is {} but {} messages are stored",
                    chat.message_count, actual
                ),
            });
        }

        Ok(chat)
    }

    /// Walk parent links from `message_id` up to its root, returned root first.
    ///
    /// Stops at a dangling parent (deleted by retention) or at a repeated id.
    async fn thread_of(&self, chat_id: &str, message_id: &str) -> Result<Vec<Message>> {
        let mut thread = Vec::new();
        let mut seen = HashSet::new();
        let mut next = Some(message_id.to_string());

        while let Some(id) = next.take() {
            if !seen.insert(id.clone()) {
                tracing::warn!(chat_id = %chat_id, message_id = %id, "Cycle in message parents");
                break;
            }
            match self.get_message(chat_id, &id).await? {
                Some(message) => {
                    next = message.parent_id.clone();
                    thread.push(message);
                }
                None if thread.is_empty() => {
                    return Err(PersistError::MessageNotFound(id));
                }
                None => break,
            }
        }

        thread.reverse();
        Ok(thread)
    }
}

/// Checks shared by every store before a message is written
pub(crate) fn validate_new_message(message: &NewMessage, assigned_id: &str) -> Result<()> {
    if message.content.trim().is_empty() {
        return Err(PersistError::validation("message content must not be empty"));
    }
    if message.parent_id.as_deref() == Some(assigned_id) {
        return Err(PersistError::validation("a message cannot be its own parent"));
    }
    match (&message.role, &message.metrics) {
        (MessageRole::User, Some(_)) => {
            return Err(PersistError::validation(
                "usage metrics are only recorded on assistant messages",
            ));
        }
        (MessageRole::Assistant, Some(metrics)) => {
            if let Some(confidence) = metrics.confidence {
                if !(0.0..=1.0).contains(&confidence) {
                    return Err(PersistError::validation(format!(
                        "confidence {} is outside [0, 1]",
                        confidence
                    )));
                }
            }
        }
        _ => {}
    }
    Ok(())
}

pub(crate) fn validate_title(title: &str) -> Result<()> {
    if title.trim().is_empty() {
        return Err(PersistError::validation("chat title must not be empty"));
    }
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;
    use docchat_types::AssistantMetrics;

    #[test]
    fn test_rejects_blank_content() {
        let err = validate_new_message(&NewMessage::user("   "), "m-1").unwrap_err();
        assert!(matches!(err, PersistError::Validation(_)));
    }

    #[test]
    fn test_rejects_self_parent() {
        let message = NewMessage::user("hello").with_parent("m-1");
        let err = validate_new_message(&message, "m-1").unwrap_err();
        assert!(matches!(err, PersistError::Validation(_)));
    }

    #[test]
    fn test_rejects_metrics_on_user_turn() {
        let mut message = NewMessage::user("hello");
        message.metrics = Some(AssistantMetrics::default());
        assert!(validate_new_message(&message, "m-1").is_err());
    }

    #[test]
    fn test_rejects_out_of_range_confidence() {
        let metrics = AssistantMetrics {
            confidence: Some(1.5),
            ..Default::default()
        };
        let message = NewMessage::assistant("answer", metrics);
        assert!(validate_new_message(&message, "m-1").is_err());
    }

    #[test]
    fn test_accepts_assistant_without_confidence() {
        let message = NewMessage::assistant("answer", AssistantMetrics::default());
        assert!(validate_new_message(&message, "m-2").is_ok());
    }
}
