use std::collections::HashMap;

use async_trait::async_trait;
use chrono::{DateTime, Utc};
use docchat_types::{Chat, ChatStatus, Message, NewMessage};
use tokio::sync::RwLock;

use crate::error::{PersistError, Result};
use crate::store::{validate_new_message, validate_title, MessageStore, SortOrder};

struct ChatRecord {
    chat: Chat,
    /// Always sorted by (created_at, seq)
    messages: Vec<Message>,
    next_seq: u64,
}

/// Process-local store. All chats live behind one lock, so every write
/// (message plus counters) is applied atomically.
#[derive(Default)]
pub struct InMemoryMessageStore {
    chats: RwLock<HashMap<String, ChatRecord>>,
}

impl InMemoryMessageStore {
    pub fn new() -> Self {
        Self::default()
    }
}

fn missing(chat_id: &str) -> PersistError {
    PersistError::ChatNotFound(chat_id.to_string())
}

#[async_trait]
impl MessageStore for InMemoryMessageStore {
    async fn create_chat(&self, owner_id: &str, title: &str) -> Result<Chat> {
        validate_title(title)?;
        let chat = Chat::new(owner_id, title);

        self.chats.write().await.insert(
            chat.id.clone(),
            ChatRecord {
                chat: chat.clone(),
                messages: Vec::new(),
                next_seq: 0,
            },
        );

        tracing::debug!(chat_id = %chat.id, owner_id = %owner_id, "Chat created");
        Ok(chat)
    }

    async fn get_chat(&self, chat_id: &str) -> Result<Option<Chat>> {
        Ok(self.chats.read().await.get(chat_id).map(|r| r.chat.clone()))
    }

    async fn list_chats(
        &self,
        owner_id: &str,
        limit: Option<usize>,
        skip: Option<usize>,
    ) -> Result<Vec<Chat>> {
        let chats = self.chats.read().await;
        let mut owned: Vec<Chat> = chats
            .values()
            .filter(|r| r.chat.owner_id == owner_id)
            .map(|r| r.chat.clone())
            .collect();
        drop(chats);

        owned.sort_by(|a, b| {
            b.last_activity_at
                .cmp(&a.last_activity_at)
                .then_with(|| a.id.cmp(&b.id))
        });

        Ok(owned
            .into_iter()
            .skip(skip.unwrap_or(0))
            .take(limit.unwrap_or(usize::MAX))
            .collect())
    }

    async fn rename_chat(&self, chat_id: &str, title: &str) -> Result<Chat> {
        validate_title(title)?;
        let mut chats = self.chats.write().await;
        let record = chats.get_mut(chat_id).ok_or_else(|| missing(chat_id))?;
        record.chat.title = title.to_string();
        record.chat.updated_at = Utc::now();
        Ok(record.chat.clone())
    }

    async fn archive_chat(&self, chat_id: &str) -> Result<Chat> {
        let mut chats = self.chats.write().await;
        let record = chats.get_mut(chat_id).ok_or_else(|| missing(chat_id))?;
        record.chat.status = ChatStatus::Archived;
        record.chat.updated_at = Utc::now();
        Ok(record.chat.clone())
    }

    async fn delete_chat(&self, chat_id: &str) -> Result<()> {
        let removed = self.chats.write().await.remove(chat_id);
        match removed {
            Some(record) => {
                tracing::debug!(
                    chat_id = %chat_id,
                    messages = record.messages.len(),
                    "Chat deleted with its messages"
                );
                Ok(())
            }
            None => Err(missing(chat_id)),
        }
    }

    async fn adjust_document_count(&self, chat_id: &str, delta: i32) -> Result<Chat> {
        let mut chats = self.chats.write().await;
        let record = chats.get_mut(chat_id).ok_or_else(|| missing(chat_id))?;

        let updated = i64::from(record.chat.document_count) + i64::from(delta);
        if updated < 0 {
            return Err(PersistError::validation(format!(
                "document count would drop below zero ({} {:+})",
                record.chat.document_count, delta
            )));
        }
        record.chat.document_count = u32::try_from(updated)
            .map_err(|_| PersistError::validation("document count overflow"))?;
        record.chat.updated_at = Utc::now();
        Ok(record.chat.clone())
    }

    async fn append(&self, chat_id: &str, message: NewMessage) -> Result<Message> {
        let id = uuid::Uuid::new_v4().to_string();
        validate_new_message(&message, &id)?;

        let mut chats = self.chats.write().await;
        let record = chats.get_mut(chat_id).ok_or_else(|| missing(chat_id))?;

        if let Some(parent_id) = &message.parent_id {
            if !record.messages.iter().any(|m| &m.id == parent_id) {
                return Err(PersistError::validation(format!(
                    "parent message {} does not belong to chat {}",
                    parent_id, chat_id
                )));
            }
        }

        // Clamp so creation times within a chat never run backwards
        let created_at = Utc::now().max(record.chat.last_activity_at);
        let persisted = Message {
            id,
            chat_id: chat_id.to_string(),
            seq: record.next_seq,
            role: message.role,
            content: message.content,
            created_at,
            parent_id: message.parent_id,
            metrics: message.metrics,
        };

        record.next_seq += 1;
        record.messages.push(persisted.clone());
        record.chat.message_count += 1;
        record.chat.last_activity_at = created_at;
        record.chat.updated_at = created_at;

        Ok(persisted)
    }

    async fn list_ordered(
        &self,
        chat_id: &str,
        order: SortOrder,
        limit: Option<usize>,
    ) -> Result<Vec<Message>> {
        let chats = self.chats.read().await;
        let record = chats.get(chat_id).ok_or_else(|| missing(chat_id))?;
        let limit = limit.unwrap_or(usize::MAX);

        let messages = match order {
            SortOrder::Asc => record.messages.iter().take(limit).cloned().collect(),
            SortOrder::Desc => record.messages.iter().rev().take(limit).cloned().collect(),
        };
        Ok(messages)
    }

    async fn get_message(&self, chat_id: &str, message_id: &str) -> Result<Option<Message>> {
        let chats = self.chats.read().await;
        let record = chats.get(chat_id).ok_or_else(|| missing(chat_id))?;
        Ok(record.messages.iter().find(|m| m.id == message_id).cloned())
    }

    async fn count_since(&self, chat_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let chats = self.chats.read().await;
        let record = chats.get(chat_id).ok_or_else(|| missing(chat_id))?;
        Ok(record.messages.iter().filter(|m| m.created_at >= cutoff).count() as u64)
    }

    async fn delete_older_than(&self, chat_id: &str, cutoff: DateTime<Utc>) -> Result<u64> {
        let mut chats = self.chats.write().await;
        let record = chats.get_mut(chat_id).ok_or_else(|| missing(chat_id))?;

        let deleted = record
            .messages
            .iter()
            .filter(|m| m.created_at < cutoff)
            .count() as u64;
        if deleted == 0 {
            return Ok(0);
        }

        let Some(remaining) = record.chat.message_count.checked_sub(deleted) else {
            tracing::error!(
                chat_id = %chat_id,
                counter = record.chat.message_count,
                deleted,
                "Retention would drive message counter negative"
            );
            return Err(PersistError::Consistency {
                chat_id: chat_id.to_string(),
                detail: format!(
                    "deleting {} messages but counter is {}",
                    deleted, record.chat.message_count
                ),
            });
        };

        record.messages.retain(|m| m.created_at >= cutoff);
        record.chat.message_count = remaining;
        record.chat.updated_at = Utc::now();

        Ok(deleted)
    }
}
