use bson::serde_helpers::chrono_datetime_as_bson_datetime;
use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

use docchat_types::{AssistantMetrics, Chat, ChatStatus, Message, MessageRole};

/// MongoDB-specific Chat document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoChat {
    #[serde(rename = "_id")]
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub status: ChatStatus,
    pub document_count: i64,
    pub message_count: i64,
    /// Sequence number handed to the next appended message
    pub next_seq: i64,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub updated_at: DateTime<Utc>,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub last_activity_at: DateTime<Utc>,
}

/// MongoDB-specific Message document
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MongoMessage {
    #[serde(rename = "_id")]
    pub id: String,
    pub chat_id: String,
    pub seq: i64,
    pub role: MessageRole,
    pub content: String,
    #[serde(with = "chrono_datetime_as_bson_datetime")]
    pub created_at: DateTime<Utc>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub parent_id: Option<String>,
    /// Sources are stored as an embedded array of documents
    #[serde(skip_serializing_if = "Option::is_none")]
    pub metrics: Option<AssistantMetrics>,
}

fn non_negative(value: i64) -> u64 {
    u64::try_from(value).unwrap_or(0)
}

impl From<Chat> for MongoChat {
    fn from(chat: Chat) -> Self {
        Self {
            id: chat.id,
            owner_id: chat.owner_id,
            title: chat.title,
            status: chat.status,
            document_count: i64::from(chat.document_count),
            message_count: i64::try_from(chat.message_count).unwrap_or(i64::MAX),
            next_seq: 0,
            created_at: chat.created_at,
            updated_at: chat.updated_at,
            last_activity_at: chat.last_activity_at,
        }
    }
}

impl From<MongoChat> for Chat {
    fn from(chat: MongoChat) -> Self {
        Self {
            id: chat.id,
            owner_id: chat.owner_id,
            title: chat.title,
            status: chat.status,
            document_count: u32::try_from(chat.document_count).unwrap_or(0),
            message_count: non_negative(chat.message_count),
            created_at: chat.created_at,
            updated_at: chat.updated_at,
            last_activity_at: chat.last_activity_at,
        }
    }
}

impl From<Message> for MongoMessage {
    fn from(msg: Message) -> Self {
        Self {
            id: msg.id,
            chat_id: msg.chat_id,
            seq: i64::try_from(msg.seq).unwrap_or(i64::MAX),
            role: msg.role,
            content: msg.content,
            created_at: msg.created_at,
            parent_id: msg.parent_id,
            metrics: msg.metrics,
        }
    }
}

impl From<MongoMessage> for Message {
    fn from(msg: MongoMessage) -> Self {
        Self {
            id: msg.id,
            chat_id: msg.chat_id,
            seq: non_negative(msg.seq),
            role: msg.role,
            content: msg.content,
            created_at: msg.created_at,
            parent_id: msg.parent_id,
            metrics: msg.metrics,
        }
    }
}
