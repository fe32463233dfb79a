use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};

/// A conversation scoped to a set of uploaded documents
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Chat {
    pub id: String,
    pub owner_id: String,
    pub title: String,
    pub status: ChatStatus,
    /// Number of live documents attached to the chat
    pub document_count: u32,
    /// Number of live messages in the chat
    pub message_count: u64,
    pub created_at: DateTime<Utc>,
    pub updated_at: DateTime<Utc>,
    /// Never moves backwards; advanced on every appended message
    pub last_activity_at: DateTime<Utc>,
}

impl Chat {
    pub fn new(owner_id: impl Into<String>, title: impl Into<String>) -> Self {
        let now = Utc::now();
        Self {
            id: uuid::Uuid::new_v4().to_string(),
            owner_id: owner_id.into(),
            title: title.into(),
            status: ChatStatus::Active,
            document_count: 0,
            message_count: 0,
            created_at: now,
            updated_at: now,
            last_activity_at: now,
        }
    }

    pub fn is_archived(&self) -> bool {
        self.status == ChatStatus::Archived
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ChatStatus {
    Active,
    Archived,
}

impl Default for ChatStatus {
    fn default() -> Self {
        ChatStatus::Active
    }
}
