use thiserror::Error;

#[derive(Error, Debug)]
pub enum PersistError {
    #[cfg(feature = "mongodb")]
    #[error("Database error: {0}")]
    Database(#[from] mongodb::error::Error),

    #[cfg(feature = "mongodb")]
    #[error("BSON serialization error: {0}")]
    BsonSerialization(#[from] bson::ser::Error),

    #[error("Chat not found: {0}")]
    ChatNotFound(String),

    #[error("Message not found: {0}")]
    MessageNotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    #[error("Consistency violation in chat {chat_id}: {detail}")]
    Consistency { chat_id: String, detail: String },

    #[error("Connection error: {0}")]
    Connection(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl PersistError {
    pub fn validation(msg: impl Into<String>) -> Self {
        PersistError::Validation(msg.into())
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, PersistError::ChatNotFound(_) | PersistError::MessageNotFound(_))
    }
}

pub type Result<T> = std::result::Result<T, PersistError>;
