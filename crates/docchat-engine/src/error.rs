use docchat_persist::PersistError;
use thiserror::Error;

#[derive(Error, Debug)]
pub enum EngineError {
    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Validation failed: {0}")]
    Validation(String),

    /// Retriever or generator failure. `ask_question` turns this into an
    /// unsuccessful `Answer` instead of returning it.
    #[error("Upstream failure: {0}")]
    Upstream(String),

    #[error("Consistency violation in chat {chat_id}: {detail}")]
    Consistency { chat_id: String, detail: String },

    #[error("Storage error: {0}")]
    Storage(PersistError),

    #[error("Configuration error: {0}")]
    Configuration(String),
}

impl EngineError {
    pub fn validation(msg: impl Into<String>) -> Self {
        EngineError::Validation(msg.into())
    }

    pub fn upstream(err: anyhow::Error) -> Self {
        EngineError::Upstream(format!("{:#}", err))
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, EngineError::NotFound(_))
    }
}

impl From<PersistError> for EngineError {
    fn from(err: PersistError) -> Self {
        match err {
            PersistError::ChatNotFound(id) => EngineError::NotFound(format!("chat {}", id)),
            PersistError::MessageNotFound(id) => EngineError::NotFound(format!("message {}", id)),
            PersistError::Validation(msg) => EngineError::Validation(msg),
            PersistError::Consistency { chat_id, detail } => {
                EngineError::Consistency { chat_id, detail }
            }
            other => EngineError::Storage(other),
        }
    }
}

impl From<config::ConfigError> for EngineError {
    fn from(err: config::ConfigError) -> Self {
        EngineError::Configuration(err.to_string())
    }
}

pub type Result<T> = std::result::Result<T, EngineError>;
