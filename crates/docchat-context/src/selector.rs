use std::sync::Arc;

use docchat_persist::{MessageStore, PersistError, Result, SortOrder};
use docchat_types::Message;

use crate::window::{fit_to_chars, ContextBudget, ContextWindow};

pub const DEFAULT_MAX_TURNS: usize = 10;

/// Picks the bounded, chronologically ordered slice of prior turns supplied
/// to the generator as conversational context.
#[derive(Clone)]
pub struct ContextSelector {
    store: Arc<dyn MessageStore>,
}

impl ContextSelector {
    pub fn new(store: Arc<dyn MessageStore>) -> Self {
        Self { store }
    }

    /// The newest `max_turns` messages of a chat, oldest first.
    ///
    /// With `max_chars`, older turns are dropped until the summed content
    /// length fits; the newest turn is always kept.
    pub async fn select_context(
        &self,
        chat_id: &str,
        max_turns: usize,
        max_chars: Option<usize>,
    ) -> Result<Vec<Message>> {
        let budget = ContextBudget { max_turns, max_chars };
        Ok(self.select_window(chat_id, budget).await?.into_messages())
    }

    pub async fn select_window(&self, chat_id: &str, budget: ContextBudget) -> Result<ContextWindow> {
        if budget.max_turns == 0 {
            return Err(PersistError::validation("max_turns must be at least 1"));
        }

        let mut messages = self
            .store
            .list_ordered(chat_id, SortOrder::Desc, Some(budget.max_turns))
            .await?;
        messages.reverse();

        let (messages, truncated) = match budget.max_chars {
            Some(max_chars) => fit_to_chars(messages, max_chars),
            None => (messages, false),
        };

        tracing::debug!(
            chat_id = %chat_id,
            turns = messages.len(),
            truncated,
            "Selected context window"
        );

        Ok(ContextWindow { messages, truncated })
    }
}
