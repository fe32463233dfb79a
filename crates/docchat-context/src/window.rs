use docchat_types::Message;
use serde::{Deserialize, Serialize};

/// Limits applied when selecting prior turns
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub struct ContextBudget {
    /// Maximum number of turns, newest first
    pub max_turns: usize,
    /// Optional cap on the summed content length, in characters
    pub max_chars: Option<usize>,
}

impl ContextBudget {
    pub fn new(max_turns: usize) -> Self {
        Self {
            max_turns,
            max_chars: None,
        }
    }

    pub fn with_max_chars(mut self, max_chars: usize) -> Self {
        self.max_chars = Some(max_chars);
        self
    }

    /// Stable label for this window shape, used to tell cached windows apart
    pub fn variant(&self) -> String {
        match self.max_chars {
            Some(chars) => format!("turns={};chars={}", self.max_turns, chars),
            None => format!("turns={}", self.max_turns),
        }
    }
}

/// Ordered slice of prior conversation handed to the generator
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ContextWindow {
    /// Oldest first
    pub messages: Vec<Message>,
    /// Older turns were dropped to respect the character budget
    pub truncated: bool,
}

impl ContextWindow {
    pub fn len(&self) -> usize {
        self.messages.len()
    }

    pub fn is_empty(&self) -> bool {
        self.messages.is_empty()
    }

    pub fn total_chars(&self) -> usize {
        self.messages.iter().map(Message::char_len).sum()
    }

    pub fn into_messages(self) -> Vec<Message> {
        self.messages
    }
}

/// Drop the oldest messages until the summed length fits `max_chars`.
///
/// The newest message always survives, even when it alone is over budget.
pub(crate) fn fit_to_chars(mut messages: Vec<Message>, max_chars: usize) -> (Vec<Message>, bool) {
    let mut total: usize = messages.iter().map(Message::char_len).sum();
    let mut drop = 0;

    while total > max_chars && messages.len() - drop > 1 {
        total -= messages[drop].char_len();
        drop += 1;
    }

    if drop > 0 {
        messages.drain(..drop);
    }
    (messages, drop > 0)
}

#[cfg(test)]
mod tests {
    use super::*;
    use chrono::Utc;
    use docchat_types::MessageRole;

    fn message(seq: u64, content: &str) -> Message {
        Message {
            id: format!("m{}", seq),
            chat_id: "c1".to_string(),
            seq,
            role: MessageRole::User,
            content: content.to_string(),
            created_at: Utc::now(),
            parent_id: None,
            metrics: None,
        }
    }

    #[test]
    fn test_fit_drops_oldest_first() {
        let messages = vec![message(0, "aaaa"), message(1, "bbbb"), message(2, "cc")];
        let (kept, truncated) = fit_to_chars(messages, 6);
        assert!(truncated);
        assert_eq!(kept.iter().map(|m| m.seq).collect::<Vec<_>>(), vec![1, 2]);
    }

    #[test]
    fn test_fit_keeps_newest_even_if_over_budget() {
        let messages = vec![message(0, "short"), message(1, "a much longer final turn")];
        let (kept, truncated) = fit_to_chars(messages, 3);
        assert!(truncated);
        assert_eq!(kept.len(), 1);
        assert_eq!(kept[0].seq, 1);
    }

    #[test]
    fn test_fit_counts_chars_not_bytes() {
        let messages = vec![message(0, "ção"), message(1, "ãé")];
        let (kept, truncated) = fit_to_chars(messages, 5);
        assert!(!truncated);
        assert_eq!(kept.len(), 2);
    }

    #[test]
    fn test_fit_empty() {
        let (kept, truncated) = fit_to_chars(Vec::new(), 0);
        assert!(kept.is_empty());
        assert!(!truncated);
    }

    #[test]
    fn test_budget_variant_labels() {
        assert_eq!(ContextBudget::new(5).variant(), "turns=5");
        assert_eq!(ContextBudget::new(5).with_max_chars(200).variant(), "turns=5;chars=200");
    }
}
