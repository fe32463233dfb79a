use docchat_types::{ChatStatistics, Message, MessageRole};

use crate::config::{AnswerConfig, StatsConfig};

/// Derives usage, cost and quality metrics from a chat's messages.
///
/// Only assistant messages carry metrics. Unmeasured values are skipped, so an
/// average over nothing is `None` rather than zero.
#[derive(Debug, Clone)]
pub struct StatisticsAggregator {
    low_confidence_threshold: f64,
    slow_response_ms: u64,
    cost_per_1k_tokens: f64,
}

impl StatisticsAggregator {
    pub fn new(stats: &StatsConfig, answer: &AnswerConfig) -> Self {
        Self {
            low_confidence_threshold: stats.low_confidence_threshold,
            slow_response_ms: stats.slow_response_ms,
            cost_per_1k_tokens: answer.cost_per_1k_tokens,
        }
    }

    pub fn aggregate(&self, chat_id: &str, messages: &[Message]) -> ChatStatistics {
        let mut stats = ChatStatistics {
            chat_id: chat_id.to_string(),
            total_messages: messages.len() as u64,
            ..ChatStatistics::default()
        };

        let mut response_times = Mean::default();
        let mut confidences = Mean::default();

        for message in messages {
            match message.role {
                MessageRole::User => stats.user_messages += 1,
                MessageRole::Assistant => stats.assistant_messages += 1,
            }
            let Some(metrics) = message.metrics.as_ref().filter(|_| message.is_assistant()) else {
                continue;
            };

            if let Some(tokens) = metrics.tokens_used {
                stats.total_tokens += u64::from(tokens);
            }
            if let Some(ms) = metrics.response_time_ms {
                response_times.add(ms as f64);
                if ms > self.slow_response_ms {
                    stats.slow_answers += 1;
                }
            }
            if let Some(confidence) = metrics.confidence {
                confidences.add(confidence);
                if confidence < self.low_confidence_threshold {
                    stats.low_confidence_answers += 1;
                }
            }
        }

        stats.average_response_time_ms = response_times.value();
        stats.average_confidence = confidences.value();
        stats.estimated_cost = stats.total_tokens as f64 / 1000.0 * self.cost_per_1k_tokens;
        stats
    }
}

#[derive(Default)]
struct Mean {
    sum: f64,
    count: u64,
}

impl Mean {
    fn add(&mut self, value: f64) {
        self.sum += value;
        self.count += 1;
    }

    fn value(&self) -> Option<f64> {
        (self.count > 0).then(|| self.sum / self.count as f64)
    }
}
