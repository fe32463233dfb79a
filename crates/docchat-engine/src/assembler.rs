use chrono::Utc;
use docchat_llm::{GeneratorOutput, RetrievedExcerpt};
use docchat_types::{Answer, AssistantMetrics, ConfidenceLevel, Source};

use crate::config::AnswerConfig;

/// Generator output turned into an answer, ready to persist
#[derive(Debug, Clone, PartialEq)]
pub struct AssembledAnswer {
    pub content: String,
    /// Most relevant first; exactly one is primary when non-empty
    pub sources: Vec<Source>,
    pub primary_source: Option<Source>,
    pub confidence: Option<f64>,
    pub confidence_level: ConfidenceLevel,
    pub tokens_used: Option<u32>,
    pub response_time_ms: Option<u64>,
    pub estimated_cost: Option<f64>,
}

impl AssembledAnswer {
    /// Metrics stored on the assistant message
    pub fn metrics(&self) -> AssistantMetrics {
        AssistantMetrics {
            tokens_used: self.tokens_used,
            response_time_ms: self.response_time_ms,
            confidence: self.confidence,
            sources: self.sources.clone(),
        }
    }

    pub fn into_answer(
        self,
        chat_id: impl Into<String>,
        question: impl Into<String>,
        question_message_id: String,
        answer_message_id: String,
    ) -> Answer {
        Answer {
            success: true,
            chat_id: chat_id.into(),
            question: question.into(),
            question_message_id: Some(question_message_id),
            answer_message_id: Some(answer_message_id),
            content: Some(self.content),
            sources: self.sources,
            primary_source: self.primary_source,
            confidence: self.confidence,
            confidence_level: self.confidence_level,
            tokens_used: self.tokens_used,
            response_time_ms: self.response_time_ms,
            estimated_cost: self.estimated_cost,
            error_message: None,
            answered_at: Utc::now(),
        }
    }
}

/// Structures raw generator output: source attribution, confidence bucket
/// and cost. Pure; persistence happens in the service.
#[derive(Debug, Clone)]
pub struct AnswerAssembler {
    cost_per_1k_tokens: f64,
    max_sources: usize,
}

impl AnswerAssembler {
    pub fn new(config: &AnswerConfig) -> Self {
        Self {
            cost_per_1k_tokens: config.cost_per_1k_tokens,
            max_sources: config.max_sources,
        }
    }

    /// `measured_latency_ms` is used when the generator does not report its own
    pub fn assemble(
        &self,
        output: GeneratorOutput,
        excerpts: Vec<RetrievedExcerpt>,
        measured_latency_ms: u64,
    ) -> AssembledAnswer {
        // Structural copy
        let mut answer = AssembledAnswer {
            content: output.text,
            sources: self.normalize_sources(excerpts),
            primary_source: None,
            confidence: output.confidence.filter(|c| !c.is_nan()).map(|c| c.clamp(0.0, 1.0)),
            confidence_level: ConfidenceLevel::Unknown,
            tokens_used: output.tokens_used,
            response_time_ms: output.latency_ms.or(Some(measured_latency_ms)),
            estimated_cost: None,
        };

        // Derived fields
        answer.primary_source = mark_primary(&mut answer.sources);
        answer.confidence_level = ConfidenceLevel::classify(answer.confidence);
        answer.estimated_cost = answer.tokens_used.map(|tokens| self.cost_of(u64::from(tokens)));
        answer
    }

    /// Linear cost of `tokens` at the configured rate
    pub fn cost_of(&self, tokens: u64) -> f64 {
        tokens as f64 / 1000.0 * self.cost_per_1k_tokens
    }

    /// Clamp scores into [0, 1], order by relevance and keep at most `max_sources`.
    /// Equal scores keep retrieval order.
    fn normalize_sources(&self, excerpts: Vec<RetrievedExcerpt>) -> Vec<Source> {
        let mut sources: Vec<Source> = excerpts
            .into_iter()
            .map(Source::from)
            .map(|mut source| {
                source.relevance_score = clamp_score(source.relevance_score);
                source
            })
            .collect();

        sources.sort_by(|a, b| b.relevance_score.total_cmp(&a.relevance_score));
        sources.truncate(self.max_sources);
        sources
    }
}

fn clamp_score(score: f64) -> f64 {
    if score.is_nan() {
        0.0
    } else {
        score.clamp(0.0, 1.0)
    }
}

/// Flag exactly the most relevant source as primary.
///
/// Ties go to the source the retriever flagged, else to the first one.
fn mark_primary(sources: &mut [Source]) -> Option<Source> {
    let mut best: Option<usize> = None;
    for (i, source) in sources.iter().enumerate() {
        best = match best {
            None => Some(i),
            Some(b) => {
                let current = &sources[b];
                let better = source.relevance_score > current.relevance_score
                    || (source.relevance_score == current.relevance_score
                        && source.is_primary
                        && !current.is_primary);
                if better {
                    Some(i)
                } else {
                    Some(b)
                }
            }
        };
    }

    for (i, source) in sources.iter_mut().enumerate() {
        source.is_primary = Some(i) == best;
    }
    best.map(|i| sources[i].clone())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn assembler() -> AnswerAssembler {
        AnswerAssembler::new(&AnswerConfig::default())
    }

    fn excerpt(id: &str, score: f64) -> RetrievedExcerpt {
        RetrievedExcerpt::new(id, format!("{}.pdf", id), score, "text")
    }

    #[test]
    fn test_highest_relevance_is_primary() {
        let answer = assembler().assemble(
            GeneratorOutput::new("answer"),
            vec![excerpt("b", 0.92), excerpt("a", 0.95)],
            10,
        );

        let primary = answer.primary_source.unwrap();
        assert_eq!(primary.document_id, "a");
        assert_eq!(primary.relevance_score, 0.95);
        assert_eq!(answer.sources.iter().filter(|s| s.is_primary).count(), 1);
        assert!(answer.sources[0].is_primary);
    }

    #[test]
    fn test_tie_prefers_retriever_flag() {
        let answer = assembler().assemble(
            GeneratorOutput::new("answer"),
            vec![excerpt("a", 0.9), excerpt("b", 0.9).flagged_primary(), excerpt("c", 0.3)],
            10,
        );
        assert_eq!(answer.primary_source.unwrap().document_id, "b");
        assert_eq!(answer.sources.iter().filter(|s| s.is_primary).count(), 1);
    }

    #[test]
    fn test_tie_without_flag_prefers_first() {
        let answer = assembler().assemble(
            GeneratorOutput::new("answer"),
            vec![excerpt("a", 0.9), excerpt("b", 0.9)],
            10,
        );
        assert_eq!(answer.primary_source.unwrap().document_id, "a");
    }

    #[test]
    fn test_retriever_flag_loses_to_higher_score() {
        let answer = assembler().assemble(
            GeneratorOutput::new("answer"),
            vec![excerpt("a", 0.4).flagged_primary(), excerpt("b", 0.8)],
            10,
        );
        assert_eq!(answer.primary_source.unwrap().document_id, "b");
        assert!(!answer.sources.iter().any(|s| s.document_id == "a" && s.is_primary));
    }

    #[test]
    fn test_scores_clamped_and_sources_capped() {
        let config = AnswerConfig::default().with_max_sources(2);
        let answer = AnswerAssembler::new(&config).assemble(
            GeneratorOutput::new("answer"),
            vec![excerpt("a", 1.7), excerpt("b", -0.2), excerpt("c", 0.5), excerpt("d", f64::NAN)],
            10,
        );

        assert_eq!(answer.sources.len(), 2);
        assert_eq!(answer.sources[0].relevance_score, 1.0);
        assert_eq!(answer.sources[1].document_id, "c");
    }

    #[test]
    fn test_no_sources_means_no_primary() {
        let answer = assembler().assemble(GeneratorOutput::new("answer"), Vec::new(), 10);
        assert!(answer.sources.is_empty());
        assert!(answer.primary_source.is_none());
    }

    #[test]
    fn test_confidence_and_cost() {
        let config = AnswerConfig::default().with_cost_per_1k_tokens(0.02);
        let output = GeneratorOutput::new("answer")
            .with_tokens(1500)
            .with_confidence(0.79);
        let answer = AnswerAssembler::new(&config).assemble(output, Vec::new(), 10);

        assert_eq!(answer.confidence_level, ConfidenceLevel::Medium);
        assert!((answer.estimated_cost.unwrap() - 0.03).abs() < 1e-12);
    }

    #[test]
    fn test_missing_usage_stays_missing() {
        let answer = assembler().assemble(GeneratorOutput::new("answer"), Vec::new(), 42);
        assert_eq!(answer.confidence_level, ConfidenceLevel::Unknown);
        assert!(answer.confidence.is_none());
        assert!(answer.estimated_cost.is_none());
        assert_eq!(answer.response_time_ms, Some(42));
    }

    #[test]
    fn test_reported_latency_wins_over_measured() {
        let output = GeneratorOutput::new("answer").with_latency_ms(800);
        let answer = assembler().assemble(output, Vec::new(), 900);
        assert_eq!(answer.response_time_ms, Some(800));
    }

    #[test]
    fn test_metrics_mirror_answer() {
        let output = GeneratorOutput::new("answer").with_tokens(10).with_confidence(0.9);
        let answer = assembler().assemble(output, vec![excerpt("a", 0.7)], 5);
        let metrics = answer.metrics();
        assert_eq!(metrics.tokens_used, Some(10));
        assert_eq!(metrics.confidence, Some(0.9));
        assert_eq!(metrics.sources, answer.sources);
    }
}
