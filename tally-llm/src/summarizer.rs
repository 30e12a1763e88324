//! Insight summarization on top of any [`ChatCompletionProvider`].

use crate::prompts;
use crate::ChatCompletionProvider;
use std::sync::Arc;
use tally_core::{ContextType, EntityId, InsightBatch, TallyResult};

#[derive(Clone)]
pub struct InsightSummarizer {
    provider: Arc<dyn ChatCompletionProvider>,
}

impl InsightSummarizer {
    pub fn new(provider: Arc<dyn ChatCompletionProvider>) -> Self {
        Self { provider }
    }

    pub fn provider_name(&self) -> &str {
        self.provider.provider_name()
    }

    /// Summarize the answers of one batch.
    pub async fn summarize_batch(
        &self,
        insight_id: EntityId,
        context: ContextType,
        batch: &InsightBatch,
    ) -> TallyResult<String> {
        self.provider
            .complete(
                prompts::batch_messages(context, batch),
                &prompts::batch_reference(insight_id, batch.batch_number),
            )
            .await
    }

    /// Fold settled batches into the overall analysis.
    pub async fn summarize_overall(
        &self,
        insight_id: EntityId,
        context: ContextType,
        batches: &[InsightBatch],
    ) -> TallyResult<String> {
        self.provider
            .complete(
                prompts::overall_messages(context, batches),
                &prompts::overall_reference(insight_id),
            )
            .await
    }
}

impl std::fmt::Debug for InsightSummarizer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("InsightSummarizer")
            .field("provider", &self.provider.provider_name())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::MockChatProvider;
    use tally_core::{new_entity_id, QuestionDraft, QuestionKind};

    #[tokio::test]
    async fn test_batch_call_carries_reference_and_prompt() {
        let provider = MockChatProvider::new();
        let summarizer = InsightSummarizer::new(Arc::new(provider.clone()));
        let insight_id = new_entity_id();
        let batch = InsightBatch {
            batch_number: 2,
            question: QuestionDraft::new(QuestionKind::Textbox, "Why?").into_question(new_entity_id()),
            aggregated_answer: None,
            textual_answers: Some(vec!["fast".to_string()]),
            summary: None,
            error: None,
        };

        let summary = summarizer
            .summarize_batch(insight_id, ContextType::EventFeedback, &batch)
            .await
            .unwrap();
        assert_eq!(summary, format!("Summary of insight:{} batch:2", insight_id));

        let calls = provider.calls();
        assert_eq!(calls.len(), 1);
        assert_eq!(calls[0].messages[0].role, "system");
        assert!(calls[0].messages[0].content.contains("event feedback"));
        assert_eq!(calls[0].messages[1].content, "Question: Why?\nAnswers: [\"fast\"]");
    }
}
