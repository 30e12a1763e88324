//! Tally Test Utilities
//!
//! Shared test infrastructure for the Tally workspace:
//! - Proptest generators for surveys, questions and answers
//! - A scripted summarizer for insight processing tests
//! - Fixtures for common scenarios
//! - Custom assertions for Tally-specific errors

// Re-export the in-memory store and mock provider from their source crates
pub use tally_llm::{MockChatProvider, RecordedCall};
pub use tally_storage::InMemoryStore;

pub use tally_core::{
    ContextType, EntityId, Insight, InsightBatch, InsightStatus, LikertSpec, MultipleChoiceSpec,
    NewSubmission, NewSurvey, Question, QuestionDraft, QuestionKind, QuestionSpec, StorageError,
    Submission, SubmissionResponse, Survey, TallyError, TallyResult, TextboxSpec, Timestamp,
    ValidationError,
};

use std::sync::Arc;
use tally_llm::InsightSummarizer;

// ============================================================================
// SCRIPTED SUMMARIZER
// ============================================================================

/// An [`InsightSummarizer`] backed by a [`MockChatProvider`] that tests can
/// script and inspect.
#[derive(Debug, Clone)]
pub struct ScriptedSummarizer {
    pub summarizer: InsightSummarizer,
    pub provider: MockChatProvider,
}

impl ScriptedSummarizer {
    /// Every call succeeds with `"Summary of <reference>"`.
    pub fn new() -> Self {
        let provider = MockChatProvider::new();
        Self {
            summarizer: InsightSummarizer::new(Arc::new(provider.clone())),
            provider,
        }
    }

    /// Calls whose reference contains `fragment` fail, e.g. `"batch:2"` or
    /// `"meta"`.
    pub fn failing(fragment: &str) -> Self {
        let scripted = Self::new();
        scripted.provider.fail_references_containing(fragment);
        scripted
    }

    /// References of every call made so far, in order.
    pub fn references(&self) -> Vec<String> {
        self.provider
            .calls()
            .into_iter()
            .map(|call| call.reference)
            .collect()
    }
}

impl Default for ScriptedSummarizer {
    fn default() -> Self {
        Self::new()
    }
}

// ============================================================================
// PROPTEST GENERATORS
// ============================================================================

pub mod generators {
    //! Proptest strategies for Tally domain types.

    use super::*;
    use proptest::collection::{btree_set, vec};
    use proptest::prelude::*;

    pub fn arb_question_kind() -> impl Strategy<Value = QuestionKind> {
        prop_oneof![
            Just(QuestionKind::Textbox),
            Just(QuestionKind::MultipleChoice),
            Just(QuestionKind::Likert),
        ]
    }

    pub fn arb_context_type() -> impl Strategy<Value = ContextType> {
        prop::sample::select(ContextType::ALL.to_vec())
    }

    pub fn arb_textbox_spec() -> impl Strategy<Value = TextboxSpec> {
        (1i64..=250).prop_map(|max_length| TextboxSpec { max_length })
    }

    /// 2 to 6 distinct, non-blank options.
    pub fn arb_multiple_choice_spec() -> impl Strategy<Value = MultipleChoiceSpec> {
        btree_set("[A-Za-z][A-Za-z0-9 ]{0,11}", 2..=6).prop_map(|options| MultipleChoiceSpec {
            options: options.into_iter().collect(),
        })
    }

    /// Scales with `max > min`, including negative and wide ranges.
    pub fn arb_likert_spec() -> impl Strategy<Value = LikertSpec> {
        (-5i64..=5, 1i64..=10).prop_map(|(min, span)| LikertSpec {
            min,
            max: min + span,
            min_label: None,
            max_label: None,
        })
    }

    pub fn arb_question_spec() -> impl Strategy<Value = QuestionSpec> {
        prop_oneof![
            arb_textbox_spec().prop_map(QuestionSpec::Textbox),
            arb_multiple_choice_spec().prop_map(QuestionSpec::MultipleChoice),
            arb_likert_spec().prop_map(QuestionSpec::Likert),
        ]
    }

    pub fn arb_question_draft() -> impl Strategy<Value = QuestionDraft> {
        ("[A-Z][a-z ]{2,30}\\?", arb_question_spec())
            .prop_map(|(text, spec)| QuestionDraft::with_spec(text, spec))
    }

    /// Valid survey input with up to `max_questions` questions.
    pub fn arb_new_survey(max_questions: usize) -> impl Strategy<Value = NewSurvey> {
        (
            "[A-Z][a-z]{2,12}( [a-z]{2,8}){0,3}",
            vec(arb_question_draft(), 0..=max_questions),
        )
            .prop_map(|(name, questions)| NewSurvey::new(name, questions))
    }

    /// An answer the question's specification accepts.
    pub fn arb_valid_answer(question: &Question) -> BoxedStrategy<String> {
        match &question.spec {
            QuestionSpec::Textbox(spec) => {
                let max = usize::try_from(spec.max_length).unwrap_or(1).max(1);
                vec(prop::char::range('a', 'z'), 0..=max)
                    .prop_map(|chars| chars.into_iter().collect())
                    .boxed()
            }
            QuestionSpec::MultipleChoice(spec) => {
                prop::sample::select(spec.options.clone()).boxed()
            }
            QuestionSpec::Likert(spec) => (spec.min..=spec.max).prop_map(|v| v.to_string()).boxed(),
        }
    }
}

// ============================================================================
// TEST FIXTURES
// ============================================================================

pub mod fixtures {
    //! Pre-built surveys and submissions for common scenarios.

    use super::*;
    use chrono::Utc;
    use tally_core::generate_token;

    /// The demo survey: one 1..5 LIKERT question.
    pub fn demo_survey() -> NewSurvey {
        NewSurvey::new(
            "Demo",
            vec![QuestionDraft::with_spec(
                "How satisfied are you?",
                QuestionSpec::Likert(LikertSpec::default()),
            )],
        )
    }

    /// One question of each type.
    pub fn feedback_survey() -> NewSurvey {
        NewSurvey::new(
            "Product feedback",
            vec![
                QuestionDraft::with_spec(
                    "What did you like?",
                    QuestionSpec::Textbox(TextboxSpec { max_length: 200 }),
                ),
                QuestionDraft::with_spec(
                    "Favorite color?",
                    QuestionSpec::MultipleChoice(MultipleChoiceSpec {
                        options: vec!["Red".to_string(), "Green".to_string(), "Blue".to_string()],
                    }),
                ),
                QuestionDraft::with_spec(
                    "Would you recommend us?",
                    QuestionSpec::Likert(LikertSpec {
                        min: 1,
                        max: 5,
                        min_label: Some("Never".to_string()),
                        max_label: Some("Always".to_string()),
                    }),
                ),
            ],
        )
    }

    /// Materialize survey input with a fresh token.
    pub fn persisted(new: NewSurvey) -> Result<Survey, ValidationError> {
        new.into_survey(generate_token(), Utc::now())
    }

    /// A deterministic accepted answer for `question`.
    pub fn valid_answer(question: &Question) -> String {
        match &question.spec {
            QuestionSpec::Textbox(spec) => {
                let max = usize::try_from(spec.max_length).unwrap_or(0);
                "Great product".chars().take(max.max(1)).collect()
            }
            QuestionSpec::MultipleChoice(spec) => spec.options.first().cloned().unwrap_or_default(),
            QuestionSpec::Likert(spec) => spec.max.to_string(),
        }
    }

    /// One accepted answer per question, in question order.
    pub fn answer_all(survey: &Survey) -> Vec<SubmissionResponse> {
        survey
            .questions
            .iter()
            .map(|q| SubmissionResponse::new(q.id, valid_answer(q)))
            .collect()
    }

    /// A complete submission to `survey`.
    pub fn full_submission(survey: &Survey) -> Submission {
        Submission::new(survey.id, answer_all(survey), Utc::now())
    }
}

// ============================================================================
// CUSTOM ASSERTIONS
// ============================================================================

pub mod assertions {
    //! Assertions over Tally error variants.

    use super::*;

    pub fn assert_validation_error<T: std::fmt::Debug>(result: &TallyResult<T>) {
        assert!(
            matches!(result, Err(TallyError::Validation(_))),
            "Expected ValidationError, got {:?}",
            result
        );
    }

    pub fn assert_not_found<T: std::fmt::Debug>(result: &TallyResult<T>) {
        assert!(
            matches!(result, Err(TallyError::Storage(StorageError::NotFound { .. }))),
            "Expected NotFound, got {:?}",
            result
        );
    }

    pub fn assert_lifecycle_error<T: std::fmt::Debug>(result: &TallyResult<T>) {
        assert!(
            matches!(result, Err(TallyError::Lifecycle(_))),
            "Expected LifecycleError, got {:?}",
            result
        );
    }

    /// Terminal insights carry `completed_at`; others do not.
    pub fn assert_completion_consistent(insight: &Insight) {
        assert_eq!(
            insight.status.is_terminal(),
            insight.completed_at.is_some(),
            "status {} with completed_at {:?}",
            insight.status,
            insight.completed_at
        );
    }
}

#[cfg(test)]
mod tests {
    use super::fixtures::*;
    use super::*;
    use tally_core::validate_submission;

    #[test]
    fn test_fixtures_are_valid() {
        for new in [demo_survey(), feedback_survey()] {
            let survey = persisted(new).unwrap();
            let responses = validate_submission(&survey, answer_all(&survey)).unwrap();
            assert_eq!(responses.len(), survey.questions.len());
        }
    }

    #[tokio::test]
    async fn test_scripted_summarizer_records_references() {
        let scripted = ScriptedSummarizer::failing("meta");
        let survey = persisted(demo_survey()).unwrap();
        let batches = tally_core::build_batches(&survey, &[full_submission(&survey)]);
        let id = tally_core::new_entity_id();

        assert!(scripted
            .summarizer
            .summarize_batch(id, ContextType::ProductSatisfaction, &batches[0])
            .await
            .is_ok());
        assert!(scripted
            .summarizer
            .summarize_overall(id, ContextType::ProductSatisfaction, &batches)
            .await
            .is_err());
        assert_eq!(
            scripted.references(),
            vec![format!("insight:{} batch:1", id), format!("insight:{} meta", id)]
        );
    }
}
