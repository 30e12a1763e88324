//! Property-Based Tests for Survey Validation Rules
//!
//! **Property 1: Question order survives creation**
//! **Property 2: Likert bounds hold after defaulting**
//! **Property 3: Answers are checked against their specification**
//! **Property 4: Text batches respect the character budget**

use chrono::Utc;
use proptest::prelude::*;
use serde_json::json;
use tally_core::{
    build_batches, validate_submission, LikertSpec, MultipleChoiceSpec, NewSurvey, QuestionDraft,
    QuestionKind, QuestionSpec, Submission, SubmissionResponse, Survey, TextboxSpec,
    TEXT_BATCH_CHAR_LIMIT,
};

// ============================================================================
// PROPERTY TEST STRATEGIES
// ============================================================================

fn kind_strategy() -> impl Strategy<Value = QuestionKind> {
    prop_oneof![
        Just(QuestionKind::Textbox),
        Just(QuestionKind::MultipleChoice),
        Just(QuestionKind::Likert),
    ]
}

fn options_strategy() -> impl Strategy<Value = Vec<String>> {
    prop::collection::btree_set("[A-Za-z][A-Za-z ]{0,11}", 2..8)
        .prop_map(|set| set.into_iter().collect())
}

fn draft_strategy() -> impl Strategy<Value = QuestionDraft> {
    (kind_strategy(), "[A-Z][a-z ]{2,30}\\?", options_strategy(), 1i64..=250).prop_map(
        |(kind, text, options, max_length)| {
            let spec = match kind {
                QuestionKind::Textbox => QuestionSpec::Textbox(TextboxSpec { max_length }),
                QuestionKind::MultipleChoice => {
                    QuestionSpec::MultipleChoice(MultipleChoiceSpec { options })
                }
                QuestionKind::Likert => QuestionSpec::Likert(LikertSpec::default()),
            };
            QuestionDraft::with_spec(text, spec)
        },
    )
}

fn survey_with(drafts: Vec<QuestionDraft>) -> Survey {
    NewSurvey::new("Property survey", drafts)
        .into_survey("prop1".to_string(), Utc::now())
        .expect("generated drafts are valid")
}

// ============================================================================
// PROPERTY TESTS
// ============================================================================

proptest! {
    #![proptest_config(ProptestConfig::with_cases(100))]

    /// Question texts and kinds come back in insertion order, and a JSON
    /// round trip of the survey keeps that order.
    #[test]
    fn prop_question_order_preserved(drafts in prop::collection::vec(draft_strategy(), 0..12)) {
        let expected: Vec<(String, QuestionKind)> =
            drafts.iter().map(|d| (d.text.clone(), d.kind())).collect();
        let survey = survey_with(drafts);

        let encoded = serde_json::to_string(&survey).expect("serialize");
        let decoded: Survey = serde_json::from_str(&encoded).expect("deserialize");

        let actual: Vec<(String, QuestionKind)> =
            decoded.questions.iter().map(|q| (q.text.clone(), q.kind())).collect();
        prop_assert_eq!(actual, expected);
        prop_assert_eq!(decoded, survey);
    }

    /// Supplying only `max` defaults `min` to 1, and the result is valid
    /// exactly when `max > 1`.
    #[test]
    fn prop_likert_max_only(max in -20i64..40) {
        let spec = QuestionSpec::from_value(QuestionKind::Likert, Some(json!({"max": max})))
            .expect("likert payload parses");
        match &spec {
            QuestionSpec::Likert(likert) => {
                prop_assert_eq!(likert.min, 1);
                prop_assert_eq!(likert.max, max);
            }
            other => prop_assert!(false, "unexpected spec {:?}", other),
        }
        prop_assert_eq!(spec.validate().is_ok(), max > 1);
    }

    /// Any accepted Likert specification has `max > min`.
    #[test]
    fn prop_likert_accepted_implies_ordered(min in -50i64..50, max in -50i64..50) {
        let spec = QuestionSpec::Likert(LikertSpec { min, max, min_label: None, max_label: None });
        if spec.validate().is_ok() {
            prop_assert!(max > min);
        } else {
            prop_assert!(max <= min);
        }
    }

    /// Text answers longer than `max_length` are rejected, others accepted.
    #[test]
    fn prop_textbox_length(max_length in 1i64..=250, answer in "[a-zé ]{0,300}") {
        let spec = QuestionSpec::Textbox(TextboxSpec { max_length });
        let len = answer.chars().count() as i64;
        prop_assert_eq!(spec.accepts(&answer), len <= max_length);
    }

    /// A choice answer is accepted iff it equals one of the options byte for byte.
    #[test]
    fn prop_choice_exact_match(options in options_strategy(), pick in any::<prop::sample::Index>(), noise in "[a-z]{1,3}") {
        let spec = QuestionSpec::MultipleChoice(MultipleChoiceSpec { options: options.clone() });
        let chosen = pick.get(&options).clone();
        prop_assert!(spec.accepts(&chosen));

        let altered = format!("{}{}", chosen, noise);
        prop_assert_eq!(spec.accepts(&altered), options.contains(&altered));
        prop_assert_eq!(spec.accepts(&chosen.to_uppercase()), options.contains(&chosen.to_uppercase()));
    }

    /// Likert answers are integers inside the scale.
    #[test]
    fn prop_likert_range(min in -10i64..10, span in 1i64..10, answer in -30i64..30) {
        let spec = QuestionSpec::Likert(LikertSpec { min, max: min + span, min_label: None, max_label: None });
        prop_assert_eq!(spec.accepts(&answer.to_string()), answer >= min && answer <= min + span);
    }

    /// Answering every question and reading back gives a one-to-one match
    /// by question id.
    #[test]
    fn prop_submission_round_trip(count in 1usize..8, seed in any::<u64>()) {
        let drafts: Vec<QuestionDraft> = (0..count)
            .map(|i| QuestionDraft::new(QuestionKind::Likert, format!("Question {}", i)))
            .collect();
        let survey = survey_with(drafts);

        let mut responses: Vec<SubmissionResponse> = survey
            .questions
            .iter()
            .enumerate()
            .map(|(i, q)| SubmissionResponse::new(q.id, ((((seed % 5) as usize + i) % 5) + 1).to_string()))
            .collect();
        responses.reverse();

        let accepted = validate_submission(&survey, responses.clone()).expect("valid submission");
        let submission = Submission::new(survey.id, accepted, Utc::now());
        let decoded: Submission =
            serde_json::from_str(&serde_json::to_string(&submission).expect("serialize")).expect("deserialize");

        prop_assert_eq!(decoded.responses.len(), survey.questions.len());
        for question in &survey.questions {
            let sent: Vec<&SubmissionResponse> =
                responses.iter().filter(|r| r.question_id == question.id).collect();
            prop_assert_eq!(sent.len(), 1);
            prop_assert_eq!(decoded.answer_for(question.id), Some(sent[0].answer.as_str()));
        }
    }

    /// Text batches never exceed the character budget unless they hold a
    /// single answer, and together they keep every non-blank answer in order.
    #[test]
    fn prop_text_batches_partition(lengths in prop::collection::vec(1usize..=250, 0..80)) {
        let survey = survey_with(vec![QuestionDraft::with_spec(
            "Tell us more",
            QuestionSpec::Textbox(TextboxSpec { max_length: 250 }),
        )]);
        let question_id = survey.questions[0].id;
        let answers: Vec<String> = lengths.iter().map(|n| "x".repeat(*n)).collect();
        let submissions: Vec<Submission> = answers
            .iter()
            .map(|a| Submission::new(survey.id, vec![SubmissionResponse::new(question_id, a.clone())], Utc::now()))
            .collect();

        let batches = build_batches(&survey, &submissions);
        prop_assert!(!batches.is_empty());

        let mut rebuilt = Vec::new();
        for (index, batch) in batches.iter().enumerate() {
            prop_assert_eq!(batch.batch_number as usize, index + 1);
            let texts = batch.textual_answers.clone().unwrap_or_default();
            let total: usize = texts.iter().map(|t| t.chars().count()).sum();
            prop_assert!(total <= TEXT_BATCH_CHAR_LIMIT || texts.len() == 1);
            rebuilt.extend(texts);
        }
        prop_assert_eq!(rebuilt, answers);
    }
}
