//! Partitioning of submissions into per-question summarization batches.

use crate::question::{Question, QuestionSpec};
use crate::{InsightBatch, Submission, Survey};
use std::collections::BTreeMap;

/// Upper bound on the characters of free-text answers sent in one batch.
pub const TEXT_BATCH_CHAR_LIMIT: usize = 4000;

/// Build the batches for an insight over `submissions`.
///
/// Questions are visited in survey order and numbered from 1. Choice and
/// Likert questions get one batch of answer counts; multiple-choice counts
/// list every option, answered or not. Textbox questions get one or more
/// batches of answers: a new batch starts when the current one holds text and
/// the next answer would push it past [`TEXT_BATCH_CHAR_LIMIT`].
pub fn build_batches(survey: &Survey, submissions: &[Submission]) -> Vec<InsightBatch> {
    let mut batches: Vec<InsightBatch> = Vec::with_capacity(survey.questions.len());

    for question in &survey.questions {
        let answers = submissions
            .iter()
            .filter_map(|submission| submission.answer_for(question.id));

        match &question.spec {
            QuestionSpec::Textbox(_) => push_text_batches(&mut batches, question, answers),
            QuestionSpec::MultipleChoice(spec) => {
                let mut counts: BTreeMap<String, u64> =
                    spec.options.iter().map(|o| (o.clone(), 0)).collect();
                for answer in answers {
                    *counts.entry(answer.to_string()).or_insert(0) += 1;
                }
                push_batch(&mut batches, question, Some(counts), None);
            }
            QuestionSpec::Likert(spec) => {
                let mut counts: BTreeMap<String, u64> = BTreeMap::new();
                for value in answers.filter_map(|answer| spec.value_of(answer)) {
                    *counts.entry(value.to_string()).or_insert(0) += 1;
                }
                push_batch(&mut batches, question, Some(counts), None);
            }
        }
    }

    batches
}

fn push_text_batches<'a>(
    batches: &mut Vec<InsightBatch>,
    question: &Question,
    answers: impl Iterator<Item = &'a str>,
) {
    let mut current: Vec<String> = Vec::new();
    let mut length = 0usize;

    for answer in answers.filter(|a| !a.trim().is_empty()) {
        let answer_length = answer.chars().count();
        if length > 0 && length + answer_length > TEXT_BATCH_CHAR_LIMIT {
            push_batch(batches, question, None, Some(std::mem::take(&mut current)));
            length = 0;
        }
        current.push(answer.to_string());
        length += answer_length;
    }

    push_batch(batches, question, None, Some(current));
}

fn push_batch(
    batches: &mut Vec<InsightBatch>,
    question: &Question,
    aggregated_answer: Option<BTreeMap<String, u64>>,
    textual_answers: Option<Vec<String>>,
) {
    let batch_number = u32::try_from(batches.len() + 1).unwrap_or(u32::MAX);
    batches.push(InsightBatch {
        batch_number,
        question: question.clone(),
        aggregated_answer,
        textual_answers,
        summary: None,
        error: None,
    });
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{MultipleChoiceSpec, QuestionDraft, QuestionKind, TextboxSpec};
    use crate::{NewSurvey, SubmissionResponse};
    use chrono::Utc;

    fn survey() -> Survey {
        NewSurvey::new(
            "Batches",
            vec![
                QuestionDraft::with_spec(
                    "Colour",
                    QuestionSpec::MultipleChoice(MultipleChoiceSpec {
                        options: vec!["Red".to_string(), "Blue".to_string(), "Green".to_string()],
                    }),
                ),
                QuestionDraft::with_spec(
                    "Thoughts",
                    QuestionSpec::Textbox(TextboxSpec { max_length: 250 }),
                ),
                QuestionDraft::new(QuestionKind::Likert, "Score"),
            ],
        )
        .into_survey("batch".to_string(), Utc::now())
        .unwrap()
    }

    fn submit(survey: &Survey, colour: &str, text: &str, score: &str) -> Submission {
        let q = &survey.questions;
        Submission::new(
            survey.id,
            vec![
                SubmissionResponse::new(q[0].id, colour),
                SubmissionResponse::new(q[1].id, text),
                SubmissionResponse::new(q[2].id, score),
            ],
            Utc::now(),
        )
    }

    #[test]
    fn test_one_batch_per_question_in_order() {
        let survey = survey();
        let submissions = vec![
            submit(&survey, "Red", "love it", "5"),
            submit(&survey, "Red", "meh", "3"),
            submit(&survey, "Blue", "", "5"),
        ];
        let batches = build_batches(&survey, &submissions);
        assert_eq!(batches.len(), 3);
        assert_eq!(
            batches.iter().map(|b| b.batch_number).collect::<Vec<_>>(),
            vec![1, 2, 3]
        );

        let colours = batches[0].aggregated_answer.as_ref().unwrap();
        assert_eq!(colours.get("Red"), Some(&2));
        assert_eq!(colours.get("Blue"), Some(&1));
        assert_eq!(colours.get("Green"), Some(&0));
        assert!(batches[0].textual_answers.is_none());

        assert_eq!(
            batches[1].textual_answers.as_deref(),
            Some(&["love it".to_string(), "meh".to_string()][..])
        );

        let scores = batches[2].aggregated_answer.as_ref().unwrap();
        assert_eq!(scores.get("5"), Some(&2));
        assert_eq!(scores.get("3"), Some(&1));
        assert_eq!(batches[2].answer_count(), 3);
    }

    #[test]
    fn test_likert_spellings_share_one_count() {
        let survey = survey();
        let submissions = vec![
            submit(&survey, "Red", "a", "4"),
            submit(&survey, "Red", "b", "04"),
            submit(&survey, "Red", "c", "+4"),
        ];
        let batches = build_batches(&survey, &submissions);
        let scores = batches[2].aggregated_answer.as_ref().unwrap();
        assert_eq!(scores.len(), 1);
        assert_eq!(scores.get("4"), Some(&3));
    }

    #[test]
    fn test_zero_submissions_yield_empty_batches() {
        let survey = survey();
        let batches = build_batches(&survey, &[]);
        assert_eq!(batches.len(), 3);
        assert!(batches.iter().all(|b| b.answer_count() == 0));
        assert!(batches.iter().all(|b| b.summary.is_none()));
    }

    #[test]
    fn test_text_batches_split_at_limit() {
        let survey = survey();
        let answer = "a".repeat(250);
        let submissions: Vec<Submission> = (0..40)
            .map(|_| submit(&survey, "Red", &answer, "4"))
            .collect();
        let batches = build_batches(&survey, &submissions);

        // 40 answers of 250 characters: 16 fit under 4000, so 16 + 16 + 8.
        let text_batches: Vec<&InsightBatch> = batches
            .iter()
            .filter(|b| b.textual_answers.is_some())
            .collect();
        let sizes: Vec<usize> = text_batches
            .iter()
            .map(|b| b.textual_answers.as_ref().map_or(0, Vec::len))
            .collect();
        assert_eq!(sizes, vec![16, 16, 8]);
        assert_eq!(
            batches.iter().map(|b| b.batch_number).collect::<Vec<_>>(),
            vec![1, 2, 3, 4, 5]
        );
        assert_eq!(batches[4].question.id, survey.questions[2].id);
    }

    #[test]
    fn test_zero_question_survey_has_no_batches() {
        let survey = NewSurvey::new("Empty", vec![])
            .into_survey("none0".to_string(), Utc::now())
            .unwrap();
        assert!(build_batches(&survey, &[]).is_empty());
    }
}
