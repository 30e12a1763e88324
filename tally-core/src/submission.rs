//! Respondent submissions and the rules that accept them.

use crate::{new_entity_id, EntityId, Survey, Timestamp, ValidationError};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;

/// One answer. Answers are always text; their meaning comes from the
/// question's specification.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct SubmissionResponse {
    #[cfg_attr(feature = "openapi", schema(value_type = uuid::Uuid))]
    pub question_id: EntityId,
    pub answer: String,
}

impl SubmissionResponse {
    pub fn new(question_id: EntityId, answer: impl Into<String>) -> Self {
        Self {
            question_id,
            answer: answer.into(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Submission {
    #[cfg_attr(feature = "openapi", schema(value_type = uuid::Uuid))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = uuid::Uuid))]
    pub survey_id: EntityId,
    pub responses: Vec<SubmissionResponse>,
    #[cfg_attr(feature = "openapi", schema(value_type = chrono::DateTime<chrono::Utc>))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = chrono::DateTime<chrono::Utc>))]
    pub updated_at: Timestamp,
}

impl Submission {
    pub fn new(survey_id: EntityId, responses: Vec<SubmissionResponse>, now: Timestamp) -> Self {
        Self {
            id: new_entity_id(),
            survey_id,
            responses,
            created_at: now,
            updated_at: now,
        }
    }

    pub fn answer_for(&self, question_id: EntityId) -> Option<&str> {
        self.responses
            .iter()
            .find(|r| r.question_id == question_id)
            .map(|r| r.answer.as_str())
    }
}

/// Public submission input, addressed by survey token.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewSubmission {
    pub survey_token: String,
    #[serde(default)]
    pub responses: Vec<SubmissionResponse>,
}

/// Check `responses` against `survey` and return them in question order.
///
/// Every response must target a question of the survey, at most once, with
/// an answer its specification accepts; every question must be answered.
pub fn validate_submission(
    survey: &Survey,
    responses: Vec<SubmissionResponse>,
) -> Result<Vec<SubmissionResponse>, ValidationError> {
    let mut by_question: HashMap<EntityId, SubmissionResponse> =
        HashMap::with_capacity(responses.len());

    for mut response in responses {
        let question = survey.question(response.question_id).ok_or_else(|| {
            ValidationError::UnknownQuestion {
                question_id: response.question_id.to_string(),
            }
        })?;
        if by_question.contains_key(&question.id) {
            return Err(ValidationError::DuplicateAnswer {
                question_id: question.id.to_string(),
            });
        }
        if !question.accepts(&response.answer) {
            return Err(ValidationError::InvalidAnswer {
                question_id: question.id.to_string(),
            });
        }
        response.answer = question.spec.canonical_answer(response.answer);
        by_question.insert(question.id, response);
    }

    survey
        .questions
        .iter()
        .map(|question| {
            by_question
                .remove(&question.id)
                .ok_or_else(|| ValidationError::MissingAnswer {
                    question_id: question.id.to_string(),
                })
        })
        .collect()
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::question::{MultipleChoiceSpec, QuestionDraft, QuestionKind, QuestionSpec};
    use crate::NewSurvey;
    use chrono::Utc;

    fn survey() -> Survey {
        NewSurvey::new(
            "Feedback",
            vec![
                QuestionDraft::new(QuestionKind::Textbox, "Comments"),
                QuestionDraft::with_spec(
                    "Colour",
                    QuestionSpec::MultipleChoice(MultipleChoiceSpec {
                        options: vec!["Red".to_string(), "Blue".to_string()],
                    }),
                ),
                QuestionDraft::new(QuestionKind::Likert, "Score"),
            ],
        )
        .into_survey("tok01".to_string(), Utc::now())
        .unwrap()
    }

    #[test]
    fn test_valid_submission_is_reordered() {
        let survey = survey();
        let q = &survey.questions;
        let responses = vec![
            SubmissionResponse::new(q[2].id, "4"),
            SubmissionResponse::new(q[0].id, "great"),
            SubmissionResponse::new(q[1].id, "Blue"),
        ];
        let accepted = validate_submission(&survey, responses).unwrap();
        let ids: Vec<EntityId> = accepted.iter().map(|r| r.question_id).collect();
        assert_eq!(ids, vec![q[0].id, q[1].id, q[2].id]);
    }

    #[test]
    fn test_likert_answers_are_stored_as_plain_integers() {
        let survey = survey();
        let q = &survey.questions;
        for spelling in ["4", "04", "+4"] {
            let accepted = validate_submission(
                &survey,
                vec![
                    SubmissionResponse::new(q[0].id, " keep  spacing "),
                    SubmissionResponse::new(q[1].id, "Red"),
                    SubmissionResponse::new(q[2].id, spelling),
                ],
            )
            .unwrap();
            assert_eq!(accepted[2].answer, "4");
            assert_eq!(accepted[0].answer, " keep  spacing ");
        }
    }

    #[test]
    fn test_unknown_question_rejected() {
        let survey = survey();
        let stray = crate::new_entity_id();
        let err = validate_submission(&survey, vec![SubmissionResponse::new(stray, "x")]).unwrap_err();
        assert_eq!(
            err,
            ValidationError::UnknownQuestion {
                question_id: stray.to_string()
            }
        );
    }

    #[test]
    fn test_missing_answer_rejected() {
        let survey = survey();
        let q = &survey.questions;
        let err = validate_submission(
            &survey,
            vec![
                SubmissionResponse::new(q[0].id, "fine"),
                SubmissionResponse::new(q[1].id, "Red"),
            ],
        )
        .unwrap_err();
        assert_eq!(
            err,
            ValidationError::MissingAnswer {
                question_id: q[2].id.to_string()
            }
        );
    }

    #[test]
    fn test_duplicate_answer_rejected() {
        let survey = survey();
        let q = &survey.questions;
        let err = validate_submission(
            &survey,
            vec![
                SubmissionResponse::new(q[0].id, "one"),
                SubmissionResponse::new(q[0].id, "two"),
            ],
        )
        .unwrap_err();
        assert!(matches!(err, ValidationError::DuplicateAnswer { .. }));
    }

    #[test]
    fn test_invalid_answers_rejected() {
        let survey = survey();
        let q = &survey.questions;
        let long = "x".repeat(101);
        for (index, answer) in [(0, long.as_str()), (1, "Green"), (2, "9")] {
            let mut responses = vec![
                SubmissionResponse::new(q[0].id, "ok"),
                SubmissionResponse::new(q[1].id, "Red"),
                SubmissionResponse::new(q[2].id, "3"),
            ];
            responses[index].answer = answer.to_string();
            let err = validate_submission(&survey, responses).unwrap_err();
            assert_eq!(
                err,
                ValidationError::InvalidAnswer {
                    question_id: q[index].id.to_string()
                }
            );
        }
    }

    #[test]
    fn test_zero_question_survey_accepts_empty_submission() {
        let survey = NewSurvey::new("Nothing", vec![])
            .into_survey("empty".to_string(), Utc::now())
            .unwrap();
        assert!(validate_submission(&survey, vec![]).unwrap().is_empty());
    }
}
