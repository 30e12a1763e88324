//! Surveys and their public tokens.

use crate::question::{Question, QuestionDraft};
#[cfg(feature = "openapi")]
use crate::question::QuestionWire;
use crate::{new_entity_id, EntityId, Timestamp, ValidationError};
use rand::distr::Alphanumeric;
use rand::Rng;
use serde::{Deserialize, Serialize};

/// Length of the public survey token.
pub const TOKEN_LENGTH: usize = 5;

/// Generate a URL-safe public token from `[A-Za-z0-9]`.
pub fn generate_token() -> String {
    rand::rng()
        .sample_iter(&Alphanumeric)
        .take(TOKEN_LENGTH)
        .map(char::from)
        .collect()
}

/// A persisted survey.
///
/// `token` is the only thing respondents ever see; `id` stays internal.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Survey {
    #[cfg_attr(feature = "openapi", schema(value_type = uuid::Uuid))]
    pub id: EntityId,
    pub token: String,
    pub name: String,
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<QuestionWire>))]
    pub questions: Vec<Question>,
    #[cfg_attr(feature = "openapi", schema(value_type = chrono::DateTime<chrono::Utc>))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = chrono::DateTime<chrono::Utc>))]
    pub updated_at: Timestamp,
}

impl Survey {
    pub fn question(&self, id: EntityId) -> Option<&Question> {
        self.questions.iter().find(|q| q.id == id)
    }
}

/// Survey creation input.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct NewSurvey {
    pub name: String,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Vec<QuestionWire>))]
    pub questions: Vec<QuestionDraft>,
}

impl NewSurvey {
    pub fn new(name: impl Into<String>, questions: Vec<QuestionDraft>) -> Self {
        Self {
            name: name.into(),
            questions,
        }
    }

    /// Check the name and every question. An empty question list is allowed.
    pub fn validate(&self) -> Result<(), ValidationError> {
        if self.name.trim().is_empty() {
            return Err(ValidationError::required("name"));
        }
        for (index, question) in self.questions.iter().enumerate() {
            question.validate().map_err(|err| match err {
                ValidationError::InvalidValue { field, reason } => ValidationError::InvalidValue {
                    field: format!("questions[{}].{}", index, field),
                    reason,
                },
                other => other,
            })?;
        }
        Ok(())
    }

    /// Validate and materialize the survey, assigning ids in question order.
    pub fn into_survey(self, token: String, now: Timestamp) -> Result<Survey, ValidationError> {
        self.validate()?;
        Ok(Survey {
            id: new_entity_id(),
            token,
            name: self.name.trim().to_string(),
            questions: self
                .questions
                .into_iter()
                .map(|draft| draft.into_question(new_entity_id()))
                .collect(),
            created_at: now,
            updated_at: now,
        })
    }
}
