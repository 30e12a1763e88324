//! Insights: asynchronous summaries of a survey's submissions.

use crate::question::Question;
#[cfg(feature = "openapi")]
use crate::question::QuestionWire;
use crate::{new_entity_id, EntityId, LifecycleError, Timestamp};
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;
use std::fmt;
use std::str::FromStr;

// ============================================================================
// CONTEXT TYPE
// ============================================================================

/// Framing hint passed to the summarizer.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ContextType {
    CourseFeedback,
    ProductSatisfaction,
    EmployeeEngagement,
    EventFeedback,
}

impl ContextType {
    pub const ALL: [ContextType; 4] = [
        ContextType::CourseFeedback,
        ContextType::ProductSatisfaction,
        ContextType::EmployeeEngagement,
        ContextType::EventFeedback,
    ];

    pub fn as_db_str(&self) -> &'static str {
        match self {
            ContextType::CourseFeedback => "COURSE_FEEDBACK",
            ContextType::ProductSatisfaction => "PRODUCT_SATISFACTION",
            ContextType::EmployeeEngagement => "EMPLOYEE_ENGAGEMENT",
            ContextType::EventFeedback => "EVENT_FEEDBACK",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, ContextTypeParseError> {
        match s {
            "COURSE_FEEDBACK" => Ok(ContextType::CourseFeedback),
            "PRODUCT_SATISFACTION" => Ok(ContextType::ProductSatisfaction),
            "EMPLOYEE_ENGAGEMENT" => Ok(ContextType::EmployeeEngagement),
            "EVENT_FEEDBACK" => Ok(ContextType::EventFeedback),
            _ => Err(ContextTypeParseError(s.to_string())),
        }
    }

    /// Human-readable phrase used inside prompts.
    pub fn label(&self) -> &'static str {
        match self {
            ContextType::CourseFeedback => "course feedback",
            ContextType::ProductSatisfaction => "product satisfaction",
            ContextType::EmployeeEngagement => "employee engagement",
            ContextType::EventFeedback => "event feedback",
        }
    }
}

impl fmt::Display for ContextType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for ContextType {
    type Err = ContextTypeParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ContextTypeParseError(pub String);

impl fmt::Display for ContextTypeParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid context type: {}", self.0)
    }
}

impl std::error::Error for ContextTypeParseError {}

// ============================================================================
// STATUS
// ============================================================================

/// Insight lifecycle. Moves forward only:
/// `PENDING -> PROCESSING -> COMPLETED | FAILED`.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize, Default)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum InsightStatus {
    #[default]
    Pending,
    Processing,
    Completed,
    Failed,
}

impl InsightStatus {
    pub fn as_db_str(&self) -> &'static str {
        match self {
            InsightStatus::Pending => "PENDING",
            InsightStatus::Processing => "PROCESSING",
            InsightStatus::Completed => "COMPLETED",
            InsightStatus::Failed => "FAILED",
        }
    }

    pub fn from_db_str(s: &str) -> Result<Self, InsightStatusParseError> {
        match s {
            "PENDING" => Ok(InsightStatus::Pending),
            "PROCESSING" => Ok(InsightStatus::Processing),
            "COMPLETED" => Ok(InsightStatus::Completed),
            "FAILED" => Ok(InsightStatus::Failed),
            _ => Err(InsightStatusParseError(s.to_string())),
        }
    }

    pub fn is_terminal(&self) -> bool {
        matches!(self, InsightStatus::Completed | InsightStatus::Failed)
    }

    pub fn can_transition_to(&self, next: InsightStatus) -> bool {
        matches!(
            (self, next),
            (InsightStatus::Pending, InsightStatus::Processing)
                | (InsightStatus::Processing, InsightStatus::Completed)
                | (InsightStatus::Processing, InsightStatus::Failed)
        )
    }
}

impl fmt::Display for InsightStatus {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_db_str())
    }
}

impl FromStr for InsightStatus {
    type Err = InsightStatusParseError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        Self::from_db_str(s)
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InsightStatusParseError(pub String);

impl fmt::Display for InsightStatusParseError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "Invalid insight status: {}", self.0)
    }
}

impl std::error::Error for InsightStatusParseError {}

// ============================================================================
// BATCHES
// ============================================================================

/// One unit of summarization: answers to a single question, possibly one of
/// several batches for the same question when the text volume is large.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct InsightBatch {
    pub batch_number: u32,
    #[cfg_attr(feature = "openapi", schema(value_type = QuestionWire))]
    pub question: Question,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub aggregated_answer: Option<BTreeMap<String, u64>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub textual_answers: Option<Vec<String>>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub summary: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl InsightBatch {
    /// A batch is settled once it has either a summary or a recorded error.
    pub fn is_settled(&self) -> bool {
        self.summary.is_some() || self.error.is_some()
    }

    pub fn answer_count(&self) -> u64 {
        match (&self.aggregated_answer, &self.textual_answers) {
            (Some(counts), _) => counts.values().sum(),
            (None, Some(answers)) => answers.len() as u64,
            (None, None) => 0,
        }
    }
}

// ============================================================================
// INSIGHT
// ============================================================================

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct Insight {
    #[cfg_attr(feature = "openapi", schema(value_type = uuid::Uuid))]
    pub id: EntityId,
    #[cfg_attr(feature = "openapi", schema(value_type = uuid::Uuid))]
    pub survey_id: EntityId,
    pub context_type: ContextType,
    pub status: InsightStatus,
    #[serde(default)]
    pub analysis: String,
    #[serde(default)]
    pub batches: Vec<InsightBatch>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub error_log: Option<String>,
    #[cfg_attr(feature = "openapi", schema(value_type = chrono::DateTime<chrono::Utc>))]
    pub created_at: Timestamp,
    #[cfg_attr(feature = "openapi", schema(value_type = chrono::DateTime<chrono::Utc>))]
    pub updated_at: Timestamp,
    #[serde(default)]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<chrono::DateTime<chrono::Utc>>))]
    pub completed_at: Option<Timestamp>,
}

impl Insight {
    pub fn new(
        survey_id: EntityId,
        context_type: ContextType,
        batches: Vec<InsightBatch>,
        now: Timestamp,
    ) -> Self {
        Self {
            id: new_entity_id(),
            survey_id,
            context_type,
            status: InsightStatus::Pending,
            analysis: String::new(),
            batches,
            error_log: None,
            created_at: now,
            updated_at: now,
            completed_at: None,
        }
    }

    fn transition(&mut self, next: InsightStatus, now: Timestamp) -> Result<(), LifecycleError> {
        if !self.status.can_transition_to(next) {
            return Err(LifecycleError::InvalidTransition {
                from: self.status,
                to: next,
            });
        }
        self.status = next;
        self.updated_at = now;
        if next.is_terminal() {
            self.completed_at = Some(now);
        }
        Ok(())
    }

    /// Enter PROCESSING. Already processing is accepted so an interrupted
    /// job can resume.
    pub fn start_processing(&mut self, now: Timestamp) -> Result<(), LifecycleError> {
        if self.status == InsightStatus::Processing {
            return Ok(());
        }
        self.transition(InsightStatus::Processing, now)
    }

    pub fn complete(&mut self, analysis: String, now: Timestamp) -> Result<(), LifecycleError> {
        self.transition(InsightStatus::Completed, now)?;
        self.analysis = analysis;
        Ok(())
    }

    pub fn fail(&mut self, error: String, now: Timestamp) -> Result<(), LifecycleError> {
        self.transition(InsightStatus::Failed, now)?;
        self.analysis.clear();
        self.error_log = Some(error);
        Ok(())
    }

    pub fn all_batches_settled(&self) -> bool {
        self.batches.iter().all(InsightBatch::is_settled)
    }

    /// Indices of batches still waiting for a summary.
    pub fn unsettled_batches(&self) -> Vec<usize> {
        self.batches
            .iter()
            .enumerate()
            .filter(|(_, batch)| !batch.is_settled())
            .map(|(index, _)| index)
            .collect()
    }
}

// =============================================================================
// TESTS
// =============================================================================
