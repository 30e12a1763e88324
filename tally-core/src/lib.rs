//! Tally Core - Survey, Submission and Insight Types
//!
//! Domain types and the rules that govern them. Every other crate depends on
//! this one; nothing here performs I/O.

use chrono::{DateTime, Utc};
use uuid::Uuid;

pub mod batching;
pub mod error;
pub mod insight;
pub mod pagination;
pub mod question;
pub mod submission;
pub mod survey;

pub use batching::{build_batches, TEXT_BATCH_CHAR_LIMIT};
pub use error::{
    ConfigError, LifecycleError, ProviderError, StorageError, TallyError, TallyResult,
    ValidationError,
};
pub use insight::{
    ContextType, ContextTypeParseError, Insight, InsightBatch, InsightStatus,
    InsightStatusParseError,
};
pub use pagination::{Page, PageRequest, DEFAULT_PAGE_LIMIT, MAX_PAGE_LIMIT};
pub use question::{
    LikertSpec, MultipleChoiceSpec, Question, QuestionDraft, QuestionKind, QuestionKindParseError,
    QuestionSpec, QuestionWire, TextboxSpec,
};
pub use submission::{validate_submission, NewSubmission, Submission, SubmissionResponse};
pub use survey::{generate_token, NewSurvey, Survey, TOKEN_LENGTH};

// ============================================================================
// IDENTITY TYPES
// ============================================================================

/// Entity identifier using UUIDv7 so ids sort by creation time.
pub type EntityId = Uuid;

/// Timestamp type using UTC timezone.
pub type Timestamp = DateTime<Utc>;

/// Generate a new UUIDv7 EntityId.
pub fn new_entity_id() -> EntityId {
    Uuid::now_v7()
}

/// Entity type discriminator used in not-found errors and logs.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum EntityType {
    Survey,
    Submission,
    Insight,
    CompletionLog,
}

impl EntityType {
    pub fn as_str(&self) -> &'static str {
        match self {
            EntityType::Survey => "Survey",
            EntityType::Submission => "Submission",
            EntityType::Insight => "Insight",
            EntityType::CompletionLog => "CompletionLog",
        }
    }
}

impl std::fmt::Display for EntityType {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.write_str(self.as_str())
    }
}
