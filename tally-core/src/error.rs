//! Error types for Tally operations

use crate::{EntityType, InsightStatus};
use thiserror::Error;

/// Input that violates a survey, question or submission rule.
///
/// The `Display` output of each variant is the message shown to users, so it
/// is kept short and free of internal detail.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ValidationError {
    #[error("{field} is required")]
    RequiredFieldMissing { field: String },

    #[error("invalid {field}: {reason}")]
    InvalidValue { field: String, reason: String },

    #[error("specification does not match question type {kind}: {reason}")]
    SpecificationMismatch { kind: String, reason: String },

    #[error("Survey not found")]
    SurveyNotFound,

    #[error("invalid question ID: {question_id}")]
    UnknownQuestion { question_id: String },

    #[error("duplicate answer for question ID: {question_id}")]
    DuplicateAnswer { question_id: String },

    #[error("invalid answer for question ID: {question_id}")]
    InvalidAnswer { question_id: String },

    #[error("missing answer for question ID: {question_id}")]
    MissingAnswer { question_id: String },
}

impl ValidationError {
    pub fn required(field: impl Into<String>) -> Self {
        Self::RequiredFieldMissing {
            field: field.into(),
        }
    }

    pub fn invalid(field: impl Into<String>, reason: impl Into<String>) -> Self {
        Self::InvalidValue {
            field: field.into(),
            reason: reason.into(),
        }
    }
}

/// Rejected insight status transitions.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum LifecycleError {
    #[error("insight cannot move from {from} to {to}")]
    InvalidTransition {
        from: InsightStatus,
        to: InsightStatus,
    },
}

/// Storage layer errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum StorageError {
    #[error("{entity_type} not found: {id}")]
    NotFound { entity_type: EntityType, id: String },

    #[error("Insert failed for {entity_type}: {reason}")]
    InsertFailed {
        entity_type: EntityType,
        reason: String,
    },

    #[error("Update failed for {entity_type} {id}: {reason}")]
    UpdateFailed {
        entity_type: EntityType,
        id: String,
        reason: String,
    },

    #[error("Survey token already in use")]
    DuplicateToken,

    #[error("Connection failed: {reason}")]
    ConnectionFailed { reason: String },

    #[error("Stored data is corrupt for {entity_type}: {reason}")]
    Corrupt {
        entity_type: EntityType,
        reason: String,
    },
}

impl StorageError {
    pub fn not_found(entity_type: EntityType, id: impl ToString) -> Self {
        Self::NotFound {
            entity_type,
            id: id.to_string(),
        }
    }
}

/// Summarization provider errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ProviderError {
    #[error("No summarization provider configured")]
    NotConfigured,

    #[error("Request to {provider} failed with status {status}: {body}")]
    RequestFailed {
        provider: String,
        status: u16,
        body: String,
    },

    #[error("Request to {provider} could not be sent: {reason}")]
    Transport { provider: String, reason: String },

    #[error("Invalid response from {provider}: {reason}")]
    InvalidResponse { provider: String, reason: String },

    #[error("no choices returned")]
    NoChoices,
}

/// Configuration errors.
#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("Missing required configuration field: {field}")]
    MissingRequired { field: String },

    #[error("Invalid value for {field}: {value} - {reason}")]
    InvalidValue {
        field: String,
        value: String,
        reason: String,
    },
}

/// Master error type for all Tally errors.
#[derive(Debug, Clone, Error)]
pub enum TallyError {
    #[error("Validation error: {0}")]
    Validation(#[from] ValidationError),

    #[error("Lifecycle error: {0}")]
    Lifecycle(#[from] LifecycleError),

    #[error("Storage error: {0}")]
    Storage(#[from] StorageError),

    #[error("Provider error: {0}")]
    Provider(#[from] ProviderError),

    #[error("Config error: {0}")]
    Config(#[from] ConfigError),
}

/// Result type alias for Tally operations.
pub type TallyResult<T> = Result<T, TallyError>;

// =============================================================================
// TESTS
// =============================================================================

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_submission_messages_are_user_facing() {
        let err = ValidationError::InvalidAnswer {
            question_id: "q-1".to_string(),
        };
        assert_eq!(err.to_string(), "invalid answer for question ID: q-1");

        let err = ValidationError::MissingAnswer {
            question_id: "q-2".to_string(),
        };
        assert_eq!(err.to_string(), "missing answer for question ID: q-2");

        assert_eq!(ValidationError::SurveyNotFound.to_string(), "Survey not found");
    }

    #[test]
    fn test_storage_error_display_not_found() {
        let err = StorageError::not_found(EntityType::Insight, "abc");
        let msg = err.to_string();
        assert!(msg.contains("Insight"));
        assert!(msg.contains("abc"));
    }

    #[test]
    fn test_provider_error_display_request_failed() {
        let err = ProviderError::RequestFailed {
            provider: "github-models".to_string(),
            status: 429,
            body: "slow down".to_string(),
        };
        let msg = err.to_string();
        assert!(msg.contains("429"));
        assert!(msg.contains("slow down"));
        assert_eq!(ProviderError::NoChoices.to_string(), "no choices returned");
    }

    #[test]
    fn test_lifecycle_error_display() {
        let err = LifecycleError::InvalidTransition {
            from: InsightStatus::Completed,
            to: InsightStatus::Processing,
        };
        assert_eq!(
            err.to_string(),
            "insight cannot move from COMPLETED to PROCESSING"
        );
    }

    #[test]
    fn test_tally_error_from_variants() {
        let validation = TallyError::from(ValidationError::required("name"));
        assert!(matches!(validation, TallyError::Validation(_)));

        let storage = TallyError::from(StorageError::DuplicateToken);
        assert!(matches!(storage, TallyError::Storage(_)));

        let provider = TallyError::from(ProviderError::NotConfigured);
        assert!(matches!(provider, TallyError::Provider(_)));

        let config = TallyError::from(ConfigError::MissingRequired {
            field: "GITHUB_TOKEN".to_string(),
        });
        assert!(matches!(config, TallyError::Config(_)));
    }
}
