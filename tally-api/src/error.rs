//! Error Types for the Tally API
//!
//! Handlers return [`ApiResult`]; domain errors convert into [`ApiError`],
//! which renders as `{"error": <message>, "code": <CODE>}` with the status
//! its [`ErrorCode`] implies. Clients show `error` verbatim, so messages
//! from storage and provider failures are replaced with generic text.

use axum::{
    extract::rejection::{JsonRejection, PathRejection, QueryRejection},
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde::{Deserialize, Serialize};
use std::fmt;
use tally_core::{StorageError, TallyError, ValidationError};

// ============================================================================
// ERROR CODES
// ============================================================================

/// Machine-readable category carried next to every error message.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
#[serde(rename_all = "SCREAMING_SNAKE_CASE")]
pub enum ErrorCode {
    /// Missing or wrong admin bearer token
    Unauthorized,

    /// A survey, question or submission rule was violated
    ValidationFailed,

    /// Body, query or path could not be decoded
    InvalidInput,

    EntityNotFound,

    /// Survey token collision that survived every retry
    EntityAlreadyExists,

    /// Insight status change that its lifecycle forbids
    StateConflict,

    InternalError,

    DatabaseError,

    /// The summarization provider failed
    UpstreamError,

    /// The database pool could not hand out a connection
    ServiceUnavailable,
}

impl ErrorCode {
    pub fn status_code(&self) -> StatusCode {
        match self {
            ErrorCode::Unauthorized => StatusCode::UNAUTHORIZED,
            ErrorCode::ValidationFailed | ErrorCode::InvalidInput => StatusCode::BAD_REQUEST,
            ErrorCode::EntityNotFound => StatusCode::NOT_FOUND,
            ErrorCode::EntityAlreadyExists | ErrorCode::StateConflict => StatusCode::CONFLICT,
            ErrorCode::UpstreamError => StatusCode::BAD_GATEWAY,
            ErrorCode::ServiceUnavailable => StatusCode::SERVICE_UNAVAILABLE,
            ErrorCode::InternalError | ErrorCode::DatabaseError => {
                StatusCode::INTERNAL_SERVER_ERROR
            }
        }
    }

    /// Message used when the underlying error must not reach the client.
    pub fn generic_message(&self) -> &'static str {
        match self {
            ErrorCode::Unauthorized => "unauthorized",
            ErrorCode::ValidationFailed => "Submission rejected",
            ErrorCode::InvalidInput => "Malformed request",
            ErrorCode::EntityNotFound => "Not found",
            ErrorCode::EntityAlreadyExists => "Already exists",
            ErrorCode::StateConflict => "Insight is already settled",
            ErrorCode::InternalError => "Internal Server Error",
            ErrorCode::DatabaseError => "Failed to read or write data",
            ErrorCode::UpstreamError => "Summarization provider request failed",
            ErrorCode::ServiceUnavailable => "Database connection unavailable",
        }
    }
}

impl fmt::Display for ErrorCode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{:?}", self)
    }
}

// ============================================================================
// API ERROR
// ============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[cfg_attr(feature = "openapi", derive(utoipa::ToSchema))]
pub struct ApiError {
    /// Shown to users as-is
    #[serde(rename = "error")]
    pub message: String,

    pub code: ErrorCode,

    /// Offending field or question, when there is one
    #[serde(default, skip_serializing_if = "Option::is_none")]
    #[cfg_attr(feature = "openapi", schema(value_type = Option<Object>))]
    pub details: Option<serde_json::Value>,
}

impl ApiError {
    pub fn new(code: ErrorCode, message: impl Into<String>) -> Self {
        Self {
            code,
            message: message.into(),
            details: None,
        }
    }

    pub fn generic(code: ErrorCode) -> Self {
        Self::new(code, code.generic_message())
    }

    pub fn with_details(mut self, details: serde_json::Value) -> Self {
        self.details = Some(details);
        self
    }

    pub fn status_code(&self) -> StatusCode {
        self.code.status_code()
    }

    pub fn unauthorized() -> Self {
        Self::generic(ErrorCode::Unauthorized)
    }

    pub fn validation_failed(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ValidationFailed, message)
    }

    pub fn invalid_input(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InvalidInput, message)
    }

    /// `"<Entity> with id <id> not found"`.
    pub fn entity_not_found(entity_type: &str, id: impl fmt::Display) -> Self {
        Self::new(
            ErrorCode::EntityNotFound,
            format!("{} with id {} not found", entity_type, id),
        )
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::EntityNotFound, message)
    }

    pub fn internal_error(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::InternalError, message)
    }

    pub fn service_unavailable(message: impl Into<String>) -> Self {
        Self::new(ErrorCode::ServiceUnavailable, message)
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "[{}] {}", self.code, self.message)
    }
}

impl std::error::Error for ApiError {}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        (self.status_code(), Json(self)).into_response()
    }
}

// ============================================================================
// EXTRACTOR REJECTIONS
// ============================================================================

impl From<JsonRejection> for ApiError {
    fn from(rejection: JsonRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

impl From<QueryRejection> for ApiError {
    fn from(rejection: QueryRejection) -> Self {
        ApiError::invalid_input(rejection.body_text())
    }
}

impl From<PathRejection> for ApiError {
    fn from(rejection: PathRejection) -> Self {
        ApiError::invalid_input(format!("invalid id: {}", rejection.body_text()))
    }
}

// ============================================================================
// DOMAIN ERRORS
// ============================================================================

impl From<ValidationError> for ApiError {
    fn from(err: ValidationError) -> Self {
        let details = match &err {
            ValidationError::SurveyNotFound => return ApiError::not_found(err.to_string()),
            ValidationError::RequiredFieldMissing { field } => {
                Some(serde_json::json!({ "field": field }))
            }
            ValidationError::UnknownQuestion { question_id }
            | ValidationError::DuplicateAnswer { question_id }
            | ValidationError::InvalidAnswer { question_id }
            | ValidationError::MissingAnswer { question_id } => {
                Some(serde_json::json!({ "question_id": question_id }))
            }
            ValidationError::InvalidValue { .. } | ValidationError::SpecificationMismatch { .. } => {
                None
            }
        };
        let mut api_error = ApiError::validation_failed(err.to_string());
        api_error.details = details;
        api_error
    }
}

impl From<StorageError> for ApiError {
    fn from(err: StorageError) -> Self {
        match err {
            StorageError::NotFound { entity_type, ref id } => {
                ApiError::entity_not_found(entity_type.as_str(), id)
            }
            StorageError::DuplicateToken => {
                ApiError::new(ErrorCode::EntityAlreadyExists, err.to_string())
            }
            StorageError::ConnectionFailed { .. } => {
                tracing::error!(error = %err, "Storage connection failed");
                ApiError::generic(ErrorCode::ServiceUnavailable)
            }
            _ => {
                tracing::error!(error = %err, "Storage error");
                ApiError::generic(ErrorCode::DatabaseError)
            }
        }
    }
}

impl From<TallyError> for ApiError {
    fn from(err: TallyError) -> Self {
        match err {
            TallyError::Validation(e) => e.into(),
            TallyError::Storage(e) => e.into(),
            TallyError::Lifecycle(e) => ApiError::new(ErrorCode::StateConflict, e.to_string()),
            TallyError::Provider(e) => {
                tracing::error!(error = %e, "Summarization provider error");
                ApiError::generic(ErrorCode::UpstreamError)
            }
            TallyError::Config(e) => {
                tracing::error!(error = %e, "Configuration error");
                ApiError::generic(ErrorCode::InternalError)
            }
        }
    }
}

pub type ApiResult<T> = Result<T, ApiError>;
