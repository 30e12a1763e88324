//! Client-side error taxonomy.
//!
//! Every failed call lands in exactly one of four kinds so pages can decide
//! what to show without inspecting status codes.

use serde::Deserialize;
use tally_core::ValidationError;
use thiserror::Error;

/// Shown when the backend fails without a usable `{error}` body.
pub const GENERIC_FAILURE_MESSAGE: &str = "Something went wrong. Please try again.";

/// Shown for transport failures instead of the underlying error.
pub const NETWORK_FAILURE_MESSAGE: &str =
    "Unable to reach the server. Check your connection and try again.";

#[derive(Debug, Clone, Error, PartialEq, Eq)]
pub enum ClientError {
    /// 400/422 from the backend, or input rejected before sending.
    #[error("{message}")]
    Validation { message: String },

    #[error("{message}")]
    NotFound { message: String },

    /// Any other non-2xx, an unreadable success body, or an insight that
    /// settled as FAILED.
    #[error("{message}")]
    Upstream { status: Option<u16>, message: String },

    /// The request never produced a response.
    #[error("network error: {message}")]
    Network { message: String },
}

#[derive(Deserialize)]
struct ErrorBody {
    error: String,
}

impl ClientError {
    /// Classify a non-2xx response. The body's `error` field is used
    /// verbatim when present.
    pub fn from_status(status: u16, body: &str) -> Self {
        let message = serde_json::from_str::<ErrorBody>(body)
            .ok()
            .map(|b| b.error)
            .filter(|m| !m.trim().is_empty())
            .unwrap_or_else(|| GENERIC_FAILURE_MESSAGE.to_string());

        match status {
            400 | 422 => Self::Validation { message },
            404 => Self::NotFound { message },
            _ => Self::Upstream {
                status: Some(status),
                message,
            },
        }
    }

    /// Text suitable for display to an end user.
    pub fn user_message(&self) -> &str {
        match self {
            Self::Network { .. } => NETWORK_FAILURE_MESSAGE,
            Self::Validation { message }
            | Self::NotFound { message }
            | Self::Upstream { message, .. } => message,
        }
    }

    pub fn status(&self) -> Option<u16> {
        match self {
            Self::Validation { .. } | Self::Network { .. } => None,
            Self::NotFound { .. } => Some(404),
            Self::Upstream { status, .. } => *status,
        }
    }

    pub fn is_validation(&self) -> bool {
        matches!(self, Self::Validation { .. })
    }

    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound { .. })
    }
}

impl From<ValidationError> for ClientError {
    fn from(err: ValidationError) -> Self {
        Self::Validation {
            message: err.to_string(),
        }
    }
}

impl From<reqwest::Error> for ClientError {
    fn from(err: reqwest::Error) -> Self {
        if err.is_decode() {
            return Self::Upstream {
                status: err.status().map(|s| s.as_u16()),
                message: format!("Invalid response from server: {}", err),
            };
        }
        Self::Network {
            message: err.to_string(),
        }
    }
}

pub type ClientResult<T> = Result<T, ClientError>;
