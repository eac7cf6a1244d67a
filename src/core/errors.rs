use http::StatusCode;
use spin_sdk::http::Response;
use std::fmt;
use thiserror::Error;

use crate::core::helpers::json_response;

/// Failures reported by the entity, follow and feed services.
#[derive(Debug, Error)]
pub enum DomainError {
    #[error("invalid {field}: {message}")]
    Validation { field: &'static str, message: String },

    #[error("permission denied: {0}")]
    Permission(String),

    #[error("{0} not found")]
    NotFound(String),

    #[error("conflict: {0}")]
    Conflict(String),

    #[error(transparent)]
    Store(#[from] anyhow::Error),
}

impl DomainError {
    pub fn validation(field: &'static str, message: impl Into<String>) -> Self {
        DomainError::Validation {
            field,
            message: message.into(),
        }
    }

    pub fn not_found(what: impl Into<String>) -> Self {
        DomainError::NotFound(what.into())
    }
}

#[derive(Debug)]
pub enum ApiError {
    BadRequest(String),
    Validation { field: String, message: String },
    Unauthorized,
    /// Denied mutation; `redirect` is where the client should go instead.
    Forbidden { message: String, redirect: Option<String> },
    NotFound(String),
    Conflict(String),
    InternalError(String),
}

impl ApiError {
    pub fn forbidden(message: impl Into<String>) -> Self {
        ApiError::Forbidden {
            message: message.into(),
            redirect: None,
        }
    }

    pub fn with_redirect(self, location: impl Into<String>) -> Self {
        match self {
            ApiError::Forbidden { message, .. } => ApiError::Forbidden {
                message,
                redirect: Some(location.into()),
            },
            other => other,
        }
    }
}

impl fmt::Display for ApiError {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ApiError::BadRequest(msg) => write!(f, "Bad Request: {}", msg),
            ApiError::Validation { field, message } => write!(f, "Invalid {}: {}", field, message),
            ApiError::Unauthorized => write!(f, "Unauthorized"),
            ApiError::Forbidden { message, .. } => write!(f, "Forbidden: {}", message),
            ApiError::NotFound(msg) => write!(f, "Not Found: {}", msg),
            ApiError::Conflict(msg) => write!(f, "Conflict: {}", msg),
            ApiError::InternalError(msg) => write!(f, "Internal Error: {}", msg),
        }
    }
}

impl From<ApiError> for Response {
    fn from(err: ApiError) -> Self {
        match err {
            ApiError::BadRequest(msg) => json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({"error": msg}),
            ),
            ApiError::Validation { field, message } => json_response(
                StatusCode::BAD_REQUEST,
                &serde_json::json!({"error": message, "field": field}),
            ),
            ApiError::Unauthorized => json_response(
                StatusCode::UNAUTHORIZED,
                &serde_json::json!({"error": "Unauthorized"}),
            ),
            ApiError::Forbidden { message, redirect } => json_response(
                StatusCode::FORBIDDEN,
                &serde_json::json!({"error": message, "redirect": redirect}),
            ),
            ApiError::NotFound(msg) => json_response(
                StatusCode::NOT_FOUND,
                &serde_json::json!({"error": msg}),
            ),
            ApiError::Conflict(msg) => json_response(
                StatusCode::CONFLICT,
                &serde_json::json!({"error": msg}),
            ),
            ApiError::InternalError(msg) => json_response(
                StatusCode::INTERNAL_SERVER_ERROR,
                &serde_json::json!({"error": msg}),
            ),
        }
    }
}

impl std::error::Error for ApiError {}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::InternalError(err.to_string())
    }
}

impl From<DomainError> for ApiError {
    fn from(err: DomainError) -> Self {
        match err {
            DomainError::Validation { field, message } => ApiError::Validation {
                field: field.to_string(),
                message,
            },
            DomainError::Permission(msg) => ApiError::forbidden(msg),
            DomainError::NotFound(what) => ApiError::NotFound(format!("{} not found", what)),
            DomainError::Conflict(msg) => ApiError::Conflict(msg),
            DomainError::Store(err) => {
                tracing::error!(error = %err, "storage failure");
                ApiError::InternalError("Internal server error".to_string())
            }
        }
    }
}
