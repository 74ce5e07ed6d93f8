//! Application error type and the single boundary translator.
//!
//! Expected domain failures travel as `Err(ApiError::...)` through handler
//! results and are rendered here as `success: false` envelopes — nothing is
//! thrown mid-flow and nothing is swallowed. `Unexpected` elides its message
//! from callers and logs it instead.

use axum::{
    Json,
    http::StatusCode,
    response::{IntoResponse, Response},
};
use thiserror::Error;

use crate::models::{Envelope, FieldError};

/// Convenience alias for handler return types.
pub type ApiResult<T> = Result<T, ApiError>;

/// Application-level errors with HTTP status mapping.
#[derive(Debug, Error)]
pub enum ApiError {
    /// Input shape or business-rule violation, keyed by field.
    #[error("Validation failed")]
    Validation(Vec<FieldError>),

    /// Expected business failure (invalid credentials, duplicate name,
    /// invalid state token). Rendered as a failure envelope, 400.
    #[error("{0}")]
    Failed(String),

    #[error("Unauthorized: {0}")]
    Unauthorized(String),

    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Internal server error")]
    Unexpected(String),
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message, errors) = match self {
            ApiError::Validation(fields) => {
                let mut errors = std::collections::BTreeMap::<String, Vec<String>>::new();
                for field in fields {
                    errors.entry(field.field).or_default().push(field.message);
                }
                (
                    StatusCode::BAD_REQUEST,
                    "Validation failed".to_string(),
                    Some(errors),
                )
            }
            ApiError::Failed(message) => (StatusCode::BAD_REQUEST, message, None),
            ApiError::Unauthorized(message) => (StatusCode::UNAUTHORIZED, message, None),
            ApiError::Forbidden(message) => (StatusCode::FORBIDDEN, message, None),
            ApiError::NotFound(message) => (StatusCode::NOT_FOUND, message, None),
            ApiError::Unexpected(detail) => {
                tracing::error!(%detail, "unexpected error");
                (
                    StatusCode::INTERNAL_SERVER_ERROR,
                    "Internal server error".to_string(),
                    None,
                )
            }
        };

        let body = Envelope::<()> {
            success: false,
            message,
            data: None,
            errors,
        };
        (status, Json(body)).into_response()
    }
}

impl From<keyline_core::auth::AuthError> for ApiError {
    fn from(err: keyline_core::auth::AuthError) -> Self {
        use keyline_core::auth::AuthError;
        match err {
            AuthError::InvalidCredentials | AuthError::InvalidOrExpiredToken => {
                ApiError::Failed(err.to_string())
            }
            AuthError::Validation(message) => ApiError::Failed(message),
            AuthError::Conflict(message) => ApiError::Failed(message),
            AuthError::NotFound(message) => ApiError::NotFound(message),
            AuthError::Configuration(message) => ApiError::Unexpected(message),
            AuthError::Db(e) => ApiError::Unexpected(e.to_string()),
            AuthError::Internal(message) => ApiError::Unexpected(message),
        }
    }
}

impl From<keyline_core::external::ExternalError> for ApiError {
    fn from(err: keyline_core::external::ExternalError) -> Self {
        use keyline_core::external::ExternalError;
        match err {
            ExternalError::InvalidState
            | ExternalError::ProviderMismatch
            | ExternalError::MissingScope(_)
            | ExternalError::NoRefreshToken(_)
            | ExternalError::Provider(_)
            | ExternalError::Conflict(_) => ApiError::Failed(err.to_string()),
            ExternalError::NotLinked(_) => ApiError::NotFound(err.to_string()),
            ExternalError::Encryption(message) => ApiError::Unexpected(message),
            ExternalError::Configuration(message) => ApiError::Unexpected(message),
            ExternalError::Db(e) => ApiError::Unexpected(e.to_string()),
            ExternalError::Internal(message) => ApiError::Unexpected(message),
        }
    }
}

impl From<sqlx::Error> for ApiError {
    fn from(e: sqlx::Error) -> Self {
        match e {
            sqlx::Error::RowNotFound => ApiError::NotFound("row not found".into()),
            _ => ApiError::Unexpected(e.to_string()),
        }
    }
}
