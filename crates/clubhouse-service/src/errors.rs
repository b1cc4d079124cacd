//! Clubhouse service error types.
//!
//! Handlers return [`ClubhouseError`]; every variant has one row in
//! [`ClubhouseError::kind`] giving its status and wire code, so there is no
//! string matching on messages anywhere in the request path.
//!
//! Response bodies have the shape `{"error": {"code", "message"}}`. Causes
//! behind 500 and 503 responses are logged and replaced with a fixed message.

use axum::{
    extract::rejection::JsonRejection,
    http::{header, HeaderValue, StatusCode},
    response::{IntoResponse, Response},
    Json,
};
use common::error::ClubhouseCommonError;
use serde::Serialize;
use thiserror::Error;

const WWW_AUTHENTICATE_VALUE: &str = "Bearer realm=\"clubhouse\", error=\"invalid_token\"";

#[derive(Debug, Error)]
pub enum ClubhouseError {
    /// Request body or path failed validation.
    #[error("Validation failed: {0}")]
    Validation(String),

    /// Missing, malformed or expired bearer token.
    #[error("Invalid token: {0}")]
    InvalidToken(String),

    /// Body sent without `Content-Type: application/json`.
    #[error("Unsupported media type: {0}")]
    UnsupportedMediaType(String),

    /// Authenticated, but not the author of the target.
    #[error("Forbidden: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    #[error("Conflict: {0}")]
    Conflict(String),

    #[error("Database error: {0}")]
    Database(String),

    #[error("Service unavailable: {0}")]
    ServiceUnavailable(String),

    #[error("Internal error: {0}")]
    Internal(String),
}

impl ClubhouseError {
    /// Status and stable wire code for this error.
    pub fn kind(&self) -> (StatusCode, &'static str) {
        match self {
            Self::Validation(_) => (StatusCode::BAD_REQUEST, "VALIDATION_FAILED"),
            Self::InvalidToken(_) => (StatusCode::UNAUTHORIZED, "INVALID_TOKEN"),
            Self::UnsupportedMediaType(_) => {
                (StatusCode::UNSUPPORTED_MEDIA_TYPE, "UNSUPPORTED_MEDIA_TYPE")
            }
            Self::Forbidden(_) => (StatusCode::FORBIDDEN, "FORBIDDEN"),
            Self::NotFound(_) => (StatusCode::NOT_FOUND, "NOT_FOUND"),
            Self::Conflict(_) => (StatusCode::CONFLICT, "CONFLICT"),
            Self::Database(_) => (StatusCode::INTERNAL_SERVER_ERROR, "DATABASE_ERROR"),
            Self::ServiceUnavailable(_) => (StatusCode::SERVICE_UNAVAILABLE, "SERVICE_UNAVAILABLE"),
            Self::Internal(_) => (StatusCode::INTERNAL_SERVER_ERROR, "INTERNAL_ERROR"),
        }
    }

    /// HTTP status as a number, for metrics labels and assertions.
    pub fn status_code(&self) -> u16 {
        self.kind().0.as_u16()
    }

    /// Text shown to the client. Server-side causes never leave the process.
    fn client_message(&self) -> String {
        match self {
            Self::Validation(msg)
            | Self::InvalidToken(msg)
            | Self::UnsupportedMediaType(msg)
            | Self::Forbidden(msg)
            | Self::NotFound(msg)
            | Self::Conflict(msg) => msg.clone(),
            Self::Database(cause) => {
                tracing::error!(target: "clubhouse.errors", error = %cause, "Database operation failed");
                "An internal database error occurred".to_string()
            }
            Self::ServiceUnavailable(cause) => {
                tracing::warn!(target: "clubhouse.errors", reason = %cause, "Dependency unavailable");
                "Service temporarily unavailable".to_string()
            }
            Self::Internal(cause) => {
                tracing::error!(target: "clubhouse.errors", reason = %cause, "Internal error");
                "An internal error occurred".to_string()
            }
        }
    }
}

#[derive(Serialize)]
struct ErrorBody {
    error: ErrorDetail,
}

#[derive(Serialize)]
struct ErrorDetail {
    code: &'static str,
    message: String,
}

impl IntoResponse for ClubhouseError {
    fn into_response(self) -> Response {
        let (status, code) = self.kind();
        let body = ErrorBody {
            error: ErrorDetail {
                code,
                message: self.client_message(),
            },
        };

        let mut response = (status, Json(body)).into_response();
        if status == StatusCode::UNAUTHORIZED {
            response.headers_mut().insert(
                header::WWW_AUTHENTICATE,
                HeaderValue::from_static(WWW_AUTHENTICATE_VALUE),
            );
        }
        response
    }
}

impl From<sqlx::Error> for ClubhouseError {
    fn from(err: sqlx::Error) -> Self {
        let unique_violation = err
            .as_database_error()
            .is_some_and(|db| db.is_unique_violation());
        if unique_violation {
            return Self::Conflict("Resource already exists".to_string());
        }
        Self::Database(err.to_string())
    }
}

impl From<JsonRejection> for ClubhouseError {
    fn from(rejection: JsonRejection) -> Self {
        tracing::debug!(target: "clubhouse.errors", error = %rejection, "Rejected request body");
        match rejection {
            JsonRejection::MissingJsonContentType(_) => Self::UnsupportedMediaType(
                "Expected request with `Content-Type: application/json`".to_string(),
            ),
            _ => Self::Validation("Invalid request body".to_string()),
        }
    }
}

impl From<ClubhouseCommonError> for ClubhouseError {
    fn from(err: ClubhouseCommonError) -> Self {
        match err {
            ClubhouseCommonError::Database(msg) => Self::Database(msg),
            ClubhouseCommonError::NotFound(msg) => Self::NotFound(msg),
            ClubhouseCommonError::Unauthorized(msg) => Self::InvalidToken(msg),
            ClubhouseCommonError::Broker(msg) => Self::ServiceUnavailable(msg),
            ClubhouseCommonError::Payload(msg) | ClubhouseCommonError::Configuration(msg) => {
                Self::Internal(msg)
            }
        }
    }
}
