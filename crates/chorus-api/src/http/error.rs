//! Application error type mapping to HTTP status codes and envelope format.

use axum::http::StatusCode;
use axum::response::{IntoResponse, Response};

use chorus_core::pipeline::{is_unavailable, public_message};
use chorus_types::error::{AuthError, PipelineError, RepositoryError};

use crate::http::response::ApiResponse;

/// Application-level error that maps to HTTP responses.
#[derive(Debug)]
pub enum AppError {
    /// Missing or rejected credentials.
    Unauthorized(String),
    /// Missing or invalid request fields.
    Validation(String),
    /// Resource missing or owned by someone else.
    NotFound(String),
    /// An upstream LLM provider could not produce an answer.
    Upstream(String),
    /// Anything else. The detail is logged, never returned.
    Internal(String),
}

impl AppError {
    pub fn status(&self) -> StatusCode {
        match self {
            AppError::Unauthorized(_) => StatusCode::UNAUTHORIZED,
            AppError::Validation(_) => StatusCode::BAD_REQUEST,
            AppError::NotFound(_) => StatusCode::NOT_FOUND,
            AppError::Upstream(_) => StatusCode::BAD_GATEWAY,
            AppError::Internal(_) => StatusCode::INTERNAL_SERVER_ERROR,
        }
    }

    fn code(&self) -> &'static str {
        match self {
            AppError::Unauthorized(_) => "UNAUTHORIZED",
            AppError::Validation(_) => "VALIDATION_ERROR",
            AppError::NotFound(_) => "NOT_FOUND",
            AppError::Upstream(_) => "UPSTREAM_ERROR",
            AppError::Internal(_) => "INTERNAL_ERROR",
        }
    }
}

impl From<RepositoryError> for AppError {
    fn from(e: RepositoryError) -> Self {
        match e {
            RepositoryError::NotFound => AppError::NotFound("session not found".to_string()),
            other => AppError::Internal(other.to_string()),
        }
    }
}

impl From<PipelineError> for AppError {
    fn from(e: PipelineError) -> Self {
        match &e {
            PipelineError::InvalidRequest(_) | PipelineError::UnknownModel(_) => {
                AppError::Validation(public_message(&e))
            }
            PipelineError::SessionNotFound
            | PipelineError::Repository(RepositoryError::NotFound) => {
                AppError::NotFound("session not found".to_string())
            }
            PipelineError::Provider { .. } => {
                if !is_unavailable(&e) {
                    tracing::warn!(error = %e, "provider failed");
                }
                AppError::Upstream(public_message(&e))
            }
            PipelineError::Incomplete | PipelineError::Repository(_) => {
                AppError::Internal(e.to_string())
            }
        }
    }
}

impl From<AuthError> for AppError {
    fn from(e: AuthError) -> Self {
        match e {
            AuthError::MalformedSubject(_) => AppError::Validation(e.to_string()),
            AuthError::KeysUnavailable(_) => {
                tracing::error!(error = %e, "cannot verify bearer tokens");
                AppError::Unauthorized("could not verify token".to_string())
            }
            other => AppError::Unauthorized(other.to_string()),
        }
    }
}

impl IntoResponse for AppError {
    fn into_response(self) -> Response {
        let status = self.status();
        let message = match &self {
            AppError::Internal(detail) => {
                tracing::error!(error = %detail, "request failed");
                "internal server error".to_string()
            }
            AppError::Unauthorized(msg)
            | AppError::Validation(msg)
            | AppError::NotFound(msg)
            | AppError::Upstream(msg) => msg.clone(),
        };

        let body = ApiResponse::error(self.code(), &message, String::new(), 0);
        (status, body).into_response()
    }
}
