use thiserror::Error;

use crate::llm::LlmError;

/// Errors from repository operations (used by trait definitions in chorus-core).
#[derive(Debug, Error)]
pub enum RepositoryError {
    #[error("database connection error")]
    Connection,

    #[error("query error: {0}")]
    Query(String),

    #[error("entity not found")]
    NotFound,

    #[error("conflict: {0}")]
    Conflict(String),
}

/// Errors from bearer token verification.
#[derive(Debug, Error)]
pub enum AuthError {
    #[error("missing bearer token")]
    MissingToken,

    #[error("invalid token: {0}")]
    InvalidToken(String),

    #[error("token expired")]
    Expired,

    #[error("unknown signing key '{0}'")]
    UnknownKey(String),

    #[error("malformed subject '{0}'")]
    MalformedSubject(String),

    #[error("signing keys unavailable: {0}")]
    KeysUnavailable(String),
}

/// Errors from the summarize pipeline.
#[derive(Debug, Error)]
pub enum PipelineError {
    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("unknown model '{0}'")]
    UnknownModel(String),

    #[error("session not found")]
    SessionNotFound,

    #[error("{provider} failed: {source}")]
    Provider {
        provider: String,
        #[source]
        source: LlmError,
    },

    #[error("pipeline ended without a final record")]
    Incomplete,

    #[error(transparent)]
    Repository(#[from] RepositoryError),
}

/// Errors from loading configuration.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {message}")]
    Read { path: String, message: String },

    #[error("failed to parse {path}: {message}")]
    Parse { path: String, message: String },

    #[error("invalid configuration: {0}")]
    Invalid(String),
}
