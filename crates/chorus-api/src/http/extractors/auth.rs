//! Bearer token authentication extractor.
//!
//! Reads `Authorization: Bearer <jwt>`, verifies it with the configured
//! verifier, and makes sure a profile row exists for the subject.

use axum::extract::FromRequestParts;
use axum::http::header::AUTHORIZATION;
use axum::http::request::Parts;
use uuid::Uuid;

use chorus_core::chat::repository::ChatRepository;

use crate::http::error::AppError;
use crate::state::AppState;

/// The authenticated caller. Extracting this validates the bearer token.
#[derive(Debug, Clone)]
pub struct AuthUser {
    pub user_id: Uuid,
}

impl FromRequestParts<AppState> for AuthUser {
    type Rejection = AppError;

    async fn from_request_parts(
        parts: &mut Parts,
        state: &AppState,
    ) -> Result<Self, Self::Rejection> {
        let token = bearer_token(parts)?;

        let claims = state.verifier.verify(token).await.map_err(|e| {
            tracing::debug!(error = %e, "bearer token rejected");
            AppError::from(e)
        })?;
        let user_id = claims.user_id()?;

        state
            .chat_service
            .repository()
            .ensure_profile(&user_id)
            .await?;

        Ok(AuthUser { user_id })
    }
}

/// Extract the raw token from the `Authorization` header.
fn bearer_token(parts: &Parts) -> Result<&str, AppError> {
    let header = parts
        .headers
        .get(AUTHORIZATION)
        .ok_or_else(|| AppError::Unauthorized("missing Authorization header".to_string()))?;
    let value = header
        .to_str()
        .map_err(|_| AppError::Unauthorized("invalid Authorization header".to_string()))?;

    let token = value
        .strip_prefix("Bearer ")
        .or_else(|| value.strip_prefix("bearer "))
        .map(str::trim)
        .filter(|t| !t.is_empty())
        .ok_or_else(|| AppError::Unauthorized("expected a Bearer token".to_string()))?;
    Ok(token)
}
