//! Session HTTP handlers, scoped to the authenticated user.
//!
//! Endpoints:
//! - GET    /api/sessions      - List sessions, most recently used first
//! - GET    /api/sessions/{id} - Get a session with its turns and responses
//! - DELETE /api/sessions/{id} - Delete a session, its turns and outputs
//!
//! Sessions owned by another user answer 404, same as unknown ids.

use std::time::Instant;

use axum::Json;
use axum::extract::{Path, Query, State};
use serde::{Deserialize, Serialize};
use uuid::Uuid;

use chorus_core::chat::repository::ChatRepository;
use chorus_types::chat::{SessionSummary, TurnWithOutputs};

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthUser;
use crate::http::response::ApiResponse;
use crate::state::AppState;

/// Query parameters for session listing.
#[derive(Debug, Deserialize)]
pub struct SessionListQuery {
    #[serde(default)]
    pub limit: Option<i64>,
    #[serde(default)]
    pub offset: Option<i64>,
}

/// A session together with its full history.
#[derive(Debug, Serialize)]
pub struct SessionDetail {
    pub session: SessionSummary,
    pub turns: Vec<TurnWithOutputs>,
}

/// Parse a UUID from a path parameter, returning a 400 error on invalid format.
fn parse_uuid(s: &str) -> Result<Uuid, AppError> {
    s.parse::<Uuid>()
        .map_err(|_| AppError::Validation(format!("invalid session id: {s}")))
}

/// GET /api/sessions - List the caller's sessions.
pub async fn list_sessions(
    State(state): State<AppState>,
    auth: AuthUser,
    Query(query): Query<SessionListQuery>,
) -> Result<Json<ApiResponse<Vec<SessionSummary>>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sessions = state
        .chat_service
        .list_sessions(&auth.user_id, query.limit, query.offset)
        .await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let summaries = sessions.into_iter().map(SessionSummary::from).collect();

    Ok(Json(ApiResponse::success(summaries, request_id, elapsed)))
}

/// GET /api/sessions/{id} - Get a session with every turn and response.
pub async fn get_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<SessionDetail>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    let session = state.chat_service.owned_session(&auth.user_id, &sid).await?;
    let turns = state.chat_service.repository().list_turns(&sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let detail = SessionDetail {
        session: session.into(),
        turns,
    };

    Ok(Json(ApiResponse::success(detail, request_id, elapsed)))
}

/// DELETE /api/sessions/{id} - Delete a session and everything under it.
pub async fn delete_session(
    State(state): State<AppState>,
    auth: AuthUser,
    Path(session_id): Path<String>,
) -> Result<Json<ApiResponse<serde_json::Value>>, AppError> {
    let start = Instant::now();
    let request_id = Uuid::now_v7().to_string();

    let sid = parse_uuid(&session_id)?;
    state.chat_service.delete_session(&auth.user_id, &sid).await?;

    let elapsed = start.elapsed().as_millis() as u64;
    let resp = ApiResponse::success(
        serde_json::json!({ "id": sid, "deleted": true }),
        request_id,
        elapsed,
    );

    Ok(Json(resp))
}
