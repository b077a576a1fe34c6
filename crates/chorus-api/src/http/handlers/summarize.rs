//! Compare-and-summarize endpoint.
//!
//! POST /api/summarize
//!
//! With `stream: true` (the default) the response is an SSE stream whose
//! `data:` frames are, in order:
//! - `{"provider": "...", "chunk": "..."}` for every piece of text
//! - `{"final": {...}}` once every output is persisted
//! - `{"error": "...", "provider": "..."}` instead of `final` if a call fails
//!
//! With `stream: false` the final record is returned in the JSON envelope.

use std::time::{Duration, Instant};

use axum::Json;
use axum::extract::State;
use axum::extract::rejection::JsonRejection;
use axum::response::sse::{Event, KeepAlive, Sse};
use axum::response::{IntoResponse, Response};
use futures_util::StreamExt;
use uuid::Uuid;

use chorus_types::chat::SummarizeRequest;

use crate::http::error::AppError;
use crate::http::extractors::auth::AuthUser;
use crate::http::response::ApiResponse;
use crate::state::AppState;

const KEEP_ALIVE_INTERVAL: Duration = Duration::from_secs(15);

/// POST /api/summarize - Ask every requested model, then summarize.
///
/// Validation, session lookup and turn creation finish before any bytes are
/// sent, so those failures still get a proper status code. Failures after
/// the first frame arrive as an in-band error frame.
pub async fn summarize(
    State(state): State<AppState>,
    auth: AuthUser,
    payload: Result<Json<SummarizeRequest>, JsonRejection>,
) -> Result<Response, AppError> {
    let start = Instant::now();
    let Json(request) = payload.map_err(|e| AppError::Validation(e.body_text()))?;

    let prepared = state.pipeline.prepare(auth.user_id, &request).await?;
    tracing::info!(
        session_id = %prepared.session.id,
        turn_id = %prepared.turn.id,
        models = ?prepared.models,
        summary_model = %prepared.summary_model,
        stream = request.stream,
        "summarize request accepted"
    );

    if request.stream {
        let frames = state
            .pipeline
            .run(prepared)
            .map(|event| Event::default().json_data(event));
        return Ok(Sse::new(frames)
            .keep_alive(KeepAlive::new().interval(KEEP_ALIVE_INTERVAL))
            .into_response());
    }

    let record = state.pipeline.collect(prepared).await?;
    let elapsed = start.elapsed().as_millis() as u64;
    Ok(Json(ApiResponse::success(record, Uuid::now_v7().to_string(), elapsed)).into_response())
}
