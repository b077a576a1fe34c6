//! SSE stream state machine for the Anthropic Messages API.
//!
//! Event order on the wire:
//! 1. `message_start` with initial usage
//! 2. per block: `content_block_start`, N x `content_block_delta`, `content_block_stop`
//! 3. `message_delta` with stop_reason and cumulative usage
//! 4. `message_stop`
//!
//! `ping` keepalives and `error` events may appear anywhere.

use eventsource_stream::Eventsource;
use futures_util::StreamExt;
use secrecy::{ExposeSecret, SecretString};

use chorus_core::llm::provider::EventStream;
use chorus_types::llm::{LlmError, StopReason, StreamEvent, Usage};

use super::client::{API_VERSION, error_from_response, map_reqwest_error};
use super::types::{
    AnthropicDelta, AnthropicRequest, ContentBlockDeltaPayload, ErrorPayload, MessageDeltaPayload,
    MessageStartPayload,
};

pub(super) fn stop_reason(raw: Option<&str>) -> StopReason {
    match raw {
        Some("max_tokens") => StopReason::MaxTokens,
        Some("stop_sequence") => StopReason::StopSequence,
        _ => StopReason::EndTurn,
    }
}

/// Translate an `error` payload into the matching [`LlmError`].
pub(super) fn error_from_payload(payload: ErrorPayload) -> LlmError {
    match payload.error.error_type.as_str() {
        "overloaded_error" => LlmError::Overloaded(payload.error.message),
        "rate_limit_error" => LlmError::RateLimited {
            retry_after_ms: None,
        },
        "authentication_error" | "permission_error" => LlmError::AuthenticationFailed,
        "invalid_request_error" => LlmError::InvalidRequest(payload.error.message),
        "api_error" => LlmError::Http {
            status: 500,
            message: payload.error.message,
        },
        _ => LlmError::Provider {
            message: payload.error.message,
        },
    }
}

/// Map one named SSE event to zero or more [`StreamEvent`]s.
pub(super) fn process_event(event_type: &str, data: &str) -> Result<Vec<StreamEvent>, LlmError> {
    let mut events = Vec::new();

    match event_type {
        "message_start" => {
            let payload: MessageStartPayload = serde_json::from_str(data)
                .map_err(|e| LlmError::Deserialization(format!("message_start: {e}")))?;
            tracing::debug!(id = %payload.message.id, model = %payload.message.model, "anthropic stream started");
            if let Some(usage) = payload.message.usage {
                events.push(StreamEvent::Usage(Usage {
                    input_tokens: usage.input_tokens,
                    output_tokens: usage.output_tokens,
                }));
            }
        }

        "content_block_delta" => {
            let payload: ContentBlockDeltaPayload = serde_json::from_str(data)
                .map_err(|e| LlmError::Deserialization(format!("content_block_delta: {e}")))?;
            if let AnthropicDelta::TextDelta { text } = payload.delta {
                events.push(StreamEvent::TextDelta { text });
            }
        }

        "message_delta" => {
            let payload: MessageDeltaPayload = serde_json::from_str(data)
                .map_err(|e| LlmError::Deserialization(format!("message_delta: {e}")))?;
            events.push(StreamEvent::Usage(Usage {
                input_tokens: payload.usage.input_tokens,
                output_tokens: payload.usage.output_tokens,
            }));
            events.push(StreamEvent::MessageDelta {
                stop_reason: stop_reason(payload.delta.stop_reason.as_deref()),
            });
        }

        "message_stop" => {
            events.push(StreamEvent::Done);
        }

        "content_block_start" | "content_block_stop" | "ping" => {}

        "error" => {
            let payload: ErrorPayload = serde_json::from_str(data)
                .map_err(|e| LlmError::Deserialization(format!("error event: {e}")))?;
            return Err(error_from_payload(payload));
        }

        unknown => {
            tracing::warn!(event_type = unknown, "unknown Anthropic event type, skipping");
        }
    }

    Ok(events)
}

/// Open a streaming request to the Messages API.
///
/// Yields `Connected` once the response status is known to be successful.
/// A body that ends before `message_stop` is reported as a stream error.
pub fn create_anthropic_stream(
    client: &reqwest::Client,
    url: &str,
    body: AnthropicRequest,
    api_key: &SecretString,
) -> EventStream {
    let client = client.clone();
    let url = url.to_string();
    let api_key = api_key.clone();

    Box::pin(async_stream::try_stream! {
        let response = client
            .post(&url)
            .header("x-api-key", api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            tracing::warn!(status = %status, "Anthropic stream API error response");
            Err::<(), _>(error_from_response(status.as_u16(), &error_body))?;
            return;
        }

        yield StreamEvent::Connected;

        let mut sse = response.bytes_stream().eventsource();
        let mut finished = false;

        while let Some(event) = sse.next().await {
            let event = event.map_err(|e| LlmError::Stream(e.to_string()))?;
            for ev in process_event(&event.event, &event.data)? {
                finished |= ev == StreamEvent::Done;
                yield ev;
            }
            if finished {
                break;
            }
        }

        if !finished {
            Err::<(), _>(LlmError::Stream("stream ended before message_stop".to_string()))?;
        }
    })
}
