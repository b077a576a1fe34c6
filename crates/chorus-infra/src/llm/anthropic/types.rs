//! Anthropic Messages API types.
//!
//! Wire structures for the Messages API only; the provider-agnostic shapes
//! live in chorus-types.

use serde::{Deserialize, Serialize};

/// Request body for the Anthropic Messages API.
#[derive(Debug, Clone, Serialize)]
pub struct AnthropicRequest {
    pub model: String,
    pub max_tokens: u32,
    pub messages: Vec<AnthropicMessage>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub stream: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

#[derive(Debug, Clone, Serialize)]
pub struct AnthropicMessage {
    pub role: String,
    pub content: String,
}

// ---------------------------------------------------------------------------
// SSE event payloads
//
// The SSE `event:` field names the event type and `data:` holds its JSON.
// Each payload is deserialized into a specific struct keyed on that name.
// ---------------------------------------------------------------------------

/// Payload for `event: message_start`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageStartPayload {
    pub message: AnthropicMessageObj,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicMessageObj {
    pub id: String,
    pub model: String,
    pub usage: Option<AnthropicUsage>,
}

/// A content block in a non-streaming response.
#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicContentBlock {
    #[serde(rename = "text")]
    Text { text: String },
    #[serde(other)]
    Other,
}

/// Payload for `event: content_block_delta`.
#[derive(Debug, Clone, Deserialize)]
pub struct ContentBlockDeltaPayload {
    pub index: u32,
    pub delta: AnthropicDelta,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(tag = "type")]
pub enum AnthropicDelta {
    #[serde(rename = "text_delta")]
    TextDelta { text: String },
    #[serde(other)]
    Other,
}

/// Payload for `event: message_delta`.
#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaPayload {
    pub delta: MessageDeltaObj,
    #[serde(default)]
    pub usage: AnthropicUsage,
}

#[derive(Debug, Clone, Deserialize)]
pub struct MessageDeltaObj {
    pub stop_reason: Option<String>,
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct AnthropicUsage {
    #[serde(default)]
    pub input_tokens: u32,
    #[serde(default)]
    pub output_tokens: u32,
}

/// Payload for `event: error`, also the body of non-2xx responses.
#[derive(Debug, Clone, Deserialize)]
pub struct ErrorPayload {
    pub error: AnthropicError,
}

#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicError {
    #[serde(rename = "type")]
    pub error_type: String,
    pub message: String,
}

/// Non-streaming response from the Anthropic Messages API.
#[derive(Debug, Clone, Deserialize)]
pub struct AnthropicNonStreamResponse {
    pub id: String,
    pub content: Vec<AnthropicContentBlock>,
    pub model: String,
    pub stop_reason: Option<String>,
    pub usage: AnthropicUsage,
}
