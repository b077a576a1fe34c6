//! LLM request/response types for Chorus.
//!
//! These types model the data shapes for LLM provider interactions:
//! completion requests, streaming events, usage tracking, and error handling.

use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

/// Role of a message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum MessageRole {
    System,
    User,
    Assistant,
}

impl fmt::Display for MessageRole {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            MessageRole::System => write!(f, "system"),
            MessageRole::User => write!(f, "user"),
            MessageRole::Assistant => write!(f, "assistant"),
        }
    }
}

impl FromStr for MessageRole {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "system" => Ok(MessageRole::System),
            "user" => Ok(MessageRole::User),
            "assistant" => Ok(MessageRole::Assistant),
            other => Err(format!("invalid message role: '{other}'")),
        }
    }
}

/// A single message in an LLM conversation.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: MessageRole,
    pub content: String,
}

impl Message {
    pub fn user(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::User,
            content: content.into(),
        }
    }

    pub fn assistant(content: impl Into<String>) -> Self {
        Self {
            role: MessageRole::Assistant,
            content: content.into(),
        }
    }
}

/// Request to an LLM provider for a completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionRequest {
    pub model: String,
    pub messages: Vec<Message>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub system: Option<String>,
    pub max_tokens: u32,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
    #[serde(default)]
    pub stream: bool,
}

/// Response from an LLM provider for a non-streaming completion.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CompletionResponse {
    pub id: String,
    pub content: String,
    pub model: String,
    pub stop_reason: StopReason,
    pub usage: Usage,
}

/// Reason why the LLM stopped generating.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum StopReason {
    EndTurn,
    MaxTokens,
    StopSequence,
}

impl fmt::Display for StopReason {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            StopReason::EndTurn => write!(f, "end_turn"),
            StopReason::MaxTokens => write!(f, "max_tokens"),
            StopReason::StopSequence => write!(f, "stop_sequence"),
        }
    }
}

impl FromStr for StopReason {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "end_turn" | "stop" => Ok(StopReason::EndTurn),
            "max_tokens" | "length" => Ok(StopReason::MaxTokens),
            "stop_sequence" => Ok(StopReason::StopSequence),
            other => Err(format!("invalid stop reason: '{other}'")),
        }
    }
}

/// Token usage for a completion request/response.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub input_tokens: u32,
    pub output_tokens: u32,
}

/// Events emitted during a streaming LLM response.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum StreamEvent {
    /// Connection established with the provider.
    Connected,

    /// A delta of text content.
    TextDelta { text: String },

    /// The message is finishing with a stop reason.
    MessageDelta { stop_reason: StopReason },

    /// Token usage information.
    Usage(Usage),

    /// The stream has completed.
    Done,
}

/// Errors from LLM provider operations.
#[derive(Debug, thiserror::Error)]
pub enum LlmError {
    #[error("provider error: {message}")]
    Provider { message: String },

    #[error("HTTP {status}: {message}")]
    Http { status: u16, message: String },

    #[error("request timed out")]
    Timeout,

    #[error("connection error: {0}")]
    Connection(String),

    #[error("deserialization error: {0}")]
    Deserialization(String),

    #[error("stream error: {0}")]
    Stream(String),

    #[error("rate limited (retry after {retry_after_ms:?}ms)")]
    RateLimited { retry_after_ms: Option<u64> },

    #[error("provider overloaded: {0}")]
    Overloaded(String),

    #[error("authentication failed")]
    AuthenticationFailed,

    #[error("invalid request: {0}")]
    InvalidRequest(String),

    #[error("gave up after {attempts} attempts: {last_error}")]
    RetryExhausted {
        attempts: u32,
        last_error: Box<LlmError>,
    },
}

impl LlmError {
    /// Classify an HTTP status code returned by a provider.
    pub fn from_status(status: u16, message: impl Into<String>) -> Self {
        let message = message.into();
        match status {
            401 | 403 => LlmError::AuthenticationFailed,
            429 => LlmError::RateLimited {
                retry_after_ms: None,
            },
            529 => LlmError::Overloaded(message),
            400 | 422 => LlmError::InvalidRequest(message),
            _ => LlmError::Http { status, message },
        }
    }
}

/// Type of LLM provider backend.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ProviderType {
    Anthropic,
    #[serde(rename = "openai_compatible")]
    OpenAiCompatible,
}

impl fmt::Display for ProviderType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            ProviderType::Anthropic => write!(f, "anthropic"),
            ProviderType::OpenAiCompatible => write!(f, "openai_compatible"),
        }
    }
}

impl FromStr for ProviderType {
    type Err = String;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_lowercase().as_str() {
            "anthropic" => Ok(ProviderType::Anthropic),
            "openai_compatible" => Ok(ProviderType::OpenAiCompatible),
            other => Err(format!("invalid provider type: '{other}'")),
        }
    }
}

/// Configuration for a single named LLM provider.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ProviderConfig {
    /// Name clients use to request this provider (e.g., "gemini", "claude").
    pub name: String,
    /// Backend type for this provider.
    pub kind: ProviderType,
    /// Model identifier to use.
    pub model: String,
    /// Override the default base URL for the provider.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub base_url: Option<String>,
    /// Environment variable holding the API key.
    pub api_key_env: String,
    #[serde(default = "default_max_tokens")]
    pub max_tokens: u32,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub temperature: Option<f64>,
}

fn default_max_tokens() -> u32 {
    1000
}

impl ProviderConfig {
    pub fn new(
        name: &str,
        kind: ProviderType,
        model: &str,
        base_url: Option<&str>,
        api_key_env: &str,
    ) -> Self {
        Self {
            name: name.to_string(),
            kind,
            model: model.to_string(),
            base_url: base_url.map(str::to_string),
            api_key_env: api_key_env.to_string(),
            max_tokens: default_max_tokens(),
            temperature: None,
        }
    }

    /// The four providers the service ships with.
    pub fn defaults() -> Vec<ProviderConfig> {
        vec![
            ProviderConfig::new(
                "deepseek",
                ProviderType::OpenAiCompatible,
                "deepseek-chat",
                Some("https://api.deepseek.com/v1"),
                "DEEPSEEK_API_KEY",
            ),
            ProviderConfig::new(
                "gemini",
                ProviderType::OpenAiCompatible,
                "gemini-2.0-flash-lite",
                Some("https://generativelanguage.googleapis.com/v1beta/openai"),
                "GEMINI_API_KEY",
            ),
            ProviderConfig::new(
                "chatgpt",
                ProviderType::OpenAiCompatible,
                "gpt-4o-mini",
                Some("https://api.openai.com/v1"),
                "CHATGPT_API_KEY",
            ),
            ProviderConfig::new(
                "claude",
                ProviderType::Anthropic,
                "claude-3-haiku-20240307",
                None,
                "CLAUDE_API_KEY",
            ),
        ]
    }
}
