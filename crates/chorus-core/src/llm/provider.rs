//! LlmProvider trait definition.
//!
//! This is the core abstraction that all LLM providers implement.
//! Uses RPITIT for `complete`, and `Pin<Box<dyn Stream>>` for `stream`
//! (streams need to be object-safe for the BoxLlmProvider wrapper).

use std::pin::Pin;

use futures_util::Stream;

use chorus_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

/// Boxed stream of provider events.
pub type EventStream = Pin<Box<dyn Stream<Item = Result<StreamEvent, LlmError>> + Send + 'static>>;

/// Trait for LLM provider backends (Anthropic, OpenAI-compatible, etc.).
///
/// Implementations live in chorus-infra (e.g., `AnthropicProvider`).
pub trait LlmProvider: Send + Sync {
    /// Name clients use to select this provider (e.g., "gemini", "claude").
    fn name(&self) -> &str;

    /// Send a completion request and receive the full response.
    fn complete(
        &self,
        request: &CompletionRequest,
    ) -> impl std::future::Future<Output = Result<CompletionResponse, LlmError>> + Send;

    /// Send a streaming completion request. Returns a stream of events.
    ///
    /// Returns a boxed stream (not RPITIT) because streams need to be
    /// object-safe for the `BoxLlmProvider` wrapper.
    fn stream(&self, request: CompletionRequest) -> EventStream;
}
