//! OpenAI SSE stream to [`StreamEvent`] adapter.
//!
//! Maps `async-openai`'s [`ChatCompletionResponseStream`] chunks to the
//! provider-agnostic [`StreamEvent`] enum defined in `chorus-types`.

use futures_util::StreamExt;

use async_openai::types::chat::{ChatCompletionResponseStream, FinishReason};

use chorus_core::llm::provider::EventStream;
use chorus_types::llm::{LlmError, StopReason, StreamEvent, Usage};

/// Translate an OpenAI finish reason.
pub(crate) fn stop_reason(reason: &FinishReason) -> StopReason {
    match reason {
        FinishReason::Length => StopReason::MaxTokens,
        _ => StopReason::EndTurn,
    }
}

/// Map an async-openai [`ChatCompletionResponseStream`] to [`StreamEvent`]s.
///
/// Emits `Connected` first, then `TextDelta` per non-empty content chunk,
/// `MessageDelta` when a finish reason appears, `Usage` when the final usage
/// chunk arrives, and `Done` once the upstream stream ends.
pub fn map_openai_stream(stream: ChatCompletionResponseStream) -> EventStream {
    Box::pin(async_stream::try_stream! {
        yield StreamEvent::Connected;

        let mut stream = stream;
        while let Some(result) = stream.next().await {
            let chunk = result.map_err(super::map_openai_error)?;

            for choice in &chunk.choices {
                if let Some(text) = choice.delta.content.as_deref() {
                    if !text.is_empty() {
                        yield StreamEvent::TextDelta { text: text.to_string() };
                    }
                }
                if let Some(reason) = choice.finish_reason.as_ref() {
                    yield StreamEvent::MessageDelta { stop_reason: stop_reason(reason) };
                }
            }

            // Sent with an empty choices array when include_usage is set.
            if let Some(usage) = chunk.usage.as_ref() {
                yield StreamEvent::Usage(Usage {
                    input_tokens: usage.prompt_tokens,
                    output_tokens: usage.completion_tokens,
                });
            }
        }

        yield StreamEvent::Done;
    })
}
