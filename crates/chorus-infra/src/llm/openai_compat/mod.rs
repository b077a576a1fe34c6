//! OpenAI-compatible LLM provider implementation.
//!
//! A single [`OpenAiCompatibleProvider`] serves DeepSeek, Google Gemini, and
//! OpenAI via configurable base URLs and factory functions.
//!
//! Uses [`async_openai`] for type-safe request/response handling and
//! built-in SSE streaming.

pub mod config;
pub mod streaming;

use std::time::Duration;

use async_openai::Client;
use async_openai::config::OpenAIConfig;
use async_openai::types::chat::{
    ChatCompletionRequestAssistantMessage, ChatCompletionRequestAssistantMessageContent,
    ChatCompletionRequestMessage, ChatCompletionRequestSystemMessage,
    ChatCompletionRequestSystemMessageContent, ChatCompletionRequestUserMessage,
    ChatCompletionRequestUserMessageContent, ChatCompletionStreamOptions,
    CreateChatCompletionRequest,
};

use chorus_core::llm::provider::{EventStream, LlmProvider};
use chorus_types::llm::{
    CompletionRequest, CompletionResponse, LlmError, MessageRole, StopReason, Usage,
};

use self::config::OpenAiCompatConfig;
use self::streaming::{map_openai_stream, stop_reason};

/// Unified provider for any OpenAI-compatible API.
///
/// Does not derive Debug: the `async_openai::Client` holds the API key.
pub struct OpenAiCompatibleProvider {
    client: Client<OpenAIConfig>,
    provider_name: String,
    model: String,
}

impl OpenAiCompatibleProvider {
    /// The client makes exactly one attempt per call. Retries belong to
    /// `RetryingProvider`, which owns the attempt count and delays.
    pub fn new(config: OpenAiCompatConfig) -> Self {
        let openai_config = OpenAIConfig::new()
            .with_api_key(&config.api_key)
            .with_api_base(&config.base_url);

        Self {
            client: Client::with_config(openai_config).with_backoff(single_attempt()),
            provider_name: config.provider_name,
            model: config.model,
        }
    }

    pub fn deepseek(api_key: &str, model: &str) -> Self {
        Self::new(config::deepseek_defaults(api_key, model))
    }

    pub fn gemini(api_key: &str, model: &str) -> Self {
        Self::new(config::gemini_defaults(api_key, model))
    }

    pub fn openai(api_key: &str, model: &str) -> Self {
        Self::new(config::openai_defaults(api_key, model))
    }

    /// Build a [`CreateChatCompletionRequest`] from a generic [`CompletionRequest`].
    fn build_request(&self, request: &CompletionRequest, stream: bool) -> CreateChatCompletionRequest {
        let mut messages: Vec<ChatCompletionRequestMessage> = Vec::new();

        if let Some(ref system) = request.system {
            messages.push(system_message(system));
        }

        for msg in &request.messages {
            let oai_msg = match msg.role {
                MessageRole::System => system_message(&msg.content),
                MessageRole::User => {
                    ChatCompletionRequestMessage::User(ChatCompletionRequestUserMessage {
                        content: ChatCompletionRequestUserMessageContent::Text(msg.content.clone()),
                        name: None,
                    })
                }
                MessageRole::Assistant => {
                    #[allow(deprecated)]
                    ChatCompletionRequestMessage::Assistant(ChatCompletionRequestAssistantMessage {
                        content: Some(ChatCompletionRequestAssistantMessageContent::Text(
                            msg.content.clone(),
                        )),
                        refusal: None,
                        name: None,
                        audio: None,
                        tool_calls: None,
                        function_call: None,
                    })
                }
            };
            messages.push(oai_msg);
        }

        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        let mut req = CreateChatCompletionRequest {
            model,
            messages,
            max_completion_tokens: Some(request.max_tokens),
            temperature: request.temperature.map(|t| t as f32),
            ..Default::default()
        };

        if stream {
            req.stream = Some(true);
            req.stream_options = Some(ChatCompletionStreamOptions {
                include_usage: Some(true),
                include_obfuscation: None,
            });
        }

        req
    }
}

/// A backoff whose elapsed-time budget is already spent after the first try.
fn single_attempt() -> backoff::ExponentialBackoff {
    backoff::ExponentialBackoffBuilder::new()
        .with_max_elapsed_time(Some(Duration::ZERO))
        .build()
}

fn system_message(content: &str) -> ChatCompletionRequestMessage {
    ChatCompletionRequestMessage::System(ChatCompletionRequestSystemMessage {
        content: ChatCompletionRequestSystemMessageContent::Text(content.to_string()),
        name: None,
    })
}

impl LlmProvider for OpenAiCompatibleProvider {
    fn name(&self) -> &str {
        &self.provider_name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let oai_request = self.build_request(request, false);

        let response = self
            .client
            .chat()
            .create(oai_request)
            .await
            .map_err(map_openai_error)?;

        let first = response.choices.first();
        let content = first
            .and_then(|c| c.message.content.clone())
            .unwrap_or_default();
        let stop_reason = first
            .and_then(|c| c.finish_reason.as_ref())
            .map(stop_reason)
            .unwrap_or(StopReason::EndTurn);
        let usage = response
            .usage
            .map(|u| Usage {
                input_tokens: u.prompt_tokens,
                output_tokens: u.completion_tokens,
            })
            .unwrap_or_default();

        Ok(CompletionResponse {
            id: response.id,
            content,
            model: response.model,
            stop_reason,
            usage,
        })
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        let oai_request = self.build_request(&request, true);
        let client = self.client.clone();

        Box::pin(async_stream::try_stream! {
            let oai_stream = client
                .chat()
                .create_stream(oai_request)
                .await
                .map_err(map_openai_error)?;

            let mut inner = map_openai_stream(oai_stream);

            use futures_util::StreamExt;
            while let Some(event) = inner.next().await {
                yield event?;
            }
        })
    }
}

/// Map an `async_openai::error::OpenAIError` to an [`LlmError`].
pub(crate) fn map_openai_error(err: async_openai::error::OpenAIError) -> LlmError {
    use async_openai::error::OpenAIError;

    match &err {
        // 5xx bodies arrive verbatim, without a type or code.
        OpenAIError::ApiError(api_err) if api_err.r#type.is_none() && api_err.code.is_none() => {
            LlmError::Overloaded(api_err.message.clone())
        }
        OpenAIError::ApiError(api_err) => {
            let code = api_err.code.as_deref().unwrap_or("");
            let error_type = api_err.r#type.as_deref().unwrap_or("");

            if code == "invalid_api_key"
                || error_type == "authentication_error"
                || api_err.message.contains("Incorrect API key")
                || api_err.message.contains("API key not valid")
            {
                LlmError::AuthenticationFailed
            } else if code == "rate_limit_exceeded"
                || error_type == "rate_limit_error"
                || error_type == "insufficient_quota"
            {
                LlmError::RateLimited {
                    retry_after_ms: None,
                }
            } else if code == "server_error"
                || error_type == "server_error"
                || error_type == "overloaded_error"
            {
                LlmError::Overloaded(api_err.message.clone())
            } else if error_type == "invalid_request_error" {
                LlmError::InvalidRequest(api_err.message.clone())
            } else {
                LlmError::Provider {
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::Reqwest(reqwest_err) => {
            if reqwest_err.is_timeout() {
                LlmError::Timeout
            } else if reqwest_err.is_connect() {
                LlmError::Connection(reqwest_err.to_string())
            } else if let Some(status) = reqwest_err.status() {
                LlmError::from_status(status.as_u16(), err.to_string())
            } else {
                LlmError::Provider {
                    message: err.to_string(),
                }
            }
        }
        OpenAIError::JSONDeserialize(_, content) => {
            LlmError::Deserialization(format!("failed to parse response: {content}"))
        }
        OpenAIError::StreamError(stream_err) => LlmError::Stream(stream_err.to_string()),
        OpenAIError::InvalidArgument(msg) => LlmError::InvalidRequest(msg.clone()),
        _ => LlmError::Provider {
            message: err.to_string(),
        },
    }
}
