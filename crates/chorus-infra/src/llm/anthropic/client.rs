//! AnthropicProvider: [`LlmProvider`] implementation for Anthropic Claude.
//!
//! Sends requests to the Messages API (`/v1/messages`) with the required
//! authentication headers. Supports both `complete` and `stream`.
//!
//! The API key is wrapped in [`secrecy::SecretString`] and is never logged
//! or included in `Debug` output.

use std::time::Duration;

use secrecy::{ExposeSecret, SecretString};

use chorus_core::llm::provider::{EventStream, LlmProvider};
use chorus_types::llm::{CompletionRequest, CompletionResponse, LlmError, Usage};

use super::streaming::{create_anthropic_stream, error_from_payload, stop_reason};
use super::types::{
    AnthropicContentBlock, AnthropicMessage, AnthropicNonStreamResponse, AnthropicRequest,
    ErrorPayload,
};

/// Value of the `anthropic-version` header.
pub(super) const API_VERSION: &str = "2023-06-01";

pub const DEFAULT_BASE_URL: &str = "https://api.anthropic.com";

const REQUEST_TIMEOUT: Duration = Duration::from_secs(120);

/// Map a transport-level reqwest failure.
pub(super) fn map_reqwest_error(err: reqwest::Error) -> LlmError {
    if err.is_timeout() {
        LlmError::Timeout
    } else if err.is_connect() {
        LlmError::Connection(err.to_string())
    } else {
        LlmError::Provider {
            message: format!("HTTP request failed: {err}"),
        }
    }
}

/// Classify a non-2xx response, preferring the typed error body when present.
pub(super) fn error_from_response(status: u16, body: &str) -> LlmError {
    match serde_json::from_str::<ErrorPayload>(body) {
        Ok(payload) if payload.error.error_type == "overloaded_error" => error_from_payload(payload),
        Ok(payload) => LlmError::from_status(status, payload.error.message),
        Err(_) => LlmError::from_status(status, body),
    }
}

/// Anthropic Claude LLM provider.
///
/// Intentionally not `Debug`; the key is only exposed when building headers.
pub struct AnthropicProvider {
    client: reqwest::Client,
    api_key: SecretString,
    base_url: String,
    model: String,
    name: String,
}

impl AnthropicProvider {
    pub fn new(name: impl Into<String>, api_key: SecretString, model: String) -> Result<Self, LlmError> {
        let client = reqwest::Client::builder()
            .timeout(REQUEST_TIMEOUT)
            .build()
            .map_err(|e| LlmError::Provider {
                message: format!("failed to create HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            api_key,
            base_url: DEFAULT_BASE_URL.to_string(),
            model,
            name: name.into(),
        })
    }

    pub fn model(&self) -> &str {
        &self.model
    }

    /// Override the base URL (proxies and tests).
    pub fn with_base_url(mut self, base_url: impl Into<String>) -> Self {
        self.base_url = base_url.into().trim_end_matches('/').to_string();
        self
    }

    fn url(&self, path: &str) -> String {
        format!("{}{}", self.base_url, path)
    }

    fn to_anthropic_request(&self, request: &CompletionRequest, stream: bool) -> AnthropicRequest {
        let messages = request
            .messages
            .iter()
            .map(|m| AnthropicMessage {
                role: m.role.to_string(),
                content: m.content.clone(),
            })
            .collect();

        let model = if request.model.is_empty() {
            self.model.clone()
        } else {
            request.model.clone()
        };

        AnthropicRequest {
            model,
            max_tokens: request.max_tokens,
            messages,
            system: request.system.clone(),
            stream,
            temperature: request.temperature,
        }
    }
}

impl LlmProvider for AnthropicProvider {
    fn name(&self) -> &str {
        &self.name
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        let body = self.to_anthropic_request(request, false);

        let response = self
            .client
            .post(self.url("/v1/messages"))
            .header("x-api-key", self.api_key.expose_secret())
            .header("anthropic-version", API_VERSION)
            .json(&body)
            .send()
            .await
            .map_err(map_reqwest_error)?;

        let status = response.status();
        if !status.is_success() {
            let error_body = response.text().await.unwrap_or_default();
            return Err(error_from_response(status.as_u16(), &error_body));
        }

        let anthropic_resp: AnthropicNonStreamResponse = response
            .json()
            .await
            .map_err(|e| LlmError::Deserialization(format!("failed to parse response: {e}")))?;

        let content = anthropic_resp
            .content
            .iter()
            .filter_map(|block| match block {
                AnthropicContentBlock::Text { text } => Some(text.as_str()),
                AnthropicContentBlock::Other => None,
            })
            .collect::<String>();

        Ok(CompletionResponse {
            id: anthropic_resp.id,
            content,
            model: anthropic_resp.model,
            stop_reason: stop_reason(anthropic_resp.stop_reason.as_deref()),
            usage: Usage {
                input_tokens: anthropic_resp.usage.input_tokens,
                output_tokens: anthropic_resp.usage.output_tokens,
            },
        })
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        let body = self.to_anthropic_request(&request, true);
        create_anthropic_stream(&self.client, &self.url("/v1/messages"), body, &self.api_key)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::Router;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::IntoResponse;
    use axum::routing::post;
    use chorus_types::llm::{Message, StopReason, StreamEvent};
    use futures_util::StreamExt;

    fn make_provider() -> AnthropicProvider {
        AnthropicProvider::new(
            "claude",
            SecretString::from("test-key-not-real"),
            "claude-3-haiku-20240307".to_string(),
        )
        .unwrap()
    }

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: String::new(),
            messages: vec![Message::user("Hello")],
            system: Some("Be helpful".to_string()),
            max_tokens: 1000,
            temperature: None,
            stream: false,
        }
    }

    async fn serve(router: Router) -> String {
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    #[test]
    fn test_provider_name_is_registration_name() {
        assert_eq!(make_provider().name(), "claude");
    }

    #[test]
    fn test_to_anthropic_request_uses_default_model() {
        let anthropic_req = make_provider().to_anthropic_request(&request(), true);
        assert_eq!(anthropic_req.model, "claude-3-haiku-20240307");
        assert!(anthropic_req.stream);
        assert_eq!(anthropic_req.messages[0].role, "user");
        assert_eq!(anthropic_req.system.as_deref(), Some("Be helpful"));
    }

    #[test]
    fn test_base_url_override() {
        let provider = make_provider().with_base_url("http://localhost:8080/");
        assert_eq!(provider.url("/v1/messages"), "http://localhost:8080/v1/messages");
    }

    #[test]
    fn test_error_from_response() {
        assert!(matches!(
            error_from_response(503, "upstream unavailable"),
            LlmError::Http { status: 503, .. }
        ));
        assert!(matches!(
            error_from_response(401, r#"{"type":"error","error":{"type":"authentication_error","message":"bad key"}}"#),
            LlmError::AuthenticationFailed
        ));
        assert!(matches!(
            error_from_response(529, r#"{"type":"error","error":{"type":"overloaded_error","message":"busy"}}"#),
            LlmError::Overloaded(_)
        ));
    }

    #[tokio::test]
    async fn test_complete_sends_headers() {
        let router = Router::new().route(
            "/v1/messages",
            post(|headers: HeaderMap| async move {
                assert_eq!(headers["x-api-key"], "test-key-not-real");
                assert_eq!(headers["anthropic-version"], API_VERSION);
                axum::Json(serde_json::json!({
                    "id": "msg_1",
                    "content": [{"type": "text", "text": "Hi "}, {"type": "text", "text": "there"}],
                    "model": "claude-3-haiku-20240307",
                    "stop_reason": "end_turn",
                    "usage": {"input_tokens": 5, "output_tokens": 2}
                }))
            }),
        );
        let provider = make_provider().with_base_url(serve(router).await);

        let response = provider.complete(&request()).await.unwrap();
        assert_eq!(response.content, "Hi there");
        assert_eq!(response.stop_reason, StopReason::EndTurn);
    }

    #[tokio::test]
    async fn test_complete_maps_server_error() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async { (StatusCode::BAD_GATEWAY, "bad gateway").into_response() }),
        );
        let provider = make_provider().with_base_url(serve(router).await);

        let err = provider.complete(&request()).await.unwrap_err();
        assert!(matches!(err, LlmError::Http { status: 502, .. }));
    }

    #[tokio::test]
    async fn test_stream_parses_sse_body() {
        let body = concat!(
            "event: message_start\n",
            "data: {\"type\":\"message_start\",\"message\":{\"id\":\"msg_1\",\"model\":\"claude-3-haiku-20240307\",\"usage\":{\"input_tokens\":5,\"output_tokens\":0}}}\n\n",
            "event: content_block_start\n",
            "data: {\"type\":\"content_block_start\",\"index\":0,\"content_block\":{\"type\":\"text\",\"text\":\"\"}}\n\n",
            "event: ping\n",
            "data: {\"type\":\"ping\"}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"lo\"}}\n\n",
            "event: content_block_stop\n",
            "data: {\"type\":\"content_block_stop\",\"index\":0}\n\n",
            "event: message_delta\n",
            "data: {\"type\":\"message_delta\",\"delta\":{\"stop_reason\":\"end_turn\"},\"usage\":{\"output_tokens\":2}}\n\n",
            "event: message_stop\n",
            "data: {\"type\":\"message_stop\"}\n\n",
        );
        let router = Router::new().route(
            "/v1/messages",
            post(move || async move { ([("content-type", "text/event-stream")], body) }),
        );
        let provider = make_provider().with_base_url(serve(router).await);

        let events: Vec<StreamEvent> = provider
            .stream(request())
            .map(|e| e.unwrap())
            .collect()
            .await;

        let text: String = events
            .iter()
            .filter_map(|e| match e {
                StreamEvent::TextDelta { text } => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "Hello");
        assert_eq!(events.first(), Some(&StreamEvent::Connected));
        assert_eq!(events.last(), Some(&StreamEvent::Done));
    }

    #[tokio::test]
    async fn test_stream_truncated_body_is_an_error() {
        let body = concat!(
            "event: content_block_delta\n",
            "data: {\"type\":\"content_block_delta\",\"index\":0,\"delta\":{\"type\":\"text_delta\",\"text\":\"Hel\"}}\n\n",
        );
        let router = Router::new().route(
            "/v1/messages",
            post(move || async move { ([("content-type", "text/event-stream")], body) }),
        );
        let provider = make_provider().with_base_url(serve(router).await);

        let results: Vec<Result<StreamEvent, LlmError>> = provider.stream(request()).collect().await;
        assert!(matches!(results.last(), Some(Err(LlmError::Stream(_)))));
    }

    #[tokio::test]
    async fn test_stream_maps_rate_limit_status() {
        let router = Router::new().route(
            "/v1/messages",
            post(|| async { (StatusCode::TOO_MANY_REQUESTS, "slow down").into_response() }),
        );
        let provider = make_provider().with_base_url(serve(router).await);

        let results: Vec<Result<StreamEvent, LlmError>> = provider.stream(request()).collect().await;
        assert_eq!(results.len(), 1);
        assert!(matches!(results[0], Err(LlmError::RateLimited { .. })));
    }
}
