//! Bounded retry with jittered exponential backoff for provider calls.
//!
//! Only transient failures are retried: timeouts, connection drops, rate
//! limiting, overload, and HTTP 408/429/500/502/503/504. Everything else is
//! returned on the first attempt. When every attempt fails with a transient
//! error, the last error is returned wrapped in `LlmError::RetryExhausted`.

use std::future::Future;
use std::sync::Arc;
use std::time::Duration;

use futures_util::StreamExt;
use rand::Rng;

use chorus_types::config::RetryConfig;
use chorus_types::llm::{CompletionRequest, CompletionResponse, LlmError, StreamEvent};

use super::box_provider::BoxLlmProvider;
use super::provider::{EventStream, LlmProvider};

/// HTTP statuses treated as transient.
pub const RETRYABLE_STATUSES: [u16; 6] = [408, 429, 500, 502, 503, 504];

/// Backoff parameters for outbound calls.
#[derive(Debug, Clone, PartialEq)]
pub struct RetryPolicy {
    pub max_attempts: u32,
    pub base_delay: Duration,
    pub max_delay: Duration,
    pub jitter: bool,
}

impl Default for RetryPolicy {
    fn default() -> Self {
        Self::from_config(&RetryConfig::default())
    }
}

impl RetryPolicy {
    pub fn from_config(config: &RetryConfig) -> Self {
        Self {
            max_attempts: config.max_attempts.max(1),
            base_delay: Duration::from_millis(config.base_delay_ms),
            max_delay: Duration::from_millis(config.max_delay_ms),
            jitter: config.jitter,
        }
    }

    /// A policy that retries `max_attempts` times without sleeping.
    pub fn immediate(max_attempts: u32) -> Self {
        Self {
            max_attempts: max_attempts.max(1),
            base_delay: Duration::ZERO,
            max_delay: Duration::ZERO,
            jitter: false,
        }
    }

    /// Delay before the retry that follows failed attempt `attempt` (0-based).
    ///
    /// `min(base * 2^attempt, max)`, drawn uniformly from `[delay/2, delay]`
    /// when jitter is enabled.
    pub fn delay_for(&self, attempt: u32) -> Duration {
        let factor = 2u32.saturating_pow(attempt.min(16));
        let delay = self.base_delay.saturating_mul(factor).min(self.max_delay);
        if !self.jitter || delay.is_zero() {
            return delay;
        }
        let ms = delay.as_millis() as u64;
        Duration::from_millis(rand::thread_rng().gen_range(ms / 2..=ms))
    }
}

/// Whether `error` is a transient failure worth another attempt.
pub fn is_retryable(error: &LlmError) -> bool {
    match error {
        LlmError::Timeout
        | LlmError::Connection(_)
        | LlmError::RateLimited { .. }
        | LlmError::Overloaded(_)
        | LlmError::Stream(_) => true,
        LlmError::Http { status, .. } => RETRYABLE_STATUSES.contains(status),
        _ => false,
    }
}

fn exhausted(attempts: u32, error: LlmError) -> LlmError {
    if is_retryable(&error) {
        LlmError::RetryExhausted {
            attempts,
            last_error: Box::new(error),
        }
    } else {
        error
    }
}

/// Run `op` until it succeeds, fails with a non-transient error, or the
/// policy's attempts are used up.
pub async fn retry<T, F, Fut>(policy: &RetryPolicy, label: &str, mut op: F) -> Result<T, LlmError>
where
    F: FnMut() -> Fut,
    Fut: Future<Output = Result<T, LlmError>>,
{
    let mut attempt = 0;
    loop {
        attempt += 1;
        match op().await {
            Ok(value) => return Ok(value),
            Err(e) if is_retryable(&e) && attempt < policy.max_attempts => {
                let delay = policy.delay_for(attempt - 1);
                tracing::warn!(
                    provider = label,
                    attempt,
                    delay_ms = delay.as_millis() as u64,
                    error = %e,
                    "transient provider error, retrying"
                );
                tokio::time::sleep(delay).await;
            }
            Err(e) => return Err(exhausted(attempt, e)),
        }
    }
}

/// Provider decorator that applies a [`RetryPolicy`] to every call.
///
/// Streams are restarted only while nothing but bookkeeping events has been
/// forwarded; once text reached the caller a failure is returned as is.
pub struct RetryingProvider {
    inner: Arc<BoxLlmProvider>,
    policy: RetryPolicy,
}

impl RetryingProvider {
    pub fn new(inner: BoxLlmProvider, policy: RetryPolicy) -> Self {
        Self {
            inner: Arc::new(inner),
            policy,
        }
    }
}

impl LlmProvider for RetryingProvider {
    fn name(&self) -> &str {
        self.inner.name()
    }

    async fn complete(&self, request: &CompletionRequest) -> Result<CompletionResponse, LlmError> {
        retry(&self.policy, self.inner.name(), || self.inner.complete(request)).await
    }

    fn stream(&self, request: CompletionRequest) -> EventStream {
        let inner = Arc::clone(&self.inner);
        let policy = self.policy.clone();

        Box::pin(async_stream::stream! {
            let mut attempt = 0;
            loop {
                attempt += 1;
                let mut events = inner.stream(request.clone());
                let mut emitted_text = false;
                let mut failure = None;

                while let Some(item) = events.next().await {
                    match item {
                        Ok(event) => {
                            if matches!(event, StreamEvent::TextDelta { .. }) {
                                emitted_text = true;
                            }
                            yield Ok(event);
                        }
                        Err(e) => {
                            failure = Some(e);
                            break;
                        }
                    }
                }

                let Some(error) = failure else {
                    break;
                };

                if emitted_text {
                    yield Err(error);
                    break;
                }
                if is_retryable(&error) && attempt < policy.max_attempts {
                    let delay = policy.delay_for(attempt - 1);
                    tracing::warn!(
                        provider = inner.name(),
                        attempt,
                        delay_ms = delay.as_millis() as u64,
                        error = %error,
                        "transient stream error, retrying"
                    );
                    tokio::time::sleep(delay).await;
                    continue;
                }
                yield Err(exhausted(attempt, error));
                break;
            }
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::test_support::{Script, ScriptedProvider};
    use chorus_types::llm::{Message, StopReason};
    use std::sync::atomic::{AtomicU32, Ordering};

    fn request() -> CompletionRequest {
        CompletionRequest {
            model: "test-model".to_string(),
            messages: vec![Message::user("hi")],
            system: None,
            max_tokens: 100,
            temperature: None,
            stream: true,
        }
    }

    fn unavailable() -> LlmError {
        LlmError::Http {
            status: 503,
            message: "unavailable".to_string(),
        }
    }

    fn teapot() -> LlmError {
        LlmError::Http {
            status: 418,
            message: "teapot".to_string(),
        }
    }

    #[test]
    fn test_is_retryable_classification() {
        for status in RETRYABLE_STATUSES {
            assert!(is_retryable(&LlmError::Http {
                status,
                message: String::new()
            }));
        }
        assert!(is_retryable(&LlmError::Timeout));
        assert!(is_retryable(&LlmError::Connection("reset".into())));
        assert!(is_retryable(&LlmError::RateLimited {
            retry_after_ms: None
        }));

        assert!(!is_retryable(&teapot()));
        assert!(!is_retryable(&LlmError::Http {
            status: 404,
            message: String::new()
        }));
        assert!(!is_retryable(&LlmError::AuthenticationFailed));
        assert!(!is_retryable(&LlmError::Provider {
            message: "generic".into()
        }));
        assert!(!is_retryable(&LlmError::InvalidRequest("bad".into())));
    }

    #[test]
    fn test_delay_doubles_and_caps() {
        let policy = RetryPolicy {
            max_attempts: 5,
            base_delay: Duration::from_millis(100),
            max_delay: Duration::from_millis(350),
            jitter: false,
        };
        assert_eq!(policy.delay_for(0), Duration::from_millis(100));
        assert_eq!(policy.delay_for(1), Duration::from_millis(200));
        assert_eq!(policy.delay_for(2), Duration::from_millis(350));
        assert_eq!(policy.delay_for(30), Duration::from_millis(350));
    }

    #[test]
    fn test_jittered_delay_stays_in_range() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(400),
            max_delay: Duration::from_secs(10),
            jitter: true,
        };
        for _ in 0..50 {
            let delay = policy.delay_for(1);
            assert!(delay >= Duration::from_millis(400));
            assert!(delay <= Duration::from_millis(800));
        }
    }

    #[test]
    fn test_policy_from_config_never_zero_attempts() {
        let config = RetryConfig {
            max_attempts: 0,
            ..RetryConfig::default()
        };
        assert_eq!(RetryPolicy::from_config(&config).max_attempts, 1);
    }

    #[tokio::test]
    async fn test_retry_makes_exactly_n_attempts_then_propagates() {
        let calls = AtomicU32::new(0);
        let result: Result<(), LlmError> = retry(&RetryPolicy::immediate(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(LlmError::Timeout) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 3);
        match result {
            Err(LlmError::RetryExhausted {
                attempts,
                last_error,
            }) => {
                assert_eq!(attempts, 3);
                assert!(matches!(*last_error, LlmError::Timeout));
            }
            other => panic!("expected RetryExhausted, got {other:?}"),
        }
    }

    #[tokio::test]
    async fn test_retry_non_retryable_fails_once() {
        let calls = AtomicU32::new(0);
        let result: Result<(), LlmError> = retry(&RetryPolicy::immediate(3), "test", || {
            calls.fetch_add(1, Ordering::SeqCst);
            async { Err(teapot()) }
        })
        .await;

        assert_eq!(calls.load(Ordering::SeqCst), 1);
        assert!(matches!(result, Err(LlmError::Http { status: 418, .. })));
    }

    #[tokio::test]
    async fn test_retry_recovers_after_transient_failure() {
        let calls = AtomicU32::new(0);
        let result = retry(&RetryPolicy::immediate(3), "test", || {
            let n = calls.fetch_add(1, Ordering::SeqCst);
            async move {
                if n == 0 {
                    Err(unavailable())
                } else {
                    Ok("done")
                }
            }
        })
        .await;

        assert_eq!(result.unwrap(), "done");
        assert_eq!(calls.load(Ordering::SeqCst), 2);
    }

    #[tokio::test(start_paused = true)]
    async fn test_retry_sleeps_between_attempts() {
        let policy = RetryPolicy {
            max_attempts: 3,
            base_delay: Duration::from_millis(500),
            max_delay: Duration::from_secs(8),
            jitter: false,
        };
        let started = tokio::time::Instant::now();
        let _: Result<(), LlmError> = retry(&policy, "test", || async { Err(LlmError::Timeout) }).await;
        // 500ms after the first failure, 1000ms after the second.
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(1500));
        assert!(elapsed < Duration::from_millis(1600));
    }

    #[tokio::test]
    async fn test_retrying_provider_complete() {
        let mock = ScriptedProvider::new(
            "flaky",
            vec![Script::Fail(unavailable), Script::Reply(vec!["ok"])],
        );
        let provider = RetryingProvider::new(
            BoxLlmProvider::new(mock.clone()),
            RetryPolicy::immediate(3),
        );

        let response = provider.complete(&request()).await.unwrap();
        assert_eq!(response.content, "ok");
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_retrying_provider_stream_restarts_before_text() {
        let mock = ScriptedProvider::new(
            "flaky",
            vec![Script::Fail(unavailable), Script::Reply(vec!["a", "b"])],
        );
        let provider = RetryingProvider::new(
            BoxLlmProvider::new(mock.clone()),
            RetryPolicy::immediate(3),
        );

        let events: Vec<_> = provider.stream(request()).collect().await;
        let text: String = events
            .iter()
            .filter_map(|e| match e {
                Ok(StreamEvent::TextDelta { text }) => Some(text.as_str()),
                _ => None,
            })
            .collect();
        assert_eq!(text, "ab");
        assert!(events.iter().all(|e| e.is_ok()));
        assert!(events.iter().any(|e| matches!(
            e,
            Ok(StreamEvent::MessageDelta {
                stop_reason: StopReason::EndTurn
            })
        )));
        assert_eq!(mock.calls(), 2);
    }

    #[tokio::test]
    async fn test_retrying_provider_stream_exhausts_attempts() {
        let mock = ScriptedProvider::new("down", vec![Script::Fail(unavailable)]);
        let provider = RetryingProvider::new(
            BoxLlmProvider::new(mock.clone()),
            RetryPolicy::immediate(4),
        );

        let events: Vec<_> = provider.stream(request()).collect().await;
        assert_eq!(mock.calls(), 4);
        assert!(matches!(
            events.last(),
            Some(Err(LlmError::RetryExhausted { attempts: 4, .. }))
        ));
    }

    #[tokio::test]
    async fn test_retrying_provider_stream_does_not_restart_after_text() {
        let mock = ScriptedProvider::new(
            "midway",
            vec![
                Script::PartialThenFail(vec!["par"], unavailable),
                Script::Reply(vec!["never"]),
            ],
        );
        let provider = RetryingProvider::new(
            BoxLlmProvider::new(mock.clone()),
            RetryPolicy::immediate(3),
        );

        let events: Vec<_> = provider.stream(request()).collect().await;
        assert_eq!(mock.calls(), 1);
        assert!(matches!(
            events.last(),
            Some(Err(LlmError::Http { status: 503, .. }))
        ));
    }
}
