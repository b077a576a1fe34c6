//! LLM provider implementations.
//!
//! Concrete [`LlmProvider`](chorus_core::llm::provider::LlmProvider)
//! implementations for Anthropic and OpenAI-compatible APIs, a factory
//! ([`create_provider`]) that builds the right one from a [`ProviderConfig`],
//! and [`build_registry`] which wires every configured provider with a key
//! into a [`ProviderRegistry`] behind the retry decorator.

pub mod anthropic;
pub mod openai_compat;

use secrecy::SecretString;

use chorus_core::llm::box_provider::BoxLlmProvider;
use chorus_core::llm::registry::{ProviderRegistry, RegisteredProvider};
use chorus_core::llm::retry::{RetryPolicy, RetryingProvider};
use chorus_types::config::RetryConfig;
use chorus_types::llm::{CompletionRequest, LlmError, Message, ProviderConfig, ProviderType};

use self::anthropic::AnthropicProvider;
use self::openai_compat::OpenAiCompatibleProvider;
use self::openai_compat::config::{OpenAiCompatConfig, known_base_url};

/// Create a [`BoxLlmProvider`] from a [`ProviderConfig`] and its resolved key.
///
/// # Errors
///
/// Returns [`LlmError::AuthenticationFailed`] when no key is given, or
/// [`LlmError::InvalidRequest`] for an OpenAI-compatible provider with no
/// known or configured base URL.
pub fn create_provider(config: &ProviderConfig, api_key: Option<&str>) -> Result<BoxLlmProvider, LlmError> {
    let key = api_key.ok_or(LlmError::AuthenticationFailed)?;

    match config.kind {
        ProviderType::Anthropic => {
            let secret = SecretString::from(key.to_string());
            let mut provider = AnthropicProvider::new(&config.name, secret, config.model.clone())?;
            if let Some(base_url) = config.base_url.as_deref() {
                provider = provider.with_base_url(base_url);
            }
            Ok(BoxLlmProvider::new(provider))
        }
        ProviderType::OpenAiCompatible => {
            let base_url = config
                .base_url
                .as_deref()
                .or_else(|| known_base_url(&config.name))
                .ok_or_else(|| {
                    LlmError::InvalidRequest(format!(
                        "provider '{}' needs a base_url",
                        config.name
                    ))
                })?;
            let provider = OpenAiCompatibleProvider::new(OpenAiCompatConfig {
                provider_name: config.name.clone(),
                base_url: base_url.to_string(),
                api_key: key.to_string(),
                model: config.model.clone(),
            });
            Ok(BoxLlmProvider::new(provider))
        }
    }
}

/// Build the registry of callable providers.
///
/// `lookup_key` resolves an environment variable name to its value.
/// Providers without a key are skipped with a warning so a partially
/// configured deployment still serves the models it can reach.
pub fn build_registry<F>(
    providers: &[ProviderConfig],
    retry: &RetryConfig,
    lookup_key: F,
) -> ProviderRegistry
where
    F: Fn(&str) -> Option<String>,
{
    let policy = RetryPolicy::from_config(retry);
    let mut registry = ProviderRegistry::new();

    for config in providers {
        let key = lookup_key(&config.api_key_env).filter(|k| !k.trim().is_empty());
        let Some(key) = key else {
            tracing::warn!(
                provider = %config.name,
                env = %config.api_key_env,
                "API key not set, provider disabled"
            );
            continue;
        };

        match create_provider(config, Some(&key)) {
            Ok(provider) => {
                let retrying = RetryingProvider::new(provider, policy.clone());
                let entry = RegisteredProvider::new(
                    BoxLlmProvider::new(retrying),
                    config.model.clone(),
                    config.max_tokens,
                )
                .with_temperature(config.temperature);
                registry.register(config.name.clone(), entry);
                tracing::debug!(provider = %config.name, model = %config.model, "provider registered");
            }
            Err(e) => {
                tracing::warn!(provider = %config.name, error = %e, "failed to create provider");
            }
        }
    }

    registry
}

/// Send a minimal completion to verify a provider's key and endpoint.
pub async fn check_provider(entry: &RegisteredProvider) -> Result<(), LlmError> {
    let mut request: CompletionRequest = entry.request(vec![Message::user("Hello")]);
    request.max_tokens = 10;
    request.stream = false;
    entry.provider.complete(&request).await?;
    Ok(())
}

#[cfg(test)]
mod tests {
    use super::*;

    fn config(name: &str, kind: ProviderType, base_url: Option<&str>) -> ProviderConfig {
        ProviderConfig::new(name, kind, "some-model", base_url, "SOME_KEY")
    }

    #[test]
    fn test_create_provider_anthropic() {
        let provider =
            create_provider(&config("claude", ProviderType::Anthropic, None), Some("sk-test")).unwrap();
        assert_eq!(provider.name(), "claude");
    }

    #[test]
    fn test_create_provider_openai_compatible_by_name() {
        let provider = create_provider(
            &config("gemini", ProviderType::OpenAiCompatible, None),
            Some("key"),
        )
        .unwrap();
        assert_eq!(provider.name(), "gemini");
    }

    #[test]
    fn test_create_provider_openai_compatible_with_base_url() {
        let provider = create_provider(
            &config(
                "local",
                ProviderType::OpenAiCompatible,
                Some("http://localhost:11434/v1"),
            ),
            Some("key"),
        )
        .unwrap();
        assert_eq!(provider.name(), "local");
    }

    #[test]
    fn test_create_provider_unknown_openai_compatible_needs_base_url() {
        let result = create_provider(
            &config("mystery", ProviderType::OpenAiCompatible, None),
            Some("key"),
        );
        assert!(matches!(result, Err(LlmError::InvalidRequest(_))));
    }

    #[test]
    fn test_create_provider_missing_key() {
        let result = create_provider(&config("claude", ProviderType::Anthropic, None), None);
        assert!(matches!(result, Err(LlmError::AuthenticationFailed)));
    }

    #[test]
    fn test_build_registry_skips_providers_without_keys() {
        let providers = ProviderConfig::defaults();
        let registry = build_registry(&providers, &RetryConfig::default(), |env| match env {
            "GEMINI_API_KEY" => Some("g-key".to_string()),
            "CLAUDE_API_KEY" => Some("c-key".to_string()),
            "DEEPSEEK_API_KEY" => Some("   ".to_string()),
            _ => None,
        });

        assert_eq!(registry.list_names(), vec!["claude", "gemini"]);
        let claude = registry.get("claude").unwrap();
        assert_eq!(claude.model, "claude-3-haiku-20240307");
        assert_eq!(claude.max_tokens, 1000);
        assert_eq!(claude.provider.name(), "claude");
    }
}
