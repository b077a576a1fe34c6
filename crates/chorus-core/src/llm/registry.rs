//! Provider registry for runtime provider lookup.
//!
//! A name-indexed registry of boxed LLM providers together with the model
//! settings used when the pipeline builds requests for them.

use std::collections::BTreeMap;

use chorus_types::llm::{CompletionRequest, Message};

use super::box_provider::BoxLlmProvider;

/// A provider plus the request defaults it was configured with.
#[derive(Debug)]
pub struct RegisteredProvider {
    pub provider: BoxLlmProvider,
    pub model: String,
    pub max_tokens: u32,
    pub temperature: Option<f64>,
}

impl RegisteredProvider {
    pub fn new(provider: BoxLlmProvider, model: impl Into<String>, max_tokens: u32) -> Self {
        Self {
            provider,
            model: model.into(),
            max_tokens,
            temperature: None,
        }
    }

    pub fn with_temperature(mut self, temperature: Option<f64>) -> Self {
        self.temperature = temperature;
        self
    }

    /// Build a streaming request for this provider's model.
    pub fn request(&self, messages: Vec<Message>) -> CompletionRequest {
        CompletionRequest {
            model: self.model.clone(),
            messages,
            system: None,
            max_tokens: self.max_tokens,
            temperature: self.temperature,
            stream: true,
        }
    }
}

/// Registry of available LLM providers, indexed by the name clients use.
#[derive(Debug, Default)]
pub struct ProviderRegistry {
    providers: BTreeMap<String, RegisteredProvider>,
}

impl ProviderRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    /// Register a provider under the given name.
    ///
    /// If a provider with this name already exists, it is replaced.
    pub fn register(&mut self, name: impl Into<String>, provider: RegisteredProvider) {
        self.providers.insert(name.into(), provider);
    }

    pub fn get(&self, name: &str) -> Option<&RegisteredProvider> {
        self.providers.get(name)
    }

    pub fn contains(&self, name: &str) -> bool {
        self.providers.contains_key(name)
    }

    /// All registered provider names, sorted.
    pub fn list_names(&self) -> Vec<&str> {
        self.providers.keys().map(|s| s.as_str()).collect()
    }

    pub fn is_empty(&self) -> bool {
        self.providers.is_empty()
    }
}
