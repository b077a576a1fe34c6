//! Configuration and per-provider defaults for OpenAI-compatible providers.
//!
//! DeepSeek, Gemini, and OpenAI all speak the chat completions protocol; they
//! differ only in base URL and key.

/// Configuration for an [`super::OpenAiCompatibleProvider`].
pub struct OpenAiCompatConfig {
    /// Name the provider is registered under (e.g., "deepseek", "gemini").
    pub provider_name: String,
    /// Base URL for the API (e.g., "https://api.openai.com/v1").
    pub base_url: String,
    pub api_key: String,
    pub model: String,
}

pub const DEEPSEEK_BASE_URL: &str = "https://api.deepseek.com/v1";
pub const GEMINI_BASE_URL: &str = "https://generativelanguage.googleapis.com/v1beta/openai";
pub const OPENAI_BASE_URL: &str = "https://api.openai.com/v1";

fn with_base(name: &str, base_url: &str, api_key: &str, model: &str) -> OpenAiCompatConfig {
    OpenAiCompatConfig {
        provider_name: name.into(),
        base_url: base_url.into(),
        api_key: api_key.into(),
        model: model.into(),
    }
}

/// DeepSeek default configuration.
pub fn deepseek_defaults(api_key: &str, model: &str) -> OpenAiCompatConfig {
    with_base("deepseek", DEEPSEEK_BASE_URL, api_key, model)
}

/// Google Gemini default configuration (OpenAI-compatible beta endpoint).
pub fn gemini_defaults(api_key: &str, model: &str) -> OpenAiCompatConfig {
    with_base("gemini", GEMINI_BASE_URL, api_key, model)
}

/// OpenAI default configuration, registered as "chatgpt".
pub fn openai_defaults(api_key: &str, model: &str) -> OpenAiCompatConfig {
    with_base("chatgpt", OPENAI_BASE_URL, api_key, model)
}

/// Default base URL for a well-known provider name.
pub fn known_base_url(name: &str) -> Option<&'static str> {
    match name {
        "deepseek" => Some(DEEPSEEK_BASE_URL),
        "gemini" => Some(GEMINI_BASE_URL),
        "chatgpt" | "openai" => Some(OPENAI_BASE_URL),
        _ => None,
    }
}
