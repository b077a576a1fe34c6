//! Configuration types for Chorus.
//!
//! `AppConfig` represents the top-level `chorus.toml`. Every field has a
//! default so an absent or empty file yields a runnable configuration;
//! environment variables are layered on top by the loader in chorus-infra.

use serde::{Deserialize, Serialize};

use crate::llm::ProviderConfig;

/// Top-level configuration for the Chorus service.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AppConfig {
    #[serde(default)]
    pub server: ServerConfig,
    #[serde(default)]
    pub database: DatabaseConfig,
    #[serde(default)]
    pub auth: AuthConfig,
    #[serde(default)]
    pub pipeline: PipelineConfig,
    #[serde(default)]
    pub retry: RetryConfig,
    #[serde(default = "ProviderConfig::defaults")]
    pub providers: Vec<ProviderConfig>,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            server: ServerConfig::default(),
            database: DatabaseConfig::default(),
            auth: AuthConfig::default(),
            pipeline: PipelineConfig::default(),
            retry: RetryConfig::default(),
            providers: ProviderConfig::defaults(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ServerConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    /// Allowed CORS origins; empty means any origin.
    #[serde(default)]
    pub cors_origins: Vec<String>,
}

fn default_host() -> String {
    "127.0.0.1".to_string()
}

fn default_port() -> u16 {
    5050
}

impl Default for ServerConfig {
    fn default() -> Self {
        Self {
            host: default_host(),
            port: default_port(),
            cors_origins: Vec::new(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct DatabaseConfig {
    #[serde(default = "default_database_url")]
    pub url: String,
}

fn default_database_url() -> String {
    "sqlite://chorus.db?mode=rwc".to_string()
}

impl Default for DatabaseConfig {
    fn default() -> Self {
        Self {
            url: default_database_url(),
        }
    }
}

/// Identity provider settings used to verify bearer tokens.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AuthConfig {
    /// Base URL of the identity provider; JWKS is served below it.
    #[serde(default)]
    pub url: Option<String>,
    /// Public anon key, sent when the JWKS endpoint requires one.
    #[serde(default)]
    pub anon_key: Option<String>,
    /// Shared HS256 secret for projects that still sign with one.
    #[serde(default)]
    pub jwt_secret: Option<String>,
    #[serde(default = "default_audience")]
    pub audience: String,
    #[serde(default = "default_jwks_ttl_secs")]
    pub jwks_ttl_secs: u64,
}

fn default_audience() -> String {
    "authenticated".to_string()
}

fn default_jwks_ttl_secs() -> u64 {
    600
}

impl Default for AuthConfig {
    fn default() -> Self {
        Self {
            url: None,
            anon_key: None,
            jwt_secret: None,
            audience: default_audience(),
            jwks_ttl_secs: default_jwks_ttl_secs(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct PipelineConfig {
    /// Summarizer used when a request does not name one.
    #[serde(default = "default_summary_model")]
    pub default_summary_model: String,
    /// Model that titles new sessions; falls back to the summary model.
    #[serde(default)]
    pub title_model: Option<String>,
}

fn default_summary_model() -> String {
    "gemini".to_string()
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self {
            default_summary_model: default_summary_model(),
            title_model: None,
        }
    }
}

/// Backoff settings for outbound provider calls.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RetryConfig {
    #[serde(default = "default_max_attempts")]
    pub max_attempts: u32,
    #[serde(default = "default_base_delay_ms")]
    pub base_delay_ms: u64,
    #[serde(default = "default_max_delay_ms")]
    pub max_delay_ms: u64,
    #[serde(default = "default_jitter")]
    pub jitter: bool,
}

fn default_max_attempts() -> u32 {
    3
}

fn default_base_delay_ms() -> u64 {
    500
}

fn default_max_delay_ms() -> u64 {
    8_000
}

fn default_jitter() -> bool {
    true
}

impl Default for RetryConfig {
    fn default() -> Self {
        Self {
            max_attempts: default_max_attempts(),
            base_delay_ms: default_base_delay_ms(),
            max_delay_ms: default_max_delay_ms(),
            jitter: default_jitter(),
        }
    }
}
