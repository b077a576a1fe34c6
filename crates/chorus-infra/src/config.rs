//! Configuration loader for Chorus.
//!
//! Reads `chorus.toml` into [`AppConfig`], then layers environment variables
//! on top. A missing file yields the defaults; a file that exists but cannot
//! be read or parsed is a startup error.

use std::collections::HashSet;
use std::path::Path;

use chorus_types::chat::SUMMARIZER_LABEL;
use chorus_types::config::AppConfig;
use chorus_types::error::ConfigError;

/// Default configuration file name, looked up in the working directory.
pub const DEFAULT_CONFIG_FILE: &str = "chorus.toml";

/// Load configuration from `path` and the process environment.
pub async fn load_config(path: &Path) -> Result<AppConfig, ConfigError> {
    let mut config = read_config_file(path).await?;
    apply_env_overrides(&mut config, |key| std::env::var(key).ok())?;
    validate(&config)?;
    Ok(config)
}

async fn read_config_file(path: &Path) -> Result<AppConfig, ConfigError> {
    let content = match tokio::fs::read_to_string(path).await {
        Ok(content) => content,
        Err(err) if err.kind() == std::io::ErrorKind::NotFound => {
            tracing::debug!("No config file at {}, using defaults", path.display());
            return Ok(AppConfig::default());
        }
        Err(err) => {
            return Err(ConfigError::Read {
                path: path.display().to_string(),
                message: err.to_string(),
            });
        }
    };

    toml::from_str::<AppConfig>(&content).map_err(|err| ConfigError::Parse {
        path: path.display().to_string(),
        message: err.to_string(),
    })
}

/// Override file values with environment variables resolved by `lookup`.
///
/// Empty values are ignored.
pub fn apply_env_overrides<F>(config: &mut AppConfig, lookup: F) -> Result<(), ConfigError>
where
    F: Fn(&str) -> Option<String>,
{
    let get = |key: &str| lookup(key).filter(|v| !v.trim().is_empty());

    if let Some(url) = get("CHORUS_DATABASE_URL") {
        config.database.url = url;
    }
    if let Some(host) = get("CHORUS_HOST") {
        config.server.host = host;
    }
    if let Some(port) = get("CHORUS_PORT") {
        config.server.port = port
            .parse()
            .map_err(|_| ConfigError::Invalid(format!("CHORUS_PORT is not a port: '{port}'")))?;
    }
    if let Some(url) = get("SUPABASE_URL") {
        config.auth.url = Some(url.trim_end_matches('/').to_string());
    }
    if let Some(key) = get("SUPABASE_ANON_KEY") {
        config.auth.anon_key = Some(key);
    }
    if let Some(secret) = get("SUPABASE_JWT_SECRET") {
        config.auth.jwt_secret = Some(secret);
    }
    Ok(())
}

/// Reject configurations the service cannot run with.
pub fn validate(config: &AppConfig) -> Result<(), ConfigError> {
    if config.retry.max_attempts == 0 {
        return Err(ConfigError::Invalid(
            "retry.max_attempts must be at least 1".to_string(),
        ));
    }
    if config.retry.base_delay_ms > config.retry.max_delay_ms {
        return Err(ConfigError::Invalid(
            "retry.base_delay_ms must not exceed retry.max_delay_ms".to_string(),
        ));
    }

    let mut seen = HashSet::new();
    for provider in &config.providers {
        if provider.name.is_empty() || provider.name.len() > 50 {
            return Err(ConfigError::Invalid(format!(
                "provider name '{}' must be 1-50 characters",
                provider.name
            )));
        }
        if provider.name == SUMMARIZER_LABEL {
            return Err(ConfigError::Invalid(format!(
                "'{SUMMARIZER_LABEL}' is reserved and cannot name a provider"
            )));
        }
        if !seen.insert(provider.name.as_str()) {
            return Err(ConfigError::Invalid(format!(
                "provider '{}' is configured twice",
                provider.name
            )));
        }
    }
    Ok(())
}
