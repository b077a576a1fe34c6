//! Bearer token verifiers.
//!
//! [`JwksVerifier`] checks asymmetric signatures against the identity
//! provider's published key set; [`SharedSecretVerifier`] covers projects
//! that still sign with a shared HS256 secret. Both enforce the audience,
//! require `exp`, `iat`, and `sub`, and check the issuer against the
//! configured identity provider URL.

pub mod jwks;
pub mod shared_secret;

pub use jwks::JwksVerifier;
pub use shared_secret::SharedSecretVerifier;

use std::time::Duration;

use jsonwebtoken::errors::ErrorKind;
use jsonwebtoken::{Algorithm, DecodingKey, Validation};

use chorus_core::auth::{BoxTokenVerifier, Claims};
use chorus_types::config::AuthConfig;
use chorus_types::error::{AuthError, ConfigError};

/// Decode and validate `token` with an already selected key.
fn decode_claims(
    token: &str,
    key: &DecodingKey,
    algorithm: Algorithm,
    audience: &str,
    issuer: Option<&str>,
) -> Result<Claims, AuthError> {
    let mut validation = Validation::new(algorithm);
    validation.set_audience(&[audience]);
    validation.set_required_spec_claims(&["exp", "sub", "aud"]);

    let data = jsonwebtoken::decode::<Claims>(token, key, &validation).map_err(|e| match e.kind() {
        ErrorKind::ExpiredSignature => AuthError::Expired,
        _ => AuthError::InvalidToken(e.to_string()),
    })?;

    if let Some(expected) = issuer {
        let matches = data
            .claims
            .iss
            .as_deref()
            .is_some_and(|iss| iss.contains(expected));
        if !matches {
            return Err(AuthError::InvalidToken("issuer mismatch".to_string()));
        }
    }

    Ok(data.claims)
}

/// Select the verifier described by `config`.
///
/// A configured `jwt_secret` wins; otherwise the JWKS published under
/// `url` is used.
pub fn build_verifier(config: &AuthConfig) -> Result<BoxTokenVerifier, ConfigError> {
    let issuer = config.url.as_deref().map(|u| u.trim_end_matches('/').to_string());

    if let Some(secret) = config.jwt_secret.as_deref().filter(|s| !s.is_empty()) {
        tracing::info!("verifying bearer tokens with shared secret");
        return Ok(BoxTokenVerifier::new(SharedSecretVerifier::new(
            secret,
            &config.audience,
            issuer,
        )));
    }

    let Some(url) = issuer else {
        return Err(ConfigError::Invalid(
            "auth.url or auth.jwt_secret must be set".to_string(),
        ));
    };

    let verifier = JwksVerifier::new(
        &url,
        config.anon_key.clone(),
        &config.audience,
        Duration::from_secs(config.jwks_ttl_secs),
    )
    .map_err(|e| ConfigError::Invalid(e.to_string()))?;
    tracing::info!(jwks_url = %verifier.jwks_url(), "verifying bearer tokens against JWKS");
    Ok(BoxTokenVerifier::new(verifier))
}

#[cfg(test)]
pub(crate) mod test_tokens {
    use jsonwebtoken::{EncodingKey, Header};
    use serde_json::{Value, json};

    pub const ISSUER: &str = "https://project.supabase.co";

    pub fn now() -> i64 {
        chrono::Utc::now().timestamp()
    }

    pub fn claims(sub: &str) -> Value {
        json!({
            "sub": sub,
            "aud": "authenticated",
            "iss": format!("{ISSUER}/auth/v1"),
            "iat": now(),
            "exp": now() + 3600,
            "email": "user@example.com",
            "role": "authenticated"
        })
    }

    pub fn sign(secret: &[u8], kid: Option<&str>, claims: &Value) -> String {
        let mut header = Header::new(jsonwebtoken::Algorithm::HS256);
        header.kid = kid.map(str::to_string);
        jsonwebtoken::encode(&header, claims, &EncodingKey::from_secret(secret)).unwrap()
    }
}
