//! HS256 verification with a shared project secret.

use jsonwebtoken::{Algorithm, DecodingKey};

use chorus_core::auth::{Claims, TokenVerifier};
use chorus_types::error::AuthError;

use super::decode_claims;

/// Verifies HS256 tokens signed with a shared secret.
///
/// Does not derive Debug; the decoding key holds the secret.
pub struct SharedSecretVerifier {
    key: DecodingKey,
    audience: String,
    issuer: Option<String>,
}

impl SharedSecretVerifier {
    pub fn new(secret: &str, audience: &str, issuer: Option<String>) -> Self {
        Self {
            key: DecodingKey::from_secret(secret.as_bytes()),
            audience: audience.to_string(),
            issuer,
        }
    }
}

impl TokenVerifier for SharedSecretVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header =
            jsonwebtoken::decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        if header.alg != Algorithm::HS256 {
            return Err(AuthError::InvalidToken(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }
        decode_claims(
            token,
            &self.key,
            Algorithm::HS256,
            &self.audience,
            self.issuer.as_deref(),
        )
    }
}
