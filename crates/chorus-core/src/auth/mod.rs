//! Bearer token verification port.
//!
//! `TokenVerifier` is implemented in chorus-infra (JWKS and shared-secret
//! verifiers). `BoxTokenVerifier` erases the concrete type for the HTTP
//! layer, following the same blanket-impl pattern as `BoxLlmProvider`.

use std::future::Future;
use std::pin::Pin;

use chorus_types::error::AuthError;
use serde::{Deserialize, Serialize};
use uuid::Uuid;

/// Claims the service relies on after signature and audience checks.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Claims {
    pub sub: String,
    pub exp: i64,
    pub iat: i64,
    #[serde(default)]
    pub iss: Option<String>,
    #[serde(default)]
    pub email: Option<String>,
    #[serde(default)]
    pub role: Option<String>,
}

impl Claims {
    /// The subject as a profile id.
    pub fn user_id(&self) -> Result<Uuid, AuthError> {
        Uuid::parse_str(&self.sub).map_err(|_| AuthError::MalformedSubject(self.sub.clone()))
    }
}

/// Verifies a raw bearer token and returns its claims.
pub trait TokenVerifier: Send + Sync {
    fn verify(&self, token: &str) -> impl Future<Output = Result<Claims, AuthError>> + Send;
}

/// Object-safe version of [`TokenVerifier`].
pub trait TokenVerifierDyn: Send + Sync {
    fn verify_boxed<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Claims, AuthError>> + Send + 'a>>;
}

impl<T: TokenVerifier> TokenVerifierDyn for T {
    fn verify_boxed<'a>(
        &'a self,
        token: &'a str,
    ) -> Pin<Box<dyn Future<Output = Result<Claims, AuthError>> + Send + 'a>> {
        Box::pin(self.verify(token))
    }
}

/// Type-erased token verifier selected at startup.
pub struct BoxTokenVerifier {
    inner: Box<dyn TokenVerifierDyn>,
}

impl BoxTokenVerifier {
    pub fn new<T: TokenVerifier + 'static>(verifier: T) -> Self {
        Self {
            inner: Box::new(verifier),
        }
    }

    pub async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        self.inner.verify_boxed(token).await
    }
}
