//! JWKS-backed token verification with an in-process key cache.

use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;

use chorus_core::auth::{Claims, TokenVerifier};
use chorus_types::error::AuthError;

use super::decode_claims;

const FETCH_TIMEOUT: Duration = Duration::from_secs(5);

/// How long a failed refresh keeps serving the stale key set before the
/// next fetch is attempted.
const FAILED_REFRESH_BACKOFF: Duration = Duration::from_secs(30);

struct CachedKeys {
    keys: Arc<JwkSet>,
    fetched_at: Instant,
    failed_at: Option<Instant>,
}

impl CachedKeys {
    fn is_fresh(&self, ttl: Duration) -> bool {
        self.fetched_at.elapsed() < ttl
    }

    fn recently_failed(&self) -> bool {
        self.failed_at
            .is_some_and(|t| t.elapsed() < FAILED_REFRESH_BACKOFF)
    }
}

/// Verifies tokens signed by keys published at `{url}/auth/v1/.well-known/jwks.json`.
///
/// The key set is cached for `ttl`. A token whose `kid` is missing from a
/// fresh cache forces one refresh before it is rejected, so key rotation is
/// picked up without waiting for expiry. While the key endpoint is failing
/// the cached set is served and fetches are spaced by a fixed backoff.
pub struct JwksVerifier {
    client: reqwest::Client,
    jwks_url: String,
    issuer: String,
    anon_key: Option<String>,
    audience: String,
    ttl: Duration,
    algorithms: Vec<Algorithm>,
    cache: RwLock<Option<CachedKeys>>,
}

impl JwksVerifier {
    pub fn new(
        url: &str,
        anon_key: Option<String>,
        audience: &str,
        ttl: Duration,
    ) -> Result<Self, AuthError> {
        let client = reqwest::Client::builder()
            .timeout(FETCH_TIMEOUT)
            .build()
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))?;
        let issuer = url.trim_end_matches('/').to_string();

        Ok(Self {
            client,
            jwks_url: format!("{issuer}/auth/v1/.well-known/jwks.json"),
            issuer,
            anon_key: anon_key.filter(|k| !k.is_empty()),
            audience: audience.to_string(),
            ttl,
            algorithms: vec![Algorithm::RS256, Algorithm::ES256],
            cache: RwLock::new(None),
        })
    }

    /// Replace the accepted signing algorithms.
    pub fn with_algorithms(mut self, algorithms: Vec<Algorithm>) -> Self {
        self.algorithms = algorithms;
        self
    }

    pub fn jwks_url(&self) -> &str {
        &self.jwks_url
    }

    async fn fetch(&self) -> Result<JwkSet, AuthError> {
        let unauthenticated = self.client.get(&self.jwks_url).send().await;
        match unauthenticated {
            Ok(resp) if resp.status().is_success() => {
                return resp
                    .json::<JwkSet>()
                    .await
                    .map_err(|e| AuthError::KeysUnavailable(e.to_string()));
            }
            Ok(resp) => {
                tracing::debug!(status = %resp.status(), "JWKS fetch rejected without credentials");
            }
            Err(e) => {
                tracing::debug!(error = %e, "JWKS fetch failed without credentials");
            }
        }

        let Some(anon_key) = self.anon_key.as_deref() else {
            return Err(AuthError::KeysUnavailable(format!(
                "unable to fetch {}",
                self.jwks_url
            )));
        };

        let resp = self
            .client
            .get(&self.jwks_url)
            .header("apikey", anon_key)
            .bearer_auth(anon_key)
            .send()
            .await
            .and_then(reqwest::Response::error_for_status)
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))?;
        resp.json::<JwkSet>()
            .await
            .map_err(|e| AuthError::KeysUnavailable(e.to_string()))
    }

    /// Fetch the key set and replace the cache. A failed fetch falls back
    /// to whatever is cached, however old.
    ///
    /// `force` skips the freshness check (unknown `kid`); the failure
    /// backoff applies either way.
    async fn refresh(&self, force: bool) -> Result<Arc<JwkSet>, AuthError> {
        let mut cache = self.cache.write().await;

        // Another request may have refreshed, or failed to, while this one
        // waited for the lock.
        if let Some(cached) = cache.as_ref() {
            if cached.recently_failed() || (!force && cached.is_fresh(self.ttl)) {
                return Ok(Arc::clone(&cached.keys));
            }
        }

        match self.fetch().await {
            Ok(keys) => {
                let keys = Arc::new(keys);
                tracing::debug!(count = keys.keys.len(), "JWKS refreshed");
                *cache = Some(CachedKeys {
                    keys: Arc::clone(&keys),
                    fetched_at: Instant::now(),
                    failed_at: None,
                });
                Ok(keys)
            }
            Err(e) => match cache.as_mut() {
                Some(stale) => {
                    tracing::warn!(
                        error = %e,
                        retry_in_secs = FAILED_REFRESH_BACKOFF.as_secs(),
                        "JWKS refresh failed, using cached keys"
                    );
                    stale.failed_at = Some(Instant::now());
                    Ok(Arc::clone(&stale.keys))
                }
                None => Err(e),
            },
        }
    }

    async fn fresh_keys(&self) -> Option<Arc<JwkSet>> {
        let cache = self.cache.read().await;
        cache
            .as_ref()
            .filter(|c| c.is_fresh(self.ttl))
            .map(|c| Arc::clone(&c.keys))
    }

    async fn key_for(&self, kid: &str) -> Result<Jwk, AuthError> {
        let (keys, refreshed) = match self.fresh_keys().await {
            Some(keys) => (keys, false),
            None => (self.refresh(false).await?, true),
        };
        if let Some(jwk) = keys.find(kid) {
            return Ok(jwk.clone());
        }
        if !refreshed {
            tracing::debug!(kid, "unknown signing key, refreshing JWKS");
            if let Some(jwk) = self.refresh(true).await?.find(kid) {
                return Ok(jwk.clone());
            }
        }
        Err(AuthError::UnknownKey(kid.to_string()))
    }
}

impl TokenVerifier for JwksVerifier {
    async fn verify(&self, token: &str) -> Result<Claims, AuthError> {
        let header =
            jsonwebtoken::decode_header(token).map_err(|e| AuthError::InvalidToken(e.to_string()))?;
        let kid = header
            .kid
            .ok_or_else(|| AuthError::InvalidToken("missing kid".to_string()))?;
        if !self.algorithms.contains(&header.alg) {
            return Err(AuthError::InvalidToken(format!(
                "unsupported algorithm {:?}",
                header.alg
            )));
        }

        let jwk = self.key_for(&kid).await?;
        let key = DecodingKey::from_jwk(&jwk).map_err(|e| AuthError::InvalidToken(e.to_string()))?;

        decode_claims(token, &key, header.alg, &self.audience, Some(&self.issuer))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::test_tokens::{ISSUER, claims, now, sign};
    use axum::Router;
    use axum::extract::State;
    use axum::http::{HeaderMap, StatusCode};
    use axum::response::{IntoResponse, Response};
    use axum::routing::get;
    use serde_json::{Value, json};
    use std::sync::Mutex;
    use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};

    const SECRET: &[u8] = b"chorus-jwks-test-secret-0123456789";
    const SECRET_B64: &str = "Y2hvcnVzLWp3a3MtdGVzdC1zZWNyZXQtMDEyMzQ1Njc4OQ";

    #[derive(Clone)]
    struct KeyServer {
        kids: Arc<Mutex<Vec<&'static str>>>,
        hits: Arc<AtomicUsize>,
        require_anon_key: bool,
        failing: Arc<AtomicBool>,
    }

    fn jwk(kid: &str) -> Value {
        json!({"kty": "oct", "kid": kid, "alg": "HS256", "k": SECRET_B64})
    }

    async fn jwks(State(server): State<KeyServer>, headers: HeaderMap) -> Response {
        server.hits.fetch_add(1, Ordering::SeqCst);
        if server.failing.load(Ordering::SeqCst) {
            return StatusCode::SERVICE_UNAVAILABLE.into_response();
        }
        if server.require_anon_key && headers.get("apikey").is_none_or(|v| v != "anon") {
            return StatusCode::UNAUTHORIZED.into_response();
        }
        let keys: Vec<Value> = server.kids.lock().unwrap().iter().map(|k| jwk(k)).collect();
        axum::Json(json!({ "keys": keys })).into_response()
    }

    /// Serve a JWKS at the identity-provider path; returns the base URL.
    async fn serve(server: KeyServer) -> String {
        let router = Router::new()
            .route("/auth/v1/.well-known/jwks.json", get(jwks))
            .with_state(server);
        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        tokio::spawn(async move {
            axum::serve(listener, router).await.unwrap();
        });
        format!("http://{addr}")
    }

    fn key_server(kids: Vec<&'static str>) -> KeyServer {
        KeyServer {
            kids: Arc::new(Mutex::new(kids)),
            hits: Arc::new(AtomicUsize::new(0)),
            require_anon_key: false,
            failing: Arc::new(AtomicBool::new(false)),
        }
    }

    fn verifier(url: &str, anon_key: Option<&str>, ttl: Duration) -> JwksVerifier {
        JwksVerifier::new(url, anon_key.map(str::to_string), "authenticated", ttl)
            .unwrap()
            .with_algorithms(vec![Algorithm::HS256])
    }

    /// Claims issued by the local key server.
    fn local_claims(url: &str, sub: &str) -> Value {
        let mut c = claims(sub);
        c["iss"] = json!(format!("{url}/auth/v1"));
        c
    }

    #[tokio::test]
    async fn test_valid_token_and_cache_reuse() {
        let server = key_server(vec!["k1"]);
        let url = serve(server.clone()).await;
        let verifier = verifier(&url, None, Duration::from_secs(600));
        let sub = uuid::Uuid::now_v7().to_string();
        let token = sign(SECRET, Some("k1"), &local_claims(&url, &sub));

        let claims = verifier.verify(&token).await.unwrap();
        assert_eq!(claims.sub, sub);
        assert_eq!(claims.email.as_deref(), Some("user@example.com"));
        verifier.verify(&token).await.unwrap();
        assert_eq!(server.hits.load(Ordering::SeqCst), 1);
    }

    #[tokio::test]
    async fn test_rotated_key_triggers_one_refresh() {
        let server = key_server(vec!["k1"]);
        let url = serve(server.clone()).await;
        let verifier = verifier(&url, None, Duration::from_secs(600));
        let sub = uuid::Uuid::now_v7().to_string();

        verifier
            .verify(&sign(SECRET, Some("k1"), &local_claims(&url, &sub)))
            .await
            .unwrap();
        server.kids.lock().unwrap().push("k2");

        verifier
            .verify(&sign(SECRET, Some("k2"), &local_claims(&url, &sub)))
            .await
            .unwrap();
        assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_unknown_kid_rejected_after_refresh() {
        let server = key_server(vec!["k1"]);
        let url = serve(server.clone()).await;
        let verifier = verifier(&url, None, Duration::from_secs(600));
        let sub = uuid::Uuid::now_v7().to_string();

        verifier
            .verify(&sign(SECRET, Some("k1"), &local_claims(&url, &sub)))
            .await
            .unwrap();
        let err = verifier
            .verify(&sign(SECRET, Some("nope"), &local_claims(&url, &sub)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownKey(kid) if kid == "nope"));
        assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_expired_ttl_refetches() {
        let server = key_server(vec!["k1"]);
        let url = serve(server.clone()).await;
        let verifier = verifier(&url, None, Duration::ZERO);
        let token = sign(SECRET, Some("k1"), &local_claims(&url, &uuid::Uuid::now_v7().to_string()));

        verifier.verify(&token).await.unwrap();
        verifier.verify(&token).await.unwrap();
        assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_outage_serves_stale_keys_without_refetching() {
        let server = key_server(vec!["k1"]);
        let url = serve(server.clone()).await;
        let verifier = verifier(&url, None, Duration::ZERO);
        let sub = uuid::Uuid::now_v7().to_string();
        let token = sign(SECRET, Some("k1"), &local_claims(&url, &sub));

        verifier.verify(&token).await.unwrap();
        server.failing.store(true, Ordering::SeqCst);

        verifier.verify(&token).await.unwrap();
        assert_eq!(server.hits.load(Ordering::SeqCst), 2);

        verifier.verify(&token).await.unwrap();
        verifier.verify(&token).await.unwrap();
        let err = verifier
            .verify(&sign(SECRET, Some("k2"), &local_claims(&url, &sub)))
            .await
            .unwrap_err();
        assert!(matches!(err, AuthError::UnknownKey(_)));
        assert_eq!(server.hits.load(Ordering::SeqCst), 2);
    }

    #[tokio::test]
    async fn test_anon_key_fallback() {
        let mut server = key_server(vec!["k1"]);
        server.require_anon_key = true;
        let url = serve(server.clone()).await;
        let token = sign(SECRET, Some("k1"), &local_claims(&url, &uuid::Uuid::now_v7().to_string()));

        let without_key = verifier(&url, None, Duration::from_secs(600));
        assert!(matches!(
            without_key.verify(&token).await,
            Err(AuthError::KeysUnavailable(_))
        ));

        let with_key = verifier(&url, Some("anon"), Duration::from_secs(600));
        with_key.verify(&token).await.unwrap();
    }

    #[tokio::test]
    async fn test_rejects_bad_claims() {
        let server = key_server(vec!["k1"]);
        let url = serve(server.clone()).await;
        let verifier = verifier(&url, None, Duration::from_secs(600));
        let sub = uuid::Uuid::now_v7().to_string();

        let mut expired = local_claims(&url, &sub);
        expired["exp"] = json!(now() - 3600);
        assert!(matches!(
            verifier.verify(&sign(SECRET, Some("k1"), &expired)).await,
            Err(AuthError::Expired)
        ));

        let mut wrong_audience = local_claims(&url, &sub);
        wrong_audience["aud"] = json!("anon");
        assert!(matches!(
            verifier.verify(&sign(SECRET, Some("k1"), &wrong_audience)).await,
            Err(AuthError::InvalidToken(_))
        ));

        let foreign_issuer = claims(&sub);
        assert_eq!(foreign_issuer["iss"], json!(format!("{ISSUER}/auth/v1")));
        assert!(matches!(
            verifier.verify(&sign(SECRET, Some("k1"), &foreign_issuer)).await,
            Err(AuthError::InvalidToken(m)) if m == "issuer mismatch"
        ));

        let mut no_iat = local_claims(&url, &sub);
        no_iat.as_object_mut().unwrap().remove("iat");
        assert!(matches!(
            verifier.verify(&sign(SECRET, Some("k1"), &no_iat)).await,
            Err(AuthError::InvalidToken(_))
        ));

        assert!(matches!(
            verifier.verify(&sign(SECRET, None, &local_claims(&url, &sub))).await,
            Err(AuthError::InvalidToken(m)) if m == "missing kid"
        ));
        assert!(matches!(
            verifier.verify("not-a-jwt").await,
            Err(AuthError::InvalidToken(_))
        ));
    }

    #[tokio::test]
    async fn test_default_algorithms_reject_hs256() {
        let server = key_server(vec!["k1"]);
        let url = serve(server.clone()).await;
        let verifier = JwksVerifier::new(&url, None, "authenticated", Duration::from_secs(600)).unwrap();
        let token = sign(SECRET, Some("k1"), &local_claims(&url, &uuid::Uuid::now_v7().to_string()));

        assert!(matches!(
            verifier.verify(&token).await,
            Err(AuthError::InvalidToken(_))
        ));
        assert_eq!(server.hits.load(Ordering::SeqCst), 0);
    }
}
