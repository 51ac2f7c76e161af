//! Client JWKS resolution and caching.
//!
//! Clients publish their public keys either inline in their registration or
//! through a `jwks_uri`. Remote sets are fetched over HTTPS with a timeout
//! and cached in memory with a TTL; a stale cache entry is refreshed on the
//! next lookup.

use std::collections::HashMap;
use std::sync::Arc;
use std::time::{Duration, Instant};

use jsonwebtoken::jwk::{AlgorithmParameters, Jwk, JwkSet};
use jsonwebtoken::{Algorithm, DecodingKey};
use tokio::sync::RwLock;

use crate::AuthResult;
use crate::error::OAuthError;
use crate::types::Client;

/// Configuration for the JWKS cache.
#[derive(Debug, Clone)]
pub struct JwksCacheConfig {
    /// Time-to-live for cached sets.
    pub ttl: Duration,

    /// HTTP request timeout.
    pub request_timeout: Duration,

    /// Maximum response size in bytes.
    pub max_response_size: usize,
}

impl Default for JwksCacheConfig {
    fn default() -> Self {
        Self {
            ttl: Duration::from_secs(3600),
            request_timeout: Duration::from_secs(10),
            max_response_size: 1024 * 1024,
        }
    }
}

struct CachedJwks {
    jwks: JwkSet,
    fetched_at: Instant,
}

/// In-memory cache of client JWKS, keyed by URI.
pub struct ClientJwksCache {
    cache: Arc<RwLock<HashMap<String, CachedJwks>>>,
    config: JwksCacheConfig,
}

impl ClientJwksCache {
    /// Creates a cache with the given configuration.
    #[must_use]
    pub fn new(config: JwksCacheConfig) -> Self {
        Self {
            cache: Arc::new(RwLock::new(HashMap::new())),
            config,
        }
    }

    /// Creates a cache with default configuration.
    #[must_use]
    pub fn with_defaults() -> Self {
        Self::new(JwksCacheConfig::default())
    }

    /// Resolves the full JWKS of a client: the inline set when registered,
    /// otherwise the (cached) remote set.
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` when the client has no keys or the remote
    /// fetch fails.
    pub async fn jwks_for_client(&self, client: &Client) -> AuthResult<JwkSet> {
        if let Some(jwks) = &client.meta.jwks {
            return Ok(jwks.clone());
        }
        if let Some(uri) = &client.meta.jwks_uri {
            return self.fetch_cached(uri).await;
        }
        Err(OAuthError::invalid_client(
            "Client has no jwks or jwks_uri registered",
        ))
    }

    /// Resolves a verification key from a client's JWKS.
    ///
    /// When `kid` is given the key must carry it; otherwise the first key
    /// compatible with one of the accepted algorithms wins.
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` when no suitable key exists.
    pub async fn decoding_key_for_client(
        &self,
        client: &Client,
        kid: Option<&str>,
        algorithms: &[Algorithm],
    ) -> AuthResult<DecodingKey> {
        let jwks = self.jwks_for_client(client).await?;
        let key = find_key(&jwks, kid, algorithms).ok_or_else(|| match kid {
            Some(kid) => OAuthError::invalid_client(format!("Key '{kid}' not found in client JWKS")),
            None => OAuthError::invalid_client("No suitable key found in client JWKS"),
        })?;

        DecodingKey::from_jwk(key)
            .map_err(|e| OAuthError::invalid_client(format!("Unusable client JWK: {e}")))
    }

    async fn fetch_cached(&self, uri: &str) -> AuthResult<JwkSet> {
        {
            let cache = self.cache.read().await;
            if let Some(cached) = cache.get(uri) {
                if cached.fetched_at.elapsed() < self.config.ttl {
                    return Ok(cached.jwks.clone());
                }
            }
        }

        let jwks = self.fetch(uri).await?;

        let mut cache = self.cache.write().await;
        cache.insert(
            uri.to_string(),
            CachedJwks {
                jwks: jwks.clone(),
                fetched_at: Instant::now(),
            },
        );
        Ok(jwks)
    }

    async fn fetch(&self, uri: &str) -> AuthResult<JwkSet> {
        if !uri.starts_with("https://") {
            return Err(OAuthError::invalid_client("jwks_uri must use HTTPS"));
        }

        let client = reqwest::Client::builder()
            .timeout(self.config.request_timeout)
            .build()
            .map_err(|e| OAuthError::server_error(format!("HTTP client build failed: {e}")))?;

        let response = client
            .get(uri)
            .header("Accept", "application/json")
            .send()
            .await
            .map_err(|e| {
                tracing::warn!(uri, error = %e, "JWKS fetch failed");
                OAuthError::invalid_client("Could not fetch client JWKS")
            })?;

        if !response.status().is_success() {
            return Err(OAuthError::invalid_client(format!(
                "JWKS fetch returned status {}",
                response.status()
            )));
        }

        if let Some(len) = response.content_length() {
            if len as usize > self.config.max_response_size {
                return Err(OAuthError::invalid_client("JWKS response exceeds size limit"));
            }
        }

        response
            .json::<JwkSet>()
            .await
            .map_err(|e| OAuthError::invalid_client(format!("Invalid JWKS document: {e}")))
    }
}

/// Finds a key in a set by kid, falling back to algorithm-family match.
#[must_use]
pub fn find_key<'a>(jwks: &'a JwkSet, kid: Option<&str>, algorithms: &[Algorithm]) -> Option<&'a Jwk> {
    match kid {
        Some(kid) => jwks
            .keys
            .iter()
            .find(|k| k.common.key_id.as_deref() == Some(kid)),
        None => jwks
            .keys
            .iter()
            .find(|k| algorithms.iter().any(|alg| key_supports(k, *alg))),
    }
}

fn key_supports(key: &Jwk, algorithm: Algorithm) -> bool {
    match (&key.algorithm, algorithm) {
        (
            AlgorithmParameters::RSA(_),
            Algorithm::RS256
            | Algorithm::RS384
            | Algorithm::RS512
            | Algorithm::PS256
            | Algorithm::PS384
            | Algorithm::PS512,
        ) => true,
        (AlgorithmParameters::EllipticCurve(_), Algorithm::ES256 | Algorithm::ES384) => true,
        (AlgorithmParameters::OctetKeyPair(_), Algorithm::EdDSA) => true,
        _ => false,
    }
}
