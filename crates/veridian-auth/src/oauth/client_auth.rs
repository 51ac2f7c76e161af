//! Client authentication.
//!
//! One operation: identify and authenticate the calling client across the
//! seven registered methods. Identification collects every claimed client
//! id — the form `client_id`, the Basic username and the unverified `iss`
//! of a client assertion — and requires them to agree. Authentication then
//! dispatches on the client's registered method; any failure surfaces as
//! `invalid_client`.

use bcrypt::verify as bcrypt_verify;

use crate::AuthResult;
use crate::config::Configuration;
use crate::context::HttpRequestInfo;
use crate::error::OAuthError;
use crate::oauth::client_assertion::{
    JWT_BEARER_ASSERTION_TYPE, extract_unverified_issuer, validate_client_secret_jwt,
    validate_private_key_jwt,
};
use crate::oauth::jwks_cache::ClientJwksCache;
use crate::oauth::mtls::{authenticate_self_signed_tls_client, authenticate_tls_client};
use crate::storage::ClientStore;
use crate::types::{AuthMethod, Client};

/// Credentials extracted from the request body.
#[derive(Debug, Clone, Default)]
pub struct ClientCredentials {
    /// Form `client_id`.
    pub client_id: Option<String>,

    /// Form `client_secret`.
    pub client_secret: Option<String>,

    /// Form `client_assertion`.
    pub client_assertion: Option<String>,

    /// Form `client_assertion_type`.
    pub client_assertion_type: Option<String>,
}

/// Authenticates the calling client.
///
/// # Errors
///
/// Returns `invalid_client` when identification is ambiguous, the client is
/// unknown, its method is not enabled, or its credentials do not verify.
pub async fn authenticate_client(
    credentials: &ClientCredentials,
    request: &HttpRequestInfo,
    config: &Configuration,
    clients: &dyn ClientStore,
    jwks_cache: &ClientJwksCache,
) -> AuthResult<Client> {
    let client_id = discover_client_id(credentials, request)?;

    let client = clients
        .get(&client_id)
        .await?
        .ok_or_else(|| OAuthError::invalid_client("Unknown client"))?;

    let method = client.meta.token_endpoint_auth_method;
    if !config.is_authn_method_enabled(method) {
        return Err(OAuthError::invalid_client(format!(
            "Authentication method {method} is not enabled"
        )));
    }

    match method {
        AuthMethod::None => authenticate_none(&client, credentials, request),
        AuthMethod::ClientSecretBasic => authenticate_secret_basic(&client, request),
        AuthMethod::ClientSecretPost => authenticate_secret_post(&client, credentials),
        AuthMethod::PrivateKeyJwt => {
            let assertion = require_assertion(credentials)?;
            validate_private_key_jwt(assertion, &client, config, jwks_cache).await?;
            Ok(client)
        }
        AuthMethod::ClientSecretJwt => {
            let assertion = require_assertion(credentials)?;
            validate_client_secret_jwt(assertion, &client, config)?;
            Ok(client)
        }
        AuthMethod::TlsClientAuth => {
            let certificate = require_certificate(request)?;
            authenticate_tls_client(&client, certificate)?;
            Ok(client)
        }
        AuthMethod::SelfSignedTlsClientAuth => {
            let certificate = require_certificate(request)?;
            let jwks = jwks_cache.jwks_for_client(&client).await?;
            authenticate_self_signed_tls_client(&client, certificate, &jwks)?;
            Ok(client)
        }
    }
}

/// Collects every claimed client id and requires agreement.
fn discover_client_id(
    credentials: &ClientCredentials,
    request: &HttpRequestInfo,
) -> AuthResult<String> {
    let mut candidates: Vec<String> = Vec::new();

    if let Some(id) = &credentials.client_id {
        candidates.push(id.clone());
    }
    if let Some((basic_user, _)) = request.basic_credentials() {
        candidates.push(basic_user);
    }
    if let Some(assertion) = &credentials.client_assertion {
        candidates.push(extract_unverified_issuer(assertion)?);
    }

    let mut iter = candidates.into_iter();
    let first = iter
        .next()
        .filter(|id| !id.is_empty())
        .ok_or_else(|| OAuthError::invalid_client("No client identification provided"))?;

    for other in iter {
        if other != first {
            return Err(OAuthError::invalid_client(
                "Conflicting client identification",
            ));
        }
    }

    Ok(first)
}

fn authenticate_none(
    client: &Client,
    credentials: &ClientCredentials,
    request: &HttpRequestInfo,
) -> AuthResult<Client> {
    // Public clients must not present a secret through any channel.
    if credentials.client_secret.is_some() || request.basic_credentials().is_some() {
        return Err(OAuthError::invalid_client(
            "Public clients must not send a secret",
        ));
    }
    Ok(client.clone())
}

fn authenticate_secret_basic(client: &Client, request: &HttpRequestInfo) -> AuthResult<Client> {
    let (_, secret) = request
        .basic_credentials()
        .ok_or_else(|| OAuthError::invalid_client("Missing Basic credentials"))?;
    verify_secret(client, &secret)?;
    Ok(client.clone())
}

fn authenticate_secret_post(
    client: &Client,
    credentials: &ClientCredentials,
) -> AuthResult<Client> {
    let secret = credentials
        .client_secret
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_client("Missing client_secret"))?;
    verify_secret(client, secret)?;
    Ok(client.clone())
}

fn verify_secret(client: &Client, presented: &str) -> AuthResult<()> {
    let hashed = client
        .hashed_secret
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_client("Client has no secret registered"))?;

    match bcrypt_verify(presented, hashed) {
        Ok(true) => Ok(()),
        Ok(false) => Err(OAuthError::invalid_client("Invalid client secret")),
        Err(_) => Err(OAuthError::invalid_client("Invalid client secret")),
    }
}

fn require_assertion(credentials: &ClientCredentials) -> AuthResult<&str> {
    match credentials.client_assertion_type.as_deref() {
        Some(JWT_BEARER_ASSERTION_TYPE) => {}
        Some(other) => {
            return Err(OAuthError::invalid_client(format!(
                "Unsupported client_assertion_type: {other}"
            )));
        }
        None => {
            return Err(OAuthError::invalid_client(
                "Missing client_assertion_type",
            ));
        }
    }
    credentials
        .client_assertion
        .as_deref()
        .ok_or_else(|| OAuthError::invalid_client("Missing client_assertion"))
}

fn require_certificate(request: &HttpRequestInfo) -> AuthResult<&crate::oauth::mtls::ClientCertificate> {
    request
        .client_certificate
        .as_ref()
        .ok_or_else(|| OAuthError::invalid_client("No client certificate presented"))
}

#[cfg(test)]
mod tests {
    use super::*;
    use std::collections::HashMap;
    use std::sync::RwLock;

    use async_trait::async_trait;
    use base64::Engine;
    use base64::engine::general_purpose::STANDARD;
    use jsonwebtoken::Algorithm;

    use crate::jose::{ServerKeySet, SigningKey};
    use crate::types::ClientMetaInfo;

    struct MockClientStore {
        clients: RwLock<HashMap<String, Client>>,
    }

    impl MockClientStore {
        fn new() -> Self {
            Self {
                clients: RwLock::new(HashMap::new()),
            }
        }

        fn add(&self, client: Client) {
            self.clients
                .write()
                .unwrap()
                .insert(client.id.clone(), client);
        }
    }

    #[async_trait]
    impl ClientStore for MockClientStore {
        async fn save(&self, client: &Client) -> AuthResult<()> {
            self.add(client.clone());
            Ok(())
        }

        async fn get(&self, client_id: &str) -> AuthResult<Option<Client>> {
            Ok(self.clients.read().unwrap().get(client_id).cloned())
        }

        async fn delete(&self, client_id: &str) -> AuthResult<()> {
            self.clients.write().unwrap().remove(client_id);
            Ok(())
        }
    }

    fn config() -> Configuration {
        let keys = ServerKeySet::new()
            .with_signing_key(SigningKey::generate_rsa("sig-1", Algorithm::RS256).unwrap());
        Configuration::new("https://server.example.com", keys).with_client_authn_methods(vec![
            AuthMethod::None,
            AuthMethod::ClientSecretBasic,
            AuthMethod::ClientSecretPost,
            AuthMethod::ClientSecretJwt,
            AuthMethod::PrivateKeyJwt,
            AuthMethod::TlsClientAuth,
        ])
    }

    fn secret_client(method: AuthMethod, secret: &str) -> Client {
        Client {
            id: "cid1".to_string(),
            hashed_secret: Some(bcrypt::hash(secret, 4).unwrap()),
            secret: None,
            hashed_registration_access_token: None,
            meta: ClientMetaInfo {
                token_endpoint_auth_method: method,
                ..ClientMetaInfo::default()
            },
        }
    }

    fn public_client() -> Client {
        Client {
            id: "pub1".to_string(),
            hashed_secret: None,
            secret: None,
            hashed_registration_access_token: None,
            meta: ClientMetaInfo {
                token_endpoint_auth_method: AuthMethod::None,
                ..ClientMetaInfo::default()
            },
        }
    }

    fn request() -> HttpRequestInfo {
        HttpRequestInfo::new("POST", "https://server.example.com/token")
    }

    fn basic_header(id: &str, secret: &str) -> String {
        format!("Basic {}", STANDARD.encode(format!("{id}:{secret}")))
    }

    #[tokio::test]
    async fn test_secret_post() {
        let store = MockClientStore::new();
        store.add(secret_client(AuthMethod::ClientSecretPost, "s3cret"));
        let cache = ClientJwksCache::with_defaults();

        let credentials = ClientCredentials {
            client_id: Some("cid1".to_string()),
            client_secret: Some("s3cret".to_string()),
            ..ClientCredentials::default()
        };

        let client = authenticate_client(&credentials, &request(), &config(), &store, &cache)
            .await
            .unwrap();
        assert_eq!(client.id, "cid1");
    }

    #[tokio::test]
    async fn test_secret_post_wrong_secret() {
        let store = MockClientStore::new();
        store.add(secret_client(AuthMethod::ClientSecretPost, "s3cret"));
        let cache = ClientJwksCache::with_defaults();

        let credentials = ClientCredentials {
            client_id: Some("cid1".to_string()),
            client_secret: Some("wrong".to_string()),
            ..ClientCredentials::default()
        };

        let result = authenticate_client(&credentials, &request(), &config(), &store, &cache).await;
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[tokio::test]
    async fn test_secret_basic() {
        let store = MockClientStore::new();
        store.add(secret_client(AuthMethod::ClientSecretBasic, "s3cret"));
        let cache = ClientJwksCache::with_defaults();

        let request = request().with_authorization(basic_header("cid1", "s3cret"));
        let client = authenticate_client(
            &ClientCredentials::default(),
            &request,
            &config(),
            &store,
            &cache,
        )
        .await
        .unwrap();
        assert_eq!(client.id, "cid1");
    }

    #[tokio::test]
    async fn test_conflicting_identification_rejected() {
        let store = MockClientStore::new();
        store.add(secret_client(AuthMethod::ClientSecretBasic, "s3cret"));
        let cache = ClientJwksCache::with_defaults();

        let credentials = ClientCredentials {
            client_id: Some("someone-else".to_string()),
            ..ClientCredentials::default()
        };
        let request = request().with_authorization(basic_header("cid1", "s3cret"));

        let result = authenticate_client(&credentials, &request, &config(), &store, &cache).await;
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[tokio::test]
    async fn test_public_client() {
        let store = MockClientStore::new();
        store.add(public_client());
        let cache = ClientJwksCache::with_defaults();

        let credentials = ClientCredentials {
            client_id: Some("pub1".to_string()),
            ..ClientCredentials::default()
        };

        let client = authenticate_client(&credentials, &request(), &config(), &store, &cache)
            .await
            .unwrap();
        assert_eq!(client.id, "pub1");
    }

    #[tokio::test]
    async fn test_public_client_with_secret_rejected() {
        let store = MockClientStore::new();
        store.add(public_client());
        let cache = ClientJwksCache::with_defaults();

        let credentials = ClientCredentials {
            client_id: Some("pub1".to_string()),
            client_secret: Some("anything".to_string()),
            ..ClientCredentials::default()
        };

        let result = authenticate_client(&credentials, &request(), &config(), &store, &cache).await;
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[tokio::test]
    async fn test_unknown_client() {
        let store = MockClientStore::new();
        let cache = ClientJwksCache::with_defaults();

        let credentials = ClientCredentials {
            client_id: Some("ghost".to_string()),
            ..ClientCredentials::default()
        };

        let result = authenticate_client(&credentials, &request(), &config(), &store, &cache).await;
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[tokio::test]
    async fn test_disabled_method_rejected() {
        let store = MockClientStore::new();
        store.add(secret_client(AuthMethod::ClientSecretPost, "s3cret"));
        let cache = ClientJwksCache::with_defaults();

        let keys = ServerKeySet::new()
            .with_signing_key(SigningKey::generate_rsa("sig-1", Algorithm::RS256).unwrap());
        let config = Configuration::new("https://server.example.com", keys)
            .with_client_authn_methods(vec![AuthMethod::PrivateKeyJwt]);

        let credentials = ClientCredentials {
            client_id: Some("cid1".to_string()),
            client_secret: Some("s3cret".to_string()),
            ..ClientCredentials::default()
        };

        let result = authenticate_client(&credentials, &request(), &config, &store, &cache).await;
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[tokio::test]
    async fn test_client_secret_jwt() {
        use jsonwebtoken::{EncodingKey, Header};
        use time::OffsetDateTime;

        let store = MockClientStore::new();
        let mut client = secret_client(AuthMethod::ClientSecretJwt, "unused");
        client.secret = Some("shared-hmac-secret".to_string());
        store.add(client);
        let cache = ClientJwksCache::with_defaults();

        let now = OffsetDateTime::now_utc().unix_timestamp();
        let assertion = jsonwebtoken::encode(
            &Header::new(Algorithm::HS256),
            &serde_json::json!({
                "iss": "cid1",
                "sub": "cid1",
                "aud": "https://server.example.com/token",
                "exp": now + 60,
                "iat": now,
            }),
            &EncodingKey::from_secret(b"shared-hmac-secret"),
        )
        .unwrap();

        let credentials = ClientCredentials {
            client_assertion: Some(assertion),
            client_assertion_type: Some(JWT_BEARER_ASSERTION_TYPE.to_string()),
            ..ClientCredentials::default()
        };

        let client = authenticate_client(&credentials, &request(), &config(), &store, &cache)
            .await
            .unwrap();
        assert_eq!(client.id, "cid1");
    }

    #[tokio::test]
    async fn test_wrong_assertion_type_rejected() {
        let store = MockClientStore::new();
        store.add(secret_client(AuthMethod::PrivateKeyJwt, "unused"));
        let cache = ClientJwksCache::with_defaults();

        let credentials = ClientCredentials {
            client_id: Some("cid1".to_string()),
            client_assertion: Some("x.y.z".to_string()),
            client_assertion_type: Some("urn:example:wrong".to_string()),
            ..ClientCredentials::default()
        };

        let result = authenticate_client(&credentials, &request(), &config(), &store, &cache).await;
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }

    #[tokio::test]
    async fn test_tls_client_auth() {
        use crate::oauth::mtls::ClientCertificate;

        let store = MockClientStore::new();
        let mut client = secret_client(AuthMethod::TlsClientAuth, "unused");
        client.hashed_secret = None;
        client.meta.tls_client_auth_san_dns = Some("client.example.com".to_string());
        store.add(client);
        let cache = ClientJwksCache::with_defaults();

        let credentials = ClientCredentials {
            client_id: Some("cid1".to_string()),
            ..ClientCredentials::default()
        };
        let request = request().with_client_certificate(ClientCertificate {
            subject_dn: "CN=client.example.com".to_string(),
            san_dns: vec!["client.example.com".to_string()],
            san_ip: vec![],
            der: b"der".to_vec(),
        });

        let client = authenticate_client(&credentials, &request, &config(), &store, &cache)
            .await
            .unwrap();
        assert_eq!(client.id, "cid1");

        // Same client without a certificate fails.
        let result = authenticate_client(
            &credentials,
            &self::request(),
            &config(),
            &store,
            &cache,
        )
        .await;
        assert!(matches!(result, Err(OAuthError::InvalidClient { .. })));
    }
}
