//! Shared fixtures for the end-to-end suites: a server over the in-memory
//! stores, registered clients, auto-approving and interactive policies,
//! and a DPoP proof generator.
//!
//! Each suite uses a different slice of these fixtures.
#![allow(dead_code)]

use std::collections::HashMap;
use std::sync::Arc;

use async_trait::async_trait;
use base64::Engine;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use jsonwebtoken::Algorithm;

use veridian_auth::config::Configuration;
use veridian_auth::jose::{ServerKeySet, SigningKey};
use veridian_auth::oauth::{AuthnPolicy, CallbackRequest, PolicyOutcome};
use veridian_auth::server::AuthServer;
use veridian_auth::session::AuthnSession;
use veridian_auth::types::{
    AuthMethod, Client, ClientMetaInfo, GrantType, ResponseType, Scope,
};
use veridian_auth_memory::{MemoryAuthnSessionStore, MemoryClientStore, MemoryGrantSessionStore};

pub const ISSUER: &str = "https://server.example.com";
pub const CLIENT_SECRET: &str = "test-client-secret";

/// A fixed PKCE verifier shared across the code-flow tests.
pub const PKCE_VERIFIER: &str =
    "4ea556349fa98a54a1dd0e2ef7bd4ed8ab93c4fe99d7a1f36787169fa9fa98";

/// The server plus handles on its stores for white-box assertions.
pub struct TestHarness {
    pub server: AuthServer,
    pub clients: Arc<MemoryClientStore>,
    pub authn_sessions: Arc<MemoryAuthnSessionStore>,
    pub grant_sessions: Arc<MemoryGrantSessionStore>,
}

/// Builds a harness with the standard fixtures and a configurable setup.
pub fn harness(configure: impl FnOnce(Configuration) -> Configuration) -> TestHarness {
    let keys = ServerKeySet::new()
        .with_signing_key(SigningKey::generate_rsa("sig-1", Algorithm::RS256).unwrap());

    let mut config = Configuration::new(ISSUER, keys).with_scopes(vec![
        Scope::simple("openid"),
        Scope::simple("profile"),
        Scope::simple("scope1"),
        Scope::simple("offline_access"),
    ]);
    config.lifetimes.access_token = std::time::Duration::from_secs(60);
    let config = configure(config);

    let clients = Arc::new(MemoryClientStore::with_clients(vec![
        confidential_client(),
        code_client(),
    ]));
    let authn_sessions = Arc::new(MemoryAuthnSessionStore::new());
    let grant_sessions = Arc::new(MemoryGrantSessionStore::new());

    let server = AuthServer::new(
        config,
        clients.clone(),
        authn_sessions.clone(),
        grant_sessions.clone(),
    );

    TestHarness {
        server,
        clients,
        authn_sessions,
        grant_sessions,
    }
}

/// `cid1`: confidential, client_secret_post, machine scopes.
pub fn confidential_client() -> Client {
    Client {
        id: "cid1".to_string(),
        hashed_secret: Some(bcrypt::hash(CLIENT_SECRET, 4).unwrap()),
        secret: None,
        hashed_registration_access_token: None,
        meta: ClientMetaInfo {
            token_endpoint_auth_method: AuthMethod::ClientSecretPost,
            grant_types: vec![GrantType::ClientCredentials],
            scope: "scope1 openid".to_string(),
            ..ClientMetaInfo::default()
        },
    }
}

/// `web1`: confidential web client running the code flow.
pub fn code_client() -> Client {
    Client {
        id: "web1".to_string(),
        hashed_secret: Some(bcrypt::hash(CLIENT_SECRET, 4).unwrap()),
        secret: None,
        hashed_registration_access_token: None,
        meta: ClientMetaInfo {
            token_endpoint_auth_method: AuthMethod::ClientSecretPost,
            grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
            response_types: vec![ResponseType::Code],
            redirect_uris: vec!["https://app.example.com/cb".to_string()],
            scope: "openid profile offline_access".to_string(),
            ..ClientMetaInfo::default()
        },
    }
}

/// Approves every request as `user-7`, granting the requested scopes.
pub struct AutoApprovePolicy;

#[async_trait]
impl AuthnPolicy for AutoApprovePolicy {
    fn id(&self) -> &str {
        "auto-approve"
    }

    fn set_up(&self, _client: &Client, _session: &mut AuthnSession) -> bool {
        true
    }

    async fn authenticate(
        &self,
        session: &mut AuthnSession,
        _request: &CallbackRequest,
    ) -> PolicyOutcome {
        session.set_subject("user-7");
        session.grant_requested_scopes();
        session.grant_requested_authorization_details();
        PolicyOutcome::Success
    }
}

/// Renders a login form first; the callback must post a `username`. The
/// callback id is embedded in the form so tests can extract it.
pub struct LoginFormPolicy;

#[async_trait]
impl AuthnPolicy for LoginFormPolicy {
    fn id(&self) -> &str {
        "login-form"
    }

    fn set_up(&self, _client: &Client, session: &mut AuthnSession) -> bool {
        session.step = Some("credentials".to_string());
        true
    }

    async fn authenticate(
        &self,
        session: &mut AuthnSession,
        request: &CallbackRequest,
    ) -> PolicyOutcome {
        match request.field("username") {
            Some(username) if !username.is_empty() => {
                session.set_subject(username);
                session.grant_requested_scopes();
                PolicyOutcome::Success
            }
            Some(_) => PolicyOutcome::Failure {
                description: "empty username".to_string(),
            },
            None => PolicyOutcome::InProgress(format!(
                "<form action=\"/authorize/{}\" method=\"post\"></form>",
                session.callback_id.as_deref().unwrap_or_default()
            )),
        }
    }
}

/// An ES256 proof key usable across requests.
pub struct DpopKey {
    encoding_key: jsonwebtoken::EncodingKey,
    pub jwk: jsonwebtoken::jwk::Jwk,
}

impl DpopKey {
    pub fn generate() -> Self {
        use p256::pkcs8::EncodePrivateKey;
        use rand::rngs::OsRng;

        let secret = p256::SecretKey::random(&mut OsRng);
        let signing = p256::ecdsa::SigningKey::from(&secret);
        let point = signing.verifying_key().to_encoded_point(false);

        let pem = secret.to_pkcs8_pem(rsa::pkcs8::LineEnding::LF).unwrap();
        let encoding_key = jsonwebtoken::EncodingKey::from_ec_pem(pem.as_bytes()).unwrap();

        let jwk: jsonwebtoken::jwk::Jwk = serde_json::from_value(serde_json::json!({
            "kty": "EC",
            "crv": "P-256",
            "x": URL_SAFE_NO_PAD.encode(point.x().unwrap()),
            "y": URL_SAFE_NO_PAD.encode(point.y().unwrap()),
        }))
        .unwrap();

        Self { encoding_key, jwk }
    }

    pub fn thumbprint(&self) -> String {
        veridian_auth::jose::jwk_thumbprint_sha256(&self.jwk).unwrap()
    }

    /// Builds a proof for a request, optionally covering an access token.
    pub fn proof(&self, htm: &str, htu: &str, access_token: Option<&str>) -> String {
        let mut header = jsonwebtoken::Header::new(Algorithm::ES256);
        header.typ = Some("dpop+jwt".to_string());
        header.jwk = Some(self.jwk.clone());

        let mut claims = serde_json::json!({
            "jti": uuid::Uuid::new_v4().to_string(),
            "htm": htm,
            "htu": htu,
            "iat": time::OffsetDateTime::now_utc().unix_timestamp(),
        });
        if let Some(token) = access_token {
            claims["ath"] = serde_json::json!(
                URL_SAFE_NO_PAD.encode(sha2::Sha256::digest(token.as_bytes()))
            );
        }

        jsonwebtoken::encode(&header, &claims, &self.encoding_key).unwrap()
    }
}

use sha2::Digest;

/// Extracts a query parameter from a redirect URL.
pub fn query_param(url: &str, name: &str) -> Option<String> {
    let parsed = url::Url::parse(url).ok()?;
    parsed
        .query_pairs()
        .find(|(k, _)| k == name)
        .map(|(_, v)| v.to_string())
}

/// Decodes the payload of a JWT without verifying it.
pub fn jwt_claims(token: &str) -> serde_json::Value {
    let payload = token.split('.').nth(1).unwrap();
    serde_json::from_slice(&URL_SAFE_NO_PAD.decode(payload).unwrap()).unwrap()
}

/// Builds the form map for an authorization request.
pub fn authorize_query(pairs: &[(&str, &str)]) -> HashMap<String, String> {
    pairs
        .iter()
        .map(|(k, v)| (k.to_string(), v.to_string()))
        .collect()
}
