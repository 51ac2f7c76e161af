//! The grant session and the issued-token value type.
//!
//! A [`GrantSession`] backs every token that needs server-side state: opaque
//! tokens, refresh tokens and `openid` grants (for userinfo). Exactly one
//! access token id is live per session; a refresh replaces it and rotates
//! the refresh token.

use serde::{Deserialize, Serialize};
use time::OffsetDateTime;
use uuid::Uuid;

use crate::types::{AuthorizationDetail, GrantType};

/// Access token representation.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum TokenFormat {
    /// Self-contained signed JWT.
    Jwt,
    /// Random reference string; the value doubles as the token id.
    Opaque,
}

/// The `token_type` returned to clients.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
pub enum TokenType {
    /// Plain bearer token.
    Bearer,
    /// DPoP-bound token.
    #[serde(rename = "DPoP")]
    DPoP,
}

impl TokenType {
    /// Returns the header scheme name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Bearer => "Bearer",
            Self::DPoP => "DPoP",
        }
    }
}

/// How the next access token should be minted.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TokenOptions {
    /// Token format.
    pub format: TokenFormat,

    /// Token lifetime in seconds.
    pub lifetime_secs: i64,

    /// Signing key id for JWT tokens; the default key when absent.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub signature_key_id: Option<String>,

    /// Length of opaque token values.
    #[serde(default)]
    pub opaque_length: usize,

    /// Extra claims embedded in the access token.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional_claims: serde_json::Map<String, serde_json::Value>,
}

impl TokenOptions {
    /// Options for a signed JWT access token.
    #[must_use]
    pub fn jwt(signature_key_id: Option<String>, lifetime_secs: i64) -> Self {
        Self {
            format: TokenFormat::Jwt,
            lifetime_secs,
            signature_key_id,
            opaque_length: 0,
            additional_claims: serde_json::Map::new(),
        }
    }

    /// Options for an opaque reference token.
    #[must_use]
    pub fn opaque(length: usize, lifetime_secs: i64) -> Self {
        Self {
            format: TokenFormat::Opaque,
            lifetime_secs,
            signature_key_id: None,
            opaque_length: length,
            additional_claims: serde_json::Map::new(),
        }
    }

    /// Merges extra claims into the token.
    pub fn add_claims(&mut self, claims: serde_json::Map<String, serde_json::Value>) {
        self.additional_claims.extend(claims);
    }
}

/// What was granted, embedded into the grant session.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantOptions {
    /// The grant type that produced this session.
    pub grant_type: GrantType,

    /// The authenticated subject (the client id for client credentials).
    pub subject: String,

    /// The client the grant belongs to.
    pub client_id: String,

    /// Granted scopes, space-delimited.
    pub granted_scopes: String,

    /// Granted authorization details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub granted_authorization_details: Option<Vec<AuthorizationDetail>>,

    /// Extra ID token claims carried from the authentication session.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional_id_token_claims: serde_json::Map<String, serde_json::Value>,

    /// Extra userinfo claims carried from the authentication session.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub additional_userinfo_claims: serde_json::Map<String, serde_json::Value>,

    /// How access tokens for this grant are minted.
    pub token_options: TokenOptions,
}

/// Long-lived state behind issued tokens.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GrantSession {
    /// Unique session id.
    pub id: String,

    /// The id of the live access token.
    pub token_id: String,

    /// The live refresh token, when issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// The refresh token retired by the latest rotation. A presentation of
    /// this value is a replay and revokes the session.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub previous_refresh_token: Option<String>,

    /// DPoP binding: thumbprint of the proof key.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk_thumbprint: Option<String>,

    /// mTLS binding: SHA-256 thumbprint of the client certificate.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_certificate_thumbprint: Option<String>,

    /// When the grant was created.
    #[serde(with = "time::serde::rfc3339")]
    pub created_at: OffsetDateTime,

    /// When the latest access token was issued.
    #[serde(with = "time::serde::rfc3339")]
    pub last_token_issued_at: OffsetDateTime,

    /// When the grant (refresh window) expires.
    #[serde(with = "time::serde::rfc3339")]
    pub expires_at: OffsetDateTime,

    /// Scopes active on the latest token, space-delimited.
    pub active_scopes: String,

    /// The grant options.
    #[serde(flatten)]
    pub options: GrantOptions,
}

impl GrantSession {
    /// Creates a session for a freshly issued token.
    #[must_use]
    pub fn new(token_id: impl Into<String>, options: GrantOptions) -> Self {
        let now = OffsetDateTime::now_utc();
        let lifetime = time::Duration::seconds(options.token_options.lifetime_secs);
        Self {
            id: Uuid::new_v4().to_string(),
            token_id: token_id.into(),
            refresh_token: None,
            previous_refresh_token: None,
            jwk_thumbprint: None,
            client_certificate_thumbprint: None,
            created_at: now,
            last_token_issued_at: now,
            expires_at: now + lifetime,
            active_scopes: options.granted_scopes.clone(),
            options,
        }
    }

    /// Whether the refresh window has closed.
    #[must_use]
    pub fn is_expired(&self) -> bool {
        OffsetDateTime::now_utc() > self.expires_at
    }

    /// Whether the latest access token has expired.
    #[must_use]
    pub fn has_last_token_expired(&self) -> bool {
        let lifetime = time::Duration::seconds(self.options.token_options.lifetime_secs);
        OffsetDateTime::now_utc() > self.last_token_issued_at + lifetime
    }

    /// Whether the grant is bound to a proof-of-possession key.
    #[must_use]
    pub fn is_bound(&self) -> bool {
        self.jwk_thumbprint.is_some() || self.client_certificate_thumbprint.is_some()
    }

    /// Whether `openid` was granted.
    #[must_use]
    pub fn has_openid_scope(&self) -> bool {
        self.options
            .granted_scopes
            .split_whitespace()
            .any(|s| s == "openid")
    }
}

/// An issued access token value. Not stored standalone; the grant session
/// carries the server-side state.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Token {
    /// Token id (`jti` for JWTs, the value itself for opaque tokens).
    pub id: String,

    /// Token format.
    pub format: TokenFormat,

    /// The token value handed to the client.
    pub value: String,

    /// Bearer or DPoP.
    pub token_type: TokenType,

    /// DPoP binding thumbprint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwk_thumbprint: Option<String>,

    /// mTLS binding thumbprint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub certificate_thumbprint: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    fn options() -> GrantOptions {
        GrantOptions {
            grant_type: GrantType::ClientCredentials,
            subject: "cid1".to_string(),
            client_id: "cid1".to_string(),
            granted_scopes: "scope1 openid".to_string(),
            granted_authorization_details: None,
            additional_id_token_claims: serde_json::Map::new(),
            additional_userinfo_claims: serde_json::Map::new(),
            token_options: TokenOptions::jwt(None, 60),
        }
    }

    #[test]
    fn test_new_grant_session() {
        let session = GrantSession::new("token-1", options());
        assert!(!session.is_expired());
        assert!(!session.has_last_token_expired());
        assert!(!session.is_bound());
        assert!(session.has_openid_scope());
        assert_eq!(session.active_scopes, "scope1 openid");
    }

    #[test]
    fn test_last_token_expiry() {
        let mut session = GrantSession::new("token-1", options());
        session.last_token_issued_at = OffsetDateTime::now_utc() - time::Duration::seconds(61);
        assert!(session.has_last_token_expired());
    }

    #[test]
    fn test_binding_detection() {
        let mut session = GrantSession::new("token-1", options());
        session.jwk_thumbprint = Some("jkt".to_string());
        assert!(session.is_bound());

        let mut session = GrantSession::new("token-2", options());
        session.client_certificate_thumbprint = Some("x5t".to_string());
        assert!(session.is_bound());
    }

    #[test]
    fn test_token_options_builders() {
        let jwt = TokenOptions::jwt(Some("sig-1".to_string()), 300);
        assert_eq!(jwt.format, TokenFormat::Jwt);
        assert_eq!(jwt.signature_key_id.as_deref(), Some("sig-1"));

        let opaque = TokenOptions::opaque(30, 300);
        assert_eq!(opaque.format, TokenFormat::Opaque);
        assert_eq!(opaque.opaque_length, 30);
    }

    #[test]
    fn test_token_type_wire_values() {
        assert_eq!(serde_json::to_string(&TokenType::Bearer).unwrap(), "\"Bearer\"");
        assert_eq!(serde_json::to_string(&TokenType::DPoP).unwrap(), "\"DPoP\"");
    }
}
