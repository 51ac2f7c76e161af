//! OAuth 2.1 client domain types.
//!
//! A [`Client`] is the registered (or dynamically registered) relying party.
//! Its [`ClientMetaInfo`] constrains every request the client makes: grant
//! types, response types, redirect URIs, scopes, per-role JOSE algorithms
//! and the token-binding requirements.

use std::fmt;

use jsonwebtoken::Algorithm;
use jsonwebtoken::jwk::JwkSet;
use serde::{Deserialize, Serialize};

use crate::jose::{ContentEncryption, KeyEncryption};
use crate::types::scope::Scope;

// =============================================================================
// Protocol constants
// =============================================================================

/// OAuth 2.0 grant types.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum GrantType {
    /// Authorization code flow.
    AuthorizationCode,
    /// Client credentials flow (confidential clients only).
    ClientCredentials,
    /// Refresh token flow.
    RefreshToken,
    /// Implicit flow (tokens issued from the authorization endpoint).
    Implicit,
    /// JWT bearer assertion grant (RFC 7523).
    #[serde(rename = "urn:ietf:params:oauth:grant-type:jwt-bearer")]
    JwtBearer,
}

impl GrantType {
    /// Returns the `grant_type` parameter value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::AuthorizationCode => "authorization_code",
            Self::ClientCredentials => "client_credentials",
            Self::RefreshToken => "refresh_token",
            Self::Implicit => "implicit",
            Self::JwtBearer => "urn:ietf:params:oauth:grant-type:jwt-bearer",
        }
    }

    /// Parses a `grant_type` parameter value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "authorization_code" => Some(Self::AuthorizationCode),
            "client_credentials" => Some(Self::ClientCredentials),
            "refresh_token" => Some(Self::RefreshToken),
            "implicit" => Some(Self::Implicit),
            "urn:ietf:params:oauth:grant-type:jwt-bearer" => Some(Self::JwtBearer),
            _ => None,
        }
    }
}

impl fmt::Display for GrantType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// OAuth 2.0 / OIDC response types, including the hybrid combinations.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(try_from = "String", into = "String")]
pub enum ResponseType {
    /// `code`
    Code,
    /// `id_token`
    IdToken,
    /// `token`
    Token,
    /// `code id_token`
    CodeIdToken,
    /// `code token`
    CodeToken,
    /// `id_token token`
    IdTokenToken,
    /// `code id_token token`
    CodeIdTokenToken,
}

impl ResponseType {
    /// Returns the space-delimited wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Code => "code",
            Self::IdToken => "id_token",
            Self::Token => "token",
            Self::CodeIdToken => "code id_token",
            Self::CodeToken => "code token",
            Self::IdTokenToken => "id_token token",
            Self::CodeIdTokenToken => "code id_token token",
        }
    }

    /// Parses a `response_type` value. Components may appear in any order.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        let mut code = false;
        let mut id_token = false;
        let mut token = false;
        for part in value.split_whitespace() {
            match part {
                "code" if !code => code = true,
                "id_token" if !id_token => id_token = true,
                "token" if !token => token = true,
                _ => return None,
            }
        }
        match (code, id_token, token) {
            (true, false, false) => Some(Self::Code),
            (false, true, false) => Some(Self::IdToken),
            (false, false, true) => Some(Self::Token),
            (true, true, false) => Some(Self::CodeIdToken),
            (true, false, true) => Some(Self::CodeToken),
            (false, true, true) => Some(Self::IdTokenToken),
            (true, true, true) => Some(Self::CodeIdTokenToken),
            (false, false, false) => None,
        }
    }

    /// Whether the response includes an authorization code.
    #[must_use]
    pub fn contains_code(&self) -> bool {
        matches!(
            self,
            Self::Code | Self::CodeIdToken | Self::CodeToken | Self::CodeIdTokenToken
        )
    }

    /// Whether the response includes an ID token.
    #[must_use]
    pub fn contains_id_token(&self) -> bool {
        matches!(
            self,
            Self::IdToken | Self::CodeIdToken | Self::IdTokenToken | Self::CodeIdTokenToken
        )
    }

    /// Whether the response includes an access token.
    #[must_use]
    pub fn contains_token(&self) -> bool {
        matches!(
            self,
            Self::Token | Self::CodeToken | Self::IdTokenToken | Self::CodeIdTokenToken
        )
    }

    /// Whether any component is issued directly from the authorization
    /// endpoint (implicit or hybrid).
    #[must_use]
    pub fn is_implicit(&self) -> bool {
        self.contains_id_token() || self.contains_token()
    }

    /// The default response mode for this response type.
    ///
    /// `code` alone defaults to the query encoding; anything implicit
    /// defaults to the fragment. When `jwt` was requested the default is
    /// the corresponding JARM variant.
    #[must_use]
    pub fn default_response_mode(&self, jarm: bool) -> ResponseMode {
        match (self.is_implicit(), jarm) {
            (false, false) => ResponseMode::Query,
            (false, true) => ResponseMode::QueryJwt,
            (true, false) => ResponseMode::Fragment,
            (true, true) => ResponseMode::FragmentJwt,
        }
    }
}

impl fmt::Display for ResponseType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

impl TryFrom<String> for ResponseType {
    type Error = String;

    fn try_from(value: String) -> Result<Self, Self::Error> {
        Self::parse(&value).ok_or_else(|| format!("invalid response_type: {value}"))
    }
}

impl From<ResponseType> for String {
    fn from(value: ResponseType) -> Self {
        value.as_str().to_string()
    }
}

/// Response modes, including the JWT-secured (JARM) variants.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ResponseMode {
    /// Parameters in the redirect URI query.
    #[serde(rename = "query")]
    Query,
    /// Parameters in the redirect URI fragment.
    #[serde(rename = "fragment")]
    Fragment,
    /// Parameters auto-posted from an HTML form.
    #[serde(rename = "form_post")]
    FormPost,
    /// JARM with the default encoding for the response type.
    #[serde(rename = "jwt")]
    Jwt,
    /// JARM in the query.
    #[serde(rename = "query.jwt")]
    QueryJwt,
    /// JARM in the fragment.
    #[serde(rename = "fragment.jwt")]
    FragmentJwt,
    /// JARM via form post.
    #[serde(rename = "form_post.jwt")]
    FormPostJwt,
}

impl ResponseMode {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Query => "query",
            Self::Fragment => "fragment",
            Self::FormPost => "form_post",
            Self::Jwt => "jwt",
            Self::QueryJwt => "query.jwt",
            Self::FragmentJwt => "fragment.jwt",
            Self::FormPostJwt => "form_post.jwt",
        }
    }

    /// Parses a `response_mode` value.
    #[must_use]
    pub fn parse(value: &str) -> Option<Self> {
        match value {
            "query" => Some(Self::Query),
            "fragment" => Some(Self::Fragment),
            "form_post" => Some(Self::FormPost),
            "jwt" => Some(Self::Jwt),
            "query.jwt" => Some(Self::QueryJwt),
            "fragment.jwt" => Some(Self::FragmentJwt),
            "form_post.jwt" => Some(Self::FormPostJwt),
            _ => None,
        }
    }

    /// Whether this is a JWT-secured (JARM) mode.
    #[must_use]
    pub fn is_jwt(&self) -> bool {
        matches!(
            self,
            Self::Jwt | Self::QueryJwt | Self::FragmentJwt | Self::FormPostJwt
        )
    }

    /// Whether the parameters travel in the query component.
    #[must_use]
    pub fn is_query(&self) -> bool {
        matches!(self, Self::Query | Self::QueryJwt)
    }
}

impl fmt::Display for ResponseMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Client authentication methods at protected endpoints.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Default, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum AuthMethod {
    /// Public clients, no authentication.
    None,
    /// RFC 7617 Basic authentication with the client secret.
    #[default]
    ClientSecretBasic,
    /// Client secret in the form body.
    ClientSecretPost,
    /// HMAC client assertion using the raw client secret.
    ClientSecretJwt,
    /// Client assertion signed with the client's private key.
    PrivateKeyJwt,
    /// PKI mutual TLS, matched on subject DN or SAN entries.
    TlsClientAuth,
    /// Self-signed mutual TLS, matched against the client JWKS.
    SelfSignedTlsClientAuth,
}

impl AuthMethod {
    /// Returns the registered method name.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::None => "none",
            Self::ClientSecretBasic => "client_secret_basic",
            Self::ClientSecretPost => "client_secret_post",
            Self::ClientSecretJwt => "client_secret_jwt",
            Self::PrivateKeyJwt => "private_key_jwt",
            Self::TlsClientAuth => "tls_client_auth",
            Self::SelfSignedTlsClientAuth => "self_signed_tls_client_auth",
        }
    }
}

impl fmt::Display for AuthMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

/// Subject identifier types.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SubjectType {
    /// The same `sub` for every client.
    #[default]
    Public,
    /// A per-client derived `sub`.
    Pairwise,
}

/// PKCE code challenge methods.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum CodeChallengeMethod {
    /// The verifier is sent as-is.
    #[serde(rename = "plain")]
    Plain,
    /// `BASE64URL(SHA256(verifier))`.
    #[serde(rename = "S256")]
    S256,
}

impl CodeChallengeMethod {
    /// Returns the wire value.
    #[must_use]
    pub fn as_str(&self) -> &'static str {
        match self {
            Self::Plain => "plain",
            Self::S256 => "S256",
        }
    }
}

impl fmt::Display for CodeChallengeMethod {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.as_str())
    }
}

// =============================================================================
// Client
// =============================================================================

/// A registered OAuth client.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Client {
    /// Unique client identifier.
    pub id: String,

    /// BCrypt hash of the client secret.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashed_secret: Option<String>,

    /// Plaintext secret, kept only when the client authenticates with
    /// `client_secret_jwt` so the HMAC can be verified.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub secret: Option<String>,

    /// BCrypt hash of the registration access token (DCR-managed clients).
    #[serde(skip_serializing_if = "Option::is_none")]
    pub hashed_registration_access_token: Option<String>,

    /// The registered metadata.
    #[serde(flatten)]
    pub meta: ClientMetaInfo,
}

/// Registered client metadata.
///
/// Field names follow the OIDC Dynamic Client Registration registry so the
/// struct doubles as the DCR request/response body.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct ClientMetaInfo {
    /// Human-readable client name.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_name: Option<String>,

    /// Allowed redirect URIs. Matching is by prefix.
    #[serde(default)]
    pub redirect_uris: Vec<String>,

    /// Allowed grant types.
    #[serde(default)]
    pub grant_types: Vec<GrantType>,

    /// Allowed response types.
    #[serde(default)]
    pub response_types: Vec<ResponseType>,

    /// Allowed scopes, space-delimited (the wire representation).
    #[serde(default)]
    pub scope: String,

    /// Subject identifier type.
    #[serde(default)]
    pub subject_type: SubjectType,

    /// Authentication method at the token endpoint.
    #[serde(default = "default_auth_method")]
    pub token_endpoint_auth_method: AuthMethod,

    /// Expected algorithm of client assertions, when pinned.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_endpoint_auth_signing_alg: Option<Algorithm>,

    /// ID token signing algorithm override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_signed_response_alg: Option<Algorithm>,

    /// ID token encryption key-management algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_alg: Option<KeyEncryption>,

    /// ID token content-encryption algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token_encrypted_response_enc: Option<ContentEncryption>,

    /// Userinfo signing algorithm; `None` means plain JSON.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_signed_response_alg: Option<Algorithm>,

    /// Userinfo encryption key-management algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_encrypted_response_alg: Option<KeyEncryption>,

    /// Userinfo content-encryption algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub userinfo_encrypted_response_enc: Option<ContentEncryption>,

    /// Declared request object signing algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub request_object_signing_alg: Option<Algorithm>,

    /// JARM response signing algorithm override.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_signed_response_alg: Option<Algorithm>,

    /// JARM response encryption key-management algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_encrypted_response_alg: Option<KeyEncryption>,

    /// JARM response content-encryption algorithm.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_encrypted_response_enc: Option<ContentEncryption>,

    /// Inline public JWKS.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks: Option<JwkSet>,

    /// JWKS URI for dynamically fetched keys.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub jwks_uri: Option<String>,

    /// Whether every access token issued to this client must be DPoP-bound.
    #[serde(default)]
    pub dpop_bound_access_tokens: bool,

    /// Expected TLS client certificate subject DN.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_client_auth_subject_dn: Option<String>,

    /// Expected TLS client certificate SAN DNS entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_client_auth_san_dns: Option<String>,

    /// Expected TLS client certificate SAN IP entry.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub tls_client_auth_san_ip: Option<String>,

    /// Whitelisted `authorization_details` types. Empty means unrestricted.
    #[serde(default)]
    pub authorization_detail_types: Vec<String>,

    /// Default `max_age` in seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_max_age: Option<i64>,

    /// Default requested ACR values, space-delimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub default_acr_values: Option<String>,

    /// Free-form extension attributes carried through registration.
    #[serde(default, skip_serializing_if = "serde_json::Map::is_empty")]
    pub attributes: serde_json::Map<String, serde_json::Value>,
}

fn default_auth_method() -> AuthMethod {
    AuthMethod::ClientSecretBasic
}

impl Client {
    /// Whether this is a public client.
    #[must_use]
    pub fn is_public(&self) -> bool {
        self.meta.token_endpoint_auth_method == AuthMethod::None
    }

    /// Checks a `redirect_uri` against the registered list by prefix.
    #[must_use]
    pub fn is_redirect_uri_allowed(&self, uri: &str) -> bool {
        self.meta
            .redirect_uris
            .iter()
            .any(|registered| uri.starts_with(registered.as_str()))
    }

    /// Checks whether the client may use the given grant type.
    #[must_use]
    pub fn is_grant_type_allowed(&self, grant_type: GrantType) -> bool {
        self.meta.grant_types.contains(&grant_type)
    }

    /// Checks whether the client may use the given response type.
    #[must_use]
    pub fn is_response_type_allowed(&self, response_type: ResponseType) -> bool {
        self.meta.response_types.contains(&response_type)
    }

    /// Checks every requested scope against the client's registered scopes
    /// combined with the server catalogue's matching predicates.
    #[must_use]
    pub fn are_scopes_allowed(&self, catalogue: &[Scope], requested: &str) -> bool {
        let client_scopes: Vec<&str> = self.meta.scope.split_whitespace().collect();
        requested.split_whitespace().all(|scope| {
            catalogue
                .iter()
                .filter(|s| client_scopes.contains(&s.id()))
                .any(|s| s.matches(scope))
        })
    }

    /// Checks one `authorization_details` type against the whitelist.
    /// An empty whitelist leaves the client unrestricted.
    #[must_use]
    pub fn is_authorization_detail_type_allowed(&self, detail_type: &str) -> bool {
        self.meta.authorization_detail_types.is_empty()
            || self
                .meta
                .authorization_detail_types
                .iter()
                .any(|t| t == detail_type)
    }

    /// The scopes registered for this client, split out of the wire string.
    #[must_use]
    pub fn scope_list(&self) -> Vec<&str> {
        self.meta.scope.split_whitespace().collect()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn test_client() -> Client {
        Client {
            id: "cid1".to_string(),
            hashed_secret: None,
            secret: None,
            hashed_registration_access_token: None,
            meta: ClientMetaInfo {
                redirect_uris: vec!["https://app.example.com/callback".to_string()],
                grant_types: vec![GrantType::AuthorizationCode, GrantType::RefreshToken],
                response_types: vec![ResponseType::Code],
                scope: "openid profile payment".to_string(),
                ..ClientMetaInfo::default()
            },
        }
    }

    #[test]
    fn test_response_type_parse() {
        assert_eq!(ResponseType::parse("code"), Some(ResponseType::Code));
        assert_eq!(
            ResponseType::parse("code id_token"),
            Some(ResponseType::CodeIdToken)
        );
        assert_eq!(
            ResponseType::parse("id_token code"),
            Some(ResponseType::CodeIdToken)
        );
        assert_eq!(
            ResponseType::parse("code id_token token"),
            Some(ResponseType::CodeIdTokenToken)
        );
        assert_eq!(ResponseType::parse(""), None);
        assert_eq!(ResponseType::parse("code code"), None);
        assert_eq!(ResponseType::parse("device"), None);
    }

    #[test]
    fn test_response_type_predicates() {
        assert!(ResponseType::Code.contains_code());
        assert!(!ResponseType::Code.is_implicit());
        assert!(ResponseType::IdTokenToken.is_implicit());
        assert!(ResponseType::CodeIdToken.contains_id_token());
        assert!(ResponseType::CodeIdToken.is_implicit());
        assert!(!ResponseType::IdToken.contains_token());
    }

    #[test]
    fn test_default_response_modes() {
        assert_eq!(
            ResponseType::Code.default_response_mode(false),
            ResponseMode::Query
        );
        assert_eq!(
            ResponseType::Code.default_response_mode(true),
            ResponseMode::QueryJwt
        );
        assert_eq!(
            ResponseType::IdToken.default_response_mode(false),
            ResponseMode::Fragment
        );
        assert_eq!(
            ResponseType::CodeToken.default_response_mode(true),
            ResponseMode::FragmentJwt
        );
    }

    #[test]
    fn test_response_mode_jwt_detection() {
        assert!(ResponseMode::QueryJwt.is_jwt());
        assert!(ResponseMode::Jwt.is_jwt());
        assert!(!ResponseMode::Query.is_jwt());
        assert!(ResponseMode::QueryJwt.is_query());
        assert!(!ResponseMode::FormPostJwt.is_query());
    }

    #[test]
    fn test_grant_type_serde() {
        assert_eq!(
            serde_json::to_string(&GrantType::JwtBearer).unwrap(),
            "\"urn:ietf:params:oauth:grant-type:jwt-bearer\""
        );
        assert_eq!(
            serde_json::to_string(&GrantType::AuthorizationCode).unwrap(),
            "\"authorization_code\""
        );
        let parsed: GrantType =
            serde_json::from_str("\"urn:ietf:params:oauth:grant-type:jwt-bearer\"").unwrap();
        assert_eq!(parsed, GrantType::JwtBearer);
    }

    #[test]
    fn test_redirect_uri_prefix_match() {
        let client = test_client();
        assert!(client.is_redirect_uri_allowed("https://app.example.com/callback"));
        assert!(client.is_redirect_uri_allowed("https://app.example.com/callback?step=2"));
        assert!(!client.is_redirect_uri_allowed("https://evil.example.com/callback"));
        assert!(!client.is_redirect_uri_allowed("https://app.example.com/other"));
    }

    #[test]
    fn test_scope_checks() {
        let client = test_client();
        let catalogue = vec![
            Scope::simple("openid"),
            Scope::simple("profile"),
            Scope::dynamic("payment", |requested| requested.starts_with("payment")),
            Scope::simple("admin"),
        ];

        assert!(client.are_scopes_allowed(&catalogue, "openid"));
        assert!(client.are_scopes_allowed(&catalogue, "openid profile"));
        assert!(client.are_scopes_allowed(&catalogue, "payment:30"));
        // admin is in the catalogue but not registered for this client
        assert!(!client.are_scopes_allowed(&catalogue, "admin"));
        assert!(!client.are_scopes_allowed(&catalogue, "unknown"));
    }

    #[test]
    fn test_authorization_detail_type_whitelist() {
        let mut client = test_client();
        assert!(client.is_authorization_detail_type_allowed("payment_initiation"));

        client.meta.authorization_detail_types = vec!["account_information".to_string()];
        assert!(client.is_authorization_detail_type_allowed("account_information"));
        assert!(!client.is_authorization_detail_type_allowed("payment_initiation"));
    }

    #[test]
    fn test_client_meta_serde_round_trip() {
        let client = test_client();
        let json = serde_json::to_string(&client).unwrap();
        let parsed: Client = serde_json::from_str(&json).unwrap();
        assert_eq!(parsed.id, "cid1");
        assert_eq!(parsed.meta.redirect_uris, client.meta.redirect_uris);
        assert_eq!(
            parsed.meta.token_endpoint_auth_method,
            AuthMethod::ClientSecretBasic
        );
    }
}
