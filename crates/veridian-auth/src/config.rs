//! Server configuration.
//!
//! A [`Configuration`] is created at startup and read-only thereafter; a
//! new configuration requires a new server instance. Besides the issuer and
//! key material it enumerates everything negotiable in the protocol:
//! enabled grant and response types, client authentication methods, JOSE
//! algorithm sets per role, lifetimes, profile rules and the host-supplied
//! hooks.

use std::sync::Arc;
use std::time::Duration;

use jsonwebtoken::Algorithm;
use serde::{Deserialize, Serialize};

use crate::error::OAuthError;
use crate::jose::ServerKeySet;
use crate::oauth::policy::AuthnPolicy;
use crate::session::TokenOptions;
use crate::types::{
    AuthMethod, Client, ClientMetaInfo, CodeChallengeMethod, GrantType, ResponseMode, ResponseType,
    Scope, SubjectType,
};

/// Converts a configuration duration into the `time` crate's type for
/// timestamp arithmetic.
#[must_use]
pub fn as_time_duration(duration: Duration) -> time::Duration {
    time::Duration::try_from(duration).unwrap_or(time::Duration::MAX)
}

/// The security profile the server enforces.
#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Profile {
    /// Plain OpenID Connect.
    #[default]
    OpenId,
    /// FAPI 2.0: PAR required, PKCE S256 forced, redirect URI always
    /// required, no implicit response types over insecure modes.
    Fapi2,
}

/// Lifetimes for every expiring artifact. Serde-friendly so deployments can
/// load them from configuration files with humantime strings ("60s", "90d").
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LifetimeConfig {
    /// PAR request URI lifetime.
    #[serde(with = "humantime_serde")]
    pub par: Duration,

    /// Maximum `exp - now` of request objects.
    #[serde(with = "humantime_serde")]
    pub jar: Duration,

    /// `exp - iat` of JARM response JWTs.
    #[serde(with = "humantime_serde")]
    pub jarm: Duration,

    /// Maximum age of DPoP proof `iat`.
    #[serde(with = "humantime_serde")]
    pub dpop: Duration,

    /// Authorization code lifetime.
    #[serde(with = "humantime_serde")]
    pub authorization_code: Duration,

    /// Default access token lifetime.
    #[serde(with = "humantime_serde")]
    pub access_token: Duration,

    /// ID token lifetime.
    #[serde(with = "humantime_serde")]
    pub id_token: Duration,

    /// Refresh window after the latest refresh token issuance.
    #[serde(with = "humantime_serde")]
    pub refresh_token: Duration,

    /// Maximum `exp - iat` of `client_secret_jwt` assertions.
    #[serde(with = "humantime_serde")]
    pub client_secret_jwt_assertion: Duration,

    /// Maximum `exp - iat` of `private_key_jwt` assertions.
    #[serde(with = "humantime_serde")]
    pub private_key_jwt_assertion: Duration,

    /// Lifetime of an interactive authentication session.
    #[serde(with = "humantime_serde")]
    pub authn_session: Duration,
}

impl Default for LifetimeConfig {
    fn default() -> Self {
        Self {
            par: Duration::from_secs(60),
            jar: Duration::from_secs(600),
            jarm: Duration::from_secs(600),
            dpop: Duration::from_secs(300),
            authorization_code: Duration::from_secs(60),
            access_token: Duration::from_secs(3600),
            id_token: Duration::from_secs(3600),
            refresh_token: Duration::from_secs(90 * 24 * 3600),
            client_secret_jwt_assertion: Duration::from_secs(300),
            private_key_jwt_assertion: Duration::from_secs(300),
            authn_session: Duration::from_secs(600),
        }
    }
}

/// Hook deciding the token options for a grant. Receives the client and the
/// granted scopes.
pub type TokenOptionsHook = Arc<dyn Fn(&Client, &str) -> TokenOptions + Send + Sync>;

/// Hook rewriting authorization errors before they are encoded for the
/// user-agent.
pub type AuthorizeErrorHook = Arc<dyn Fn(OAuthError) -> OAuthError + Send + Sync>;

/// Host extension points around dynamic client registration.
pub trait DcrPlugin: Send + Sync {
    /// Runs before metadata validation; may coerce defaults.
    fn before_validation(&self, meta: &mut ClientMetaInfo);

    /// Runs after the client record is assembled, before persistence.
    fn after_validation(&self, client: &mut Client);
}

/// Process-wide immutable configuration.
pub struct Configuration {
    /// Issuer host, e.g. `https://server.example.com`.
    pub host: String,

    /// The server's private keyset.
    pub keys: ServerKeySet,

    /// Enforced security profile.
    pub profile: Profile,

    /// Enabled grant types.
    pub grant_types: Vec<GrantType>,

    /// Enabled response types.
    pub response_types: Vec<ResponseType>,

    /// Enabled response modes.
    pub response_modes: Vec<ResponseMode>,

    /// Supported client authentication methods.
    pub client_authn_methods: Vec<AuthMethod>,

    /// Enabled PKCE challenge methods.
    pub code_challenge_methods: Vec<CodeChallengeMethod>,

    /// Supported subject identifier types.
    pub subject_types: Vec<SubjectType>,

    /// The scope catalogue.
    pub scopes: Vec<Scope>,

    /// Ordered authentication policies.
    pub policies: Vec<Arc<dyn AuthnPolicy>>,

    /// Signing key id for access tokens; keyset default when absent.
    pub default_token_signature_key_id: Option<String>,

    /// Signing key id for ID tokens and userinfo.
    pub default_id_token_signature_key_id: Option<String>,

    /// Signing key id for JARM responses.
    pub default_jarm_signature_key_id: Option<String>,

    /// Algorithms accepted on client assertions.
    pub client_signing_algorithms: Vec<Algorithm>,

    /// Algorithms accepted on request objects.
    pub jar_signing_algorithms: Vec<Algorithm>,

    /// Algorithms accepted on DPoP proofs.
    pub dpop_signing_algorithms: Vec<Algorithm>,

    /// All lifetimes.
    pub lifetimes: LifetimeConfig,

    /// Pushed authorization requests accepted.
    pub par_enabled: bool,

    /// Every authorization must start at `/par`.
    pub par_required: bool,

    /// Signed request objects accepted.
    pub jar_enabled: bool,

    /// Authorization parameters must arrive in a request object.
    pub jar_required: bool,

    /// Encrypted request objects accepted.
    pub jar_encryption_enabled: bool,

    /// JWT-secured response modes available.
    pub jarm_enabled: bool,

    /// DPoP proofs accepted.
    pub dpop_enabled: bool,

    /// Every token issuance must be DPoP-bound.
    pub dpop_required: bool,

    /// PKCE accepted.
    pub pkce_enabled: bool,

    /// PKCE required for every authorization code flow.
    pub pkce_required: bool,

    /// Certificate-bound access tokens for mTLS clients.
    pub tls_bound_tokens_enabled: bool,

    /// Echo the `iss` parameter on authorization responses (RFC 9207).
    pub issuer_response_parameter_enabled: bool,

    /// RFC 9396 `authorization_details` accepted.
    pub authorization_details_enabled: bool,

    /// Dynamic client registration endpoints exposed.
    pub dcr_enabled: bool,

    /// Whether the `openid` scope is mandatory on authorization requests.
    pub openid_scope_required: bool,

    /// Length of opaque token values (also the detection length when
    /// resolving presented tokens).
    pub opaque_token_length: usize,

    /// Correlation id header name.
    pub correlation_id_header: String,

    /// Token options hook; the engine defaults to JWTs with the configured
    /// lifetime when absent.
    pub token_options: Option<TokenOptionsHook>,

    /// DCR extension hook.
    pub dcr_plugin: Option<Arc<dyn DcrPlugin>>,

    /// Authorization error rewrite hook.
    pub authorize_error_plugin: Option<AuthorizeErrorHook>,
}

impl Configuration {
    /// Creates a configuration with conservative defaults: authorization code,
    /// client credentials and refresh token grants, the `code` response
    /// type, plain response modes, secret-based client authentication and
    /// S256 PKCE.
    #[must_use]
    pub fn new(host: impl Into<String>, keys: ServerKeySet) -> Self {
        Self {
            host: host.into(),
            keys,
            profile: Profile::OpenId,
            grant_types: vec![
                GrantType::AuthorizationCode,
                GrantType::ClientCredentials,
                GrantType::RefreshToken,
            ],
            response_types: vec![ResponseType::Code],
            response_modes: vec![
                ResponseMode::Query,
                ResponseMode::Fragment,
                ResponseMode::FormPost,
            ],
            client_authn_methods: vec![AuthMethod::ClientSecretBasic, AuthMethod::ClientSecretPost],
            code_challenge_methods: vec![CodeChallengeMethod::S256],
            subject_types: vec![SubjectType::Public],
            scopes: Vec::new(),
            policies: Vec::new(),
            default_token_signature_key_id: None,
            default_id_token_signature_key_id: None,
            default_jarm_signature_key_id: None,
            client_signing_algorithms: vec![Algorithm::RS256],
            jar_signing_algorithms: vec![Algorithm::RS256],
            dpop_signing_algorithms: vec![Algorithm::ES256, Algorithm::RS256],
            lifetimes: LifetimeConfig::default(),
            par_enabled: false,
            par_required: false,
            jar_enabled: false,
            jar_required: false,
            jar_encryption_enabled: false,
            jarm_enabled: false,
            dpop_enabled: false,
            dpop_required: false,
            pkce_enabled: true,
            pkce_required: false,
            tls_bound_tokens_enabled: false,
            issuer_response_parameter_enabled: false,
            authorization_details_enabled: false,
            dcr_enabled: false,
            openid_scope_required: false,
            opaque_token_length: 30,
            correlation_id_header: "X-Correlation-ID".to_string(),
            token_options: None,
            dcr_plugin: None,
            authorize_error_plugin: None,
        }
    }

    /// Switches to the FAPI 2.0 profile, forcing its baseline: PAR and
    /// PKCE required, S256 only.
    #[must_use]
    pub fn with_fapi2_profile(mut self) -> Self {
        self.profile = Profile::Fapi2;
        self.par_enabled = true;
        self.par_required = true;
        self.pkce_enabled = true;
        self.pkce_required = true;
        self.code_challenge_methods = vec![CodeChallengeMethod::S256];
        self
    }

    /// Registers the scope catalogue.
    #[must_use]
    pub fn with_scopes(mut self, scopes: Vec<Scope>) -> Self {
        self.scopes = scopes;
        self
    }

    /// Appends an authentication policy.
    #[must_use]
    pub fn with_policy(mut self, policy: Arc<dyn AuthnPolicy>) -> Self {
        self.policies.push(policy);
        self
    }

    /// Replaces the enabled grant types. Response types that need a
    /// disabled grant should be adjusted by the caller.
    #[must_use]
    pub fn with_grant_types(mut self, grant_types: Vec<GrantType>) -> Self {
        self.grant_types = grant_types;
        self
    }

    /// Replaces the enabled response types.
    #[must_use]
    pub fn with_response_types(mut self, response_types: Vec<ResponseType>) -> Self {
        self.response_types = response_types;
        self
    }

    /// Replaces the supported client authentication methods.
    #[must_use]
    pub fn with_client_authn_methods(mut self, methods: Vec<AuthMethod>) -> Self {
        self.client_authn_methods = methods;
        self
    }

    /// Enables pushed authorization requests.
    #[must_use]
    pub fn with_par(mut self, required: bool) -> Self {
        self.par_enabled = true;
        self.par_required = required;
        self
    }

    /// Enables signed request objects with the accepted algorithms.
    #[must_use]
    pub fn with_jar(mut self, algorithms: Vec<Algorithm>, required: bool) -> Self {
        self.jar_enabled = true;
        self.jar_required = required;
        self.jar_signing_algorithms = algorithms;
        self
    }

    /// Enables decryption of encrypted request objects.
    #[must_use]
    pub fn with_jar_encryption(mut self) -> Self {
        self.jar_encryption_enabled = true;
        self
    }

    /// Enables JWT-secured response modes.
    #[must_use]
    pub fn with_jarm(mut self, signature_key_id: impl Into<String>) -> Self {
        self.jarm_enabled = true;
        self.default_jarm_signature_key_id = Some(signature_key_id.into());
        self.response_modes = vec![
            ResponseMode::Query,
            ResponseMode::QueryJwt,
            ResponseMode::Fragment,
            ResponseMode::FragmentJwt,
            ResponseMode::FormPost,
            ResponseMode::FormPostJwt,
            ResponseMode::Jwt,
        ];
        self
    }

    /// Enables DPoP with the accepted proof algorithms.
    #[must_use]
    pub fn with_dpop(mut self, algorithms: Vec<Algorithm>, required: bool) -> Self {
        self.dpop_enabled = true;
        self.dpop_required = required;
        self.dpop_signing_algorithms = algorithms;
        self
    }

    /// Enables PKCE with the given challenge methods.
    #[must_use]
    pub fn with_pkce(mut self, methods: Vec<CodeChallengeMethod>, required: bool) -> Self {
        self.pkce_enabled = true;
        self.pkce_required = required;
        self.code_challenge_methods = methods;
        self
    }

    /// Enables dynamic client registration.
    #[must_use]
    pub fn with_dcr(mut self) -> Self {
        self.dcr_enabled = true;
        self
    }

    /// Installs the token options hook.
    #[must_use]
    pub fn with_token_options_hook(mut self, hook: TokenOptionsHook) -> Self {
        self.token_options = Some(hook);
        self
    }

    /// Installs the DCR plugin.
    #[must_use]
    pub fn with_dcr_plugin(mut self, plugin: Arc<dyn DcrPlugin>) -> Self {
        self.dcr_plugin = Some(plugin);
        self
    }

    /// Installs the authorize error rewrite hook.
    #[must_use]
    pub fn with_authorize_error_plugin(mut self, hook: AuthorizeErrorHook) -> Self {
        self.authorize_error_plugin = Some(hook);
        self
    }

    /// Replaces the lifetimes wholesale.
    #[must_use]
    pub fn with_lifetimes(mut self, lifetimes: LifetimeConfig) -> Self {
        self.lifetimes = lifetimes;
        self
    }

    /// Whether a grant type is enabled.
    #[must_use]
    pub fn is_grant_type_enabled(&self, grant_type: GrantType) -> bool {
        self.grant_types.contains(&grant_type)
    }

    /// Whether a response mode is enabled.
    #[must_use]
    pub fn is_response_mode_enabled(&self, mode: ResponseMode) -> bool {
        self.response_modes.contains(&mode)
    }

    /// Whether a client authentication method is supported.
    #[must_use]
    pub fn is_authn_method_enabled(&self, method: AuthMethod) -> bool {
        self.client_authn_methods.contains(&method)
    }

    /// The token endpoint URL, an acceptable audience of client assertions.
    #[must_use]
    pub fn token_endpoint(&self) -> String {
        format!("{}/token", self.host)
    }

    /// Resolves the token options for a grant: the hook when installed,
    /// JWT defaults otherwise.
    #[must_use]
    pub fn token_options_for(&self, client: &Client, scopes: &str) -> TokenOptions {
        match &self.token_options {
            Some(hook) => hook(client, scopes),
            None => TokenOptions::jwt(
                self.default_token_signature_key_id.clone(),
                self.lifetimes.access_token.as_secs() as i64,
            ),
        }
    }

    /// Runs the authorize error hook, when installed.
    #[must_use]
    pub fn rewrite_authorize_error(&self, error: OAuthError) -> OAuthError {
        match &self.authorize_error_plugin {
            Some(hook) => hook(error),
            None => error,
        }
    }
}
