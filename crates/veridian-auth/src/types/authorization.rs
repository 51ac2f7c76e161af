//! Authorization request parameters.
//!
//! [`AuthorizationParameters`] is the field set shared by the authorization
//! endpoint, PAR and signed request objects. When parameters arrive through
//! more than one channel (JAR or PAR inside, query string outside), the
//! inner set wins field by field — see [`AuthorizationParameters::merge`].

use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::fmt;

use crate::types::client::{CodeChallengeMethod, ResponseMode, ResponseType};

/// OIDC `prompt` values.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Prompt {
    /// No interactive prompt may be shown.
    None,
    /// Force re-authentication.
    Login,
    /// Force the consent screen.
    Consent,
    /// Force account selection.
    SelectAccount,
}

/// OIDC `display` values. Syntactic only; policies decide what to render.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum DisplayValue {
    /// Full page.
    Page,
    /// Popup window.
    Popup,
    /// Touch device.
    Touch,
    /// Feature phone.
    Wap,
}

/// One entry of the `claims` request parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimInfo {
    /// Whether the claim is essential.
    #[serde(default)]
    pub essential: bool,

    /// A specific requested value.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub value: Option<serde_json::Value>,

    /// A set of acceptable values.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub values: Option<Vec<serde_json::Value>>,
}

/// The OIDC `claims` request parameter.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct ClaimsObject {
    /// Claims requested for the ID token.
    #[serde(default)]
    pub id_token: HashMap<String, ClaimInfo>,

    /// Claims requested for the userinfo response.
    #[serde(default)]
    pub userinfo: HashMap<String, ClaimInfo>,
}

/// One RAR object (RFC 9396).
///
/// Kept as a JSON map because the shape varies per `type`; the well-known
/// members are exposed as accessors.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct AuthorizationDetail(pub serde_json::Map<String, serde_json::Value>);

impl AuthorizationDetail {
    /// The mandatory `type` member.
    #[must_use]
    pub fn detail_type(&self) -> Option<&str> {
        self.0.get("type").and_then(serde_json::Value::as_str)
    }

    /// The `identifier` member.
    #[must_use]
    pub fn identifier(&self) -> Option<&str> {
        self.0.get("identifier").and_then(serde_json::Value::as_str)
    }

    /// The `locations` member.
    #[must_use]
    pub fn locations(&self) -> Vec<&str> {
        self.string_array("locations")
    }

    /// The `actions` member.
    #[must_use]
    pub fn actions(&self) -> Vec<&str> {
        self.string_array("actions")
    }

    /// The `datatypes` member.
    #[must_use]
    pub fn datatypes(&self) -> Vec<&str> {
        self.string_array("datatypes")
    }

    fn string_array(&self, key: &str) -> Vec<&str> {
        self.0
            .get(key)
            .and_then(serde_json::Value::as_array)
            .map(|values| values.iter().filter_map(serde_json::Value::as_str).collect())
            .unwrap_or_default()
    }
}

/// The authorization request parameter set.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct AuthorizationParameters {
    /// Redirect URI.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub redirect_uri: Option<String>,

    /// Response mode.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_mode: Option<ResponseMode>,

    /// Response type.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub response_type: Option<ResponseType>,

    /// Requested scopes, space-delimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// Opaque client state, echoed back.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub state: Option<String>,

    /// OIDC nonce, bound into the ID token.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub nonce: Option<String>,

    /// PKCE code challenge.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge: Option<String>,

    /// PKCE challenge method.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub code_challenge_method: Option<CodeChallengeMethod>,

    /// Prompt directive.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub prompt: Option<Prompt>,

    /// Maximum authentication age, seconds.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub max_age: Option<i64>,

    /// Display hint.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub display: Option<DisplayValue>,

    /// Requested ACR values, space-delimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub acr_values: Option<String>,

    /// The `claims` request parameter.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub claims: Option<ClaimsObject>,

    /// RFC 9396 authorization details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_details: Option<Vec<AuthorizationDetail>>,
}

impl AuthorizationParameters {
    /// Merges inner parameters (from a request object or a PAR session)
    /// over outer ones. For every field: inner wins when non-empty.
    #[must_use]
    pub fn merge(inner: Self, outer: Self) -> Self {
        Self {
            redirect_uri: non_empty_or(inner.redirect_uri, outer.redirect_uri),
            response_mode: inner.response_mode.or(outer.response_mode),
            response_type: inner.response_type.or(outer.response_type),
            scope: non_empty_or(inner.scope, outer.scope),
            state: non_empty_or(inner.state, outer.state),
            nonce: non_empty_or(inner.nonce, outer.nonce),
            code_challenge: non_empty_or(inner.code_challenge, outer.code_challenge),
            code_challenge_method: inner.code_challenge_method.or(outer.code_challenge_method),
            prompt: inner.prompt.or(outer.prompt),
            max_age: inner.max_age.or(outer.max_age),
            display: inner.display.or(outer.display),
            acr_values: non_empty_or(inner.acr_values, outer.acr_values),
            claims: inner.claims.or(outer.claims),
            authorization_details: inner.authorization_details.or(outer.authorization_details),
        }
    }

    /// The effective response mode: the requested one, or the response
    /// type's default; the bare `jwt` mode resolves to the response type's
    /// default JARM variant.
    #[must_use]
    pub fn resolved_response_mode(&self) -> ResponseMode {
        let response_type = self.response_type.unwrap_or(ResponseType::Code);
        match self.response_mode {
            None => response_type.default_response_mode(false),
            Some(ResponseMode::Jwt) => response_type.default_response_mode(true),
            Some(mode) => mode,
        }
    }

    /// The requested scopes as a list.
    #[must_use]
    pub fn scope_list(&self) -> Vec<&str> {
        self.scope
            .as_deref()
            .map(|s| s.split_whitespace().collect())
            .unwrap_or_default()
    }

    /// Whether `openid` is among the requested scopes.
    #[must_use]
    pub fn has_openid_scope(&self) -> bool {
        self.scope_list().contains(&"openid")
    }
}

impl fmt::Display for Prompt {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let value = match self {
            Self::None => "none",
            Self::Login => "login",
            Self::Consent => "consent",
            Self::SelectAccount => "select_account",
        };
        write!(f, "{value}")
    }
}

fn non_empty_or(inner: Option<String>, outer: Option<String>) -> Option<String> {
    match inner {
        Some(value) if !value.is_empty() => Some(value),
        _ => outer,
    }
}
