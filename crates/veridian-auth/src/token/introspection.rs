//! Token introspection (RFC 7662).
//!
//! A client-authenticated lookup of any token the server issued. Unknown,
//! expired or foreign tokens all collapse to `{"active": false}`; known
//! live tokens return the canonical metadata set.

use serde::{Deserialize, Serialize};
use serde_json::json;

use crate::AuthResult;
use crate::context::HttpRequestInfo;
use crate::error::OAuthError;
use crate::oauth::client_auth::{ClientCredentials, authenticate_client};
use crate::server::AuthServer;
use crate::session::{GrantSession, TokenType};
use crate::token::lookup::PresentedTokenKind;
use crate::types::AuthorizationDetail;

/// The wire form of an introspection request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct IntrospectionRequest {
    /// The token under inspection.
    #[serde(default)]
    pub token: Option<String>,

    /// Caller's hint; the lookup tries every kind regardless.
    #[serde(default)]
    pub token_type_hint: Option<String>,

    /// Client id (client_secret_post).
    #[serde(default)]
    pub client_id: Option<String>,

    /// Client secret (client_secret_post).
    #[serde(default)]
    pub client_secret: Option<String>,

    /// Client assertion JWT.
    #[serde(default)]
    pub client_assertion: Option<String>,

    /// Client assertion type.
    #[serde(default)]
    pub client_assertion_type: Option<String>,
}

impl IntrospectionRequest {
    /// The client credentials carried in the body.
    #[must_use]
    pub fn credentials(&self) -> ClientCredentials {
        ClientCredentials {
            client_id: self.client_id.clone(),
            client_secret: self.client_secret.clone(),
            client_assertion: self.client_assertion.clone(),
            client_assertion_type: self.client_assertion_type.clone(),
        }
    }
}

/// The RFC 7662 response body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct IntrospectionResponse {
    /// Whether the token is live.
    pub active: bool,

    /// Active scopes.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// The owning client.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub client_id: Option<String>,

    /// The subject.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub sub: Option<String>,

    /// `Bearer` or `DPoP`.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub token_type: Option<TokenType>,

    /// Expiry of the introspected artifact.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub exp: Option<i64>,

    /// When the latest token was issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub iat: Option<i64>,

    /// Proof-of-possession binding.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub cnf: Option<serde_json::Value>,

    /// Granted authorization details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_details: Option<Vec<AuthorizationDetail>>,
}

impl IntrospectionResponse {
    /// The inactive response.
    #[must_use]
    pub fn inactive() -> Self {
        Self {
            active: false,
            scope: None,
            client_id: None,
            sub: None,
            token_type: None,
            exp: None,
            iat: None,
            cnf: None,
            authorization_details: None,
        }
    }
}

impl AuthServer {
    /// Handles `POST /introspect`.
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` when the caller fails authentication and
    /// `invalid_request` when no token was sent; lookup failures are not
    /// errors, they are `{active: false}`.
    pub async fn introspect(
        &self,
        request: IntrospectionRequest,
        http: &HttpRequestInfo,
    ) -> AuthResult<IntrospectionResponse> {
        authenticate_client(
            &request.credentials(),
            http,
            &self.config,
            self.clients.as_ref(),
            self.jwks_cache.as_ref(),
        )
        .await?;

        let token = request
            .token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("token is required"))?;

        let Some(resolved) = self.resolve_token(token, true).await? else {
            return Ok(IntrospectionResponse::inactive());
        };

        let active = match resolved.kind {
            // A rotated-out refresh value is not live.
            PresentedTokenKind::Refresh => {
                !resolved.grant.is_expired()
                    && resolved.grant.refresh_token.as_deref() == Some(token)
            }
            PresentedTokenKind::Access => {
                !resolved.grant.is_expired() && !resolved.grant.has_last_token_expired()
            }
        };

        if !active {
            return Ok(IntrospectionResponse::inactive());
        }

        Ok(build_active_response(&resolved.grant, resolved.kind))
    }
}

fn build_active_response(
    grant: &GrantSession,
    kind: PresentedTokenKind,
) -> IntrospectionResponse {
    let mut cnf = serde_json::Map::new();
    if let Some(jkt) = &grant.jwk_thumbprint {
        cnf.insert("jkt".to_string(), json!(jkt));
    }
    if let Some(x5t) = &grant.client_certificate_thumbprint {
        cnf.insert("x5t#S256".to_string(), json!(x5t));
    }

    let token_type = if grant.jwk_thumbprint.is_some() {
        TokenType::DPoP
    } else {
        TokenType::Bearer
    };

    let exp = match kind {
        PresentedTokenKind::Refresh => grant.expires_at.unix_timestamp(),
        PresentedTokenKind::Access => {
            grant.last_token_issued_at.unix_timestamp() + grant.options.token_options.lifetime_secs
        }
    };

    IntrospectionResponse {
        active: true,
        scope: Some(grant.active_scopes.clone()),
        client_id: Some(grant.options.client_id.clone()),
        sub: Some(grant.options.subject.clone()),
        token_type: Some(token_type),
        exp: Some(exp),
        iat: Some(grant.last_token_issued_at.unix_timestamp()),
        cnf: if cnf.is_empty() {
            None
        } else {
            Some(serde_json::Value::Object(cnf))
        },
        authorization_details: grant.options.granted_authorization_details.clone(),
    }
}
