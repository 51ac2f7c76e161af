//! Token revocation (RFC 7009).
//!
//! Client-authenticated; revoking any token of a grant deletes the whole
//! grant session. Unknown tokens and tokens owned by other clients are
//! acknowledged silently, as the RFC requires.

use serde::Deserialize;

use crate::AuthResult;
use crate::context::HttpRequestInfo;
use crate::error::OAuthError;
use crate::oauth::client_auth::{ClientCredentials, authenticate_client};
use crate::server::AuthServer;

/// The wire form of a revocation request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct RevocationRequest {
    /// The token to revoke.
    #[serde(default)]
    pub token: Option<String>,

    /// Caller's hint; ignored, every kind is tried.
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

impl RevocationRequest {
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

impl AuthServer {
    /// Handles `POST /revoke`.
    ///
    /// # Errors
    ///
    /// Returns `invalid_client` for authentication failures and
    /// `invalid_request` for a missing token parameter. A token that does
    /// not resolve is not an error.
    pub async fn revoke(
        &self,
        request: RevocationRequest,
        http: &HttpRequestInfo,
    ) -> AuthResult<()> {
        let client = authenticate_client(
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

        if let Some(resolved) = self.resolve_token(token, true).await? {
            // Only the owner may revoke; everything else is silently fine.
            if resolved.grant.options.client_id == client.id {
                tracing::debug!(client_id = %client.id, "revoking grant session");
                self.grant_sessions.delete(&resolved.grant.id).await?;
            }
        }

        Ok(())
    }
}
