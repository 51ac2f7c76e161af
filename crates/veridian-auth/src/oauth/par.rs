//! Pushed authorization requests (RFC 9126).
//!
//! A client pushes its authorization parameters over an authenticated
//! back-channel call and receives an opaque request URI to hand to the
//! user-agent. The parameters are validated here, once, and frozen into an
//! [`crate::session::AuthnSession`] keyed by that URI.

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::context::HttpRequestInfo;
use crate::error::OAuthError;
use crate::jose::random_token;
use crate::oauth::authorize::validate_par_parameters;
use crate::oauth::client_auth::{ClientCredentials, authenticate_client};
use crate::oauth::jar;
use crate::server::AuthServer;
use crate::session::AuthnSession;
use crate::types::{AuthMethod, AuthorizationParameters};

/// Prefix of minted request URIs.
pub const REQUEST_URI_PREFIX: &str = "urn:ietf:params:oauth:request_uri:";

/// Length of the random part of a request URI.
const REQUEST_URI_LENGTH: usize = 20;

/// The wire form of a pushed authorization request.
#[derive(Debug, Clone, Default)]
pub struct PushedAuthorizationRequest {
    /// Client credentials from the form and headers.
    pub credentials: ClientCredentials,

    /// A signed request object, when the client pushes JAR-style.
    pub request_object: Option<String>,

    /// A `request_uri` parameter, never allowed inside PAR.
    pub request_uri: Option<String>,

    /// The plain form parameters.
    pub parameters: AuthorizationParameters,
}

/// The RFC 9126 success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PushedAuthorizationResponse {
    /// The opaque handle for the authorization endpoint.
    pub request_uri: String,

    /// Seconds until the handle expires.
    pub expires_in: u64,
}

impl AuthServer {
    /// Handles `POST /par`.
    ///
    /// # Errors
    ///
    /// Returns the validation or authentication failure; PAR errors are
    /// always delivered directly, never redirected.
    pub async fn pushed_authorization_request(
        &self,
        request: PushedAuthorizationRequest,
        http: &HttpRequestInfo,
    ) -> AuthResult<PushedAuthorizationResponse> {
        if !self.config.par_enabled {
            return Err(OAuthError::invalid_request(
                "Pushed authorization requests are not enabled",
            ));
        }

        let client = authenticate_client(
            &request.credentials,
            http,
            &self.config,
            self.clients.as_ref(),
            self.jwks_cache.as_ref(),
        )
        .await?;

        // PAR is an authenticated endpoint; public clients push through the
        // authorization endpoint instead.
        if client.meta.token_endpoint_auth_method == AuthMethod::None {
            return Err(OAuthError::invalid_client(
                "Public clients cannot use pushed authorization requests",
            ));
        }

        if request.request_uri.is_some() {
            return Err(OAuthError::invalid_request(
                "request_uri is not allowed in a pushed authorization request",
            ));
        }

        let parameters = match &request.request_object {
            Some(request_object) if self.config.jar_enabled => {
                let inner =
                    jar::parse_request_object(request_object, &client, &self.config, &self.jwks_cache)
                        .await?;
                AuthorizationParameters::merge(inner, request.parameters)
            }
            Some(_) => {
                return Err(OAuthError::invalid_request(
                    "Request objects are not enabled",
                ));
            }
            None if self.config.jar_required => {
                return Err(OAuthError::invalid_request(
                    "A request object is required",
                ));
            }
            None => request.parameters,
        };

        validate_par_parameters(&parameters, &client, &self.config)?;

        let par_lifetime = self.config.lifetimes.par;
        let mut session = AuthnSession::new(
            &client.id,
            parameters,
            crate::config::as_time_duration(par_lifetime),
        );
        let request_uri = format!("{REQUEST_URI_PREFIX}{}", random_token(REQUEST_URI_LENGTH));
        session.request_uri = Some(request_uri.clone());

        self.authn_sessions.save(&session).await?;

        tracing::debug!(client_id = %client.id, "pushed authorization request accepted");

        Ok(PushedAuthorizationResponse {
            request_uri,
            expires_in: par_lifetime.as_secs(),
        })
    }
}
