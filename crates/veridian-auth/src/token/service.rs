//! The token endpoint.
//!
//! Grant dispatch in the documented order: parse, DPoP, client
//! authentication, per-grant validation, minting, session persistence.
//! During code redemption the authentication session is fetched
//! concurrently with client authentication and deleted on load, so a code
//! is consumed exactly once even under races.

use serde::{Deserialize, Serialize};

use crate::AuthResult;
use crate::config::as_time_duration;
use crate::context::HttpRequestInfo;
use crate::error::OAuthError;
use crate::jose::random_token;
use crate::oauth::client_auth::{ClientCredentials, authenticate_client};
use crate::oauth::dpop::{self, DpopProof};
use crate::oauth::pkce;
use crate::server::AuthServer;
use crate::session::{AuthnSession, GrantOptions, GrantSession, TokenFormat, TokenType};
use crate::token::claims::{IdTokenInputs, TokenBinding, mint_access_token, mint_id_token};
use crate::types::{AuthorizationDetail, Client, CodeChallengeMethod, GrantType};

/// Length of refresh tokens.
const REFRESH_TOKEN_LENGTH: usize = 30;

/// Scratch keys of the consumed-code tombstone session.
const CONSUMED_MARKER: &str = "consumed_code";
const TOMBSTONE_GRANT_ID: &str = "grant_session_id";

/// The wire form of a token request.
#[derive(Debug, Clone, Default, Deserialize)]
pub struct TokenRequest {
    /// `grant_type`, required.
    #[serde(default)]
    pub grant_type: Option<String>,

    /// Authorization code (authorization_code grant).
    #[serde(default)]
    pub code: Option<String>,

    /// Redirect URI, must equal the one authorized.
    #[serde(default)]
    pub redirect_uri: Option<String>,

    /// PKCE verifier.
    #[serde(default)]
    pub code_verifier: Option<String>,

    /// Refresh token (refresh_token grant).
    #[serde(default)]
    pub refresh_token: Option<String>,

    /// Requested scope.
    #[serde(default)]
    pub scope: Option<String>,

    /// Bearer assertion (jwt-bearer grant).
    #[serde(default)]
    pub assertion: Option<String>,

    /// Client id (public clients, client_secret_post).
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

impl TokenRequest {
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

/// The token endpoint success body.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TokenResponse {
    /// The access token value.
    pub access_token: String,

    /// `Bearer` or `DPoP`.
    pub token_type: TokenType,

    /// Access token lifetime in seconds.
    pub expires_in: i64,

    /// Granted scopes, space-delimited.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub scope: Option<String>,

    /// ID token, when `openid` was granted.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub id_token: Option<String>,

    /// Refresh token, when issued.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub refresh_token: Option<String>,

    /// Granted authorization details.
    #[serde(skip_serializing_if = "Option::is_none")]
    pub authorization_details: Option<Vec<AuthorizationDetail>>,
}

impl AuthServer {
    /// Handles `POST /token`.
    ///
    /// # Errors
    ///
    /// Returns the typed OAuth error for the failing step.
    pub async fn token(
        &self,
        request: TokenRequest,
        http: &HttpRequestInfo,
    ) -> AuthResult<TokenResponse> {
        let grant_type_raw = request
            .grant_type
            .as_deref()
            .filter(|g| !g.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("grant_type is required"))?;

        let grant_type = GrantType::parse(grant_type_raw)
            .ok_or_else(|| OAuthError::unsupported_grant_type(grant_type_raw))?;
        if grant_type == GrantType::Implicit || !self.config.is_grant_type_enabled(grant_type) {
            return Err(OAuthError::unsupported_grant_type(grant_type_raw));
        }

        let dpop = self.validate_token_dpop(http)?;

        tracing::debug!(grant_type = %grant_type, "processing token request");

        match grant_type {
            GrantType::AuthorizationCode => {
                self.authorization_code_grant(request, http, dpop).await
            }
            GrantType::ClientCredentials => {
                let client = self.authenticate_token_client(&request, http).await?;
                self.client_credentials_grant(&client, &request, dpop.as_ref(), http)
                    .await
            }
            GrantType::RefreshToken => {
                let client = self.authenticate_token_client(&request, http).await?;
                self.refresh_token_grant(&client, &request, dpop.as_ref(), http)
                    .await
            }
            GrantType::JwtBearer => {
                let client = self.authenticate_token_client(&request, http).await?;
                self.jwt_bearer_grant(&client, &request, dpop.as_ref(), http)
                    .await
            }
            GrantType::Implicit => unreachable!("rejected above"),
        }
    }

    async fn authenticate_token_client(
        &self,
        request: &TokenRequest,
        http: &HttpRequestInfo,
    ) -> AuthResult<Client> {
        authenticate_client(
            &request.credentials(),
            http,
            &self.config,
            self.clients.as_ref(),
            self.jwks_cache.as_ref(),
        )
        .await
    }

    fn validate_token_dpop(&self, http: &HttpRequestInfo) -> AuthResult<Option<DpopProof>> {
        match &http.dpop_proof {
            Some(proof) if self.config.dpop_enabled => Ok(Some(dpop::validate_proof(
                proof,
                &http.method,
                &http.url,
                &self.config,
                None,
            )?)),
            Some(_) => Ok(None),
            None if self.config.dpop_required => Err(OAuthError::invalid_request(
                "This server requires DPoP proofs",
            )),
            None => Ok(None),
        }
    }

    /// Resolves the binding of a new token from the DPoP proof and the
    /// peer certificate.
    fn token_binding(
        &self,
        client: &Client,
        dpop: Option<&DpopProof>,
        http: &HttpRequestInfo,
    ) -> AuthResult<TokenBinding> {
        if client.meta.dpop_bound_access_tokens && dpop.is_none() {
            return Err(OAuthError::invalid_request(
                "This client requires DPoP-bound tokens",
            ));
        }

        let certificate_thumbprint = if self.config.tls_bound_tokens_enabled {
            http.client_certificate
                .as_ref()
                .map(crate::oauth::mtls::ClientCertificate::thumbprint_sha256)
        } else {
            None
        };

        Ok(TokenBinding {
            jwk_thumbprint: dpop.map(|proof| proof.thumbprint.clone()),
            certificate_thumbprint,
        })
    }

    // -------------------------------------------------------------------
    // client_credentials
    // -------------------------------------------------------------------

    async fn client_credentials_grant(
        &self,
        client: &Client,
        request: &TokenRequest,
        dpop: Option<&DpopProof>,
        http: &HttpRequestInfo,
    ) -> AuthResult<TokenResponse> {
        if request.code.is_some() || request.redirect_uri.is_some() || request.refresh_token.is_some()
        {
            return Err(OAuthError::invalid_request(
                "Invalid parameter for the client_credentials grant",
            ));
        }
        if !client.is_grant_type_allowed(GrantType::ClientCredentials) {
            return Err(OAuthError::unauthorized_client(
                "Client may not use client_credentials",
            ));
        }

        let scopes = match request.scope.as_deref().filter(|s| !s.is_empty()) {
            Some(requested) => {
                if !client.are_scopes_allowed(&self.config.scopes, requested) {
                    return Err(OAuthError::invalid_scope("Requested scope not allowed"));
                }
                requested.to_string()
            }
            None => client.meta.scope.clone(),
        };

        let binding = self.token_binding(client, dpop, http)?;
        let options = GrantOptions {
            grant_type: GrantType::ClientCredentials,
            subject: client.id.clone(),
            client_id: client.id.clone(),
            granted_scopes: scopes.clone(),
            granted_authorization_details: None,
            additional_id_token_claims: serde_json::Map::new(),
            additional_userinfo_claims: serde_json::Map::new(),
            token_options: self.config.token_options_for(client, &scopes),
        };

        let token = mint_access_token(&options, &binding, &self.config)?;
        let expires_in = options.token_options.lifetime_secs;

        let mut grant = GrantSession::new(&token.id, options);
        grant.jwk_thumbprint = binding.jwk_thumbprint.clone();
        grant.client_certificate_thumbprint = binding.certificate_thumbprint.clone();
        self.grant_sessions.save(&grant).await?;

        Ok(TokenResponse {
            access_token: token.value,
            token_type: token.token_type,
            expires_in,
            scope: Some(scopes),
            id_token: None,
            refresh_token: None,
            authorization_details: None,
        })
    }

    // -------------------------------------------------------------------
    // authorization_code
    // -------------------------------------------------------------------

    async fn authorization_code_grant(
        &self,
        request: TokenRequest,
        http: &HttpRequestInfo,
        dpop: Option<DpopProof>,
    ) -> AuthResult<TokenResponse> {
        let code = request
            .code
            .as_deref()
            .filter(|c| !c.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("code is required"))?;
        if request.refresh_token.is_some() || request.scope.is_some() {
            return Err(OAuthError::invalid_request(
                "Invalid parameter for the authorization_code grant",
            ));
        }
        if let Some(verifier) = request.code_verifier.as_deref() {
            pkce::validate_verifier(verifier)?;
        }

        // The session fetch and the client authentication are independent;
        // run them concurrently and join before validation. The fetch
        // deletes the session, so the code is burned even when client
        // authentication fails.
        let (client_result, session_result) = tokio::join!(
            self.authenticate_token_client(&request, http),
            self.authn_sessions.take_by_authorization_code(code)
        );
        let client = client_result?;
        let session = session_result?.ok_or_else(|| {
            OAuthError::invalid_grant("Invalid authorization code")
        })?;

        // A tombstone means the code was already redeemed: revoke whatever
        // grant it produced.
        if session.stored_value(CONSUMED_MARKER).is_some() {
            if let Some(grant_id) = session
                .stored_value(TOMBSTONE_GRANT_ID)
                .and_then(serde_json::Value::as_str)
            {
                tracing::warn!(client_id = %client.id, "authorization code replayed, revoking grant");
                self.grant_sessions.delete(grant_id).await?;
            }
            return Err(OAuthError::invalid_grant("Invalid authorization code"));
        }

        if !client.is_grant_type_allowed(GrantType::AuthorizationCode) {
            return Err(OAuthError::unauthorized_client(
                "Client may not use authorization_code",
            ));
        }
        if session.client_id != client.id {
            return Err(OAuthError::invalid_grant(
                "The authorization code was not issued to this client",
            ));
        }
        if session.is_authorization_code_expired(as_time_duration(
            self.config.lifetimes.authorization_code,
        )) {
            return Err(OAuthError::invalid_grant("The authorization code has expired"));
        }
        if session.parameters.redirect_uri != request.redirect_uri {
            return Err(OAuthError::invalid_grant("redirect_uri does not match"));
        }
        self.verify_pkce(&session, request.code_verifier.as_deref())?;

        let binding = self.token_binding(&client, dpop.as_ref(), http)?;
        let subject = session
            .subject
            .clone()
            .ok_or_else(|| OAuthError::server_error("Session has no subject"))?;
        let scopes = session.effective_scopes();

        let mut token_options = self.config.token_options_for(&client, &scopes);
        token_options.add_claims(session.additional_token_claims.clone());

        let options = GrantOptions {
            grant_type: GrantType::AuthorizationCode,
            subject: subject.clone(),
            client_id: client.id.clone(),
            granted_scopes: scopes.clone(),
            granted_authorization_details: session.granted_authorization_details.clone(),
            additional_id_token_claims: session.additional_id_token_claims.clone(),
            additional_userinfo_claims: session.additional_userinfo_claims.clone(),
            token_options,
        };

        let token = mint_access_token(&options, &binding, &self.config)?;
        let expires_in = options.token_options.lifetime_secs;

        let id_token = if options.granted_scopes.split_whitespace().any(|s| s == "openid") {
            let inputs = IdTokenInputs {
                access_token: Some(&token.value),
                code: None,
                state: None,
                nonce: session.parameters.nonce.as_deref(),
            };
            Some(mint_id_token(
                &subject,
                &client,
                &self.config,
                &inputs,
                &options.additional_id_token_claims,
            )?)
        } else {
            None
        };

        let offline = options
            .granted_scopes
            .split_whitespace()
            .any(|s| s == "offline_access")
            && client.is_grant_type_allowed(GrantType::RefreshToken);

        let needs_grant_session = options.token_options.format == TokenFormat::Opaque
            || offline
            || id_token.is_some();

        let mut refresh_token = None;
        let mut grant = GrantSession::new(&token.id, options);
        grant.jwk_thumbprint = binding.jwk_thumbprint.clone();
        grant.client_certificate_thumbprint = binding.certificate_thumbprint.clone();

        if offline {
            let value = random_token(REFRESH_TOKEN_LENGTH);
            grant.refresh_token = Some(value.clone());
            grant.expires_at = time::OffsetDateTime::now_utc()
                + as_time_duration(self.config.lifetimes.refresh_token);
            refresh_token = Some(value);
        }

        if needs_grant_session {
            self.grant_sessions.save(&grant).await?;
            self.save_code_tombstone(&session, code, Some(&grant.id)).await?;
        } else {
            self.save_code_tombstone(&session, code, None).await?;
        }

        Ok(TokenResponse {
            access_token: token.value,
            token_type: token.token_type,
            expires_in,
            scope: Some(grant.options.granted_scopes.clone()),
            id_token,
            refresh_token,
            authorization_details: grant.options.granted_authorization_details.clone(),
        })
    }

    fn verify_pkce(&self, session: &AuthnSession, verifier: Option<&str>) -> AuthResult<()> {
        let Some(challenge) = session.parameters.code_challenge.as_deref() else {
            return Ok(());
        };

        let method = session
            .parameters
            .code_challenge_method
            .unwrap_or(CodeChallengeMethod::Plain);

        match verifier {
            Some(verifier) if pkce::is_valid(verifier, challenge, method) => Ok(()),
            Some(_) => Err(OAuthError::invalid_grant("Invalid PKCE verifier")),
            None => Err(OAuthError::invalid_request("code_verifier is required")),
        }
    }

    /// Re-parks the redeemed code as a tombstone so a replay can be told
    /// apart from garbage and can revoke the grant it once produced.
    async fn save_code_tombstone(
        &self,
        session: &AuthnSession,
        code: &str,
        grant_id: Option<&str>,
    ) -> AuthResult<()> {
        let mut tombstone = AuthnSession::new(
            &session.client_id,
            crate::types::AuthorizationParameters::default(),
            as_time_duration(self.config.lifetimes.authorization_code),
        );
        tombstone.authorization_code = Some(code.to_string());
        tombstone.store_value(CONSUMED_MARKER, serde_json::json!(true));
        if let Some(grant_id) = grant_id {
            tombstone.store_value(TOMBSTONE_GRANT_ID, serde_json::json!(grant_id));
        }
        self.authn_sessions.save(&tombstone).await
    }

    // -------------------------------------------------------------------
    // refresh_token
    // -------------------------------------------------------------------

    async fn refresh_token_grant(
        &self,
        client: &Client,
        request: &TokenRequest,
        dpop: Option<&DpopProof>,
        http: &HttpRequestInfo,
    ) -> AuthResult<TokenResponse> {
        let presented = request
            .refresh_token
            .as_deref()
            .filter(|t| !t.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("refresh_token is required"))?;
        if request.code.is_some() || request.redirect_uri.is_some() {
            return Err(OAuthError::invalid_request(
                "Invalid parameter for the refresh_token grant",
            ));
        }
        if !client.is_grant_type_allowed(GrantType::RefreshToken) {
            return Err(OAuthError::unauthorized_client(
                "Client may not use refresh_token",
            ));
        }

        let mut grant = self
            .grant_sessions
            .get_by_refresh_token(presented)
            .await?
            .ok_or_else(|| OAuthError::invalid_grant("Invalid refresh token"))?;

        if grant.options.client_id != client.id {
            return Err(OAuthError::invalid_grant(
                "The refresh token was not issued to this client",
            ));
        }

        // A retired token coming back is a replay: kill the session.
        if grant.previous_refresh_token.as_deref() == Some(presented) {
            tracing::warn!(client_id = %client.id, "refresh token replayed, revoking grant");
            self.grant_sessions.delete(&grant.id).await?;
            return Err(OAuthError::invalid_grant("Refresh token has been rotated"));
        }

        if grant.is_expired() {
            self.grant_sessions.delete(&grant.id).await?;
            return Err(OAuthError::invalid_grant("The refresh session has expired"));
        }

        self.verify_presented_binding(&grant, dpop, http)?;

        // A narrower scope may be requested; never a wider one.
        let scopes = match request.scope.as_deref().filter(|s| !s.is_empty()) {
            Some(requested) => {
                let granted: Vec<&str> = grant.options.granted_scopes.split_whitespace().collect();
                if !requested.split_whitespace().all(|s| granted.contains(&s)) {
                    return Err(OAuthError::invalid_scope(
                        "Requested scope exceeds the granted scope",
                    ));
                }
                requested.to_string()
            }
            None => grant.options.granted_scopes.clone(),
        };

        let binding = TokenBinding {
            jwk_thumbprint: grant.jwk_thumbprint.clone(),
            certificate_thumbprint: grant.client_certificate_thumbprint.clone(),
        };
        let mut mint_options = grant.options.clone();
        mint_options.granted_scopes = scopes.clone();
        let token = mint_access_token(&mint_options, &binding, &self.config)?;
        let expires_in = grant.options.token_options.lifetime_secs;

        // Rotate.
        let now = time::OffsetDateTime::now_utc();
        let new_refresh = random_token(REFRESH_TOKEN_LENGTH);
        grant.previous_refresh_token = grant.refresh_token.take();
        grant.refresh_token = Some(new_refresh.clone());
        grant.token_id = token.id.clone();
        grant.last_token_issued_at = now;
        grant.expires_at = now + as_time_duration(self.config.lifetimes.refresh_token);
        grant.active_scopes = scopes.clone();
        self.grant_sessions.save(&grant).await?;

        let id_token = if scopes.split_whitespace().any(|s| s == "openid") {
            let inputs = IdTokenInputs {
                access_token: Some(&token.value),
                code: None,
                state: None,
                nonce: None,
            };
            Some(mint_id_token(
                &grant.options.subject,
                client,
                &self.config,
                &inputs,
                &grant.options.additional_id_token_claims,
            )?)
        } else {
            None
        };

        Ok(TokenResponse {
            access_token: token.value,
            token_type: token.token_type,
            expires_in,
            scope: Some(scopes),
            id_token,
            refresh_token: Some(new_refresh),
            authorization_details: grant.options.granted_authorization_details.clone(),
        })
    }

    /// A bound grant only refreshes when the presenter proves possession
    /// of the bound key or certificate.
    fn verify_presented_binding(
        &self,
        grant: &GrantSession,
        dpop: Option<&DpopProof>,
        http: &HttpRequestInfo,
    ) -> AuthResult<()> {
        if let Some(expected) = &grant.jwk_thumbprint {
            match dpop {
                Some(proof) if &proof.thumbprint == expected => {}
                _ => {
                    return Err(OAuthError::invalid_grant(
                        "Refresh token is bound to another DPoP key",
                    ));
                }
            }
        }
        if let Some(expected) = &grant.client_certificate_thumbprint {
            let presented = http
                .client_certificate
                .as_ref()
                .map(crate::oauth::mtls::ClientCertificate::thumbprint_sha256);
            if presented.as_deref() != Some(expected.as_str()) {
                return Err(OAuthError::invalid_grant(
                    "Refresh token is bound to another certificate",
                ));
            }
        }
        Ok(())
    }

    // -------------------------------------------------------------------
    // urn:ietf:params:oauth:grant-type:jwt-bearer
    // -------------------------------------------------------------------

    async fn jwt_bearer_grant(
        &self,
        client: &Client,
        request: &TokenRequest,
        dpop: Option<&DpopProof>,
        http: &HttpRequestInfo,
    ) -> AuthResult<TokenResponse> {
        let assertion = request
            .assertion
            .as_deref()
            .filter(|a| !a.is_empty())
            .ok_or_else(|| OAuthError::invalid_request("assertion is required"))?;
        if !client.is_grant_type_allowed(GrantType::JwtBearer) {
            return Err(OAuthError::unauthorized_client(
                "Client may not use the jwt-bearer grant",
            ));
        }

        let subject = self.verify_bearer_assertion(assertion, client).await?;

        let scopes = match request.scope.as_deref().filter(|s| !s.is_empty()) {
            Some(requested) => {
                if !client.are_scopes_allowed(&self.config.scopes, requested) {
                    return Err(OAuthError::invalid_scope("Requested scope not allowed"));
                }
                requested.to_string()
            }
            None => client.meta.scope.clone(),
        };

        let binding = self.token_binding(client, dpop, http)?;
        let options = GrantOptions {
            grant_type: GrantType::JwtBearer,
            subject,
            client_id: client.id.clone(),
            granted_scopes: scopes.clone(),
            granted_authorization_details: None,
            additional_id_token_claims: serde_json::Map::new(),
            additional_userinfo_claims: serde_json::Map::new(),
            token_options: self.config.token_options_for(client, &scopes),
        };

        let token = mint_access_token(&options, &binding, &self.config)?;
        let expires_in = options.token_options.lifetime_secs;

        let mut grant = GrantSession::new(&token.id, options);
        grant.jwk_thumbprint = binding.jwk_thumbprint.clone();
        grant.client_certificate_thumbprint = binding.certificate_thumbprint.clone();
        self.grant_sessions.save(&grant).await?;

        Ok(TokenResponse {
            access_token: token.value,
            token_type: token.token_type,
            expires_in,
            scope: Some(scopes),
            id_token: None,
            refresh_token: None,
            authorization_details: None,
        })
    }

    /// Verifies a jwt-bearer assertion with the client's keys; its subject
    /// becomes the grant subject.
    async fn verify_bearer_assertion(&self, assertion: &str, client: &Client) -> AuthResult<String> {
        let header = crate::jose::jwt::peek_header(assertion)
            .map_err(|_| OAuthError::invalid_grant("Malformed assertion"))?;
        if crate::jose::is_symmetric(header.alg) {
            return Err(OAuthError::invalid_grant(
                "Bearer assertions must use an asymmetric algorithm",
            ));
        }
        if !self.config.client_signing_algorithms.contains(&header.alg) {
            return Err(OAuthError::invalid_grant(format!(
                "Assertion algorithm {:?} not accepted",
                header.alg
            )));
        }

        let key = self
            .jwks_cache
            .decoding_key_for_client(client, header.kid.as_deref(), &[header.alg])
            .await
            .map_err(|e| OAuthError::invalid_grant(e.public_description().to_string()))?;

        let options = crate::jose::VerifyOptions::new(vec![header.alg]);
        let claims: serde_json::Value = crate::jose::jwt::verify(assertion, &key, &options)
            .map_err(|e| OAuthError::invalid_grant(format!("Invalid assertion: {e}")))?;

        if claims.get("iss").and_then(serde_json::Value::as_str) != Some(client.id.as_str()) {
            return Err(OAuthError::invalid_grant(
                "Assertion issuer must be the client",
            ));
        }
        let aud_ok = match claims.get("aud") {
            Some(serde_json::Value::String(aud)) => {
                aud == &self.config.host || aud == &self.config.token_endpoint()
            }
            Some(serde_json::Value::Array(auds)) => auds
                .iter()
                .filter_map(serde_json::Value::as_str)
                .any(|aud| aud == self.config.host || aud == self.config.token_endpoint()),
            _ => false,
        };
        if !aud_ok {
            return Err(OAuthError::invalid_grant(
                "Assertion audience must name this server",
            ));
        }

        claims
            .get("sub")
            .and_then(serde_json::Value::as_str)
            .map(str::to_string)
            .ok_or_else(|| OAuthError::invalid_grant("Assertion has no subject"))
    }
}

