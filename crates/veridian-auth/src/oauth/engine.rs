//! The authorization flow engine.
//!
//! A finite state machine over an [`AuthnSession`]: entry points create or
//! look up a session and drive the selected authentication policy until it
//! suspends (another user-agent round-trip) or reaches a terminal state.
//! Success mints the response for the negotiated response type; failure is
//! delivered as an OAuth error through the same response mode; the session
//! survives exactly until its authorization code is redeemed.

use crate::AuthResult;
use crate::config::as_time_duration;
use crate::error::OAuthError;
use crate::jose::random_token;
use crate::oauth::authorize::{AuthorizeError, AuthorizeRequest, validate_authorize_parameters};
use crate::oauth::jar;
use crate::oauth::jarm;
use crate::oauth::policy::{CallbackRequest, PolicyOutcome};
use crate::oauth::response_mode::{AuthorizeResponse, build_response};
use crate::server::AuthServer;
use crate::session::{AuthnSession, GrantOptions, GrantSession};
use crate::token::claims::{IdTokenInputs, TokenBinding, mint_access_token, mint_id_token};
use crate::types::{AuthorizationParameters, Client, GrantType, ResponseMode, ResponseType};

/// Length of the callback id parking an in-progress session.
const CALLBACK_ID_LENGTH: usize = 20;

/// Length of authorization codes.
const AUTHORIZATION_CODE_LENGTH: usize = 30;

impl AuthServer {
    /// Handles the authorization endpoint.
    ///
    /// Redirect-capable failures come back as `Ok` responses carrying the
    /// error to the client; only failures that must not redirect (bad
    /// redirect URI, dead request URI) surface as `Err`.
    ///
    /// # Errors
    ///
    /// Returns the direct error for non-redirectable failures.
    pub async fn authorize(&self, request: AuthorizeRequest) -> AuthResult<AuthorizeResponse> {
        match self.authorize_inner(request).await {
            Ok(response) => Ok(response),
            Err(error) => self.deliver_authorize_error(error).await,
        }
    }

    /// Handles the interactive callback endpoint.
    ///
    /// # Errors
    ///
    /// Returns the direct error when the callback id resolves to nothing.
    pub async fn authorize_callback(
        &self,
        callback_id: &str,
        form: CallbackRequest,
    ) -> AuthResult<AuthorizeResponse> {
        match self.callback_inner(callback_id, form).await {
            Ok(response) => Ok(response),
            Err(error) => self.deliver_authorize_error(error).await,
        }
    }

    async fn authorize_inner(
        &self,
        request: AuthorizeRequest,
    ) -> Result<AuthorizeResponse, AuthorizeError> {
        let client_id = request
            .client_id
            .clone()
            .filter(|id| !id.is_empty())
            .ok_or_else(|| {
                AuthorizeError::Direct(OAuthError::invalid_request("client_id is required"))
            })?;

        let client = self
            .load_client(&client_id)
            .await
            .map_err(AuthorizeError::Direct)?;

        let mut session = match &request.request_uri {
            Some(request_uri) => self.resume_pushed_session(&client, request_uri, &request).await?,
            None => self.start_session(&client, &request).await?,
        };

        validate_authorize_parameters(&session.parameters, &client, &self.config)?;

        self.run_policy_from_start(&client, &mut session).await
    }

    /// Loads the PAR session addressed by a request URI. The handle is
    /// single-use: the store deletes it on load.
    async fn resume_pushed_session(
        &self,
        client: &Client,
        request_uri: &str,
        request: &AuthorizeRequest,
    ) -> Result<AuthnSession, AuthorizeError> {
        if !self.config.par_enabled {
            return Err(AuthorizeError::Direct(OAuthError::invalid_request(
                "request_uri is not supported",
            )));
        }

        let mut session = self
            .authn_sessions
            .take_by_request_uri(request_uri)
            .await
            .map_err(AuthorizeError::Direct)?
            .ok_or_else(|| {
                AuthorizeError::Direct(OAuthError::invalid_request("Invalid request_uri"))
            })?;

        if session.client_id != client.id {
            return Err(AuthorizeError::Direct(OAuthError::access_denied(
                "The request_uri belongs to another client",
            )));
        }
        if session.is_expired() {
            return Err(AuthorizeError::Direct(OAuthError::invalid_request(
                "The request_uri has expired",
            )));
        }

        // Pushed parameters win over anything repeated in the query.
        session.parameters = AuthorizationParameters::merge(
            session.parameters.clone(),
            request.parameters.clone(),
        );
        session.request_uri = None;
        session.expires_at =
            time::OffsetDateTime::now_utc() + as_time_duration(self.config.lifetimes.authn_session);

        Ok(session)
    }

    /// Builds a fresh session from the query string, materializing a
    /// request object first when one is present.
    async fn start_session(
        &self,
        client: &Client,
        request: &AuthorizeRequest,
    ) -> Result<AuthnSession, AuthorizeError> {
        if self.config.par_required {
            return Err(AuthorizeError::Direct(OAuthError::invalid_request(
                "This server requires pushed authorization requests",
            )));
        }

        let jar_expected =
            self.config.jar_enabled || client.meta.request_object_signing_alg.is_some();

        let parameters = match &request.request_object {
            Some(request_object) if jar_expected => {
                let inner = jar::parse_request_object(
                    request_object,
                    client,
                    &self.config,
                    &self.jwks_cache,
                )
                .await
                .map_err(|e| AuthorizeError::redirect(e, &client.id, &request.parameters))?;
                AuthorizationParameters::merge(inner, request.parameters.clone())
            }
            Some(_) => {
                return Err(AuthorizeError::Direct(OAuthError::invalid_request(
                    "Request objects are not enabled",
                )));
            }
            None if self.config.jar_required => {
                return Err(AuthorizeError::Direct(OAuthError::invalid_request(
                    "A request object is required",
                )));
            }
            None => request.parameters.clone(),
        };

        Ok(AuthnSession::new(
            &client.id,
            parameters,
            as_time_duration(self.config.lifetimes.authn_session),
        ))
    }

    /// Selects a policy, parks the session under a callback id and runs
    /// the first authentication step.
    async fn run_policy_from_start(
        &self,
        client: &Client,
        session: &mut AuthnSession,
    ) -> Result<AuthorizeResponse, AuthorizeError> {
        let policy = self
            .config
            .policies
            .iter()
            .find(|policy| policy.set_up(client, session))
            .cloned()
            .ok_or_else(|| {
                AuthorizeError::redirect(
                    OAuthError::access_denied("No authentication policy accepts this request"),
                    &client.id,
                    &session.parameters,
                )
            })?;

        session.policy_id = Some(policy.id().to_string());
        session.callback_id = Some(random_token(CALLBACK_ID_LENGTH));
        self.authn_sessions
            .save(session)
            .await
            .map_err(AuthorizeError::Direct)?;

        let outcome = policy.authenticate(session, &CallbackRequest::default()).await;
        self.handle_policy_outcome(client, session, outcome).await
    }

    async fn callback_inner(
        &self,
        callback_id: &str,
        form: CallbackRequest,
    ) -> Result<AuthorizeResponse, AuthorizeError> {
        let mut session = self
            .authn_sessions
            .get_by_callback_id(callback_id)
            .await
            .map_err(AuthorizeError::Direct)?
            .ok_or_else(|| {
                AuthorizeError::Direct(OAuthError::invalid_request("Unknown callback"))
            })?;

        let client = self
            .load_client(&session.client_id.clone())
            .await
            .map_err(AuthorizeError::Direct)?;

        if session.is_expired() {
            self.authn_sessions
                .delete(&session.id)
                .await
                .map_err(AuthorizeError::Direct)?;
            return Err(AuthorizeError::redirect(
                OAuthError::access_denied("The authentication session has expired"),
                &client.id,
                &session.parameters,
            ));
        }

        let policy_id = session.policy_id.clone().unwrap_or_default();
        let policy = self
            .config
            .policies
            .iter()
            .find(|policy| policy.id() == policy_id)
            .cloned()
            .ok_or_else(|| {
                AuthorizeError::Direct(OAuthError::server_error(format!(
                    "Session references unknown policy {policy_id}"
                )))
            })?;

        let outcome = policy.authenticate(&mut session, &form).await;
        self.handle_policy_outcome(&client, &mut session, outcome).await
    }

    async fn handle_policy_outcome(
        &self,
        client: &Client,
        session: &mut AuthnSession,
        outcome: PolicyOutcome,
    ) -> Result<AuthorizeResponse, AuthorizeError> {
        match outcome {
            PolicyOutcome::InProgress(html) => {
                self.authn_sessions
                    .save(session)
                    .await
                    .map_err(AuthorizeError::Direct)?;
                Ok(AuthorizeResponse::Html(html))
            }
            PolicyOutcome::Failure { description } => {
                self.authn_sessions
                    .delete(&session.id)
                    .await
                    .map_err(AuthorizeError::Direct)?;
                Err(AuthorizeError::redirect(
                    OAuthError::access_denied(description),
                    &client.id,
                    &session.parameters,
                ))
            }
            PolicyOutcome::Success => self.finish_flow(client, session).await,
        }
    }

    /// Terminal success: mint the response for the negotiated response
    /// type and emit it through the response mode.
    async fn finish_flow(
        &self,
        client: &Client,
        session: &mut AuthnSession,
    ) -> Result<AuthorizeResponse, AuthorizeError> {
        let response_type = session.parameters.response_type.unwrap_or(ResponseType::Code);
        let mut parameters: Vec<(String, String)> = Vec::new();

        if let Some(state) = &session.parameters.state {
            parameters.push(("state".to_string(), state.clone()));
        }

        let code = if response_type.contains_code() {
            let code = random_token(AUTHORIZATION_CODE_LENGTH);
            session.authorization_code = Some(code.clone());
            session.auth_code_issued_at = Some(time::OffsetDateTime::now_utc());
            parameters.push(("code".to_string(), code.clone()));
            if self.config.issuer_response_parameter_enabled {
                parameters.push(("iss".to_string(), self.config.host.clone()));
            }
            Some(code)
        } else {
            None
        };

        let access_token_value = if response_type.contains_token() {
            Some(
                self.issue_implicit_token(client, session, &mut parameters, code.is_some())
                    .await?,
            )
        } else {
            None
        };

        if response_type.contains_id_token() {
            let subject = session.subject.clone().ok_or_else(|| {
                AuthorizeError::Direct(OAuthError::server_error(
                    "Policy finished without a subject",
                ))
            })?;
            let inputs = IdTokenInputs {
                access_token: access_token_value.as_deref(),
                code: code.as_deref(),
                state: session.parameters.state.as_deref(),
                nonce: session.parameters.nonce.as_deref(),
            };
            let id_token = mint_id_token(
                &subject,
                client,
                &self.config,
                &inputs,
                &session.additional_id_token_claims,
            )
            .map_err(AuthorizeError::Direct)?;
            parameters.push(("id_token".to_string(), id_token));
        }

        let mode = session.parameters.resolved_response_mode();
        if mode.is_jwt() {
            let wrapped = jarm::create_response_jwt(&parameters, client, &self.config)
                .map_err(AuthorizeError::Direct)?;
            parameters = vec![("response".to_string(), wrapped)];
        }

        let redirect_uri = session.parameters.redirect_uri.clone().ok_or_else(|| {
            AuthorizeError::Direct(OAuthError::server_error(
                "Flow finished without a redirect URI",
            ))
        })?;

        let response =
            build_response(&redirect_uri, mode, &parameters).map_err(AuthorizeError::Direct)?;

        // The session lives on only to redeem the code.
        if code.is_some() {
            self.authn_sessions
                .save(session)
                .await
                .map_err(AuthorizeError::Direct)?;
        } else {
            self.authn_sessions
                .delete(&session.id)
                .await
                .map_err(AuthorizeError::Direct)?;
        }

        Ok(response)
    }

    /// Mints the access token of an implicit or hybrid response. A grant
    /// session is persisted only when a code travels alongside; a pure
    /// implicit token is self-contained.
    async fn issue_implicit_token(
        &self,
        client: &Client,
        session: &mut AuthnSession,
        parameters: &mut Vec<(String, String)>,
        persistent: bool,
    ) -> Result<String, AuthorizeError> {
        let subject = session.subject.clone().ok_or_else(|| {
            AuthorizeError::Direct(OAuthError::server_error(
                "Policy finished without a subject",
            ))
        })?;

        let scopes = session.effective_scopes();
        let mut token_options = self.config.token_options_for(client, &scopes);
        token_options.add_claims(session.additional_token_claims.clone());

        let options = GrantOptions {
            grant_type: GrantType::Implicit,
            subject,
            client_id: client.id.clone(),
            granted_scopes: scopes.clone(),
            granted_authorization_details: session.granted_authorization_details.clone(),
            additional_id_token_claims: session.additional_id_token_claims.clone(),
            additional_userinfo_claims: session.additional_userinfo_claims.clone(),
            token_options,
        };

        let token = mint_access_token(&options, &TokenBinding::default(), &self.config)
            .map_err(AuthorizeError::Direct)?;

        parameters.push(("access_token".to_string(), token.value.clone()));
        parameters.push(("token_type".to_string(), token.token_type.as_str().to_string()));
        parameters.push((
            "expires_in".to_string(),
            options.token_options.lifetime_secs.to_string(),
        ));
        parameters.push(("scope".to_string(), scopes));

        if persistent {
            let grant = GrantSession::new(&token.id, options);
            self.grant_sessions
                .save(&grant)
                .await
                .map_err(AuthorizeError::Direct)?;
        }

        Ok(token.value)
    }

    /// Routes an authorization failure: redirect-capable errors travel to
    /// the client through the response mode, direct errors bubble to the
    /// HTTP layer. The authorize error plugin sees every error first.
    async fn deliver_authorize_error(
        &self,
        error: AuthorizeError,
    ) -> AuthResult<AuthorizeResponse> {
        match error {
            AuthorizeError::Direct(error) => Err(self.config.rewrite_authorize_error(error)),
            AuthorizeError::Redirect {
                error,
                redirect_uri,
                response_mode,
                client_id,
                state,
            } => {
                let error = self.config.rewrite_authorize_error(error);

                let mut parameters = vec![
                    ("error".to_string(), error.error_code().to_string()),
                    (
                        "error_description".to_string(),
                        error.public_description().to_string(),
                    ),
                ];
                if let Some(state) = state {
                    parameters.push(("state".to_string(), state));
                }

                let mode = if response_mode.is_jwt() && self.config.jarm_enabled {
                    match self.load_client(&client_id).await {
                        Ok(client) => {
                            let wrapped =
                                jarm::create_response_jwt(&parameters, &client, &self.config)?;
                            parameters = vec![("response".to_string(), wrapped)];
                            response_mode
                        }
                        Err(_) => ResponseMode::Query,
                    }
                } else {
                    response_mode
                };

                build_response(&redirect_uri, mode, &parameters)
            }
        }
    }

    pub(crate) async fn load_client(&self, client_id: &str) -> AuthResult<Client> {
        self.clients
            .get(client_id)
            .await?
            .ok_or_else(|| OAuthError::invalid_client("Unknown client"))
    }
}
