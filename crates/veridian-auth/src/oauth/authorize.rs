//! Authorization request validation.
//!
//! An ordered validator chain, first-error-wins. The redirect URI is
//! validated before everything else: until it passes, errors go straight
//! back over HTTP; after it passes, errors are redirect-capable and travel
//! to the client through the negotiated response mode.

use crate::config::{Configuration, Profile};
use crate::error::OAuthError;
use crate::types::{
    AuthorizationParameters, Client, GrantType, ResponseMode, ResponseType,
};

/// The wire form of an authorization request.
#[derive(Debug, Clone, Default)]
pub struct AuthorizeRequest {
    /// `client_id` query parameter.
    pub client_id: Option<String>,

    /// `request_uri` pointing at a PAR session.
    pub request_uri: Option<String>,

    /// `request` object (JAR).
    pub request_object: Option<String>,

    /// All plain query parameters.
    pub parameters: AuthorizationParameters,
}

/// An authorization failure, split by whether it may be redirected.
#[derive(Debug, Clone)]
pub enum AuthorizeError {
    /// Returned directly over HTTP: the redirect URI never validated, or
    /// the artifact addressed (request_uri, callback) is gone.
    Direct(OAuthError),

    /// Delivered to the client through the response mode.
    Redirect {
        /// The underlying error.
        error: OAuthError,
        /// Where to deliver it.
        redirect_uri: String,
        /// How to deliver it.
        response_mode: ResponseMode,
        /// The client being answered.
        client_id: String,
        /// Echoed state.
        state: Option<String>,
    },
}

impl AuthorizeError {
    /// Wraps an error as redirect-capable using the request parameters.
    #[must_use]
    pub fn redirect(error: OAuthError, client_id: &str, params: &AuthorizationParameters) -> Self {
        match &params.redirect_uri {
            Some(redirect_uri) => Self::Redirect {
                error,
                redirect_uri: redirect_uri.clone(),
                response_mode: params.resolved_response_mode(),
                client_id: client_id.to_string(),
                state: params.state.clone(),
            },
            None => Self::Direct(error),
        }
    }

    /// The underlying error.
    #[must_use]
    pub fn error(&self) -> &OAuthError {
        match self {
            Self::Direct(error) | Self::Redirect { error, .. } => error,
        }
    }
}

/// Runs the full chain for the authorization endpoint. The redirect URI is
/// mandatory here.
///
/// # Errors
///
/// The first failing rule, redirect-capable once the redirect URI passed.
pub fn validate_authorize_parameters(
    params: &AuthorizationParameters,
    client: &Client,
    config: &Configuration,
) -> Result<(), AuthorizeError> {
    validate_redirect_uri(params, client, true).map_err(AuthorizeError::Direct)?;

    run_common_chain(params, client, config, true)
        .map_err(|error| AuthorizeError::redirect(error, &client.id, params))
}

/// Runs the chain for PAR. Everything is returned directly; the redirect
/// URI may be absent outside FAPI 2.0 (it can still arrive at the
/// authorization endpoint).
///
/// # Errors
///
/// The first failing rule.
pub fn validate_par_parameters(
    params: &AuthorizationParameters,
    client: &Client,
    config: &Configuration,
) -> Result<(), OAuthError> {
    let redirect_required = config.profile == Profile::Fapi2;
    validate_redirect_uri(params, client, redirect_required)?;
    run_common_chain(params, client, config, false)
}

fn validate_redirect_uri(
    params: &AuthorizationParameters,
    client: &Client,
    required: bool,
) -> Result<(), OAuthError> {
    match params.redirect_uri.as_deref() {
        Some(uri) if client.is_redirect_uri_allowed(uri) => Ok(()),
        Some(_) => Err(OAuthError::invalid_request("Invalid redirect_uri")),
        None if required => Err(OAuthError::invalid_request("redirect_uri is required")),
        None => Ok(()),
    }
}

/// The shared rule list, in order. `strict` is true at the authorization
/// endpoint, where a response type must have been negotiated.
fn run_common_chain(
    params: &AuthorizationParameters,
    client: &Client,
    config: &Configuration,
    strict: bool,
) -> Result<(), OAuthError> {
    validate_response_type(params, client, config, strict)?;
    validate_response_mode(params, config)?;
    validate_scopes(params, client, config)?;
    validate_pkce(params, client, config)?;
    validate_authorization_details(params, client, config)?;
    validate_nonce(params)?;
    validate_syntax(params)?;
    Ok(())
}

fn validate_response_type(
    params: &AuthorizationParameters,
    client: &Client,
    config: &Configuration,
    strict: bool,
) -> Result<(), OAuthError> {
    let response_type = match params.response_type {
        Some(rt) => rt,
        None if strict => {
            return Err(OAuthError::invalid_request("response_type is required"));
        }
        None => return Ok(()),
    };

    if !config.response_types.contains(&response_type) {
        return Err(OAuthError::unsupported_response_type(
            response_type.as_str(),
        ));
    }
    if !client.is_response_type_allowed(response_type) {
        return Err(OAuthError::unauthorized_client(
            "Client may not use this response_type",
        ));
    }
    if response_type.contains_code() && !client.is_grant_type_allowed(GrantType::AuthorizationCode)
    {
        return Err(OAuthError::unauthorized_client(
            "response_type code requires the authorization_code grant",
        ));
    }
    if response_type.is_implicit() && !client.is_grant_type_allowed(GrantType::Implicit) {
        return Err(OAuthError::unauthorized_client(
            "Implicit response types require the implicit grant",
        ));
    }

    Ok(())
}

fn validate_response_mode(
    params: &AuthorizationParameters,
    config: &Configuration,
) -> Result<(), OAuthError> {
    let Some(mode) = params.response_mode else {
        return Ok(());
    };

    if !config.is_response_mode_enabled(mode) {
        return Err(OAuthError::invalid_request(format!(
            "response_mode {mode} is not enabled"
        )));
    }
    if mode.is_jwt() && !config.jarm_enabled {
        return Err(OAuthError::invalid_request(
            "JWT response modes require JARM",
        ));
    }

    // Tokens must never land in a query string.
    if let Some(response_type) = params.response_type {
        if response_type.is_implicit() && mode.is_query() {
            return Err(OAuthError::invalid_request(
                "response_mode query cannot carry implicit responses",
            ));
        }
    }

    Ok(())
}

fn validate_scopes(
    params: &AuthorizationParameters,
    client: &Client,
    config: &Configuration,
) -> Result<(), OAuthError> {
    let scope = params.scope.as_deref().unwrap_or_default();

    if config.openid_scope_required && !params.has_openid_scope() {
        return Err(OAuthError::invalid_scope("The openid scope is required"));
    }
    if scope.is_empty() {
        return Ok(());
    }
    if !client.are_scopes_allowed(&config.scopes, scope) {
        return Err(OAuthError::invalid_scope("Requested scope not allowed"));
    }

    Ok(())
}

fn validate_pkce(
    params: &AuthorizationParameters,
    client: &Client,
    config: &Configuration,
) -> Result<(), OAuthError> {
    if !config.pkce_enabled {
        return Ok(());
    }

    let challenge_required = config.pkce_required
        || config.profile == Profile::Fapi2
        || (client.is_public() && client.hashed_secret.is_none());

    match (&params.code_challenge, params.code_challenge_method) {
        (None, _) if challenge_required => {
            Err(OAuthError::invalid_request("PKCE is required"))
        }
        (None, _) => Ok(()),
        (Some(challenge), method) => {
            if challenge.is_empty() {
                return Err(OAuthError::invalid_request("Empty code_challenge"));
            }
            if let Some(method) = method {
                if !config.code_challenge_methods.contains(&method) {
                    return Err(OAuthError::invalid_request(format!(
                        "code_challenge_method {method} is not enabled"
                    )));
                }
            }
            Ok(())
        }
    }
}

fn validate_authorization_details(
    params: &AuthorizationParameters,
    client: &Client,
    config: &Configuration,
) -> Result<(), OAuthError> {
    let Some(details) = &params.authorization_details else {
        return Ok(());
    };

    if !config.authorization_details_enabled {
        return Err(OAuthError::invalid_request(
            "authorization_details are not enabled",
        ));
    }

    for detail in details {
        let Some(detail_type) = detail.detail_type() else {
            return Err(OAuthError::invalid_request(
                "authorization_details entry without type",
            ));
        };
        if !client.is_authorization_detail_type_allowed(detail_type) {
            return Err(OAuthError::invalid_request(format!(
                "authorization_details type {detail_type} not allowed for this client"
            )));
        }
    }

    Ok(())
}

fn validate_nonce(params: &AuthorizationParameters) -> Result<(), OAuthError> {
    if let Some(response_type) = params.response_type {
        if response_type.contains_id_token()
            && params.nonce.as_deref().unwrap_or_default().is_empty()
        {
            return Err(OAuthError::invalid_request(
                "nonce is required when the response includes an id_token",
            ));
        }
    }
    Ok(())
}

fn validate_syntax(params: &AuthorizationParameters) -> Result<(), OAuthError> {
    if let Some(max_age) = params.max_age {
        if max_age < 0 {
            return Err(OAuthError::invalid_request("max_age must not be negative"));
        }
    }
    Ok(())
}
