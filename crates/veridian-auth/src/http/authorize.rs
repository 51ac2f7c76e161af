//! Authorization endpoint handlers.

use std::collections::HashMap;

use axum::Form;
use axum::extract::{Path, Query, State};
use axum::http::StatusCode;
use axum::response::{Html, IntoResponse, Redirect, Response};

use crate::context::HttpRequestInfo;
use crate::oauth::authorize::AuthorizeRequest;
use crate::oauth::policy::CallbackRequest;
use crate::oauth::response_mode::AuthorizeResponse;
use crate::server::AuthServer;
use crate::types::{
    AuthorizationParameters, CodeChallengeMethod, DisplayValue, Prompt, ResponseMode, ResponseType,
};

/// Handler for `GET /authorize`.
pub async fn authorize_handler(
    State(server): State<AuthServer>,
    Query(query): Query<HashMap<String, String>>,
) -> Response {
    run_authorize(server, query).await
}

/// Handler for `POST /authorize` (form-encoded parameters).
pub async fn authorize_post_handler(
    State(server): State<AuthServer>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    run_authorize(server, form).await
}

async fn run_authorize(server: AuthServer, raw: HashMap<String, String>) -> Response {
    let request = parse_authorize_request(&raw);

    match server.authorize(request).await {
        Ok(response) => into_http(response),
        Err(error) => {
            // The authorization endpoint has no client credentials; direct
            // errors are always plain JSON.
            super::error_response(&error, &HttpRequestInfo::default())
        }
    }
}

/// Handler for `POST /authorize/{callback_id}`.
pub async fn callback_handler(
    State(server): State<AuthServer>,
    Path(callback_id): Path<String>,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let request = CallbackRequest { form };

    match server.authorize_callback(&callback_id, request).await {
        Ok(response) => into_http(response),
        Err(error) => super::error_response(&error, &HttpRequestInfo::default()),
    }
}

fn into_http(response: AuthorizeResponse) -> Response {
    match response {
        AuthorizeResponse::Redirect(url) => Redirect::to(&url).into_response(),
        AuthorizeResponse::Html(body) => (StatusCode::OK, Html(body)).into_response(),
    }
}

/// Parses the raw query/form pairs into the engine's request type. Values
/// that do not parse are dropped; the validator chain reports what is
/// missing or inconsistent.
#[must_use]
pub fn parse_authorize_request(raw: &HashMap<String, String>) -> AuthorizeRequest {
    AuthorizeRequest {
        client_id: raw.get("client_id").cloned(),
        request_uri: raw.get("request_uri").cloned(),
        request_object: raw.get("request").cloned(),
        parameters: parse_authorization_parameters(raw),
    }
}

/// Parses the plain authorization parameters out of query/form pairs.
#[must_use]
pub fn parse_authorization_parameters(raw: &HashMap<String, String>) -> AuthorizationParameters {
    AuthorizationParameters {
        redirect_uri: raw.get("redirect_uri").cloned(),
        response_mode: raw
            .get("response_mode")
            .and_then(|v| ResponseMode::parse(v)),
        response_type: raw
            .get("response_type")
            .and_then(|v| ResponseType::parse(v)),
        scope: raw.get("scope").cloned(),
        state: raw.get("state").cloned(),
        nonce: raw.get("nonce").cloned(),
        code_challenge: raw.get("code_challenge").cloned(),
        code_challenge_method: raw.get("code_challenge_method").and_then(|v| match v.as_str() {
            "plain" => Some(CodeChallengeMethod::Plain),
            "S256" => Some(CodeChallengeMethod::S256),
            _ => None,
        }),
        prompt: raw
            .get("prompt")
            .and_then(|v| serde_json::from_value::<Prompt>(serde_json::json!(v)).ok()),
        max_age: raw.get("max_age").and_then(|v| v.parse().ok()),
        display: raw
            .get("display")
            .and_then(|v| serde_json::from_value::<DisplayValue>(serde_json::json!(v)).ok()),
        acr_values: raw.get("acr_values").cloned(),
        claims: raw
            .get("claims")
            .and_then(|v| serde_json::from_str(v).ok()),
        authorization_details: raw
            .get("authorization_details")
            .and_then(|v| serde_json::from_str(v).ok()),
    }
}
