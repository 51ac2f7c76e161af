//! Pushed authorization request handler.

use std::collections::HashMap;

use axum::Form;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::oauth::client_auth::ClientCredentials;
use crate::oauth::par::PushedAuthorizationRequest;
use crate::server::AuthServer;

use super::authorize::parse_authorization_parameters;

/// Handler for `POST /par`. Succeeds with 201 and the request URI body.
pub async fn par_handler(
    State(server): State<AuthServer>,
    headers: HeaderMap,
    Form(form): Form<HashMap<String, String>>,
) -> Response {
    let info = super::request_info(&server, "POST", "/par", &headers);

    let request = PushedAuthorizationRequest {
        credentials: credentials_from_form(&form),
        request_object: form.get("request").cloned(),
        request_uri: form.get("request_uri").cloned(),
        parameters: parse_authorization_parameters(&form),
    };

    match server.pushed_authorization_request(request, &info).await {
        Ok(response) => (StatusCode::CREATED, axum::Json(response)).into_response(),
        Err(error) => super::error_response(&error, &info),
    }
}

pub(crate) fn credentials_from_form(form: &HashMap<String, String>) -> ClientCredentials {
    ClientCredentials {
        client_id: form.get("client_id").cloned(),
        client_secret: form.get("client_secret").cloned(),
        client_assertion: form.get("client_assertion").cloned(),
        client_assertion_type: form.get("client_assertion_type").cloned(),
    }
}
