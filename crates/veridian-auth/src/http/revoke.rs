//! Revocation endpoint handler.

use axum::Form;
use axum::extract::State;
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::server::AuthServer;
use crate::token::revocation::RevocationRequest;

/// Handler for `POST /revoke`. Success is an empty 200, even for tokens
/// the server never issued.
pub async fn revoke_handler(
    State(server): State<AuthServer>,
    headers: HeaderMap,
    Form(request): Form<RevocationRequest>,
) -> Response {
    let info = super::request_info(&server, "POST", "/revoke", &headers);

    match server.revoke(request, &info).await {
        Ok(()) => StatusCode::OK.into_response(),
        Err(error) => super::error_response(&error, &info),
    }
}
