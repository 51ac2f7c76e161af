//! Token endpoint handler.

use axum::Form;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use crate::server::AuthServer;
use crate::token::service::TokenRequest;

/// Handler for `POST /token`.
pub async fn token_handler(
    State(server): State<AuthServer>,
    headers: HeaderMap,
    Form(request): Form<TokenRequest>,
) -> Response {
    let info = super::request_info(&server, "POST", "/token", &headers);

    match server.token(request, &info).await {
        Ok(response) => axum::Json(response).into_response(),
        Err(error) => super::error_response(&error, &info),
    }
}
