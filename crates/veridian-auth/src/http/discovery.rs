//! Discovery and JWKS handlers.

use axum::extract::State;
use axum::response::IntoResponse;

use crate::server::AuthServer;

/// Handler for `GET /.well-known/openid-configuration`.
pub async fn openid_configuration_handler(State(server): State<AuthServer>) -> impl IntoResponse {
    axum::Json(server.discovery_document())
}

/// Handler for `GET /jwks`.
pub async fn jwks_handler(State(server): State<AuthServer>) -> impl IntoResponse {
    axum::Json(server.public_jwks())
}
