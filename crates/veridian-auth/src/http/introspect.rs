//! Introspection endpoint handler.

use axum::Form;
use axum::extract::State;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};

use crate::server::AuthServer;
use crate::token::introspection::IntrospectionRequest;

/// Handler for `POST /introspect`.
pub async fn introspect_handler(
    State(server): State<AuthServer>,
    headers: HeaderMap,
    Form(request): Form<IntrospectionRequest>,
) -> Response {
    let info = super::request_info(&server, "POST", "/introspect", &headers);

    match server.introspect(request, &info).await {
        Ok(response) => axum::Json(response).into_response(),
        Err(error) => super::error_response(&error, &info),
    }
}
