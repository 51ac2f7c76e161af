//! Dynamic client registration handlers.

use axum::extract::{Path, State};
use axum::http::{HeaderMap, StatusCode};
use axum::response::{IntoResponse, Response};

use crate::context::HttpRequestInfo;
use crate::error::OAuthError;
use crate::server::AuthServer;
use crate::types::ClientMetaInfo;

/// Handler for `POST /register`.
pub async fn register_handler(
    State(server): State<AuthServer>,
    axum::Json(meta): axum::Json<ClientMetaInfo>,
) -> Response {
    match server.register_client(meta).await {
        Ok(response) => (StatusCode::CREATED, axum::Json(response)).into_response(),
        Err(error) => super::error_response(&error, &HttpRequestInfo::default()),
    }
}

/// Handler for `GET /register/{client_id}`.
pub async fn read_handler(
    State(server): State<AuthServer>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match management_token(&headers) {
        Ok(token) => token,
        Err(error) => return super::error_response(&error, &HttpRequestInfo::default()),
    };

    match server.read_client(&client_id, &token).await {
        Ok(response) => axum::Json(response).into_response(),
        Err(error) => super::error_response(&error, &HttpRequestInfo::default()),
    }
}

/// Handler for `PUT /register/{client_id}`.
pub async fn update_handler(
    State(server): State<AuthServer>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
    axum::Json(meta): axum::Json<ClientMetaInfo>,
) -> Response {
    let token = match management_token(&headers) {
        Ok(token) => token,
        Err(error) => return super::error_response(&error, &HttpRequestInfo::default()),
    };

    match server.update_client(&client_id, &token, meta).await {
        Ok(response) => axum::Json(response).into_response(),
        Err(error) => super::error_response(&error, &HttpRequestInfo::default()),
    }
}

/// Handler for `DELETE /register/{client_id}`.
pub async fn delete_handler(
    State(server): State<AuthServer>,
    Path(client_id): Path<String>,
    headers: HeaderMap,
) -> Response {
    let token = match management_token(&headers) {
        Ok(token) => token,
        Err(error) => return super::error_response(&error, &HttpRequestInfo::default()),
    };

    match server.delete_registered_client(&client_id, &token).await {
        Ok(()) => StatusCode::NO_CONTENT.into_response(),
        Err(error) => super::error_response(&error, &HttpRequestInfo::default()),
    }
}

fn management_token(headers: &HeaderMap) -> Result<String, OAuthError> {
    super::header_string(headers, "authorization")
        .as_deref()
        .and_then(|h| h.trim().strip_prefix("Bearer "))
        .map(|t| t.trim().to_string())
        .filter(|t| !t.is_empty())
        .ok_or_else(|| OAuthError::access_denied("Missing registration access token"))
}
