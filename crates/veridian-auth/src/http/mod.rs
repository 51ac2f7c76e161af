//! Axum HTTP surface.
//!
//! A thin skin over the engine: handlers parse the wire format, build the
//! per-request [`HttpRequestInfo`] and delegate to the [`AuthServer`]
//! methods. Every response carries `Cache-Control: no-store, no-cache`
//! and the echoed (or generated) correlation id.
//!
//! mTLS note: TLS termination is external, so these handlers never see a
//! peer certificate. Deployments using the mTLS client methods or
//! certificate-bound tokens call the engine methods directly with an
//! [`HttpRequestInfo`] carrying the certificate the terminator extracted.

pub mod authorize;
pub mod discovery;
pub mod introspect;
pub mod layers;
pub mod par;
pub mod register;
pub mod revoke;
pub mod token;
pub mod userinfo;

use axum::Router;
use axum::http::HeaderMap;
use axum::response::{IntoResponse, Response};
use axum::routing::{get, post};
use serde_json::json;

use crate::context::HttpRequestInfo;
use crate::error::OAuthError;
use crate::server::AuthServer;

/// Builds the full router with the standard paths.
#[must_use]
pub fn router(server: AuthServer) -> Router {
    Router::new()
        .route(
            "/.well-known/openid-configuration",
            get(discovery::openid_configuration_handler),
        )
        .route("/jwks", get(discovery::jwks_handler))
        .route("/par", post(par::par_handler))
        .route(
            "/authorize",
            get(authorize::authorize_handler).post(authorize::authorize_post_handler),
        )
        .route(
            "/authorize/{callback_id}",
            post(authorize::callback_handler),
        )
        .route("/token", post(token::token_handler))
        .route(
            "/userinfo",
            get(userinfo::userinfo_handler).post(userinfo::userinfo_handler),
        )
        .route("/introspect", post(introspect::introspect_handler))
        .route("/revoke", post(revoke::revoke_handler))
        .route("/register", post(register::register_handler))
        .route(
            "/register/{client_id}",
            get(register::read_handler)
                .put(register::update_handler)
                .delete(register::delete_handler),
        )
        .layer(axum::middleware::from_fn_with_state(
            server.clone(),
            layers::common_headers,
        ))
        .with_state(server)
}

/// Builds the request context from the transport facts.
pub(crate) fn request_info(
    server: &AuthServer,
    method: &str,
    path: &str,
    headers: &HeaderMap,
) -> HttpRequestInfo {
    let mut info = HttpRequestInfo::new(
        method,
        format!("{}{}", server.config().host.trim_end_matches('/'), path),
    );
    if let Some(authorization) = header_string(headers, "authorization") {
        info = info.with_authorization(authorization);
    }
    if let Some(proof) = header_string(headers, "dpop") {
        info = info.with_dpop_proof(proof);
    }
    info
}

pub(crate) fn header_string(headers: &HeaderMap, name: &str) -> Option<String> {
    headers
        .get(name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
}

/// Encodes an OAuth error as the RFC 6749 JSON body. `invalid_client` is
/// upgraded to 401 with a challenge when the request carried Basic
/// credentials.
pub(crate) fn error_response(error: &OAuthError, request: &HttpRequestInfo) -> Response {
    let status = if error.is_authentication_error() && request.used_basic_auth() {
        401
    } else {
        error.status_code()
    };

    let body = json!({
        "error": error.error_code(),
        "error_description": error.public_description(),
    });

    let mut response = (
        axum::http::StatusCode::from_u16(status).unwrap_or(axum::http::StatusCode::BAD_REQUEST),
        axum::Json(body),
    )
        .into_response();

    if status == 401 {
        let challenge = if request.used_basic_auth() {
            "Basic"
        } else {
            "Bearer"
        };
        if let Ok(value) = axum::http::HeaderValue::from_str(challenge) {
            response
                .headers_mut()
                .insert(axum::http::header::WWW_AUTHENTICATE, value);
        }
    }

    response
}
