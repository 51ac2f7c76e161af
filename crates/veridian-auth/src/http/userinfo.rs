//! UserInfo endpoint handler.

use axum::extract::State;
use axum::http::{HeaderMap, Method, header};
use axum::response::{IntoResponse, Response};

use crate::server::AuthServer;
use crate::userinfo::UserInfoResponse;

/// Handler for `GET`/`POST /userinfo`.
pub async fn userinfo_handler(
    State(server): State<AuthServer>,
    method: Method,
    headers: HeaderMap,
) -> Response {
    let info = super::request_info(&server, method.as_str(), "/userinfo", &headers);

    match server.userinfo(&info).await {
        Ok(UserInfoResponse::Json(claims)) => axum::Json(claims).into_response(),
        Ok(UserInfoResponse::Jwt(jwt)) => {
            ([(header::CONTENT_TYPE, "application/jwt")], jwt).into_response()
        }
        Err(error) => super::error_response(&error, &info),
    }
}
