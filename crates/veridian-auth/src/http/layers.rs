//! Shared response headers.
//!
//! Every response is uncacheable and echoes the correlation id header,
//! generating one when the caller sent none.

use axum::extract::{Request, State};
use axum::http::{HeaderName, HeaderValue, header};
use axum::middleware::Next;
use axum::response::Response;
use uuid::Uuid;

use crate::server::AuthServer;

/// Middleware applying `Cache-Control`/`Pragma` and the correlation id.
pub async fn common_headers(
    State(server): State<AuthServer>,
    request: Request,
    next: Next,
) -> Response {
    let header_name = server.config().correlation_id_header.to_ascii_lowercase();
    let correlation_id = request
        .headers()
        .get(&header_name)
        .and_then(|v| v.to_str().ok())
        .map(str::to_string)
        .unwrap_or_else(|| Uuid::new_v4().to_string());

    tracing::debug!(
        correlation_id = %correlation_id,
        path = %request.uri().path(),
        "handling request"
    );

    let mut response = next.run(request).await;

    let headers = response.headers_mut();
    headers.insert(
        header::CACHE_CONTROL,
        HeaderValue::from_static("no-store, no-cache"),
    );
    headers.insert(header::PRAGMA, HeaderValue::from_static("no-cache"));
    if let (Ok(name), Ok(value)) = (
        HeaderName::try_from(header_name),
        HeaderValue::from_str(&correlation_id),
    ) {
        headers.insert(name, value);
    }

    response
}
