//! Shared-secret gate for the management routes.
//!
//! The secret may arrive as `?access_token=` (scrapers that cannot set
//! headers) or as `Authorization: Bearer <token>`.

use axum::{
    body::Body,
    extract::State,
    http::{header, HeaderMap, Request, StatusCode},
    middleware::Next,
    response::Response,
};

use crate::http::server::AppState;

pub const ACCESS_TOKEN_PARAM: &str = "access_token";

/// Token carried by a request, query parameter first.
pub fn presented_token(headers: &HeaderMap, query: Option<&str>) -> Option<String> {
    let from_query = query.and_then(|q| {
        url::form_urlencoded::parse(q.as_bytes())
            .find(|(key, _)| key == ACCESS_TOKEN_PARAM)
            .map(|(_, value)| value.into_owned())
    });

    from_query.or_else(|| {
        headers
            .get(header::AUTHORIZATION)
            .and_then(|h| h.to_str().ok())
            .and_then(|v| v.strip_prefix("Bearer "))
            .map(|t| t.trim().to_string())
    })
}

pub async fn require_access(
    State(state): State<AppState>,
    request: Request<Body>,
    next: Next,
) -> Result<Response, StatusCode> {
    if !state.access.is_enabled() {
        return Ok(next.run(request).await);
    }

    match presented_token(request.headers(), request.uri().query()) {
        Some(token) if token == state.access.token => Ok(next.run(request).await),
        _ => {
            tracing::debug!(
                path = %request.uri().path(),
                "Rejected request without valid access token"
            );
            Err(StatusCode::UNAUTHORIZED)
        }
    }
}
