//! Authentication Middleware
//! Mission: Protect endpoints behind a token authority

use crate::auth::models::AuthIdentity;
use crate::auth::tokens::TokenAuthority;
use crate::errors::ApiError;
use axum::{
    extract::{Request, State},
    http::HeaderMap,
    middleware::Next,
    response::Response,
};
use std::net::SocketAddr;
use std::sync::Arc;

/// Token authority handle shared with the middleware. The admin router
/// carries the signed-claims authority, the chat router the session one;
/// the middleware does not care which.
pub type SharedAuthority = Arc<dyn TokenAuthority>;

/// Middleware that validates the bearer token and attaches the verified
/// identity to the request. Any verification failure is a plain 401.
pub async fn bearer_auth(
    State(authority): State<SharedAuthority>,
    mut req: Request,
    next: Next,
) -> Result<Response, ApiError> {
    let token = extract_token(req.headers()).ok_or(ApiError::Unauthorized)?;

    let identity = authority.verify(&token).ok_or(ApiError::Unauthorized)?;

    req.extensions_mut().insert(identity);

    Ok(next.run(req).await)
}

/// Pull the bearer token out of the request headers. `Authorization: Bearer`
/// is preferred; `X-Auth-Token` is kept for older clients.
pub fn extract_token(headers: &HeaderMap) -> Option<String> {
    let from_bearer = headers
        .get("Authorization")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.strip_prefix("Bearer "))
        .map(|t| t.to_string());

    from_bearer.or_else(|| {
        headers
            .get("X-Auth-Token")
            .and_then(|h| h.to_str().ok())
            .map(|t| t.to_string())
    })
}

/// Resolve the client address for throttling and audit rows. The first
/// X-Forwarded-For hop wins when present (the service runs behind a
/// proxy in production); otherwise the socket peer address.
pub fn client_address(headers: &HeaderMap, peer: SocketAddr) -> String {
    headers
        .get("X-Forwarded-For")
        .and_then(|h| h.to_str().ok())
        .and_then(|s| s.split(',').next())
        .map(|s| s.trim().to_string())
        .filter(|s| !s.is_empty())
        .unwrap_or_else(|| peer.ip().to_string())
}

#[cfg(test)]
mod tests {
    use super::*;
    use axum::http::HeaderValue;

    #[test]
    fn test_extract_token_prefers_bearer() {
        let mut headers = HeaderMap::new();
        headers.insert("Authorization", HeaderValue::from_static("Bearer abc123"));
        headers.insert("X-Auth-Token", HeaderValue::from_static("legacy"));

        assert_eq!(extract_token(&headers).as_deref(), Some("abc123"));
    }

    #[test]
    fn test_extract_token_falls_back_to_header() {
        let mut headers = HeaderMap::new();
        headers.insert("X-Auth-Token", HeaderValue::from_static("legacy"));

        assert_eq!(extract_token(&headers).as_deref(), Some("legacy"));
        assert_eq!(extract_token(&HeaderMap::new()), None);
    }

    #[test]
    fn test_client_address_forwarded_first_hop() {
        let peer: SocketAddr = "127.0.0.1:9999".parse().unwrap();

        let mut headers = HeaderMap::new();
        headers.insert(
            "X-Forwarded-For",
            HeaderValue::from_static("203.0.113.7, 10.0.0.1"),
        );
        assert_eq!(client_address(&headers, peer), "203.0.113.7");

        assert_eq!(client_address(&HeaderMap::new(), peer), "127.0.0.1");
    }
}
