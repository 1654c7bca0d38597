//! API Error Taxonomy
//! Mission: One uniform JSON error shape for every handler

use axum::{
    http::StatusCode,
    response::{IntoResponse, Response},
    Json,
};
use serde_json::json;
use tracing::warn;

/// Errors surfaced to HTTP clients. Every variant maps to a status code and
/// a `{"error": <message>}` body.
#[derive(Debug)]
pub enum ApiError {
    /// Missing or malformed input (400).
    BadRequest(String),
    /// Missing, malformed, expired, or invalid token/credentials (401).
    Unauthorized,
    /// Authenticated but not allowed, or protected-entity violation (403).
    Forbidden(&'static str),
    /// Target does not exist (404).
    NotFound(&'static str),
    /// Duplicate resource, e.g. username already taken (409).
    Conflict(&'static str),
    /// Too many failed login attempts from this client (429).
    RateLimited,
    /// Storage or other internal failure (500). Cause is logged, never echoed.
    Internal,
}

impl ApiError {
    pub fn bad_request(message: impl Into<String>) -> Self {
        ApiError::BadRequest(message.into())
    }

    /// Log the underlying cause and collapse it to a generic 500.
    /// Raw database/internal error text must never reach the client.
    pub fn internal(err: impl std::fmt::Display) -> Self {
        warn!("internal error: {err}");
        ApiError::Internal
    }
}

impl From<anyhow::Error> for ApiError {
    fn from(err: anyhow::Error) -> Self {
        ApiError::internal(err)
    }
}

impl IntoResponse for ApiError {
    fn into_response(self) -> Response {
        let (status, message) = match self {
            ApiError::BadRequest(msg) => (StatusCode::BAD_REQUEST, msg),
            ApiError::Unauthorized => (
                StatusCode::UNAUTHORIZED,
                "Invalid credentials or token".to_string(),
            ),
            ApiError::Forbidden(msg) => (StatusCode::FORBIDDEN, msg.to_string()),
            ApiError::NotFound(msg) => (StatusCode::NOT_FOUND, msg.to_string()),
            ApiError::Conflict(msg) => (StatusCode::CONFLICT, msg.to_string()),
            ApiError::RateLimited => (
                StatusCode::TOO_MANY_REQUESTS,
                "Too many failed attempts. Try again later.".to_string(),
            ),
            ApiError::Internal => (
                StatusCode::INTERNAL_SERVER_ERROR,
                "Internal server error".to_string(),
            ),
        };

        (status, Json(json!({ "error": message }))).into_response()
    }
}
