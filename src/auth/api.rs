//! Authentication API Endpoints
//! Mission: Login, identity echo, and password change

use crate::auth::middleware::client_address;
use crate::auth::models::{
    AuthIdentity, ChangePasswordRequest, LoginRequest, LoginResponse,
};
use crate::auth::password::{self, VerifyOutcome};
use crate::auth::throttle::LoginThrottle;
use crate::auth::tokens::{SignedTokenAuthority, TokenAuthority};
use crate::auth::user_store::UserStore;
use crate::errors::ApiError;
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Extension, Json,
};
use serde_json::json;
use std::future::Future;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

pub const MIN_PASSWORD_LEN: usize = 6;

/// Shared auth state.
#[derive(Clone)]
pub struct AuthState {
    pub users: Arc<UserStore>,
    pub tokens: Arc<SignedTokenAuthority>,
    pub throttle: Arc<LoginThrottle>,
    /// Minimum wall-clock duration of a login response.
    pub login_floor: Duration,
}

/// Run a login future, then pad the response up to the floor duration so the
/// outcome cannot be inferred from latency (user exists vs not, blocked vs
/// wrong password).
pub async fn with_min_duration<T, F>(floor: Duration, fut: F) -> T
where
    F: Future<Output = T>,
{
    let started = tokio::time::Instant::now();
    let out = fut.await;
    let elapsed = started.elapsed();
    if elapsed < floor {
        tokio::time::sleep(floor - elapsed).await;
    }
    out
}

/// Login endpoint - POST /api/auth/login
pub async fn login(
    State(state): State<AuthState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<LoginResponse>, ApiError> {
    let floor = state.login_floor;
    with_min_duration(floor, login_inner(state, peer, headers, payload)).await
}

async fn login_inner(
    state: AuthState,
    peer: SocketAddr,
    headers: HeaderMap,
    payload: LoginRequest,
) -> Result<Json<LoginResponse>, ApiError> {
    if payload.username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Username and password required"));
    }

    let client = client_address(&headers, peer);

    // Throttle check comes before any password work: a blocked client gets
    // no hashing cycles and no oracle.
    if state.throttle.is_blocked(&client)? {
        state
            .throttle
            .record_attempt(&client, &payload.username, false)?;
        return Err(ApiError::RateLimited);
    }

    let user = state.users.find_by_username(&payload.username)?;

    let Some(user) = user else {
        state
            .throttle
            .record_attempt(&client, &payload.username, false)?;
        warn!("failed login attempt for unknown user: {}", payload.username);
        return Err(ApiError::Unauthorized);
    };

    let outcome = password::verify_password(&payload.password, &user.password_hash)?;

    let VerifyOutcome::Match { needs_rehash } = outcome else {
        state
            .throttle
            .record_attempt(&client, &payload.username, false)?;
        warn!("failed login attempt: {}", payload.username);
        return Err(ApiError::Unauthorized);
    };

    // Legacy digest rows are upgraded to bcrypt on the first successful
    // login. A failed upgrade is logged, not fatal.
    if needs_rehash {
        match password::hash_password(&payload.password) {
            Ok(new_hash) => {
                if let Err(e) = state.users.update_password_hash(user.id, &new_hash) {
                    warn!("failed to migrate legacy password hash for {}: {e}", user.username);
                } else {
                    info!("migrated legacy password hash for {}", user.username);
                }
            }
            Err(e) => warn!("failed to re-hash legacy password for {}: {e}", user.username),
        }
    }

    state
        .throttle
        .record_attempt(&client, &payload.username, true)?;

    let issued = state
        .tokens
        .issue(user.id, &user.username, Some(user.role))?;

    info!("login successful: {} ({})", user.username, user.role.as_str());

    Ok(Json(LoginResponse {
        token: issued.token,
        expires_in: issued.expires_in,
        role: Some(user.role),
        username: user.username,
    }))
}

/// Current identity - GET /api/auth/me
pub async fn me(Extension(identity): Extension<AuthIdentity>) -> Json<AuthIdentity> {
    Json(identity)
}

/// Password change - POST /api/auth/change-password
pub async fn change_password(
    State(state): State<AuthState>,
    Extension(identity): Extension<AuthIdentity>,
    Json(payload): Json<ChangePasswordRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    if payload.old_password.is_empty() || payload.new_password.is_empty() {
        return Err(ApiError::bad_request("Old and new password required"));
    }
    if payload.new_password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "New password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let user = state
        .users
        .find_by_id(identity.user_id)?
        .ok_or(ApiError::Unauthorized)?;

    if !password::verify_password(&payload.old_password, &user.password_hash)?.is_match() {
        return Err(ApiError::Unauthorized);
    }

    let new_hash = password::hash_password(&payload.new_password)?;
    state.users.update_password_hash(user.id, &new_hash)?;

    info!("password changed for {}", user.username);

    Ok(Json(json!({ "success": true })))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[tokio::test]
    async fn test_floor_pads_fast_paths() {
        let floor = Duration::from_millis(100);
        let started = tokio::time::Instant::now();
        with_min_duration(floor, async { 42 }).await;
        assert!(started.elapsed() >= floor);
    }

    #[tokio::test]
    async fn test_floor_does_not_delay_slow_paths() {
        let floor = Duration::from_millis(10);
        let started = tokio::time::Instant::now();
        with_min_duration(floor, async {
            tokio::time::sleep(Duration::from_millis(50)).await;
        })
        .await;
        let elapsed = started.elapsed();
        assert!(elapsed >= Duration::from_millis(50));
        assert!(elapsed < Duration::from_millis(100));
    }
}
