//! Admin User Management API
//! Mission: Superadmin-only account administration

use crate::api::PanelState;
use crate::auth::api::MIN_PASSWORD_LEN;
use crate::auth::guard::require_role;
use crate::auth::middleware::client_address;
use crate::auth::models::{AuthIdentity, CreateUserRequest, Role, UserResponse};
use crate::auth::password;
use crate::auth::user_store::{CreateUserOutcome, DeleteUserOutcome};
use crate::errors::ApiError;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use std::net::SocketAddr;
use tracing::info;

/// List users - GET /api/admin/users (superadmin only)
pub async fn list_users(
    State(state): State<PanelState>,
    Extension(identity): Extension<AuthIdentity>,
) -> Result<Json<Vec<UserResponse>>, ApiError> {
    require_role(&identity, Role::Superadmin)?;

    let users = state.users.list_users()?;
    let response = users.iter().map(UserResponse::from_user).collect();

    Ok(Json(response))
}

/// Create user - POST /api/admin/users (superadmin only)
pub async fn create_user(
    State(state): State<PanelState>,
    Extension(identity): Extension<AuthIdentity>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<CreateUserRequest>,
) -> Result<(StatusCode, Json<UserResponse>), ApiError> {
    require_role(&identity, Role::Superadmin)?;

    let username = payload.username.trim();
    if username.is_empty() || payload.password.is_empty() {
        return Err(ApiError::bad_request("Username and password required"));
    }
    if username.len() < 3 || username.len() > 50 {
        return Err(ApiError::bad_request(
            "Username must be between 3 and 50 characters",
        ));
    }
    if payload.password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }

    let hash = password::hash_password(&payload.password)?;

    let user = match state.users.create_user(username, &hash, payload.role)? {
        CreateUserOutcome::Created(user) => user,
        CreateUserOutcome::DuplicateUsername => {
            return Err(ApiError::Conflict("User already exists"));
        }
    };

    info!("user created by {}: {}", identity.username, user.username);
    state.audit.record(
        &identity.username,
        "create",
        "user",
        Some(&user.username),
        Some(user.role.as_str()),
        &client_address(&headers, peer),
    );

    Ok((StatusCode::CREATED, Json(UserResponse::from_user(&user))))
}

/// Delete user - DELETE /api/admin/users/:username (superadmin only)
///
/// Superadmin records are protected unconditionally; even another
/// superadmin gets a 403 here.
pub async fn delete_user(
    State(state): State<PanelState>,
    Extension(identity): Extension<AuthIdentity>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(username): Path<String>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&identity, Role::Superadmin)?;

    match state.users.delete_by_username(&username)? {
        DeleteUserOutcome::Deleted => {}
        DeleteUserOutcome::NotFound => return Err(ApiError::NotFound("User not found")),
        DeleteUserOutcome::ProtectedRole => {
            return Err(ApiError::Forbidden("Cannot delete superadmin"));
        }
    }

    info!("user deleted by {}: {}", identity.username, username);
    state.audit.record(
        &identity.username,
        "delete",
        "user",
        Some(&username),
        None,
        &client_address(&headers, peer),
    );

    Ok(Json(serde_json::json!({ "success": true })))
}
