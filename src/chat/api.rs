//! Chat API Endpoints
//! Mission: Registration, session login, messaging, and moderation

use crate::api::audit::AuditLog;
use crate::auth::api::{with_min_duration, MIN_PASSWORD_LEN};
use crate::auth::guard::require_role;
use crate::auth::middleware::{client_address, extract_token};
use crate::auth::models::{AuthIdentity, LoginRequest, Role};
use crate::auth::password::{self, VerifyOutcome};
use crate::auth::throttle::LoginThrottle;
use crate::auth::tokens::{SessionTokenAuthority, TokenAuthority};
use crate::chat::store::{ChatStore, CreateChatUserOutcome};
use crate::errors::ApiError;
use axum::{
    extract::{ConnectInfo, Path, State},
    http::{HeaderMap, StatusCode},
    Extension, Json,
};
use serde::{Deserialize, Serialize};
use serde_json::json;
use std::net::SocketAddr;
use std::sync::Arc;
use std::time::Duration;
use tracing::{info, warn};

const MAX_MESSAGE_LEN: usize = 1000;
const MESSAGE_PAGE: u32 = 100;

/// Shared chat state. The session authority is the chat deployment's token
/// mechanism; moderation endpoints ride the admin router and only need the
/// store and audit log from here.
#[derive(Clone)]
pub struct ChatState {
    pub store: Arc<ChatStore>,
    pub sessions: Arc<SessionTokenAuthority>,
    pub throttle: Arc<LoginThrottle>,
    pub audit: Arc<AuditLog>,
    pub login_floor: Duration,
}

#[derive(Debug, Serialize)]
pub struct ChatAuthResponse {
    pub token: String,
    pub expires_in: u64,
    pub user: ChatUserPublic,
}

#[derive(Debug, Serialize)]
pub struct ChatUserPublic {
    pub id: i64,
    pub username: String,
}

fn validate_credentials(username: &str, password: &str) -> Result<(), ApiError> {
    if username.is_empty() || password.is_empty() {
        return Err(ApiError::bad_request("Username and password required"));
    }
    if username.len() < 3 || username.len() > 50 {
        return Err(ApiError::bad_request(
            "Username must be between 3 and 50 characters",
        ));
    }
    if password.len() < MIN_PASSWORD_LEN {
        return Err(ApiError::bad_request(format!(
            "Password must be at least {MIN_PASSWORD_LEN} characters"
        )));
    }
    Ok(())
}

/// Chat registration - POST /api/chat/register
pub async fn register(
    State(state): State<ChatState>,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ChatAuthResponse>, ApiError> {
    let username = payload.username.trim().to_string();
    validate_credentials(&username, &payload.password)?;

    let hash = password::hash_password(&payload.password)?;

    let user = match state.store.create_user(&username, &hash)? {
        CreateChatUserOutcome::Created(user) => user,
        CreateChatUserOutcome::DuplicateUsername => {
            return Err(ApiError::Conflict("User already exists"));
        }
    };

    let issued = state.sessions.issue(user.id, &user.username, None)?;

    Ok(Json(ChatAuthResponse {
        token: issued.token,
        expires_in: issued.expires_in,
        user: ChatUserPublic {
            id: user.id,
            username: user.username,
        },
    }))
}

/// Chat login - POST /api/chat/login
pub async fn login(
    State(state): State<ChatState>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<LoginRequest>,
) -> Result<Json<ChatAuthResponse>, ApiError> {
    let floor = state.login_floor;
    with_min_duration(floor, login_inner(state, peer, headers, payload)).await
}

async fn login_inner(
    state: ChatState,
    peer: SocketAddr,
    headers: HeaderMap,
    payload: LoginRequest,
) -> Result<Json<ChatAuthResponse>, ApiError> {
    let username = payload.username.trim().to_string();
    validate_credentials(&username, &payload.password)?;

    let client = client_address(&headers, peer);

    if state.throttle.is_blocked(&client)? {
        state.throttle.record_attempt(&client, &username, false)?;
        return Err(ApiError::RateLimited);
    }

    let Some(user) = state.store.find_user_by_username(&username)? else {
        state.throttle.record_attempt(&client, &username, false)?;
        return Err(ApiError::Unauthorized);
    };

    if user.is_banned {
        state.throttle.record_attempt(&client, &username, false)?;
        return Err(ApiError::Forbidden("User is banned"));
    }

    let outcome = password::verify_password(&payload.password, &user.password_hash)?;
    let VerifyOutcome::Match { needs_rehash } = outcome else {
        state.throttle.record_attempt(&client, &username, false)?;
        warn!("failed chat login attempt: {username}");
        return Err(ApiError::Unauthorized);
    };

    if needs_rehash {
        match password::hash_password(&payload.password) {
            Ok(new_hash) => {
                if let Err(e) = state.store.update_password_hash(user.id, &new_hash) {
                    warn!("failed to migrate legacy chat password hash for {username}: {e}");
                } else {
                    info!("migrated legacy chat password hash for {username}");
                }
            }
            Err(e) => warn!("failed to re-hash legacy chat password for {username}: {e}"),
        }
    }

    state.throttle.record_attempt(&client, &username, true)?;

    let issued = state.sessions.issue(user.id, &user.username, None)?;

    info!("chat login successful: {}", user.username);

    Ok(Json(ChatAuthResponse {
        token: issued.token,
        expires_in: issued.expires_in,
        user: ChatUserPublic {
            id: user.id,
            username: user.username,
        },
    }))
}

/// Chat logout - POST /api/chat/logout (session-authenticated)
pub async fn logout(
    State(state): State<ChatState>,
    headers: HeaderMap,
) -> Result<Json<serde_json::Value>, ApiError> {
    // The middleware already verified this token; revoking it ends the
    // session immediately.
    let token = extract_token(&headers).ok_or(ApiError::Unauthorized)?;
    state.sessions.revoke(&token)?;
    Ok(Json(json!({ "success": true })))
}

/// Message listing - GET /api/chat/messages (public)
pub async fn list_messages(
    State(state): State<ChatState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let messages = state.store.messages(MESSAGE_PAGE)?;
    Ok(Json(json!({ "messages": messages })))
}

#[derive(Debug, Deserialize)]
pub struct PostMessageRequest {
    pub message: String,
}

/// Post a message - POST /api/chat/messages (session-authenticated)
pub async fn post_message(
    State(state): State<ChatState>,
    Extension(identity): Extension<AuthIdentity>,
    Json(payload): Json<PostMessageRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    // Ban state is checked against the store on every post; a ban applied
    // after token issue takes effect immediately.
    match state.store.is_banned(identity.user_id)? {
        Some(false) => {}
        _ => return Err(ApiError::Forbidden("User is banned")),
    }

    let message = payload.message.trim();
    if message.is_empty() {
        return Err(ApiError::bad_request("Message cannot be empty"));
    }
    if message.len() > MAX_MESSAGE_LEN {
        return Err(ApiError::bad_request(format!(
            "Message too long (max {MAX_MESSAGE_LEN} characters)"
        )));
    }

    let message_id = state.store.insert_message(identity.user_id, message)?;

    Ok(Json(json!({ "success": true, "message_id": message_id })))
}

/// Chat user listing - GET /api/chat/users (superadmin, admin router)
pub async fn list_chat_users(
    State(state): State<ChatState>,
    Extension(identity): Extension<AuthIdentity>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&identity, Role::Superadmin)?;

    let users = state.store.list_users()?;
    Ok(Json(json!({ "users": users })))
}

#[derive(Debug, Deserialize)]
pub struct BanRequest {
    pub user_id: i64,
    pub action: String, // "ban" | "unban"
}

/// Ban or unban a chat user - POST /api/chat/ban (superadmin, admin router)
pub async fn ban_user(
    State(state): State<ChatState>,
    Extension(identity): Extension<AuthIdentity>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<BanRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&identity, Role::Superadmin)?;

    let banned = match payload.action.as_str() {
        "ban" => true,
        "unban" => false,
        _ => return Err(ApiError::bad_request("action must be ban or unban")),
    };

    if !state.store.set_banned(payload.user_id, banned)? {
        return Err(ApiError::NotFound("User not found"));
    }

    info!(
        "chat user {} {} by {}",
        payload.user_id, payload.action, identity.username
    );
    state.audit.record(
        &identity.username,
        &payload.action,
        "chat_user",
        Some(&payload.user_id.to_string()),
        None,
        &client_address(&headers, peer),
    );

    Ok(Json(json!({ "success": true, "is_banned": banned })))
}

/// Soft-delete a message - POST /api/chat/messages/:id/remove
/// (superadmin, admin router)
pub async fn remove_message(
    State(state): State<ChatState>,
    Extension(identity): Extension<AuthIdentity>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(message_id): Path<i64>,
) -> Result<StatusCode, ApiError> {
    require_role(&identity, Role::Superadmin)?;

    if !state.store.remove_message(message_id)? {
        return Err(ApiError::NotFound("Message not found"));
    }

    state.audit.record(
        &identity.username,
        "remove",
        "chat_message",
        Some(&message_id.to_string()),
        None,
        &client_address(&headers, peer),
    );

    Ok(StatusCode::NO_CONTENT)
}
