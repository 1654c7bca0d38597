//! Application Assembly
//! Mission: Construct every store once, wire the routers, serve

use crate::api::{
    audit::{self, AuditLog},
    contacts::{self, ContactStore},
    settings::{self, SettingsStore},
    users as users_api, PanelState,
};
use crate::auth::{
    api as auth_api, bearer_auth, AuthState, LoginThrottle, SessionTokenAuthority,
    SharedAuthority, SignedTokenAuthority, UserStore,
};
use crate::chat::{api as chat_api, ChatState, ChatStore};
use crate::config::AppConfig;
use crate::middleware::request_logging;
use anyhow::{Context, Result};
use axum::{
    middleware,
    routing::{delete, get, post, put},
    Router,
};
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tower_http::cors::CorsLayer;
use tracing::info;

/// Build the full application router against the configured database.
///
/// Also used by integration tests, which point it at a throwaway database
/// with a zeroed login floor.
pub fn build_router(config: &AppConfig) -> Result<Router> {
    let db = &config.database_path;

    let users = Arc::new(UserStore::new(db)?);
    let throttle = Arc::new(LoginThrottle::new(
        db,
        config.throttle_window,
        config.throttle_max_failures,
    )?);

    let mut signed = SignedTokenAuthority::new(
        config.jwt_secret.clone(),
        config.admin_token_ttl_hours,
    );
    if config.refresh_role_on_verify {
        signed = signed.with_role_source(users.clone());
    }
    let admin_tokens = Arc::new(signed);

    let chat_sessions = Arc::new(SessionTokenAuthority::new(
        db,
        chrono::Duration::days(config.chat_session_ttl_days),
    )?);

    let contacts_store = Arc::new(ContactStore::new(db)?);
    let settings_store = Arc::new(SettingsStore::new(db)?);
    let audit_log = Arc::new(AuditLog::new(db)?);
    let chat_store = Arc::new(ChatStore::new(db)?);

    let auth_state = AuthState {
        users: users.clone(),
        tokens: admin_tokens.clone(),
        throttle: throttle.clone(),
        login_floor: config.login_floor,
    };

    let panel_state = PanelState {
        contacts: contacts_store,
        settings: settings_store,
        users,
        audit: audit_log.clone(),
    };

    let chat_state = ChatState {
        store: chat_store,
        sessions: chat_sessions.clone(),
        throttle,
        audit: audit_log,
        login_floor: config.login_floor,
    };

    // The admin surface authenticates with signed-claims tokens, the chat
    // surface with opaque sessions. Same middleware, different authority.
    let admin_authority: SharedAuthority = admin_tokens;
    let chat_authority: SharedAuthority = chat_sessions;

    let auth_public = Router::new()
        .route("/api/auth/login", post(auth_api::login))
        .with_state(auth_state.clone());

    let auth_protected = Router::new()
        .route("/api/auth/me", get(auth_api::me))
        .route("/api/auth/change-password", post(auth_api::change_password))
        .route_layer(middleware::from_fn_with_state(
            admin_authority.clone(),
            bearer_auth,
        ))
        .with_state(auth_state);

    let panel_public = Router::new()
        .route("/api/contacts", get(contacts::list_contacts))
        .route("/api/settings", get(settings::get_settings))
        .with_state(panel_state.clone());

    let panel_protected = Router::new()
        .route("/api/contacts", post(contacts::create_contact))
        .route(
            "/api/contacts/:id",
            put(contacts::update_contact).delete(contacts::delete_contact),
        )
        .route("/api/settings", put(settings::update_settings))
        .route(
            "/api/admin/users",
            get(users_api::list_users).post(users_api::create_user),
        )
        .route("/api/admin/users/:username", delete(users_api::delete_user))
        .route("/api/admin/audit", get(audit::list_audit))
        .route_layer(middleware::from_fn_with_state(
            admin_authority.clone(),
            bearer_auth,
        ))
        .with_state(panel_state);

    let chat_public = Router::new()
        .route("/api/chat/register", post(chat_api::register))
        .route("/api/chat/login", post(chat_api::login))
        .route("/api/chat/messages", get(chat_api::list_messages))
        .with_state(chat_state.clone());

    let chat_protected = Router::new()
        .route("/api/chat/messages", post(chat_api::post_message))
        .route("/api/chat/logout", post(chat_api::logout))
        .route_layer(middleware::from_fn_with_state(chat_authority, bearer_auth))
        .with_state(chat_state.clone());

    let chat_admin = Router::new()
        .route("/api/chat/users", get(chat_api::list_chat_users))
        .route("/api/chat/ban", post(chat_api::ban_user))
        .route(
            "/api/chat/messages/:id/remove",
            post(chat_api::remove_message),
        )
        .route_layer(middleware::from_fn_with_state(admin_authority, bearer_auth))
        .with_state(chat_state);

    let app = Router::new()
        .route("/health", get(health_check))
        .merge(auth_public)
        .merge(auth_protected)
        .merge(panel_public)
        .merge(panel_protected)
        .merge(chat_public)
        .merge(chat_protected)
        .merge(chat_admin)
        .layer(middleware::from_fn(request_logging))
        // Preflight OPTIONS short-circuits here with permissive CORS
        // headers, independent of all other logic.
        .layer(CorsLayer::permissive());

    Ok(app)
}

pub async fn serve(config: AppConfig) -> Result<()> {
    let app = build_router(&config)?;

    let addr = format!("0.0.0.0:{}", config.port);
    let listener = TcpListener::bind(&addr).await?;
    info!("API server listening on {}", addr);

    axum::serve(
        listener,
        app.into_make_service_with_connect_info::<SocketAddr>(),
    )
    .await
    .context("Server error")?;

    Ok(())
}

async fn health_check() -> &'static str {
    "OK"
}
