//! Contacts Admin Backend
//! Mission: Contacts/chat admin panel API with a hardened auth core

use anyhow::Result;
use contacts_admin_backend::{app, config::AppConfig};
use tracing::info;
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<()> {
    init_tracing();

    let config = AppConfig::from_env();

    info!("Contacts admin backend starting");
    info!("Database: {}", config.database_path);
    info!(
        "Login throttle: {} failures / {:?} window, {:?} response floor",
        config.throttle_max_failures, config.throttle_window, config.login_floor
    );

    app::serve(config).await
}

fn init_tracing() {
    tracing_subscriber::registry()
        .with(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| "contacts_admin_backend=debug,tower_http=debug".into()),
        )
        .with(tracing_subscriber::fmt::layer())
        .init();
}
