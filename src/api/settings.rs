//! Page Settings API
//! Mission: Single-row page configuration with sensible defaults

use crate::api::PanelState;
use crate::auth::guard::require_role;
use crate::auth::middleware::client_address;
use crate::auth::models::{AuthIdentity, Role};
use crate::auth::user_store::open_db;
use crate::errors::ApiError;
use anyhow::{Context, Result};
use axum::{
    extract::{ConnectInfo, State},
    http::HeaderMap,
    Extension, Json,
};
use rusqlite::params;
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;

/// Public page settings. A missing row answers with these defaults.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PageSettings {
    pub main_title: String,
    pub main_description: String,
    pub background_image_url: Option<String>,
}

impl Default for PageSettings {
    fn default() -> Self {
        Self {
            main_title: "Contacts".to_string(),
            main_description: "Get in touch on Telegram".to_string(),
            background_image_url: None,
        }
    }
}

/// Settings storage over the single-row `page_settings` table.
pub struct SettingsStore {
    db_path: String,
}

impl SettingsStore {
    pub fn new(db_path: &str) -> Result<Self> {
        let store = Self {
            db_path: db_path.to_string(),
        };
        store.init_db()?;
        Ok(store)
    }

    fn init_db(&self) -> Result<()> {
        let conn = open_db(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS page_settings (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                main_title TEXT NOT NULL,
                main_description TEXT NOT NULL,
                background_image_url TEXT
            )",
            [],
        )?;
        Ok(())
    }

    pub fn get(&self) -> Result<Option<PageSettings>> {
        let conn = open_db(&self.db_path)?;

        let row = conn.query_row(
            "SELECT main_title, main_description, background_image_url
             FROM page_settings LIMIT 1",
            [],
            |row| {
                Ok(PageSettings {
                    main_title: row.get(0)?,
                    main_description: row.get(1)?,
                    background_image_url: row.get(2)?,
                })
            },
        );

        match row {
            Ok(settings) => Ok(Some(settings)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn upsert(&self, settings: &PageSettings) -> Result<()> {
        let conn = open_db(&self.db_path)?;

        let existing: Option<i64> = match conn.query_row(
            "SELECT id FROM page_settings LIMIT 1",
            [],
            |row| row.get(0),
        ) {
            Ok(id) => Some(id),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        match existing {
            Some(id) => {
                conn.execute(
                    "UPDATE page_settings
                     SET main_title = ?1, main_description = ?2, background_image_url = ?3
                     WHERE id = ?4",
                    params![
                        settings.main_title,
                        settings.main_description,
                        settings.background_image_url,
                        id,
                    ],
                )
                .context("Failed to update settings")?;
            }
            None => {
                conn.execute(
                    "INSERT INTO page_settings (main_title, main_description, background_image_url)
                     VALUES (?1, ?2, ?3)",
                    params![
                        settings.main_title,
                        settings.main_description,
                        settings.background_image_url,
                    ],
                )
                .context("Failed to insert settings")?;
            }
        }

        Ok(())
    }
}

/// Public settings - GET /api/settings
pub async fn get_settings(
    State(state): State<PanelState>,
) -> Result<Json<PageSettings>, ApiError> {
    let settings = state.settings.get()?.unwrap_or_default();
    Ok(Json(settings))
}

/// Update settings - PUT /api/settings (admin)
pub async fn update_settings(
    State(state): State<PanelState>,
    Extension(identity): Extension<AuthIdentity>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<PageSettings>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&identity, Role::Admin)?;

    state.settings.upsert(&payload)?;

    state.audit.record(
        &identity.username,
        "update",
        "settings",
        None,
        Some(&payload.main_title),
        &client_address(&headers, peer),
    );

    Ok(Json(serde_json::json!({ "message": "Settings updated" })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_store() -> (SettingsStore, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let store = SettingsStore::new(temp.path().to_str().unwrap()).unwrap();
        (store, temp)
    }

    #[test]
    fn test_empty_store_has_no_row() {
        let (store, _temp) = create_test_store();
        assert!(store.get().unwrap().is_none());
    }

    #[test]
    fn test_upsert_inserts_then_updates() {
        let (store, _temp) = create_test_store();

        store
            .upsert(&PageSettings {
                main_title: "Team".to_string(),
                main_description: "Reach us".to_string(),
                background_image_url: None,
            })
            .unwrap();

        let loaded = store.get().unwrap().unwrap();
        assert_eq!(loaded.main_title, "Team");

        store
            .upsert(&PageSettings {
                main_title: "Team v2".to_string(),
                main_description: "Reach us".to_string(),
                background_image_url: Some("https://example.com/bg.png".to_string()),
            })
            .unwrap();

        let loaded = store.get().unwrap().unwrap();
        assert_eq!(loaded.main_title, "Team v2");
        assert_eq!(
            loaded.background_image_url.as_deref(),
            Some("https://example.com/bg.png")
        );

        // Still a single row
        let conn = rusqlite::Connection::open(_temp.path()).unwrap();
        let count: i64 = conn
            .query_row("SELECT COUNT(*) FROM page_settings", [], |r| r.get(0))
            .unwrap();
        assert_eq!(count, 1);
    }
}
