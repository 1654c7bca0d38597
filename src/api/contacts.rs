//! Contacts API
//! Mission: Public contact listing, admin-managed contact records

use crate::api::PanelState;
use crate::auth::guard::require_role;
use crate::auth::middleware::client_address;
use crate::auth::models::{AuthIdentity, Role};
use crate::auth::user_store::open_db;
use crate::errors::ApiError;
use anyhow::{Context, Result};
use axum::{
    extract::{ConnectInfo, Path, State},
    http::HeaderMap,
    Extension, Json,
};
use chrono::Utc;
use rusqlite::{params, ToSql};
use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use tracing::info;

/// A shared contact card shown on the public page.
#[derive(Debug, Clone, Serialize)]
pub struct Contact {
    pub id: i64,
    pub title: String,
    pub description: String,
    pub telegram_link: String,
    pub display_order: i64,
    pub updated_at: String,
}

#[derive(Debug, Deserialize)]
pub struct CreateContactRequest {
    pub title: String,
    #[serde(default)]
    pub description: String,
    pub telegram_link: String,
    #[serde(default)]
    pub display_order: i64,
}

/// Partial update; absent fields keep their stored value.
#[derive(Debug, Deserialize)]
pub struct UpdateContactRequest {
    pub title: Option<String>,
    pub description: Option<String>,
    pub telegram_link: Option<String>,
    pub display_order: Option<i64>,
}

/// Contact storage over the `contacts` table.
pub struct ContactStore {
    db_path: String,
}

impl ContactStore {
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
            "CREATE TABLE IF NOT EXISTS contacts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                title TEXT NOT NULL,
                description TEXT NOT NULL DEFAULT '',
                telegram_link TEXT NOT NULL,
                display_order INTEGER NOT NULL DEFAULT 0,
                updated_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    pub fn list(&self) -> Result<Vec<Contact>> {
        let conn = open_db(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, title, description, telegram_link, display_order, updated_at
             FROM contacts ORDER BY display_order ASC, id ASC",
        )?;

        let contacts = stmt
            .query_map([], |row| {
                Ok(Contact {
                    id: row.get(0)?,
                    title: row.get(1)?,
                    description: row.get(2)?,
                    telegram_link: row.get(3)?,
                    display_order: row.get(4)?,
                    updated_at: row.get(5)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(contacts)
    }

    pub fn create(&self, req: &CreateContactRequest) -> Result<Contact> {
        let conn = open_db(&self.db_path)?;
        let updated_at = Utc::now().to_rfc3339();

        conn.execute(
            "INSERT INTO contacts (title, description, telegram_link, display_order, updated_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                req.title,
                req.description,
                req.telegram_link,
                req.display_order,
                updated_at,
            ],
        )
        .context("Failed to insert contact")?;

        Ok(Contact {
            id: conn.last_insert_rowid(),
            title: req.title.clone(),
            description: req.description.clone(),
            telegram_link: req.telegram_link.clone(),
            display_order: req.display_order,
            updated_at,
        })
    }

    /// Apply the provided fields. Returns false when the contact is unknown.
    pub fn update(&self, id: i64, req: &UpdateContactRequest) -> Result<bool> {
        let conn = open_db(&self.db_path)?;
        let updated_at = Utc::now().to_rfc3339();

        let mut sets: Vec<&str> = Vec::new();
        let mut values: Vec<&dyn ToSql> = Vec::new();

        if let Some(title) = &req.title {
            sets.push("title = ?");
            values.push(title);
        }
        if let Some(description) = &req.description {
            sets.push("description = ?");
            values.push(description);
        }
        if let Some(telegram_link) = &req.telegram_link {
            sets.push("telegram_link = ?");
            values.push(telegram_link);
        }
        if let Some(display_order) = &req.display_order {
            sets.push("display_order = ?");
            values.push(display_order);
        }

        sets.push("updated_at = ?");
        values.push(&updated_at);
        values.push(&id);

        let sql = format!("UPDATE contacts SET {} WHERE id = ?", sets.join(", "));
        let changed = conn
            .execute(&sql, &values[..])
            .context("Failed to update contact")?;

        Ok(changed > 0)
    }

    pub fn delete(&self, id: i64) -> Result<bool> {
        let conn = open_db(&self.db_path)?;
        let removed = conn
            .execute("DELETE FROM contacts WHERE id = ?1", params![id])
            .context("Failed to delete contact")?;
        Ok(removed > 0)
    }
}

/// Public contact listing - GET /api/contacts
pub async fn list_contacts(
    State(state): State<PanelState>,
) -> Result<Json<serde_json::Value>, ApiError> {
    let contacts = state.contacts.list()?;
    Ok(Json(serde_json::json!({ "contacts": contacts })))
}

/// Create contact - POST /api/contacts (admin)
pub async fn create_contact(
    State(state): State<PanelState>,
    Extension(identity): Extension<AuthIdentity>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Json(payload): Json<CreateContactRequest>,
) -> Result<(axum::http::StatusCode, Json<Contact>), ApiError> {
    require_role(&identity, Role::Admin)?;

    if payload.title.trim().is_empty() || payload.telegram_link.trim().is_empty() {
        return Err(ApiError::bad_request("Title and telegram_link required"));
    }

    let contact = state.contacts.create(&payload)?;

    info!("contact created: {} ({})", contact.title, contact.id);
    state.audit.record(
        &identity.username,
        "create",
        "contact",
        Some(&contact.id.to_string()),
        Some(&contact.title),
        &client_address(&headers, peer),
    );

    Ok((axum::http::StatusCode::CREATED, Json(contact)))
}

/// Update contact - PUT /api/contacts/:id (admin)
pub async fn update_contact(
    State(state): State<PanelState>,
    Extension(identity): Extension<AuthIdentity>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(id): Path<i64>,
    Json(payload): Json<UpdateContactRequest>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&identity, Role::Admin)?;

    if !state.contacts.update(id, &payload)? {
        return Err(ApiError::NotFound("Contact not found"));
    }

    state.audit.record(
        &identity.username,
        "update",
        "contact",
        Some(&id.to_string()),
        None,
        &client_address(&headers, peer),
    );

    Ok(Json(serde_json::json!({ "message": "Contact updated" })))
}

/// Delete contact - DELETE /api/contacts/:id (admin)
pub async fn delete_contact(
    State(state): State<PanelState>,
    Extension(identity): Extension<AuthIdentity>,
    ConnectInfo(peer): ConnectInfo<SocketAddr>,
    headers: HeaderMap,
    Path(id): Path<i64>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&identity, Role::Admin)?;

    if !state.contacts.delete(id)? {
        return Err(ApiError::NotFound("Contact not found"));
    }

    state.audit.record(
        &identity.username,
        "delete",
        "contact",
        Some(&id.to_string()),
        None,
        &client_address(&headers, peer),
    );

    Ok(Json(serde_json::json!({ "message": "Contact deleted" })))
}
