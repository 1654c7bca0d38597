//! Audit Log
//! Mission: Append-only record of privileged admin actions

use crate::api::PanelState;
use crate::auth::guard::require_role;
use crate::auth::models::{AuthIdentity, Role};
use crate::auth::user_store::open_db;
use crate::errors::ApiError;
use anyhow::{Context, Result};
use axum::{
    extract::{Query, State},
    Extension, Json,
};
use chrono::Utc;
use rusqlite::params;
use serde::{Deserialize, Serialize};
use tracing::warn;

/// One recorded admin action.
#[derive(Debug, Clone, Serialize)]
pub struct AuditEntry {
    pub id: i64,
    pub admin_username: String,
    pub action_type: String,
    pub target_type: String,
    pub target_id: Option<String>,
    pub details: Option<String>,
    pub ip_address: String,
    pub created_at: String,
}

/// Append-only audit store over the `admin_actions` table.
pub struct AuditLog {
    db_path: String,
}

impl AuditLog {
    pub fn new(db_path: &str) -> Result<Self> {
        let log = Self {
            db_path: db_path.to_string(),
        };
        log.init_db()?;
        Ok(log)
    }

    fn init_db(&self) -> Result<()> {
        let conn = open_db(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS admin_actions (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                admin_username TEXT NOT NULL,
                action_type TEXT NOT NULL,
                target_type TEXT NOT NULL,
                target_id TEXT,
                details TEXT,
                ip_address TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Fire-and-forget write. Audit failures are logged and swallowed; they
    /// never fail the mutation they describe.
    pub fn record(
        &self,
        admin_username: &str,
        action_type: &str,
        target_type: &str,
        target_id: Option<&str>,
        details: Option<&str>,
        ip_address: &str,
    ) {
        let result = (|| -> Result<()> {
            let conn = open_db(&self.db_path)?;
            conn.execute(
                "INSERT INTO admin_actions
                 (admin_username, action_type, target_type, target_id, details, ip_address, created_at)
                 VALUES (?1, ?2, ?3, ?4, ?5, ?6, ?7)",
                params![
                    admin_username,
                    action_type,
                    target_type,
                    target_id,
                    details,
                    ip_address,
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to insert audit record")?;
            Ok(())
        })();

        if let Err(e) = result {
            warn!("audit record dropped ({action_type} on {target_type}): {e}");
        }
    }

    pub fn list(&self, limit: u32, offset: u32) -> Result<Vec<AuditEntry>> {
        let conn = open_db(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, admin_username, action_type, target_type, target_id,
                    details, ip_address, created_at
             FROM admin_actions
             ORDER BY created_at DESC, id DESC
             LIMIT ?1 OFFSET ?2",
        )?;

        let entries = stmt
            .query_map(params![limit, offset], |row| {
                Ok(AuditEntry {
                    id: row.get(0)?,
                    admin_username: row.get(1)?,
                    action_type: row.get(2)?,
                    target_type: row.get(3)?,
                    target_id: row.get(4)?,
                    details: row.get(5)?,
                    ip_address: row.get(6)?,
                    created_at: row.get(7)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(entries)
    }
}

#[derive(Debug, Deserialize)]
pub struct AuditQuery {
    #[serde(default = "default_limit")]
    pub limit: u32,
    #[serde(default)]
    pub offset: u32,
}

fn default_limit() -> u32 {
    100
}

/// Audit log listing - GET /api/admin/audit (superadmin only)
pub async fn list_audit(
    State(state): State<PanelState>,
    Extension(identity): Extension<AuthIdentity>,
    Query(query): Query<AuditQuery>,
) -> Result<Json<serde_json::Value>, ApiError> {
    require_role(&identity, Role::Superadmin)?;

    let logs = state.audit.list(query.limit.min(1000), query.offset)?;

    Ok(Json(serde_json::json!({ "logs": logs })))
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_log() -> (AuditLog, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let log = AuditLog::new(temp.path().to_str().unwrap()).unwrap();
        (log, temp)
    }

    #[test]
    fn test_record_and_list() {
        let (log, _temp) = create_test_log();

        log.record(
            "admin",
            "delete",
            "user",
            Some("alice"),
            Some("removed stale account"),
            "10.0.0.1",
        );
        log.record("admin", "update", "settings", None, None, "10.0.0.1");

        let entries = log.list(100, 0).unwrap();
        assert_eq!(entries.len(), 2);
        // Newest first
        assert_eq!(entries[0].action_type, "update");
        assert_eq!(entries[1].target_id.as_deref(), Some("alice"));
    }

    #[test]
    fn test_pagination() {
        let (log, _temp) = create_test_log();

        for i in 0..5 {
            log.record("admin", "create", "contact", Some(&i.to_string()), None, "x");
        }

        let page = log.list(2, 0).unwrap();
        assert_eq!(page.len(), 2);
        let rest = log.list(10, 4).unwrap();
        assert_eq!(rest.len(), 1);
    }

    #[test]
    fn test_record_never_panics_on_bad_db() {
        let log = AuditLog {
            db_path: "/nonexistent-dir/audit.db".to_string(),
        };
        // Swallowed, logged
        log.record("admin", "create", "contact", None, None, "x");
    }
}
