//! User Storage
//! Mission: Securely store and manage admin accounts with SQLite

use crate::auth::models::{Role, User};
use crate::auth::password;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::{params, Connection};
use std::time::Duration;
use tracing::{info, warn};

/// Default busy timeout for every connection. Storage calls must not block
/// indefinitely; on timeout the request fails closed.
pub const DB_BUSY_TIMEOUT: Duration = Duration::from_secs(5);

/// Open a connection to the given database with the busy timeout applied.
pub fn open_db(db_path: &str) -> Result<Connection> {
    let conn = Connection::open(db_path)
        .with_context(|| format!("Failed to open database at {db_path}"))?;
    conn.busy_timeout(DB_BUSY_TIMEOUT)
        .context("Failed to set busy timeout")?;
    Ok(conn)
}

/// Outcome of a user creation attempt.
#[derive(Debug)]
pub enum CreateUserOutcome {
    Created(User),
    DuplicateUsername,
}

/// Outcome of a user deletion attempt.
#[derive(Debug, PartialEq, Eq)]
pub enum DeleteUserOutcome {
    Deleted,
    NotFound,
    /// The target is a superadmin. Superadmin records can never be deleted,
    /// regardless of who asks.
    ProtectedRole,
}

/// Admin credential store. Holds only the database path; every call opens a
/// fresh connection, mirroring the per-request connection model.
pub struct UserStore {
    db_path: String,
}

impl UserStore {
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
            "CREATE TABLE IF NOT EXISTS users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                role TEXT NOT NULL,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        self.seed_default_superadmin(&conn)?;

        Ok(())
    }

    /// Seed a default superadmin for initial setup when none exists.
    fn seed_default_superadmin(&self, conn: &Connection) -> Result<()> {
        let count: i64 = conn
            .query_row(
                "SELECT COUNT(*) FROM users WHERE role = 'superadmin'",
                [],
                |row| row.get(0),
            )
            .context("Failed to check for superadmin users")?;

        if count == 0 {
            let password_hash = password::hash_password("admin123")?;

            conn.execute(
                "INSERT INTO users (username, password_hash, role, created_at)
                 VALUES (?1, ?2, ?3, ?4)",
                params![
                    "admin",
                    password_hash,
                    Role::Superadmin.as_str(),
                    Utc::now().to_rfc3339(),
                ],
            )
            .context("Failed to insert default superadmin")?;

            info!("Default superadmin created (username: admin, password: admin123)");
            warn!("CHANGE DEFAULT PASSWORD IN PRODUCTION!");
        }

        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<User> {
        let role_str: String = row.get(3)?;
        Ok(User {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            role: Role::from_str(&role_str).unwrap_or(Role::Admin),
            created_at: row.get(4)?,
        })
    }

    pub fn find_by_username(&self, username: &str) -> Result<Option<User>> {
        let conn = open_db(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, role, created_at
             FROM users WHERE username = ?1",
        )?;

        match stmt.query_row(params![username], Self::row_to_user) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn find_by_id(&self, id: i64) -> Result<Option<User>> {
        let conn = open_db(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, role, created_at
             FROM users WHERE id = ?1",
        )?;

        match stmt.query_row(params![id], Self::row_to_user) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Insert a new user with an already-hashed password.
    pub fn create_user(
        &self,
        username: &str,
        password_hash: &str,
        role: Role,
    ) -> Result<CreateUserOutcome> {
        let conn = open_db(&self.db_path)?;

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM users WHERE username = ?1)",
                params![username],
                |row| row.get(0),
            )
            .context("Failed to check username")?;

        if exists {
            return Ok(CreateUserOutcome::DuplicateUsername);
        }

        let created_at = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO users (username, password_hash, role, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![username, password_hash, role.as_str(), created_at],
        )
        .context("Failed to insert user")?;

        let user = User {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            role,
            created_at,
        };

        info!("Created user: {} ({})", user.username, user.role.as_str());

        Ok(CreateUserOutcome::Created(user))
    }

    pub fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<()> {
        let conn = open_db(&self.db_path)?;
        conn.execute(
            "UPDATE users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )
        .context("Failed to update password hash")?;
        Ok(())
    }

    pub fn update_role(&self, id: i64, role: Role) -> Result<()> {
        let conn = open_db(&self.db_path)?;
        conn.execute(
            "UPDATE users SET role = ?1 WHERE id = ?2",
            params![role.as_str(), id],
        )
        .context("Failed to update role")?;
        Ok(())
    }

    /// Delete a user by username. Superadmin rows are protected
    /// unconditionally; the check is the store's, not the caller's.
    pub fn delete_by_username(&self, username: &str) -> Result<DeleteUserOutcome> {
        let conn = open_db(&self.db_path)?;

        let role: Option<String> = match conn.query_row(
            "SELECT role FROM users WHERE username = ?1",
            params![username],
            |row| row.get(0),
        ) {
            Ok(role) => Some(role),
            Err(rusqlite::Error::QueryReturnedNoRows) => None,
            Err(e) => return Err(e.into()),
        };

        match role.as_deref() {
            None => Ok(DeleteUserOutcome::NotFound),
            Some("superadmin") => Ok(DeleteUserOutcome::ProtectedRole),
            Some(_) => {
                conn.execute("DELETE FROM users WHERE username = ?1", params![username])
                    .context("Failed to delete user")?;
                info!("Deleted user: {}", username);
                Ok(DeleteUserOutcome::Deleted)
            }
        }
    }

    pub fn list_users(&self) -> Result<Vec<User>> {
        let conn = open_db(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, role, created_at
             FROM users ORDER BY id",
        )?;

        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }
}
