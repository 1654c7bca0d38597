//! Chat Storage
//! Mission: Chat accounts and messages with SQLite

use crate::auth::user_store::open_db;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;
use serde::Serialize;
use tracing::info;

/// A chat account. Separate from admin users; carries no role.
#[derive(Debug, Clone, Serialize)]
pub struct ChatUser {
    pub id: i64,
    pub username: String,
    #[serde(skip_serializing)]
    pub password_hash: String,
    pub is_banned: bool,
    pub telegram_username: Option<String>,
    pub created_at: String,
}

/// A chat message joined with its author's username.
#[derive(Debug, Clone, Serialize)]
pub struct ChatMessage {
    pub id: i64,
    pub user_id: i64,
    pub message: String,
    pub username: String,
    pub created_at: String,
}

#[derive(Debug)]
pub enum CreateChatUserOutcome {
    Created(ChatUser),
    DuplicateUsername,
}

/// Chat storage over the `chat_users` and `chat_messages` tables.
pub struct ChatStore {
    db_path: String,
}

impl ChatStore {
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
            "CREATE TABLE IF NOT EXISTS chat_users (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                username TEXT UNIQUE NOT NULL,
                password_hash TEXT NOT NULL,
                is_banned INTEGER NOT NULL DEFAULT 0,
                telegram_username TEXT,
                created_at TEXT NOT NULL
            )",
            [],
        )?;

        conn.execute(
            "CREATE TABLE IF NOT EXISTS chat_messages (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                user_id INTEGER NOT NULL,
                message TEXT NOT NULL,
                is_removed INTEGER NOT NULL DEFAULT 0,
                created_at TEXT NOT NULL,
                FOREIGN KEY (user_id) REFERENCES chat_users(id)
            )",
            [],
        )?;

        Ok(())
    }

    fn row_to_user(row: &rusqlite::Row<'_>) -> rusqlite::Result<ChatUser> {
        Ok(ChatUser {
            id: row.get(0)?,
            username: row.get(1)?,
            password_hash: row.get(2)?,
            is_banned: row.get(3)?,
            telegram_username: row.get(4)?,
            created_at: row.get(5)?,
        })
    }

    pub fn find_user_by_username(&self, username: &str) -> Result<Option<ChatUser>> {
        let conn = open_db(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, is_banned, telegram_username, created_at
             FROM chat_users WHERE username = ?1",
        )?;

        match stmt.query_row(params![username], Self::row_to_user) {
            Ok(user) => Ok(Some(user)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    pub fn create_user(&self, username: &str, password_hash: &str) -> Result<CreateChatUserOutcome> {
        let conn = open_db(&self.db_path)?;

        let exists: bool = conn
            .query_row(
                "SELECT EXISTS(SELECT 1 FROM chat_users WHERE username = ?1)",
                params![username],
                |row| row.get(0),
            )
            .context("Failed to check chat username")?;

        if exists {
            return Ok(CreateChatUserOutcome::DuplicateUsername);
        }

        let created_at = Utc::now().to_rfc3339();
        conn.execute(
            "INSERT INTO chat_users (username, password_hash, created_at)
             VALUES (?1, ?2, ?3)",
            params![username, password_hash, created_at],
        )
        .context("Failed to insert chat user")?;

        let user = ChatUser {
            id: conn.last_insert_rowid(),
            username: username.to_string(),
            password_hash: password_hash.to_string(),
            is_banned: false,
            telegram_username: None,
            created_at,
        };

        info!("chat user registered: {}", user.username);

        Ok(CreateChatUserOutcome::Created(user))
    }

    pub fn update_password_hash(&self, id: i64, password_hash: &str) -> Result<()> {
        let conn = open_db(&self.db_path)?;
        conn.execute(
            "UPDATE chat_users SET password_hash = ?1 WHERE id = ?2",
            params![password_hash, id],
        )
        .context("Failed to update chat password hash")?;
        Ok(())
    }

    /// Ban state for a chat user; `None` when the account no longer exists.
    pub fn is_banned(&self, user_id: i64) -> Result<Option<bool>> {
        let conn = open_db(&self.db_path)?;

        match conn.query_row(
            "SELECT is_banned FROM chat_users WHERE id = ?1",
            params![user_id],
            |row| row.get::<_, bool>(0),
        ) {
            Ok(banned) => Ok(Some(banned)),
            Err(rusqlite::Error::QueryReturnedNoRows) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Set ban state. Returns false when the user is unknown.
    pub fn set_banned(&self, user_id: i64, banned: bool) -> Result<bool> {
        let conn = open_db(&self.db_path)?;
        let changed = conn
            .execute(
                "UPDATE chat_users SET is_banned = ?1 WHERE id = ?2",
                params![banned, user_id],
            )
            .context("Failed to update ban state")?;
        Ok(changed > 0)
    }

    pub fn list_users(&self) -> Result<Vec<ChatUser>> {
        let conn = open_db(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT id, username, password_hash, is_banned, telegram_username, created_at
             FROM chat_users ORDER BY created_at DESC, id DESC",
        )?;

        let users = stmt
            .query_map([], Self::row_to_user)?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(users)
    }

    pub fn messages(&self, limit: u32) -> Result<Vec<ChatMessage>> {
        let conn = open_db(&self.db_path)?;

        let mut stmt = conn.prepare(
            "SELECT m.id, m.user_id, m.message, m.created_at, u.username
             FROM chat_messages m
             JOIN chat_users u ON m.user_id = u.id
             WHERE m.is_removed = 0
             ORDER BY m.created_at ASC, m.id ASC
             LIMIT ?1",
        )?;

        let messages = stmt
            .query_map(params![limit], |row| {
                Ok(ChatMessage {
                    id: row.get(0)?,
                    user_id: row.get(1)?,
                    message: row.get(2)?,
                    created_at: row.get(3)?,
                    username: row.get(4)?,
                })
            })?
            .collect::<Result<Vec<_>, _>>()?;

        Ok(messages)
    }

    pub fn insert_message(&self, user_id: i64, message: &str) -> Result<i64> {
        let conn = open_db(&self.db_path)?;
        conn.execute(
            "INSERT INTO chat_messages (user_id, message, created_at)
             VALUES (?1, ?2, ?3)",
            params![user_id, message, Utc::now().to_rfc3339()],
        )
        .context("Failed to insert chat message")?;
        Ok(conn.last_insert_rowid())
    }

    /// Soft-delete a message. Returns false when the message is unknown.
    pub fn remove_message(&self, message_id: i64) -> Result<bool> {
        let conn = open_db(&self.db_path)?;
        let changed = conn
            .execute(
                "UPDATE chat_messages SET is_removed = 1 WHERE id = ?1",
                params![message_id],
            )
            .context("Failed to remove chat message")?;
        Ok(changed > 0)
    }
}
