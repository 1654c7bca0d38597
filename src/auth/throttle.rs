//! Login Throttle
//! Mission: Count recent failed logins per client and block brute force

use crate::auth::user_store::open_db;
use anyhow::{Context, Result};
use chrono::Utc;
use rusqlite::params;
use std::time::Duration;
use tracing::warn;

/// Failed-login throttle backed by an append-only `login_attempts` table.
/// Attempt rows are never deleted; blocking looks only at a trailing window,
/// so a block lapses once the window slides past the last failure.
pub struct LoginThrottle {
    db_path: String,
    window_secs: i64,
    max_failures: u32,
}

impl LoginThrottle {
    pub fn new(db_path: &str, window: Duration, max_failures: u32) -> Result<Self> {
        let throttle = Self {
            db_path: db_path.to_string(),
            window_secs: window.as_secs() as i64,
            max_failures,
        };
        throttle.init_db()?;
        Ok(throttle)
    }

    fn init_db(&self) -> Result<()> {
        let conn = open_db(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS login_attempts (
                id INTEGER PRIMARY KEY AUTOINCREMENT,
                ip_address TEXT NOT NULL,
                username TEXT NOT NULL,
                success INTEGER NOT NULL,
                created_at INTEGER NOT NULL
            )",
            [],
        )?;
        conn.execute(
            "CREATE INDEX IF NOT EXISTS idx_login_attempts_ip_time
             ON login_attempts(ip_address, created_at DESC)",
            [],
        )?;
        Ok(())
    }

    /// Whether this client has accumulated enough recent failures to be
    /// blocked. Must be consulted BEFORE any password hashing.
    pub fn is_blocked(&self, client_addr: &str) -> Result<bool> {
        let conn = open_db(&self.db_path)?;
        let cutoff = Utc::now().timestamp() - self.window_secs;

        let failures: u32 = conn
            .query_row(
                "SELECT COUNT(*) FROM login_attempts
                 WHERE ip_address = ?1 AND success = 0 AND created_at >= ?2",
                params![client_addr, cutoff],
                |row| row.get(0),
            )
            .context("Failed to count login attempts")?;

        if failures >= self.max_failures {
            warn!(
                client = client_addr,
                failures, "login blocked by throttle"
            );
            return Ok(true);
        }
        Ok(false)
    }

    /// Record one attempt, successful or not. Called for every attempt after
    /// the blocking decision, including blocked ones.
    pub fn record_attempt(&self, client_addr: &str, username: &str, success: bool) -> Result<()> {
        let conn = open_db(&self.db_path)?;
        conn.execute(
            "INSERT INTO login_attempts (ip_address, username, success, created_at)
             VALUES (?1, ?2, ?3, ?4)",
            params![client_addr, username, success, Utc::now().timestamp()],
        )
        .context("Failed to record login attempt")?;
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::NamedTempFile;

    fn create_test_throttle(max_failures: u32) -> (LoginThrottle, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let db_path = temp.path().to_str().unwrap();
        let throttle =
            LoginThrottle::new(db_path, Duration::from_secs(15 * 60), max_failures).unwrap();
        (throttle, temp)
    }

    #[test]
    fn test_blocks_after_threshold() {
        let (throttle, _temp) = create_test_throttle(5);

        for _ in 0..4 {
            throttle.record_attempt("10.0.0.1", "alice", false).unwrap();
        }
        assert!(!throttle.is_blocked("10.0.0.1").unwrap());

        throttle.record_attempt("10.0.0.1", "alice", false).unwrap();
        assert!(throttle.is_blocked("10.0.0.1").unwrap());
    }

    #[test]
    fn test_other_clients_unaffected() {
        let (throttle, _temp) = create_test_throttle(5);

        for _ in 0..5 {
            throttle.record_attempt("10.0.0.1", "alice", false).unwrap();
        }
        assert!(throttle.is_blocked("10.0.0.1").unwrap());
        assert!(!throttle.is_blocked("10.0.0.2").unwrap());
    }

    #[test]
    fn test_successes_do_not_count_or_clear() {
        let (throttle, _temp) = create_test_throttle(5);

        for _ in 0..10 {
            throttle.record_attempt("10.0.0.1", "alice", true).unwrap();
        }
        assert!(!throttle.is_blocked("10.0.0.1").unwrap());

        for _ in 0..5 {
            throttle.record_attempt("10.0.0.1", "alice", false).unwrap();
        }
        assert!(throttle.is_blocked("10.0.0.1").unwrap());

        // Strict lockout: a success never clears prior failures.
        throttle.record_attempt("10.0.0.1", "alice", true).unwrap();
        assert!(throttle.is_blocked("10.0.0.1").unwrap());
    }

    #[test]
    fn test_old_failures_outside_window_ignored() {
        let temp = NamedTempFile::new().unwrap();
        let db_path = temp.path().to_str().unwrap();
        let throttle = LoginThrottle::new(db_path, Duration::from_secs(900), 5).unwrap();

        // Backdate five failures past the window.
        let conn = rusqlite::Connection::open(temp.path()).unwrap();
        let old = Utc::now().timestamp() - 1000;
        for _ in 0..5 {
            conn.execute(
                "INSERT INTO login_attempts (ip_address, username, success, created_at)
                 VALUES ('10.0.0.1', 'alice', 0, ?1)",
                params![old],
            )
            .unwrap();
        }

        assert!(!throttle.is_blocked("10.0.0.1").unwrap());
    }
}
