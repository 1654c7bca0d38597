//! Token Issuing and Verification
//! Mission: Two bearer token mechanisms behind one capability

use crate::auth::models::{AuthIdentity, Claims, Role};
use crate::auth::user_store::{open_db, UserStore};
use anyhow::{Context, Result};
use base64::{engine::general_purpose::URL_SAFE_NO_PAD, Engine};
use chrono::Utc;
use jsonwebtoken::{decode, encode, DecodingKey, EncodingKey, Header, Validation};
use rand::rngs::OsRng;
use rand::RngCore;
use rusqlite::params;
use std::sync::Arc;
use tracing::debug;

/// A freshly issued bearer token.
#[derive(Debug, Clone)]
pub struct IssuedToken {
    pub token: String,
    pub expires_in: u64, // seconds
}

/// Issue and verify bearer tokens. Verification failures of any kind
/// (malformed, expired, bad signature, unknown session, vanished user)
/// collapse to `None` so callers cannot tell which check failed.
pub trait TokenAuthority: Send + Sync {
    fn issue(&self, user_id: i64, username: &str, role: Option<Role>) -> Result<IssuedToken>;
    fn verify(&self, token: &str) -> Option<AuthIdentity>;
}

/// Signed-claims variant: a self-contained HS256 token. No storage lookup
/// unless role re-fetch is enabled.
pub struct SignedTokenAuthority {
    secret: String,
    ttl_hours: i64,
    /// When set, the current role is re-read from the credential store on
    /// every verification, so a role change or account deletion takes
    /// effect without re-login.
    role_source: Option<Arc<UserStore>>,
}

impl SignedTokenAuthority {
    pub fn new(secret: String, ttl_hours: i64) -> Self {
        Self {
            secret,
            ttl_hours,
            role_source: None,
        }
    }

    pub fn with_role_source(mut self, users: Arc<UserStore>) -> Self {
        self.role_source = Some(users);
        self
    }
}

impl TokenAuthority for SignedTokenAuthority {
    fn issue(&self, user_id: i64, username: &str, role: Option<Role>) -> Result<IssuedToken> {
        let now = Utc::now();
        let expiry = now
            .checked_add_signed(chrono::Duration::hours(self.ttl_hours))
            .context("Invalid timestamp")?;

        let claims = Claims {
            sub: user_id.to_string(),
            username: username.to_string(),
            role,
            iat: now.timestamp() as usize,
            exp: expiry.timestamp() as usize,
        };

        debug!(
            "Issuing signed token for user {} ({}), expires in {}h",
            username, user_id, self.ttl_hours
        );

        let token = encode(
            &Header::default(),
            &claims,
            &EncodingKey::from_secret(self.secret.as_bytes()),
        )
        .context("Failed to sign token")?;

        Ok(IssuedToken {
            token,
            expires_in: (self.ttl_hours * 3600).max(0) as u64,
        })
    }

    fn verify(&self, token: &str) -> Option<AuthIdentity> {
        let decoded = decode::<Claims>(
            token,
            &DecodingKey::from_secret(self.secret.as_bytes()),
            &Validation::default(),
        )
        .ok()?;

        let claims = decoded.claims;
        let user_id: i64 = claims.sub.parse().ok()?;

        if let Some(users) = &self.role_source {
            // Verification fails if the account has vanished since issue.
            let user = users.find_by_id(user_id).ok()??;
            return Some(AuthIdentity {
                user_id,
                username: user.username,
                role: Some(user.role),
            });
        }

        Some(AuthIdentity {
            user_id,
            username: claims.username,
            role: claims.role,
        })
    }
}

/// Opaque session variant: a random high-entropy string whose validity is a
/// storage lookup. Owns the `sessions` table exclusively. Expiry is fixed at
/// issue and never refreshed on use.
pub struct SessionTokenAuthority {
    db_path: String,
    ttl_seconds: i64,
}

impl SessionTokenAuthority {
    pub fn new(db_path: &str, ttl: chrono::Duration) -> Result<Self> {
        let authority = Self {
            db_path: db_path.to_string(),
            ttl_seconds: ttl.num_seconds(),
        };
        authority.init_db()?;
        Ok(authority)
    }

    fn init_db(&self) -> Result<()> {
        let conn = open_db(&self.db_path)?;
        conn.execute(
            "CREATE TABLE IF NOT EXISTS sessions (
                token TEXT PRIMARY KEY,
                user_id INTEGER NOT NULL,
                username TEXT NOT NULL,
                role TEXT,
                expires_at INTEGER NOT NULL
            )",
            [],
        )?;
        Ok(())
    }

    /// Delete a session row, invalidating the token. Returns whether a row
    /// existed.
    pub fn revoke(&self, token: &str) -> Result<bool> {
        let conn = open_db(&self.db_path)?;
        let removed = conn
            .execute("DELETE FROM sessions WHERE token = ?1", params![token])
            .context("Failed to revoke session")?;
        Ok(removed > 0)
    }

    fn generate_token() -> String {
        let mut bytes = [0u8; 32];
        OsRng.fill_bytes(&mut bytes);
        URL_SAFE_NO_PAD.encode(bytes)
    }
}

impl TokenAuthority for SessionTokenAuthority {
    fn issue(&self, user_id: i64, username: &str, role: Option<Role>) -> Result<IssuedToken> {
        let conn = open_db(&self.db_path)?;
        let now = Utc::now().timestamp();

        // Opportunistic cleanup; dead sessions have no other reaper.
        conn.execute(
            "DELETE FROM sessions WHERE expires_at <= ?1",
            params![now],
        )
        .context("Failed to prune expired sessions")?;

        let token = Self::generate_token();
        let expires_at = now + self.ttl_seconds;

        conn.execute(
            "INSERT INTO sessions (token, user_id, username, role, expires_at)
             VALUES (?1, ?2, ?3, ?4, ?5)",
            params![
                token,
                user_id,
                username,
                role.map(|r| r.as_str().to_string()),
                expires_at,
            ],
        )
        .context("Failed to store session")?;

        debug!("Issued session token for user {} ({})", username, user_id);

        Ok(IssuedToken {
            token,
            expires_in: self.ttl_seconds.max(0) as u64,
        })
    }

    fn verify(&self, token: &str) -> Option<AuthIdentity> {
        let conn = open_db(&self.db_path).ok()?;

        let row = conn
            .query_row(
                "SELECT user_id, username, role, expires_at
                 FROM sessions WHERE token = ?1",
                params![token],
                |row| {
                    Ok((
                        row.get::<_, i64>(0)?,
                        row.get::<_, String>(1)?,
                        row.get::<_, Option<String>>(2)?,
                        row.get::<_, i64>(3)?,
                    ))
                },
            )
            .ok()?;

        let (user_id, username, role_str, expires_at) = row;
        if Utc::now().timestamp() >= expires_at {
            return None;
        }

        Some(AuthIdentity {
            user_id,
            username,
            role: role_str.as_deref().and_then(Role::from_str),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::auth::password;
    use crate::auth::user_store::CreateUserOutcome;
    use tempfile::NamedTempFile;

    const SECRET: &str = "test-secret-key-12345";

    #[test]
    fn test_signed_roundtrip() {
        let authority = SignedTokenAuthority::new(SECRET.to_string(), 24);

        let issued = authority.issue(7, "alice", Some(Role::Admin)).unwrap();
        assert!(!issued.token.is_empty());
        assert_eq!(issued.expires_in, 24 * 3600);

        let identity = authority.verify(&issued.token).unwrap();
        assert_eq!(identity.user_id, 7);
        assert_eq!(identity.username, "alice");
        assert_eq!(identity.role, Some(Role::Admin));

        // Verification is repeatable; tokens are not consumed.
        assert!(authority.verify(&issued.token).is_some());
    }

    #[test]
    fn test_signed_expired_rejected() {
        let authority = SignedTokenAuthority::new(SECRET.to_string(), -1);
        let issued = authority.issue(1, "alice", None).unwrap();
        assert!(authority.verify(&issued.token).is_none());
    }

    #[test]
    fn test_signed_tamper_rejected() {
        let authority = SignedTokenAuthority::new(SECRET.to_string(), 24);
        let issued = authority.issue(1, "alice", Some(Role::Admin)).unwrap();

        // Flip one character in each of the three segments in turn.
        let parts: Vec<&str> = issued.token.split('.').collect();
        assert_eq!(parts.len(), 3);
        for segment in 1..3 {
            let mut tampered: Vec<String> = parts.iter().map(|s| s.to_string()).collect();
            let mut chars: Vec<char> = tampered[segment].chars().collect();
            let mid = chars.len() / 2;
            chars[mid] = if chars[mid] == 'A' { 'B' } else { 'A' };
            tampered[segment] = chars.into_iter().collect();
            assert!(
                authority.verify(&tampered.join(".")).is_none(),
                "tampered segment {segment} accepted"
            );
        }
    }

    #[test]
    fn test_signed_wrong_secret_rejected() {
        let a = SignedTokenAuthority::new("secret1".to_string(), 24);
        let b = SignedTokenAuthority::new("secret2".to_string(), 24);

        let issued = a.issue(1, "alice", None).unwrap();
        assert!(b.verify(&issued.token).is_none());
    }

    #[test]
    fn test_signed_malformed_rejected() {
        let authority = SignedTokenAuthority::new(SECRET.to_string(), 24);
        assert!(authority.verify("not.a.token").is_none());
        assert!(authority.verify("").is_none());
    }

    #[test]
    fn test_role_refresh_on_verify() {
        let temp = NamedTempFile::new().unwrap();
        let db_path = temp.path().to_str().unwrap();
        let users = Arc::new(UserStore::new(db_path).unwrap());

        let hash = password::hash_password("pass12").unwrap();
        let user = match users.create_user("bob", &hash, Role::Admin).unwrap() {
            CreateUserOutcome::Created(u) => u,
            other => panic!("expected Created, got {other:?}"),
        };

        let authority =
            SignedTokenAuthority::new(SECRET.to_string(), 24).with_role_source(users.clone());
        let issued = authority.issue(user.id, &user.username, Some(user.role)).unwrap();

        // Role change takes effect without re-login.
        users.update_role(user.id, Role::Superadmin).unwrap();
        let identity = authority.verify(&issued.token).unwrap();
        assert_eq!(identity.role, Some(Role::Superadmin));

        // Deleted account fails verification outright.
        users.delete_by_username("bob").unwrap();
        assert!(authority.verify(&issued.token).is_none());
    }

    fn session_authority(ttl: chrono::Duration) -> (SessionTokenAuthority, NamedTempFile) {
        let temp = NamedTempFile::new().unwrap();
        let db_path = temp.path().to_str().unwrap();
        let authority = SessionTokenAuthority::new(db_path, ttl).unwrap();
        (authority, temp)
    }

    #[test]
    fn test_session_roundtrip() {
        let (authority, _temp) = session_authority(chrono::Duration::days(30));

        let issued = authority.issue(3, "chatter", None).unwrap();
        assert_eq!(issued.expires_in, 30 * 86400);

        let identity = authority.verify(&issued.token).unwrap();
        assert_eq!(identity.user_id, 3);
        assert_eq!(identity.username, "chatter");
        assert_eq!(identity.role, None);

        assert!(authority.verify("no-such-token").is_none());
    }

    #[test]
    fn test_session_expired_rejected() {
        let (authority, _temp) = session_authority(chrono::Duration::seconds(-1));
        let issued = authority.issue(3, "chatter", None).unwrap();
        assert!(authority.verify(&issued.token).is_none());
    }

    #[test]
    fn test_session_verify_does_not_slide_expiry() {
        let (authority, temp) = session_authority(chrono::Duration::days(1));
        let issued = authority.issue(3, "chatter", None).unwrap();

        let read_expiry = || -> i64 {
            let conn = rusqlite::Connection::open(temp.path()).unwrap();
            conn.query_row(
                "SELECT expires_at FROM sessions WHERE token = ?1",
                params![issued.token],
                |row| row.get(0),
            )
            .unwrap()
        };

        let before = read_expiry();
        assert!(authority.verify(&issued.token).is_some());
        assert!(authority.verify(&issued.token).is_some());
        assert_eq!(read_expiry(), before);
    }

    #[test]
    fn test_session_revoke() {
        let (authority, _temp) = session_authority(chrono::Duration::days(1));
        let issued = authority.issue(3, "chatter", None).unwrap();

        assert!(authority.revoke(&issued.token).unwrap());
        assert!(authority.verify(&issued.token).is_none());
        assert!(!authority.revoke(&issued.token).unwrap());
    }

    #[test]
    fn test_session_tokens_unique_and_urlsafe() {
        let (authority, _temp) = session_authority(chrono::Duration::days(1));
        let a = authority.issue(1, "u1", None).unwrap().token;
        let b = authority.issue(1, "u1", None).unwrap().token;
        assert_ne!(a, b);
        assert!(a
            .chars()
            .all(|c| c.is_ascii_alphanumeric() || c == '-' || c == '_'));
    }
}
