//! Password Hashing
//! Mission: One adaptive-cost algorithm everywhere, legacy digests migrated away

use anyhow::{Context, Result};
use bcrypt::DEFAULT_COST;
use sha2::{Digest, Sha256};

/// Result of checking a plaintext password against a stored hash.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum VerifyOutcome {
    NoMatch,
    Match {
        /// True when the stored hash uses the legacy unsalted SHA-256
        /// scheme and must be replaced with a bcrypt hash on this login.
        needs_rehash: bool,
    },
}

impl VerifyOutcome {
    pub fn is_match(&self) -> bool {
        matches!(self, VerifyOutcome::Match { .. })
    }
}

/// Hash a plaintext password with bcrypt at the default (adaptive) cost.
pub fn hash_password(plain: &str) -> Result<String> {
    bcrypt::hash(plain, DEFAULT_COST).context("Failed to hash password")
}

/// Verify a plaintext password against a stored hash.
///
/// Stored hashes are bcrypt (`$2...`) except for legacy rows carrying a bare
/// SHA-256 hex digest. Legacy digests verify exactly once per login and the
/// caller is told to re-hash; they are never written back.
pub fn verify_password(plain: &str, stored: &str) -> Result<VerifyOutcome> {
    if is_legacy_digest(stored) {
        let digest = hex::encode(Sha256::digest(plain.as_bytes()));
        if constant_time_eq(digest.as_bytes(), stored.as_bytes()) {
            return Ok(VerifyOutcome::Match { needs_rehash: true });
        }
        return Ok(VerifyOutcome::NoMatch);
    }

    let valid = bcrypt::verify(plain, stored).context("Failed to verify password")?;
    if valid {
        Ok(VerifyOutcome::Match {
            needs_rehash: false,
        })
    } else {
        Ok(VerifyOutcome::NoMatch)
    }
}

/// Legacy rows store `sha256(password)` as 64 lowercase hex characters.
fn is_legacy_digest(stored: &str) -> bool {
    stored.len() == 64
        && stored
            .bytes()
            .all(|b| b.is_ascii_digit() || (b'a'..=b'f').contains(&b))
}

/// Byte comparison whose runtime does not depend on where the inputs first
/// differ. Length mismatch short-circuits; lengths here are not secret.
fn constant_time_eq(a: &[u8], b: &[u8]) -> bool {
    if a.len() != b.len() {
        return false;
    }
    let mut diff = 0u8;
    for (x, y) in a.iter().zip(b.iter()) {
        diff |= x ^ y;
    }
    diff == 0
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_hash_and_verify_roundtrip() {
        let hash = hash_password("Secret123").unwrap();
        assert!(hash.starts_with("$2"));

        assert_eq!(
            verify_password("Secret123", &hash).unwrap(),
            VerifyOutcome::Match {
                needs_rehash: false
            }
        );
        assert_eq!(
            verify_password("Secret124", &hash).unwrap(),
            VerifyOutcome::NoMatch
        );
    }

    #[test]
    fn test_hashes_are_salted() {
        let a = hash_password("Secret123").unwrap();
        let b = hash_password("Secret123").unwrap();
        assert_ne!(a, b);
    }

    #[test]
    fn test_legacy_digest_matches_and_requests_rehash() {
        // sha256("Secret123")
        let legacy = hex::encode(Sha256::digest(b"Secret123"));

        assert_eq!(
            verify_password("Secret123", &legacy).unwrap(),
            VerifyOutcome::Match { needs_rehash: true }
        );
        assert_eq!(
            verify_password("wrong", &legacy).unwrap(),
            VerifyOutcome::NoMatch
        );
    }

    #[test]
    fn test_legacy_detection() {
        assert!(is_legacy_digest(&hex::encode(Sha256::digest(b"x"))));
        assert!(!is_legacy_digest("$2b$12$abcdefghijklmnopqrstuv"));
        // Right length, not hex
        assert!(!is_legacy_digest(&"z".repeat(64)));
    }

    #[test]
    fn test_constant_time_eq() {
        assert!(constant_time_eq(b"abc", b"abc"));
        assert!(!constant_time_eq(b"abc", b"abd"));
        assert!(!constant_time_eq(b"abc", b"ab"));
    }
}
