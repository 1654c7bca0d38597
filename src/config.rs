//! Application Configuration
//! Mission: Collect every tunable from the environment once, pass it in explicitly

use std::time::Duration;

/// Application configuration. Built once at startup; components receive the
/// values they need at construction so tests can inject deterministic ones.
#[derive(Debug, Clone)]
pub struct AppConfig {
    pub database_path: String,
    pub port: u16,
    /// Secret for the signed-claims (HS256) admin tokens.
    pub jwt_secret: String,
    /// Lifetime of admin panel tokens.
    pub admin_token_ttl_hours: i64,
    /// Lifetime of opaque chat session tokens.
    pub chat_session_ttl_days: i64,
    /// Trailing window inspected for failed login attempts.
    pub throttle_window: Duration,
    /// Failed attempts within the window before a client is blocked.
    pub throttle_max_failures: u32,
    /// Minimum wall-clock duration of any login response. Masks the latency
    /// difference between unknown-user and wrong-password outcomes.
    pub login_floor: Duration,
    /// Re-fetch the user's role from the credential store on every signed
    /// token verification, so role changes apply without re-login.
    pub refresh_role_on_verify: bool,
}

impl AppConfig {
    pub fn from_env() -> Self {
        dotenv::dotenv().ok();

        let database_path = std::env::var("DATABASE_PATH")
            .unwrap_or_else(|_| "./contacts_admin.db".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "8080".to_string())
            .parse()
            .unwrap_or(8080);

        let jwt_secret = std::env::var("JWT_SECRET").unwrap_or_else(|_| {
            "dev-secret-change-in-production-minimum-32-characters".to_string()
        });

        let admin_token_ttl_hours = std::env::var("ADMIN_TOKEN_TTL_HOURS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(24);

        let chat_session_ttl_days = std::env::var("CHAT_SESSION_TTL_DAYS")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(30);

        let throttle_window_minutes = std::env::var("LOGIN_THROTTLE_WINDOW_MINUTES")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .filter(|&v| v > 0)
            .unwrap_or(15);

        let throttle_max_failures = std::env::var("LOGIN_THROTTLE_MAX_FAILURES")
            .ok()
            .and_then(|v| v.parse().ok())
            .filter(|&v| v > 0)
            .unwrap_or(5);

        let login_floor_ms = std::env::var("LOGIN_FLOOR_MS")
            .ok()
            .and_then(|v| v.parse::<u64>().ok())
            .unwrap_or(500);

        let refresh_role_on_verify = std::env::var("REFRESH_ROLE_ON_VERIFY")
            .map(|v| matches!(v.as_str(), "1" | "true" | "TRUE" | "on" | "ON"))
            .unwrap_or(true);

        Self {
            database_path,
            port,
            jwt_secret,
            admin_token_ttl_hours,
            chat_session_ttl_days,
            throttle_window: Duration::from_secs(throttle_window_minutes * 60),
            throttle_max_failures,
            login_floor: Duration::from_millis(login_floor_ms),
            refresh_role_on_verify,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_defaults() {
        let config = AppConfig::from_env();
        assert!(config.port > 0);
        assert!(config.admin_token_ttl_hours > 0);
        assert_eq!(config.throttle_max_failures, 5);
        assert_eq!(config.throttle_window, Duration::from_secs(15 * 60));
    }
}
