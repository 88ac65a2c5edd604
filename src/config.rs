//! Application configuration loaded from environment variables.
//!
//! Secrets (JWT signing key, OTP key) are read once at startup and kept in
//! memory only. Cloud Run injects them as environment variables through
//! secret bindings.

use std::env;
use std::str::FromStr;

/// Which document store backs the service.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StoreBackend {
    Firestore,
    Memory,
}

impl FromStr for StoreBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "firestore" => Ok(StoreBackend::Firestore),
            "memory" => Ok(StoreBackend::Memory),
            _ => Err(ConfigError::Invalid("STORE_BACKEND")),
        }
    }
}

/// Application configuration, loaded once at startup.
#[derive(Clone)]
pub struct Config {
    // --- Environment Variables (non-sensitive) ---
    /// Frontend URL (CORS origin, cookie security, email links)
    pub frontend_url: String,
    /// GCP project ID
    pub gcp_project_id: String,
    /// Server port
    pub port: u16,
    pub store_backend: StoreBackend,
    /// Google OAuth client ID; Google sign-in is disabled when unset
    pub google_client_id: Option<String>,
    /// Mail relay endpoint; codes are only logged as dispatched when unset
    pub mail_webhook_url: Option<String>,

    // --- Policy ---
    pub session_ttl_hours: i64,
    pub otp_ttl_minutes: i64,
    pub otp_max_attempts: u32,
    /// Offset from UTC of the calendar used for the daily claim limit
    pub claim_utc_offset_minutes: i32,
    pub claim_points: i64,
    pub argon2_memory_kib: u32,
    pub argon2_iterations: u32,
    /// If set, Argon2 iterations are calibrated at startup to this target
    pub argon2_target_ms: Option<u64>,

    // --- Secrets ---
    /// JWT signing key for session tokens (raw bytes)
    pub jwt_signing_key: Vec<u8>,
    /// Key for hashing one-time codes
    pub otp_hmac_key: Vec<u8>,
    pub mail_webhook_token: Option<String>,
}

impl std::fmt::Debug for Config {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Config")
            .field("frontend_url", &self.frontend_url)
            .field("gcp_project_id", &self.gcp_project_id)
            .field("port", &self.port)
            .field("store_backend", &self.store_backend)
            .field("google_client_id", &self.google_client_id)
            .field("mail_webhook_url", &self.mail_webhook_url)
            .field("session_ttl_hours", &self.session_ttl_hours)
            .field("otp_ttl_minutes", &self.otp_ttl_minutes)
            .field("otp_max_attempts", &self.otp_max_attempts)
            .field("claim_utc_offset_minutes", &self.claim_utc_offset_minutes)
            .field("claim_points", &self.claim_points)
            .finish_non_exhaustive()
    }
}

impl Config {
    /// Config for tests: in-memory store, cheap hashing, fixed keys.
    pub fn test_default() -> Self {
        Self {
            frontend_url: "http://localhost:5173".to_string(),
            gcp_project_id: "test-project".to_string(),
            port: 8080,
            store_backend: StoreBackend::Memory,
            google_client_id: None,
            mail_webhook_url: None,
            session_ttl_hours: 6,
            otp_ttl_minutes: 10,
            otp_max_attempts: 3,
            claim_utc_offset_minutes: 0,
            claim_points: 10,
            argon2_memory_kib: 1024,
            argon2_iterations: 1,
            argon2_target_ms: None,
            jwt_signing_key: b"test_jwt_key_32_bytes_minimum!!".to_vec(),
            otp_hmac_key: b"test_otp_key_32_bytes_minimum!!".to_vec(),
            mail_webhook_token: None,
        }
    }

    /// Load configuration from environment variables.
    pub fn from_env() -> Result<Self, ConfigError> {
        dotenvy::dotenv().ok(); // Load .env file if present

        Ok(Self {
            frontend_url: env::var("FRONTEND_URL")
                .unwrap_or_else(|_| "http://localhost:5173".to_string()),
            gcp_project_id: env::var("GCP_PROJECT_ID").unwrap_or_else(|_| "local-dev".to_string()),
            port: parse_or("PORT", 8080)?,
            store_backend: env::var("STORE_BACKEND")
                .unwrap_or_else(|_| "firestore".to_string())
                .parse()?,
            google_client_id: optional("GOOGLE_CLIENT_ID"),
            mail_webhook_url: optional("MAIL_WEBHOOK_URL"),

            session_ttl_hours: parse_or("SESSION_TTL_HOURS", 6)?,
            otp_ttl_minutes: parse_or("OTP_TTL_MINUTES", 10)?,
            otp_max_attempts: parse_or("OTP_MAX_ATTEMPTS", 3)?,
            claim_utc_offset_minutes: parse_or("CLAIM_UTC_OFFSET_MINUTES", 0)?,
            claim_points: parse_or("CLAIM_POINTS", 10)?,
            argon2_memory_kib: parse_or("ARGON2_MEMORY_KIB", 19456)?,
            argon2_iterations: parse_or("ARGON2_ITERATIONS", 2)?,
            argon2_target_ms: optional("ARGON2_TARGET_MS")
                .map(|v| v.parse().map_err(|_| ConfigError::Invalid("ARGON2_TARGET_MS")))
                .transpose()?,

            jwt_signing_key: required_secret("JWT_SIGNING_KEY")?,
            otp_hmac_key: required_secret("OTP_HMAC_KEY")?,
            mail_webhook_token: optional("MAIL_WEBHOOK_TOKEN"),
        })
    }

    /// Whether cookies should carry the `Secure` attribute.
    pub fn cookies_secure(&self) -> bool {
        self.frontend_url.starts_with("https://")
    }
}

fn optional(name: &str) -> Option<String> {
    env::var(name)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

fn parse_or<T: FromStr>(name: &'static str, default: T) -> Result<T, ConfigError> {
    match optional(name) {
        Some(raw) => raw.parse().map_err(|_| ConfigError::Invalid(name)),
        None => Ok(default),
    }
}

fn required_secret(name: &'static str) -> Result<Vec<u8>, ConfigError> {
    let value = env::var(name).map_err(|_| ConfigError::Missing(name))?;
    let value = value.trim();
    if value.len() < 32 {
        return Err(ConfigError::WeakSecret(name));
    }
    Ok(value.as_bytes().to_vec())
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    Missing(&'static str),

    #[error("Invalid value for environment variable: {0}")]
    Invalid(&'static str),

    #[error("Secret {0} must be at least 32 bytes")]
    WeakSecret(&'static str),
}
