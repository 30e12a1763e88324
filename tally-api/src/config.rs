//! API Configuration Module
//!
//! Server settings loaded from environment variables with defaults suited
//! to local development.

use secrecy::SecretString;
use std::net::SocketAddr;
use std::time::Duration;
use tally_core::ConfigError;

pub const DEFAULT_BIND_ADDR: &str = "0.0.0.0:8080";

// ============================================================================
// API CONFIGURATION
// ============================================================================

/// Settings for the HTTP server, persistence and admin authentication.
#[derive(Debug, Clone)]
pub struct ApiConfig {
    /// Address the server listens on.
    pub bind_addr: SocketAddr,

    /// Postgres connection string. `None` selects the in-memory store.
    pub database_url: Option<SecretString>,

    /// Maximum Postgres pool size.
    pub db_pool_size: usize,

    /// Static bearer token guarding `/api/admin/*`. Empty means every admin
    /// request is rejected.
    pub root_token: SecretString,

    // ========================================================================
    // CORS Configuration
    // ========================================================================
    /// Allowed CORS origins (comma-separated in env var).
    /// Empty means allow all origins (dev mode).
    pub cors_origins: Vec<String>,

    /// Max age for CORS preflight cache in seconds.
    pub cors_max_age_secs: u64,

    /// Per-request timeout applied to every route.
    pub request_timeout: Duration,
}

impl Default for ApiConfig {
    fn default() -> Self {
        Self {
            bind_addr: SocketAddr::from(([0, 0, 0, 0], 8080)),
            database_url: None,
            db_pool_size: 16,
            root_token: SecretString::from(String::new()),
            cors_origins: Vec::new(),
            cors_max_age_secs: 86400,
            request_timeout: Duration::from_secs(30),
        }
    }
}

impl ApiConfig {
    /// Create ApiConfig from environment variables.
    ///
    /// Environment variables:
    /// - `TALLY_BIND_ADDR`: full socket address (default: 0.0.0.0:8080)
    /// - `PORT`: port only, used when `TALLY_BIND_ADDR` is unset
    /// - `DATABASE_URL`: Postgres URL (unset = in-memory store)
    /// - `TALLY_DB_POOL_SIZE`: pool size (default: 16)
    /// - `TALLY_ROOT_TOKEN` or `ROOT_TOKEN`: admin bearer token
    /// - `TALLY_CORS_ORIGINS`: comma-separated allowed origins (empty = allow all)
    /// - `TALLY_CORS_MAX_AGE_SECS`: preflight cache duration (default: 86400)
    /// - `TALLY_REQUEST_TIMEOUT_SECS`: per-request timeout (default: 30)
    pub fn from_env() -> Result<Self, ConfigError> {
        let defaults = Self::default();

        let bind_addr = resolve_bind_addr(
            env_non_empty("TALLY_BIND_ADDR").as_deref(),
            env_non_empty("PORT").as_deref(),
        )?;

        let root_token = env_non_empty("TALLY_ROOT_TOKEN")
            .or_else(|| env_non_empty("ROOT_TOKEN"))
            .unwrap_or_default();

        let cors_origins = std::env::var("TALLY_CORS_ORIGINS")
            .ok()
            .map(|s| parse_origins(&s))
            .unwrap_or_default();

        Ok(Self {
            bind_addr,
            database_url: env_non_empty("DATABASE_URL").map(SecretString::from),
            db_pool_size: parse_env("TALLY_DB_POOL_SIZE", defaults.db_pool_size)?,
            root_token: SecretString::from(root_token),
            cors_origins,
            cors_max_age_secs: parse_env("TALLY_CORS_MAX_AGE_SECS", defaults.cors_max_age_secs)?,
            request_timeout: Duration::from_secs(parse_env(
                "TALLY_REQUEST_TIMEOUT_SECS",
                defaults.request_timeout.as_secs(),
            )?),
        })
    }

    /// Check if running in production mode (strict CORS).
    pub fn is_production(&self) -> bool {
        !self.cors_origins.is_empty()
    }
}

/// Pick the listen address: an explicit address wins, then a bare port on
/// all interfaces, then the default.
pub fn resolve_bind_addr(
    bind_addr: Option<&str>,
    port: Option<&str>,
) -> Result<SocketAddr, ConfigError> {
    let (field, raw) = match (bind_addr, port) {
        (Some(addr), _) => ("TALLY_BIND_ADDR", addr.to_string()),
        (None, Some(port)) => ("PORT", format!("0.0.0.0:{}", port)),
        (None, None) => ("TALLY_BIND_ADDR", DEFAULT_BIND_ADDR.to_string()),
    };
    raw.parse().map_err(|e: std::net::AddrParseError| ConfigError::InvalidValue {
        field: field.to_string(),
        value: raw.clone(),
        reason: e.to_string(),
    })
}

fn parse_origins(raw: &str) -> Vec<String> {
    raw.split(',')
        .map(|o| o.trim().to_string())
        .filter(|o| !o.is_empty())
        .collect()
}

fn env_non_empty(key: &str) -> Option<String> {
    std::env::var(key)
        .ok()
        .map(|v| v.trim().to_string())
        .filter(|v| !v.is_empty())
}

pub(crate) fn parse_env<T>(key: &str, default: T) -> Result<T, ConfigError>
where
    T: std::str::FromStr,
    T::Err: std::fmt::Display,
{
    match env_non_empty(key) {
        None => Ok(default),
        Some(raw) => raw.parse().map_err(|e: T::Err| ConfigError::InvalidValue {
            field: key.to_string(),
            value: raw.clone(),
            reason: e.to_string(),
        }),
    }
}
