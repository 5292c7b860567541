//! # Portal Configuration
//!
//! Settings are resolved in this order, later sources winning:
//! 1. Built-in defaults
//! 2. TOML file (`-c portal.toml`)
//! 3. Environment variables
//! 4. CLI flags (applied by the command layer)
//!
//! ## Environment Variables
//!
//! - `CEMS_DATABASE`: Path of the redb file (default: `cems.redb`)
//! - `CEMS_HOST`: Bind host (default: `127.0.0.1`)
//! - `CEMS_PORT`: Bind port (default: `8080`)
//! - `CEMS_RATE_LIMIT`: Requests per second (default: 100, 0 to disable)
//! - `CEMS_SESSION_TTL`: Seconds before an idle wizard session is discarded (default: 3600)
//! - `CEMS_MAX_SESSIONS`: Live wizard sessions kept in memory (default: 10000)

use crate::api::{DEFAULT_MAX_SESSIONS, DEFAULT_SESSION_TTL};
use cems_core::CemsError;
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

pub const ENV_DATABASE: &str = "CEMS_DATABASE";
pub const ENV_HOST: &str = "CEMS_HOST";
pub const ENV_PORT: &str = "CEMS_PORT";
pub const ENV_RATE_LIMIT: &str = "CEMS_RATE_LIMIT";
pub const ENV_SESSION_TTL: &str = "CEMS_SESSION_TTL";
pub const ENV_MAX_SESSIONS: &str = "CEMS_MAX_SESSIONS";

/// Resolved portal settings.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default, deny_unknown_fields)]
pub struct PortalConfig {
    /// Path of the redb database file.
    pub database: PathBuf,
    pub host: String,
    pub port: u16,
    /// Global requests per second; 0 disables rate limiting.
    pub rate_limit: u32,
    /// Idle seconds before a wizard session is discarded.
    pub session_ttl_secs: u64,
    pub max_sessions: usize,
}

impl Default for PortalConfig {
    fn default() -> Self {
        Self {
            database: PathBuf::from("cems.redb"),
            host: "127.0.0.1".to_string(),
            port: 8080,
            rate_limit: 100,
            session_ttl_secs: DEFAULT_SESSION_TTL.as_secs(),
            max_sessions: DEFAULT_MAX_SESSIONS,
        }
    }
}

impl PortalConfig {
    /// Parse a TOML document. Missing keys keep their defaults.
    pub fn from_toml_str(text: &str) -> Result<Self, CemsError> {
        toml::from_str(text).map_err(|e| CemsError::ConfigError(e.to_string()))
    }

    /// Read the optional file, then apply the process environment.
    pub fn load(path: Option<&Path>) -> Result<Self, CemsError> {
        let base = match path {
            Some(path) => {
                let text = std::fs::read_to_string(path).map_err(|e| {
                    CemsError::ConfigError(format!("Cannot read '{}': {}", path.display(), e))
                })?;
                Self::from_toml_str(&text)?
            }
            None => Self::default(),
        };
        base.with_env(|key| std::env::var(key).ok())
    }

    /// Apply overrides from `lookup` (normally `std::env::var`).
    pub fn with_env(
        mut self,
        lookup: impl Fn(&str) -> Option<String>,
    ) -> Result<Self, CemsError> {
        if let Some(database) = lookup(ENV_DATABASE) {
            self.database = PathBuf::from(database);
        }
        if let Some(host) = lookup(ENV_HOST) {
            self.host = host;
        }
        if let Some(port) = lookup(ENV_PORT) {
            self.port = parse_env(ENV_PORT, &port)?;
        }
        if let Some(rate_limit) = lookup(ENV_RATE_LIMIT) {
            self.rate_limit = parse_env(ENV_RATE_LIMIT, &rate_limit)?;
        }
        if let Some(ttl) = lookup(ENV_SESSION_TTL) {
            self.session_ttl_secs = parse_env(ENV_SESSION_TTL, &ttl)?;
        }
        if let Some(max_sessions) = lookup(ENV_MAX_SESSIONS) {
            self.max_sessions = parse_env(ENV_MAX_SESSIONS, &max_sessions)?;
        }
        Ok(self)
    }

    /// Idle time before a wizard session is discarded.
    #[must_use]
    pub fn session_ttl(&self) -> Duration {
        Duration::from_secs(self.session_ttl_secs)
    }

    /// `host:port` for the listener.
    #[must_use]
    pub fn addr(&self) -> String {
        format!("{}:{}", self.host, self.port)
    }
}

fn parse_env<T: std::str::FromStr>(key: &str, value: &str) -> Result<T, CemsError>
where
    T::Err: std::fmt::Display,
{
    value
        .trim()
        .parse()
        .map_err(|e| CemsError::ConfigError(format!("{key}='{value}': {e}")))
}

// =============================================================================
// TESTS
// =============================================================================
