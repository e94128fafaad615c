//! Storefront configuration module.
//!
//! Configuration is loaded from environment variables with fallback to defaults.

use serde::Serialize;
use std::env;
use std::path::PathBuf;

use storefront_engine::events::DEFAULT_EVENT_BUFFER;

/// Storefront configuration.
#[derive(Debug, Clone, Serialize)]
pub struct StorefrontConfig {
    /// SQLite database file
    pub db_path: PathBuf,

    /// Pool size
    pub db_max_connections: u32,

    /// Events buffered per feed subscriber before it starts lagging
    pub event_buffer: usize,

    /// Token that unlocks catalog administration. Unset means no caller is
    /// an admin.
    #[serde(skip_serializing)]
    pub admin_token: Option<String>,
}

impl Default for StorefrontConfig {
    fn default() -> Self {
        StorefrontConfig {
            db_path: PathBuf::from("./storefront.db"),
            db_max_connections: 5,
            event_buffer: DEFAULT_EVENT_BUFFER,
            admin_token: None,
        }
    }
}

impl StorefrontConfig {
    /// Load configuration from environment variables.
    pub fn load() -> Result<Self, ConfigError> {
        Self::from_lookup(|key| env::var(key).ok())
    }

    /// Builds the configuration from any key lookup (the environment in
    /// production, a map in tests).
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let defaults = StorefrontConfig::default();

        let config = StorefrontConfig {
            db_path: lookup("STOREFRONT_DB_PATH")
                .map(PathBuf::from)
                .unwrap_or(defaults.db_path),

            db_max_connections: parse_or(
                &lookup,
                "STOREFRONT_DB_MAX_CONNECTIONS",
                defaults.db_max_connections,
            )?,

            event_buffer: parse_or(&lookup, "STOREFRONT_EVENT_BUFFER", defaults.event_buffer)?,

            admin_token: lookup("STOREFRONT_ADMIN_TOKEN").filter(|t| !t.trim().is_empty()),
        };

        if config.db_max_connections == 0 {
            return Err(ConfigError::InvalidValue(
                "STOREFRONT_DB_MAX_CONNECTIONS".to_string(),
            ));
        }
        if config.event_buffer == 0 {
            return Err(ConfigError::InvalidValue(
                "STOREFRONT_EVENT_BUFFER".to_string(),
            ));
        }

        Ok(config)
    }

    /// Whether `token` grants catalog administration.
    pub fn is_admin(&self, token: Option<&str>) -> bool {
        match (&self.admin_token, token) {
            (Some(expected), Some(given)) => expected == given,
            _ => false,
        }
    }
}

fn parse_or<F, T>(lookup: &F, key: &str, default: T) -> Result<T, ConfigError>
where
    F: Fn(&str) -> Option<String>,
    T: std::str::FromStr,
{
    match lookup(key) {
        Some(raw) => raw
            .trim()
            .parse()
            .map_err(|_| ConfigError::InvalidValue(key.to_string())),
        None => Ok(default),
    }
}

/// Configuration error types.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Invalid value for {0}")]
    InvalidValue(String),
}
