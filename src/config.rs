//! Configuration management for the forms workflow service.
//!
//! Configuration can be set via environment variables:
//! - `HOST` - Optional. Server host. Defaults to `127.0.0.1`.
//! - `PORT` - Optional. Server port. Defaults to `3000`.
//! - `STORE` - Optional. Storage backend, `sqlite` or `memory`. Defaults to `sqlite`.
//! - `DATABASE_PATH` - Optional. SQLite database file. Defaults to `data/forms_workflow.db`.
//! - `SIGNING_KEY` - Correction-link signing key. Required unless `DEV_MODE` is set.
//! - `DEV_MODE` - Optional. When `true`, a missing signing key is replaced by an
//!   ephemeral one at startup. Defaults to `false`.

use std::path::PathBuf;
use thiserror::Error;

use crate::store::StoreType;

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("Missing required environment variable: {0}")]
    MissingEnvVar(String),

    #[error("Invalid value for {0}: {1}")]
    InvalidValue(String, String),
}

/// Service configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Server host
    pub host: String,

    /// Server port
    pub port: u16,

    /// Storage backend selector
    pub store_type: StoreType,

    /// SQLite database file (ignored by the memory backend)
    pub database_path: PathBuf,

    /// HMAC key for correction-link signatures
    pub signing_key: Option<String>,

    /// Allow running without a signing key (an ephemeral one is generated)
    pub dev_mode: bool,
}

impl Config {
    /// Load configuration from environment variables.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::MissingEnvVar` if `SIGNING_KEY` is not set and
    /// `DEV_MODE` is off.
    pub fn from_env() -> Result<Self, ConfigError> {
        let host = std::env::var("HOST").unwrap_or_else(|_| "127.0.0.1".to_string());

        let port = std::env::var("PORT")
            .unwrap_or_else(|_| "3000".to_string())
            .parse()
            .map_err(|e| ConfigError::InvalidValue("PORT".to_string(), format!("{}", e)))?;

        let store_type = std::env::var("STORE")
            .map(|v| StoreType::from_str(&v))
            .unwrap_or_default();

        let database_path = std::env::var("DATABASE_PATH")
            .map(PathBuf::from)
            .unwrap_or_else(|_| PathBuf::from("data/forms_workflow.db"));

        let signing_key = std::env::var("SIGNING_KEY").ok();

        let dev_mode = std::env::var("DEV_MODE")
            .map(|v| v == "true" || v == "1")
            .unwrap_or(false);

        if signing_key.is_none() && !dev_mode {
            return Err(ConfigError::MissingEnvVar("SIGNING_KEY".to_string()));
        }

        Ok(Self {
            host,
            port,
            store_type,
            database_path,
            signing_key,
            dev_mode,
        })
    }

    /// Create a config with custom values (useful for testing).
    pub fn new(host: String, port: u16) -> Self {
        Self {
            host,
            port,
            store_type: StoreType::Memory,
            database_path: PathBuf::from("data/forms_workflow.db"),
            signing_key: None,
            dev_mode: true,
        }
    }
}
