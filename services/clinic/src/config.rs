//! services/clinic/src/config.rs
//!
//! Defines the application's configuration structure and loading logic.
//!
//! All configuration is loaded from environment variables at startup. The `.env`
//! file is used for local development.

use std::path::PathBuf;
use std::str::FromStr;
use tracing::Level;

/// Longest monthly series a report may request.
pub const MAX_REPORT_MONTHS: u32 = 120;

/// A custom error type for configuration loading failures.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("Missing the environment variable {0}")]
    MissingVar(String),
    #[error("Invalid value for the environment variable {0}: {1}")]
    InvalidValue(String, String),
}

/// Where the clinic's collections are persisted.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum StorageBackend {
    /// One JSON file per key inside `data_dir`.
    File,
    /// A `kv_store` table in PostgreSQL.
    Postgres,
    /// Nothing survives the process. Useful for demos.
    Memory,
}

impl FromStr for StorageBackend {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "file" => Ok(Self::File),
            "postgres" | "postgresql" => Ok(Self::Postgres),
            "memory" => Ok(Self::Memory),
            other => Err(ConfigError::InvalidValue(
                "CLINIC_STORAGE".to_string(),
                format!("'{}' is not one of file, postgres, memory", other),
            )),
        }
    }
}

/// Holds all configuration loaded from the environment at startup.
#[derive(Clone, Debug)]
pub struct Config {
    pub storage: StorageBackend,
    pub data_dir: PathBuf,
    pub database_url: Option<String>,
    pub log_level: Level,
    pub report_months: u32,
    pub app_version: String,
}

impl Config {
    /// Loads configuration from environment variables.
    ///
    /// It will look for a `.env` file in the current directory for development,
    /// but this is skipped in test environments to ensure tests are hermetic.
    pub fn from_env() -> Result<Self, ConfigError> {
        if !cfg!(test) {
            dotenvy::dotenv().ok();
        }
        Self::from_lookup(|name| std::env::var(name).ok())
    }

    /// Builds the configuration from an arbitrary variable source.
    pub fn from_lookup<F>(lookup: F) -> Result<Self, ConfigError>
    where
        F: Fn(&str) -> Option<String>,
    {
        let storage = lookup("CLINIC_STORAGE")
            .map(|s| s.parse::<StorageBackend>())
            .transpose()?
            .unwrap_or(StorageBackend::File);

        let data_dir = lookup("CLINIC_DATA_DIR")
            .map(PathBuf::from)
            .unwrap_or_else(|| PathBuf::from("./clinic-data"));

        let database_url = lookup("DATABASE_URL");
        if storage == StorageBackend::Postgres && database_url.is_none() {
            return Err(ConfigError::MissingVar("DATABASE_URL".to_string()));
        }

        let log_level_str = lookup("RUST_LOG").unwrap_or_else(|| "INFO".to_string());
        let log_level = log_level_str.parse::<Level>().map_err(|_| {
            ConfigError::InvalidValue(
                "RUST_LOG".to_string(),
                format!("'{}' is not a valid log level", log_level_str),
            )
        })?;

        let report_months = match lookup("CLINIC_REPORT_MONTHS") {
            Some(raw) => raw
                .trim()
                .parse::<u32>()
                .ok()
                .filter(|n| (1..=MAX_REPORT_MONTHS).contains(n))
                .ok_or_else(|| {
                    ConfigError::InvalidValue(
                        "CLINIC_REPORT_MONTHS".to_string(),
                        format!("'{}' is not a number between 1 and {}", raw, MAX_REPORT_MONTHS),
                    )
                })?,
            None => 6,
        };

        Ok(Self {
            storage,
            data_dir,
            database_url,
            log_level,
            report_months,
            app_version: env!("CARGO_PKG_VERSION").to_string(),
        })
    }
}
