//! services/clinic/src/error.rs
//!
//! Defines the primary error type for the clinic service.

use crate::config::ConfigError;
use clinic_core::{BackupError, LifecycleError, PortError, StoreError};

/// The primary error type for the `clinic` service.
#[derive(Debug, thiserror::Error)]
pub enum AppError {
    /// Represents an error that occurred during configuration loading.
    #[error("Configuration error: {0}")]
    Config(#[from] ConfigError),

    /// Represents an error that propagated up from the storage port.
    #[error("Storage error: {0}")]
    Port(#[from] PortError),

    /// Represents an error from the underlying database library.
    #[error("Database Error: {0}")]
    Database(#[from] sqlx::Error),

    /// Represents a failure applying the embedded database migrations.
    #[error("Migration Error: {0}")]
    Migration(#[from] sqlx::migrate::MigrateError),

    /// Represents a standard Input/Output error (e.g., reading a backup file).
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Json(#[from] serde_json::Error),

    #[error(transparent)]
    Store(#[from] StoreError),

    #[error(transparent)]
    Lifecycle(#[from] LifecycleError),

    #[error("Restore aborted: {0}")]
    Backup(#[from] BackupError),

    /// A form field failed validation; nothing was changed.
    #[error("Invalid input: {0}")]
    Validation(String),

    #[error("Invalid email or password")]
    InvalidCredentials,

    /// No user is logged in.
    #[error("Login required")]
    Unauthorized,

    /// The logged-in user's role does not allow the action.
    #[error("Not allowed: {0}")]
    Forbidden(String),

    #[error("Not found: {0}")]
    NotFound(String),

    /// The action would break a referential or account rule.
    #[error("Conflict: {0}")]
    Conflict(String),

    /// A catch-all for any other unexpected errors.
    #[error("An unexpected internal error occurred: {0}")]
    Internal(String),
}

pub type AppResult<T> = Result<T, AppError>;
