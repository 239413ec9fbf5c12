//! crates/clinic_core/src/ports.rs
//!
//! Defines the storage contract for the clinic's persisted state.
//! The core never performs I/O itself; the service crate supplies an adapter
//! (files on disk, PostgreSQL, memory) implementing `KeyValueStore`.

use async_trait::async_trait;

//=========================================================================================
// Generic Port Error and Result Types
//=========================================================================================

/// A generic error type for all port operations.
/// This abstracts away the specific errors from the underlying storage medium.
#[derive(Debug, thiserror::Error)]
pub enum PortError {
    #[error("Stored value under '{key}' is malformed: {reason}")]
    Corrupt { key: String, reason: String },
    #[error("An unexpected error occurred: {0}")]
    Unexpected(String),
}

/// A convenience type alias for `Result<T, PortError>`.
pub type PortResult<T> = Result<T, PortError>;

//=========================================================================================
// Storage Port
//=========================================================================================

/// A durable key-value medium holding one JSON document per key.
///
/// Values are complete snapshots, never deltas. A later write to the same key
/// replaces the earlier one entirely.
#[async_trait]
pub trait KeyValueStore: Send + Sync {
    /// Returns the value stored under `key`, or `None` if the key was never written.
    async fn get(&self, key: &str) -> PortResult<Option<String>>;

    /// Overwrites the value stored under `key`.
    async fn put(&self, key: &str, value: String) -> PortResult<()>;

    /// Writes several keys so that readers observe either all of them or none.
    async fn put_many(&self, entries: Vec<(String, String)>) -> PortResult<()>;

    /// Deletes `key`. Removing an absent key is not an error.
    async fn remove(&self, key: &str) -> PortResult<()>;
}
