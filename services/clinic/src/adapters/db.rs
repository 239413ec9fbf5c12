//! services/clinic/src/adapters/db.rs
//!
//! This module contains the database adapter, a concrete implementation of the
//! `KeyValueStore` port from the `core` crate. Each persisted key is one row in
//! the `kv_store` table of a PostgreSQL database, accessed through `sqlx`.

use async_trait::async_trait;
use clinic_core::ports::{KeyValueStore, PortError, PortResult};
use sqlx::PgPool;
use tracing::debug;

//=========================================================================================
// The Main Adapter Struct
//=========================================================================================

/// A database adapter that implements the `KeyValueStore` port.
#[derive(Clone)]
pub struct DbAdapter {
    pool: PgPool,
}

impl DbAdapter {
    /// Creates a new `DbAdapter`.
    pub fn new(pool: PgPool) -> Self {
        Self { pool }
    }

    /// A helper function to run database migrations at startup.
    pub async fn run_migrations(&self) -> Result<(), sqlx::migrate::MigrateError> {
        sqlx::migrate!("./migrations").run(&self.pool).await?;
        Ok(())
    }
}

const UPSERT: &str = "INSERT INTO kv_store (key, value, updated_at) VALUES ($1, $2, now()) \
     ON CONFLICT (key) DO UPDATE SET value = EXCLUDED.value, updated_at = now()";

fn unexpected(e: sqlx::Error) -> PortError {
    PortError::Unexpected(e.to_string())
}

//=========================================================================================
// `KeyValueStore` Trait Implementation
//=========================================================================================

#[async_trait]
impl KeyValueStore for DbAdapter {
    async fn get(&self, key: &str) -> PortResult<Option<String>> {
        sqlx::query_scalar::<_, String>("SELECT value FROM kv_store WHERE key = $1")
            .bind(key)
            .fetch_optional(&self.pool)
            .await
            .map_err(unexpected)
    }

    async fn put(&self, key: &str, value: String) -> PortResult<()> {
        sqlx::query(UPSERT)
            .bind(key)
            .bind(value)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }

    async fn put_many(&self, entries: Vec<(String, String)>) -> PortResult<()> {
        let mut tx = self.pool.begin().await.map_err(unexpected)?;
        let count = entries.len();
        for (key, value) in entries {
            sqlx::query(UPSERT)
                .bind(key)
                .bind(value)
                .execute(&mut *tx)
                .await
                .map_err(unexpected)?;
        }
        tx.commit().await.map_err(unexpected)?;
        debug!(count, "Committed batched key writes");
        Ok(())
    }

    async fn remove(&self, key: &str) -> PortResult<()> {
        sqlx::query("DELETE FROM kv_store WHERE key = $1")
            .bind(key)
            .execute(&self.pool)
            .await
            .map_err(unexpected)?;
        Ok(())
    }
}
