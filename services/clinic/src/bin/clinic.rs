//! services/clinic/src/bin/clinic.rs

use chrono::{Local, Utc};
use clap::Parser;
use clinic_lib::{
    adapters::{DbAdapter, FileStore, MemoryStore},
    cli::{self, Cli},
    config::{Config, StorageBackend},
    error::AppError,
    persistence::Persistence,
    state::AppState,
};
use clinic_core::ports::KeyValueStore;
use sqlx::postgres::PgPoolOptions;
use std::sync::Arc;
use tracing::{debug, info};
use tracing_subscriber::{layer::SubscriberExt, util::SubscriberInitExt};

#[tokio::main]
async fn main() -> Result<(), AppError> {
    // --- 1. Load Configuration & Set Up Logging ---
    let config = Config::from_env()?;
    tracing_subscriber::registry()
        .with(tracing_subscriber::EnvFilter::new(config.log_level.to_string()))
        .with(tracing_subscriber::fmt::layer().with_writer(std::io::stderr))
        .init();
    let cli = Cli::parse();
    debug!(storage = ?config.storage, "Configuration loaded");

    // --- 2. Open the Configured Storage ---
    let store: Arc<dyn KeyValueStore> = match config.storage {
        StorageBackend::File => Arc::new(FileStore::open(&config.data_dir).await?),
        StorageBackend::Memory => Arc::new(MemoryStore::new()),
        StorageBackend::Postgres => {
            let url = config
                .database_url
                .as_deref()
                .ok_or_else(|| AppError::Internal("DATABASE_URL is required".to_string()))?;
            info!("Connecting to database...");
            let db_pool = PgPoolOptions::new().max_connections(5).connect(url).await?;
            let db_adapter = DbAdapter::new(db_pool);
            info!("Running database migrations...");
            db_adapter.run_migrations().await?;
            Arc::new(db_adapter)
        }
    };

    // --- 3. Load State & Run the Command ---
    let mut state = AppState::load(Persistence::new(store), &config, Local::now().date_naive()).await?;
    let output = cli::run(cli, &mut state, Local::now().date_naive(), Utc::now()).await?;
    if !output.is_empty() {
        println!("{}", output);
    }
    Ok(())
}
