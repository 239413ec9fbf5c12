pub mod adapters;
pub mod auth;
pub mod cli;
pub mod config;
pub mod error;
pub mod handlers;
pub mod persistence;
pub mod state;

pub use error::{AppError, AppResult};
pub use state::AppState;
