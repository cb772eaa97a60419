mod config;
pub mod database;
pub mod migrations;

pub use config::{CalendarConfig, Config, TrackingConfig};
pub use database::{Database, IngestWrite};

use std::path::PathBuf;

use crate::error::Result;

/// Returns `~/.config/presence[-dev]/` based on PRESENCE_ENV.
///
/// Set PRESENCE_ENV=dev to use the development data directory.
///
/// # Errors
/// Returns an error if creating the config directory fails.
pub fn data_dir() -> Result<PathBuf> {
    let base_dir = dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".config");

    let env = std::env::var("PRESENCE_ENV").unwrap_or_else(|_| "production".to_string());

    let dir = if env == "dev" {
        base_dir.join("presence-dev")
    } else {
        base_dir.join("presence")
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
