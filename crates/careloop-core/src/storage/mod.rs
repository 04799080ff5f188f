mod config;
pub mod database;

pub use config::{Config, SessionConfig};
pub use database::{Database, SessionRecord, Stats};

use std::path::PathBuf;

/// Returns the careloop data directory, creating it if needed.
///
/// `CARELOOP_DATA_DIR` names an explicit path, used as-is (tests point
/// this at a scratch directory). Otherwise `~/.config/careloop/`, or
/// `~/.config/careloop-dev/` with CARELOOP_ENV=dev.
///
/// # Errors
/// Returns an error if the directory cannot be created.
pub fn data_dir() -> Result<PathBuf, std::io::Error> {
    let dir = if let Ok(explicit) = std::env::var("CARELOOP_DATA_DIR") {
        PathBuf::from(explicit)
    } else {
        let base_dir = dirs::home_dir()
            .unwrap_or_else(|| PathBuf::from("."))
            .join(".config");
        let env = std::env::var("CARELOOP_ENV").unwrap_or_else(|_| "production".to_string());
        if env == "dev" {
            base_dir.join("careloop-dev")
        } else {
            base_dir.join("careloop")
        }
    };

    std::fs::create_dir_all(&dir)?;
    Ok(dir)
}
