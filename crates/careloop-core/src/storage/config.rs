//! TOML-based application configuration.
//!
//! Stores the session tuning knobs:
//! - the grace interval between a countdown completing and the
//!   automatic advance
//! - whether sessions auto-advance at all
//!
//! Configuration is stored at `<data_dir>/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::error::{ConfigError, CoreError};

/// Session-specific configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct SessionConfig {
    /// Seconds between a step's countdown completing and the automatic
    /// advance. 0 advances within the same tick; `set` rejects values
    /// above `MAX_GRACE_SECS`.
    #[serde(default = "default_grace_secs")]
    pub grace_secs: u64,
    /// When false, completed countdowns wait for a manual advance.
    #[serde(default = "default_true")]
    pub auto_advance: bool,
}

/// Application configuration.
///
/// Serialized to/from TOML at `<data_dir>/config.toml`.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub session: SessionConfig,
}

fn default_grace_secs() -> u64 {
    1
}
fn default_true() -> bool {
    true
}

/// Upper bound `set` accepts for `session.grace_secs`. A grace longer
/// than an hour is a typo, not a breather.
const MAX_GRACE_SECS: u64 = 3600;

impl Default for SessionConfig {
    fn default() -> Self {
        Self {
            grace_secs: default_grace_secs(),
            auto_advance: true,
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Self {
            session: SessionConfig::default(),
        }
    }
}

impl Config {
    pub fn path() -> Result<PathBuf, CoreError> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk, writing the default file if none exists.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self, CoreError> {
        let path = Self::path()?;
        match std::fs::read_to_string(&path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content)
                    .map_err(|e| ConfigError::ParseFailed(e.to_string()))?;
                Ok(cfg)
            }
            Err(_) => {
                let cfg = Self::default();
                cfg.save()?;
                Ok(cfg)
            }
        }
    }

    /// Persist to disk.
    ///
    /// # Errors
    ///
    /// Returns an error if the config cannot be serialized or written
    /// to disk.
    pub fn save(&self) -> Result<(), CoreError> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Get a config value as a string by dotted key.
    pub fn get(&self, key: &str) -> Option<String> {
        match key {
            "session.grace_secs" => Some(self.session.grace_secs.to_string()),
            "session.auto_advance" => Some(self.session.auto_advance.to_string()),
            _ => None,
        }
    }

    /// Set a config value by dotted key and persist.
    ///
    /// # Errors
    ///
    /// Returns `ConfigError::UnknownKey` for keys that do not exist and
    /// `ConfigError::InvalidValue` when the value does not parse as the
    /// key's type or falls outside its range, plus any error from
    /// saving.
    pub fn set(&mut self, key: &str, value: &str) -> Result<(), CoreError> {
        match key {
            "session.grace_secs" => {
                let secs: u64 = value.parse().map_err(|_| ConfigError::InvalidValue {
                    key: key.to_string(),
                    message: format!("cannot parse '{value}' as seconds"),
                })?;
                if secs > MAX_GRACE_SECS {
                    return Err(ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: format!("grace is capped at {MAX_GRACE_SECS} seconds"),
                    }
                    .into());
                }
                self.session.grace_secs = secs;
            }
            "session.auto_advance" => {
                self.session.auto_advance =
                    value.parse().map_err(|_| ConfigError::InvalidValue {
                        key: key.to_string(),
                        message: format!("cannot parse '{value}' as bool"),
                    })?;
            }
            _ => return Err(ConfigError::UnknownKey(key.to_string()).into()),
        }
        self.save()?;
        Ok(())
    }
}
