//! Engine tuning: storage key and timer windows.
use serde::{Deserialize, Serialize};
use std::time::Duration;
use thiserror::Error;

use crate::constants::{SAVE_DEBOUNCE_MS, STORAGE_KEY, TICK_INTERVAL_MS};

fn default_storage_key() -> String {
    STORAGE_KEY.to_string()
}

const fn default_save_debounce_ms() -> u64 {
    SAVE_DEBOUNCE_MS
}

const fn default_tick_interval_ms() -> u64 {
    TICK_INTERVAL_MS
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Key of the single persisted snapshot.
    #[serde(default = "default_storage_key")]
    pub storage_key: String,
    /// Quiescence window before a pending save is written.
    #[serde(default = "default_save_debounce_ms")]
    pub save_debounce_ms: u64,
    /// Period of the live passive-income tick.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum ConfigError {
    #[error("{field} must be greater than zero")]
    ZeroInterval { field: &'static str },
    #[error("storage key must not be empty")]
    EmptyStorageKey,
    #[error("config JSON could not be parsed: {0}")]
    Parse(String),
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            storage_key: default_storage_key(),
            save_debounce_ms: SAVE_DEBOUNCE_MS,
            tick_interval_ms: TICK_INTERVAL_MS,
        }
    }
}

impl EngineConfig {
    /// Get default configuration
    #[must_use]
    pub fn default_config() -> Self {
        Self::default()
    }

    /// Parse a config, filling absent fields with defaults.
    ///
    /// # Errors
    ///
    /// Returns an error if the JSON is malformed or the values are invalid.
    pub fn from_json(json: &str) -> Result<Self, ConfigError> {
        let config: Self =
            serde_json::from_str(json).map_err(|err| ConfigError::Parse(err.to_string()))?;
        config.validate()?;
        Ok(config)
    }

    /// # Errors
    ///
    /// Returns an error for empty keys or zero-length windows.
    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.storage_key.trim().is_empty() {
            return Err(ConfigError::EmptyStorageKey);
        }
        if self.save_debounce_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "save_debounce_ms",
            });
        }
        if self.tick_interval_ms == 0 {
            return Err(ConfigError::ZeroInterval {
                field: "tick_interval_ms",
            });
        }
        Ok(())
    }

    #[must_use]
    pub const fn save_debounce(&self) -> Duration {
        Duration::from_millis(self.save_debounce_ms)
    }

    #[must_use]
    pub const fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms)
    }
}
