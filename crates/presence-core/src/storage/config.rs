//! TOML-based application configuration.
//!
//! Stores the tunable policy knobs:
//! - Minimum qualifying duration for streak credit
//! - Staleness threshold for the session reaper
//! - Bounded retry attempts for contended account writes
//! - The calendar day/week boundary offset
//!
//! Configuration is stored at `~/.config/presence/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

use super::data_dir;
use crate::aggregator::AggregatorConfig;
use crate::calendar::CalendarPolicy;
use crate::error::{ConfigError, Result};

/// Session-tracking thresholds.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TrackingConfig {
    /// Minimum completed duration (seconds) for streak credit.
    #[serde(default = "default_min_qualifying_secs")]
    pub min_qualifying_secs: i64,
    /// Active sessions older than this (seconds) are reaped.
    #[serde(default = "default_stale_threshold_secs")]
    pub stale_threshold_secs: i64,
    /// Attempts for a contended account write before giving up.
    #[serde(default = "default_max_write_attempts")]
    pub max_write_attempts: u32,
}

/// Calendar boundary configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CalendarConfig {
    /// Fixed UTC offset (minutes) defining where the day rolls over.
    #[serde(default)]
    pub utc_offset_minutes: i32,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/presence/config.toml`.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub tracking: TrackingConfig,
    #[serde(default)]
    pub calendar: CalendarConfig,
}

// Default functions
fn default_min_qualifying_secs() -> i64 {
    60
}
fn default_stale_threshold_secs() -> i64 {
    2 * 60 * 60
}
fn default_max_write_attempts() -> u32 {
    3
}

impl Default for TrackingConfig {
    fn default() -> Self {
        Self {
            min_qualifying_secs: default_min_qualifying_secs(),
            stale_threshold_secs: default_stale_threshold_secs(),
            max_write_attempts: default_max_write_attempts(),
        }
    }
}

impl Default for CalendarConfig {
    fn default() -> Self {
        Self {
            utc_offset_minutes: 0,
        }
    }
}

impl Config {
    fn get_json_value_by_path<'a>(
        root: &'a serde_json::Value,
        key: &str,
    ) -> Option<&'a serde_json::Value> {
        if key.is_empty() {
            return None;
        }

        let mut current = root;
        for part in key.split('.') {
            current = current.get(part)?;
        }
        Some(current)
    }

    fn set_json_value_by_path(
        root: &mut serde_json::Value,
        key: &str,
        value: &str,
    ) -> Result<(), ConfigError> {
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if parts.peek().is_none() {
            return Err(invalid("config key is empty".into()));
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            let is_leaf = parts.peek().is_none();
            if is_leaf {
                let obj = current
                    .as_object_mut()
                    .ok_or_else(|| invalid("unknown config key".into()))?;
                let existing = obj
                    .get(part)
                    .ok_or_else(|| invalid("unknown config key".into()))?;

                let new_value = match existing {
                    serde_json::Value::Bool(_) => serde_json::Value::Bool(
                        value
                            .parse::<bool>()
                            .map_err(|e| invalid(e.to_string()))?,
                    ),
                    serde_json::Value::Number(_) => {
                        if let Ok(n) = value.parse::<i64>() {
                            serde_json::Value::Number(n.into())
                        } else {
                            return Err(invalid(format!("cannot parse '{value}' as number")));
                        }
                    }
                    _ => serde_json::Value::String(value.into()),
                };

                obj.insert(part.to_string(), new_value);
                return Ok(());
            }

            current = current
                .get_mut(part)
                .ok_or_else(|| invalid("unknown config key".into()))?;
        }

        Err(invalid("unknown config key".into()))
    }

    pub fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Load from disk or return default.
    ///
    /// # Errors
    ///
    /// Returns an error if the config file exists but cannot be parsed,
    /// or if the default config cannot be written to disk.
    pub fn load() -> Result<Self> {
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
    /// Returns an error if the config cannot be serialized or written to disk.
    pub fn save(&self) -> Result<()> {
        let path = Self::path()?;
        let content = toml::to_string_pretty(self).map_err(|e| ConfigError::SaveFailed {
            path: path.clone(),
            message: e.to_string(),
        })?;
        std::fs::write(&path, content).map_err(|e| ConfigError::SaveFailed {
            path,
            message: e.to_string(),
        })?;
        Ok(())
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key and persist. Returns an error if the
    /// key is unknown or the value cannot be parsed.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        *self = serde_json::from_value(json)?;
        self.save()?;
        Ok(())
    }

    /// Load from disk, returning default on error.
    /// This is a convenience method that never fails.
    pub fn load_or_default() -> Self {
        Self::load().unwrap_or_default()
    }

    /// Aggregator thresholds derived from this config.
    pub fn aggregator(&self) -> AggregatorConfig {
        AggregatorConfig {
            min_qualifying_secs: self.tracking.min_qualifying_secs,
            max_write_attempts: self.tracking.max_write_attempts,
        }
    }

    /// Calendar boundary policy derived from this config.
    pub fn calendar_policy(&self) -> Result<CalendarPolicy> {
        Ok(CalendarPolicy::from_offset_minutes(
            self.calendar.utc_offset_minutes,
        )?)
    }

    /// Reaper staleness threshold as a duration.
    pub fn stale_threshold(&self) -> chrono::Duration {
        chrono::Duration::seconds(self.tracking.stale_threshold_secs.max(0))
    }
}
