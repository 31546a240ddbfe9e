//! TOML-based application configuration.
//!
//! Stores:
//! - Model settings (personalization threshold, default curve anchors)
//! - Refresh loop cadence
//! - Database file name
//!
//! Configuration is stored at `~/.config/airtime/config.toml`.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::warn;

use super::data_dir;
use crate::curve::{Anchor, CalibrationCurve};
use crate::error::{ConfigError, Result};

/// Consumption model configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ModelConfig {
    /// Qualifying historical records needed before a curve is personalized.
    #[serde(default = "default_min_entries")]
    pub min_entries: usize,
    #[serde(default = "default_high_anchor_pressure")]
    pub high_anchor_pressure: i32,
    #[serde(default = "default_high_anchor_minutes")]
    pub high_anchor_minutes: f64,
    #[serde(default = "default_low_anchor_pressure")]
    pub low_anchor_pressure: i32,
    #[serde(default = "default_low_anchor_minutes")]
    pub low_anchor_minutes: f64,
}

/// Refresh loop configuration.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct RefreshConfig {
    #[serde(default = "default_true")]
    pub enabled: bool,
    #[serde(default = "default_interval_secs")]
    pub interval_secs: u64,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// File name inside the data directory.
    #[serde(default = "default_database_file")]
    pub database_file: String,
}

/// Application configuration.
///
/// Serialized to/from TOML at `~/.config/airtime/config.toml`.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub model: ModelConfig,
    #[serde(default)]
    pub refresh: RefreshConfig,
    #[serde(default)]
    pub storage: StorageConfig,
}

// Default functions
fn default_min_entries() -> usize {
    5
}
fn default_high_anchor_pressure() -> i32 {
    300
}
fn default_high_anchor_minutes() -> f64 {
    38.0
}
fn default_low_anchor_pressure() -> i32 {
    150
}
fn default_low_anchor_minutes() -> f64 {
    17.0
}
fn default_true() -> bool {
    true
}
fn default_interval_secs() -> u64 {
    60
}
fn default_database_file() -> String {
    "airtime.db".into()
}

impl Default for ModelConfig {
    fn default() -> Self {
        Self {
            min_entries: default_min_entries(),
            high_anchor_pressure: default_high_anchor_pressure(),
            high_anchor_minutes: default_high_anchor_minutes(),
            low_anchor_pressure: default_low_anchor_pressure(),
            low_anchor_minutes: default_low_anchor_minutes(),
        }
    }
}

impl Default for RefreshConfig {
    fn default() -> Self {
        Self {
            enabled: true,
            interval_secs: default_interval_secs(),
        }
    }
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            database_file: default_database_file(),
        }
    }
}

impl ModelConfig {
    pub fn high_anchor(&self) -> Anchor {
        Anchor::new(self.high_anchor_pressure, self.high_anchor_minutes)
    }

    pub fn low_anchor(&self) -> Anchor {
        Anchor::new(self.low_anchor_pressure, self.low_anchor_minutes)
    }

    /// Reject a threshold of zero and anchors that cannot define a curve.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        if self.min_entries == 0 {
            return Err(invalid("model.min_entries", "must be at least 1").into());
        }
        if self.high_anchor_pressure <= self.low_anchor_pressure {
            return Err(invalid(
                "model.high_anchor_pressure",
                "must be greater than model.low_anchor_pressure",
            )
            .into());
        }
        if !self.high_anchor_minutes.is_finite() || !self.low_anchor_minutes.is_finite() {
            return Err(
                invalid("model.high_anchor_minutes", "anchor minutes must be finite").into(),
            );
        }
        Ok(())
    }

    /// Default curve described by the configured anchors.
    pub fn default_curve(&self) -> CalibrationCurve {
        CalibrationCurve::default_from_anchors(self.high_anchor(), self.low_anchor())
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

    fn set_json_value_by_path(root: &mut serde_json::Value, key: &str, value: &str) -> Result<()> {
        let unknown = || ConfigError::UnknownKey(key.to_string());
        let invalid = |message: String| ConfigError::InvalidValue {
            key: key.to_string(),
            message,
        };

        let mut parts = key.split('.').peekable();
        if key.is_empty() {
            return Err(unknown().into());
        }

        let mut current = root;
        while let Some(part) = parts.next() {
            if parts.peek().is_some() {
                current = current.get_mut(part).ok_or_else(unknown)?;
                continue;
            }

            let obj = current.as_object_mut().ok_or_else(unknown)?;
            let existing = obj.get(part).ok_or_else(unknown)?;
            let new_value = match existing {
                serde_json::Value::Bool(_) => serde_json::Value::Bool(
                    value
                        .parse::<bool>()
                        .map_err(|e| invalid(e.to_string()))?,
                ),
                serde_json::Value::Number(n) if n.is_f64() => value
                    .parse::<f64>()
                    .ok()
                    .and_then(serde_json::Number::from_f64)
                    .map(serde_json::Value::Number)
                    .ok_or_else(|| invalid(format!("cannot parse '{value}' as number")))?,
                serde_json::Value::Number(_) => {
                    if let Ok(n) = value.parse::<u64>() {
                        serde_json::Value::Number(n.into())
                    } else if let Ok(n) = value.parse::<i64>() {
                        serde_json::Value::Number(n.into())
                    } else {
                        return Err(invalid(format!("cannot parse '{value}' as integer")).into());
                    }
                }
                serde_json::Value::Object(_) | serde_json::Value::Array(_) => {
                    return Err(invalid("not a leaf value".into()).into());
                }
                _ => serde_json::Value::String(value.into()),
            };

            obj.insert(part.to_string(), new_value);
            return Ok(());
        }

        Err(unknown().into())
    }

    fn path() -> Result<PathBuf> {
        Ok(data_dir()?.join("config.toml"))
    }

    /// Reject settings the engine cannot work with.
    ///
    /// # Errors
    /// Returns [`ConfigError::InvalidValue`] naming the offending key.
    pub fn validate(&self) -> Result<()> {
        let invalid = |key: &str, message: &str| ConfigError::InvalidValue {
            key: key.to_string(),
            message: message.to_string(),
        };
        self.model.validate()?;
        if self.refresh.interval_secs == 0 {
            return Err(invalid("refresh.interval_secs", "must be at least 1").into());
        }
        if self.storage.database_file.trim().is_empty() {
            return Err(invalid("storage.database_file", "must not be empty").into());
        }
        Ok(())
    }

    /// Load from `path`, writing defaults there if the file is missing.
    ///
    /// # Errors
    /// Returns an error if the file exists but cannot be read, parsed or
    /// validated, or if the default config cannot be written.
    pub fn load_from(path: &Path) -> Result<Self> {
        match std::fs::read_to_string(path) {
            Ok(content) => {
                let cfg: Config = toml::from_str(&content).map_err(|e| {
                    ConfigError::ParseFailed(format!("{}: {e}", path.display()))
                })?;
                cfg.validate()?;
                Ok(cfg)
            }
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                let cfg = Self::default();
                cfg.save_to(path)?;
                Ok(cfg)
            }
            Err(e) => Err(ConfigError::LoadFailed {
                path: path.to_path_buf(),
                message: e.to_string(),
            }
            .into()),
        }
    }

    /// Like [`Config::load_from`], falling back to defaults on any error.
    pub fn load_from_or_default(path: &Path) -> Self {
        Self::load_from(path).unwrap_or_else(|e| {
            warn!(path = %path.display(), error = %e, "using default config");
            Self::default()
        })
    }

    /// # Errors
    /// Returns an error if the config cannot be serialized or written.
    pub fn save_to(&self, path: &Path) -> Result<()> {
        let save_failed = |message: String| ConfigError::SaveFailed {
            path: path.to_path_buf(),
            message,
        };
        let content = toml::to_string_pretty(self).map_err(|e| save_failed(e.to_string()))?;
        std::fs::write(path, content).map_err(|e| save_failed(e.to_string()))?;
        Ok(())
    }

    /// Load from the data directory or create it with defaults.
    ///
    /// # Errors
    /// See [`Config::load_from`].
    pub fn load() -> Result<Self> {
        Self::load_from(&Self::path()?)
    }

    /// Load from the data directory, never failing.
    pub fn load_or_default() -> Self {
        match Self::path() {
            Ok(path) => Self::load_from_or_default(&path),
            Err(e) => {
                warn!(error = %e, "no data directory, using default config");
                Self::default()
            }
        }
    }

    /// Persist to the data directory.
    ///
    /// # Errors
    /// See [`Config::save_to`].
    pub fn save(&self) -> Result<()> {
        self.save_to(&Self::path()?)
    }

    /// Get a config value as string by dot-separated key.
    pub fn get(&self, key: &str) -> Option<String> {
        let json = serde_json::to_value(self).ok()?;
        let val = Self::get_json_value_by_path(&json, key)?;
        match val {
            serde_json::Value::String(s) => Some(s.clone()),
            serde_json::Value::Object(_) => None,
            other => Some(other.to_string()),
        }
    }

    /// Set a config value by key without saving.
    ///
    /// # Errors
    /// Returns an error if the key is unknown, the value does not parse as
    /// the key's type, or the result fails validation.
    pub fn set(&mut self, key: &str, value: &str) -> Result<()> {
        let mut json = serde_json::to_value(&*self)?;
        Self::set_json_value_by_path(&mut json, key, value)?;
        let updated: Config = serde_json::from_value(json)?;
        updated.validate()?;
        *self = updated;
        Ok(())
    }

    /// Database location inside the data directory.
    ///
    /// # Errors
    /// Returns an error if the data directory cannot be created.
    pub fn database_path(&self) -> Result<PathBuf> {
        Ok(data_dir()?.join(&self.storage.database_file))
    }
}
