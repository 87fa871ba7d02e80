//! Application configuration.
//!
//! Loaded from a TOML file under the platform config directory and passed
//! explicitly to the components that need it. There is no process-wide
//! configuration singleton.

use serde::{Deserialize, Serialize};
use std::path::PathBuf;

/// Engine configuration.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct AppConfig {
    /// Path to the SQLite database. `None` resolves under the platform
    /// data directory.
    pub database_path: Option<PathBuf>,
    /// Default scoring window length for newly created tournaments, in days.
    pub tournament_duration_days: i64,
    /// Length of generated tournament join secrets.
    pub join_secret_length: usize,
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            database_path: None,
            tournament_duration_days: 7,
            join_secret_length: 32,
        }
    }
}

impl AppConfig {
    /// Load configuration from the default location, falling back to
    /// defaults when no file exists yet.
    pub fn load() -> Result<Self, ConfigError> {
        match Self::config_file() {
            Some(path) if path.exists() => Self::load_from(&path),
            _ => Ok(Self::default()),
        }
    }

    /// Load configuration from an explicit path.
    pub fn load_from(path: &PathBuf) -> Result<Self, ConfigError> {
        let contents =
            std::fs::read_to_string(path).map_err(|e| ConfigError::IoError(e.to_string()))?;
        toml::from_str(&contents).map_err(|e| ConfigError::ParseError(e.to_string()))
    }

    /// Save configuration to an explicit path.
    pub fn save_to(&self, path: &PathBuf) -> Result<(), ConfigError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent).map_err(|e| ConfigError::IoError(e.to_string()))?;
        }
        let contents =
            toml::to_string_pretty(self).map_err(|e| ConfigError::SerializeError(e.to_string()))?;
        std::fs::write(path, contents).map_err(|e| ConfigError::IoError(e.to_string()))
    }

    /// Resolve the path of the database file.
    pub fn resolve_database_path(&self) -> Option<PathBuf> {
        if let Some(path) = &self.database_path {
            return Some(path.clone());
        }
        directories::ProjectDirs::from("", "", "sprintrank")
            .map(|dirs| dirs.data_dir().join("sprintrank.db"))
    }

    fn config_file() -> Option<PathBuf> {
        directories::ProjectDirs::from("", "", "sprintrank")
            .map(|dirs| dirs.config_dir().join("config.toml"))
    }
}

/// Configuration errors.
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    IoError(String),

    #[error("Failed to parse config: {0}")]
    ParseError(String),

    #[error("Failed to serialize config: {0}")]
    SerializeError(String),
}
