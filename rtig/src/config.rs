//! RTIG configuration types and loading

use eyre::{Context, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::{Path, PathBuf};

use crate::broker::BrokerConfig;
use crate::federation::{DEFAULT_MAX_FEDERATES, DEFAULT_MAX_OBJECTS};
use crate::federations::DEFAULT_MAX_FEDERATIONS;

/// Main RTIG configuration
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// Broker channel sizing
    pub broker: BrokerConfig,

    /// Snapshot storage
    pub storage: StorageConfig,

    /// Log output
    pub logging: LoggingConfig,

    /// Handle domain limits
    pub handles: HandlesConfig,
}

impl Config {
    /// Load configuration with fallback chain
    pub fn load(config_path: Option<&PathBuf>) -> Result<Self> {
        // If explicit config path provided, try to load it
        if let Some(path) = config_path {
            return Self::load_from_file(path).context(format!("Failed to load config from {}", path.display()));
        }

        // Try project-local config: .rtig.yml
        let local_config = PathBuf::from(".rtig.yml");
        if local_config.exists() {
            match Self::load_from_file(&local_config) {
                Ok(config) => return Ok(config),
                Err(e) => {
                    tracing::warn!("Failed to load config from {}: {}", local_config.display(), e);
                }
            }
        }

        // Try user config: ~/.config/rtig/rtig.yml
        if let Some(config_dir) = dirs::config_dir() {
            let user_config = config_dir.join("rtig").join("rtig.yml");
            if user_config.exists() {
                match Self::load_from_file(&user_config) {
                    Ok(config) => return Ok(config),
                    Err(e) => {
                        tracing::warn!("Failed to load config from {}: {}", user_config.display(), e);
                    }
                }
            }
        }

        // No config file found, use defaults
        tracing::info!("No config file found, using defaults");
        Ok(Self::default())
    }

    fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = fs::read_to_string(&path).context("Failed to read config file")?;

        let config: Self = serde_yaml::from_str(&content).context("Failed to parse config file")?;

        tracing::info!("Loaded config from: {}", path.as_ref().display());
        Ok(config)
    }
}

/// Where federation snapshots are written
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct StorageConfig {
    /// Directory of the JSON snapshot files
    #[serde(rename = "save-dir")]
    pub save_dir: PathBuf,
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            save_dir: dirs::data_dir()
                .unwrap_or_else(|| PathBuf::from("."))
                .join("rtig")
                .join("saves"),
        }
    }
}

/// Log level and destination
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct LoggingConfig {
    /// One of trace, debug, info, warn, error
    pub level: String,

    /// Log directory, `<data-local-dir>/rtig/logs` when unset
    #[serde(rename = "log-dir")]
    pub log_dir: Option<PathBuf>,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
            log_dir: None,
        }
    }
}

/// Upper bounds of the handle domains
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct HandlesConfig {
    #[serde(rename = "max-federations")]
    pub max_federations: u32,

    #[serde(rename = "max-federates")]
    pub max_federates: u32,

    #[serde(rename = "max-objects")]
    pub max_objects: u32,
}

impl Default for HandlesConfig {
    fn default() -> Self {
        Self {
            max_federations: DEFAULT_MAX_FEDERATIONS,
            max_federates: DEFAULT_MAX_FEDERATES,
            max_objects: DEFAULT_MAX_OBJECTS,
        }
    }
}
