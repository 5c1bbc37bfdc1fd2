//! Configuration management for tasksync
//!
//! This module handles loading, parsing, and validation of configuration
//! files.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::collections::HashMap;
use std::path::{Path, PathBuf};
use std::str::FromStr;

use crate::constants::{
    APP_DIR, CONFIG_FILE_NAME, LOCAL_CONFIG_FILE_NAME, MAX_SYNC_INTERVAL_MINUTES,
};
use crate::sync::ConflictStrategy;

/// Main configuration structure
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub sync: SyncConfig,
    pub logging: LoggingConfig,
    pub backends: BackendsConfig,
}

/// Sync configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// Conflict resolution strategy: server-wins, local-wins, merge, keep-both
    pub conflict_resolution: String,
    /// Auto-sync interval in minutes (0 = disabled, manual sync only)
    pub sync_interval_minutes: u64,
    /// Database file path; empty means the XDG default location
    pub db_path: Option<PathBuf>,
}

/// Logging configuration
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct LoggingConfig {
    /// Enable file logging
    pub enabled: bool,
    /// Log file path when file logging is enabled
    pub file: Option<PathBuf>,
}

/// Backend configurations
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BackendsConfig {
    /// Default backend to use for new items
    pub default_backend: String,
    /// Map of backend_id -> backend configuration
    pub instances: HashMap<String, BackendInstanceConfig>,
}

/// Configuration for a single backend instance
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BackendInstanceConfig {
    /// Backend type (e.g., "memory", "caldav", "file")
    pub backend_type: String,
    /// Human-readable name for this backend instance
    pub name: String,
    /// Whether this backend instance is enabled
    pub enabled: bool,
    /// Backend-specific configuration as a map of key-value pairs
    pub config: HashMap<String, String>,
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            conflict_resolution: ConflictStrategy::ServerWins.to_string(),
            sync_interval_minutes: 5,
            db_path: None,
        }
    }
}

impl Default for BackendsConfig {
    fn default() -> Self {
        let mut instances = HashMap::new();
        instances.insert(
            "memory".to_string(),
            BackendInstanceConfig {
                backend_type: "memory".to_string(),
                name: "In-memory".to_string(),
                enabled: true,
                config: HashMap::new(),
            },
        );

        Self {
            default_backend: "memory".to_string(),
            instances,
        }
    }
}

impl BackendInstanceConfig {
    /// Get a configuration value by key
    pub fn get_config(&self, key: &str) -> Option<&String> {
        self.config.get(key)
    }
}

impl Config {
    /// Load configuration from file or return defaults
    pub fn load() -> Result<Self> {
        match Self::find_config_file()? {
            Some(path) => Self::load_from_file(&path),
            None => Ok(Self::default()),
        }
    }

    /// Load configuration from a specific file
    pub fn load_from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let content = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config file: {}", path.as_ref().display()))?;

        let config: Config = toml::from_str(&content)
            .with_context(|| format!("Failed to parse config file: {}", path.as_ref().display()))?;

        config.validate()?;
        Ok(config)
    }

    /// Find configuration file in order of precedence
    fn find_config_file() -> Result<Option<PathBuf>> {
        // 1. Check current directory
        let current_dir_config = PathBuf::from(LOCAL_CONFIG_FILE_NAME);
        if current_dir_config.exists() {
            return Ok(Some(current_dir_config));
        }

        // 2. Check XDG config directory
        if let Some(config_dir) = dirs::config_dir() {
            let xdg_config = config_dir.join(APP_DIR).join(CONFIG_FILE_NAME);
            if xdg_config.exists() {
                return Ok(Some(xdg_config));
            }
        }

        Ok(None)
    }

    /// The conflict resolution strategy named in the config.
    pub fn conflict_strategy(&self) -> Result<ConflictStrategy> {
        ConflictStrategy::from_str(&self.sync.conflict_resolution)
    }

    /// Validate configuration values
    pub fn validate(&self) -> Result<()> {
        self.conflict_strategy().with_context(|| {
            format!(
                "invalid sync.conflict_resolution '{}'",
                self.sync.conflict_resolution
            )
        })?;

        if self.sync.sync_interval_minutes > MAX_SYNC_INTERVAL_MINUTES {
            anyhow::bail!(
                "sync_interval_minutes cannot exceed {} (24 hours)",
                MAX_SYNC_INTERVAL_MINUTES
            );
        }

        if self.logging.enabled && self.logging.file.is_none() {
            anyhow::bail!("logging.file is required when logging is enabled");
        }

        self.validate_backends()?;
        Ok(())
    }

    /// Validate backend configurations
    fn validate_backends(&self) -> Result<()> {
        let default_backend = &self.backends.default_backend;
        match self.backends.instances.get(default_backend) {
            Some(instance) => {
                if !instance.enabled {
                    anyhow::bail!("default_backend '{}' is disabled", default_backend);
                }
            }
            None => {
                let available = self.get_available_backend_ids();
                anyhow::bail!(
                    "default_backend '{}' not found. Available backends: {}",
                    default_backend,
                    if available.is_empty() {
                        "none".to_string()
                    } else {
                        available.join(", ")
                    }
                );
            }
        }

        for (backend_id, instance) in &self.backends.instances {
            if instance.name.is_empty() {
                anyhow::bail!("Backend '{}': name cannot be empty", backend_id);
            }
            if instance.backend_type.is_empty() {
                anyhow::bail!("Backend '{}': backend_type cannot be empty", backend_id);
            }
        }

        Ok(())
    }

    /// Get list of available (enabled) backend IDs
    pub fn get_available_backend_ids(&self) -> Vec<String> {
        self.backends
            .instances
            .iter()
            .filter(|(_, instance)| instance.enabled)
            .map(|(backend_id, _)| backend_id.clone())
            .collect()
    }

    /// Get a specific backend instance configuration
    pub fn get_backend_instance(&self, backend_id: &str) -> Option<&BackendInstanceConfig> {
        self.backends.instances.get(backend_id)
    }

    /// Check if a specific backend instance is enabled
    pub fn is_backend_enabled(&self, backend_id: &str) -> bool {
        self.backends
            .instances
            .get(backend_id)
            .map(|instance| instance.enabled)
            .unwrap_or(false)
    }

    /// Generate default configuration file
    pub fn generate_default_config<P: AsRef<Path>>(path: P) -> Result<()> {
        let config = Self::default();
        let toml_content =
            toml::to_string_pretty(&config).context("Failed to serialize default config")?;

        let header = format!(
            "# tasksync Configuration File\n# Generated on {}\n\n",
            chrono::Local::now().format("%Y-%m-%d")
        );
        let full_content = header + &toml_content;

        if let Some(parent) = path.as_ref().parent() {
            std::fs::create_dir_all(parent)
                .with_context(|| format!("Failed to create config directory: {}", parent.display()))?;
        }

        std::fs::write(&path, full_content)
            .with_context(|| format!("Failed to write config file: {}", path.as_ref().display()))?;
        Ok(())
    }

    /// Get the XDG config directory path
    pub fn get_xdg_config_dir() -> Result<PathBuf> {
        dirs::config_dir()
            .ok_or_else(|| anyhow::anyhow!("Could not determine config directory"))
            .map(|dir| dir.join(APP_DIR))
    }

    /// Get the default config file path
    pub fn get_default_config_path() -> Result<PathBuf> {
        Ok(Self::get_xdg_config_dir()?.join(CONFIG_FILE_NAME))
    }
}
