//! Configuration structures for the update engine.
//!
//! An [`UpdateConfig`] names the package and its feed, and carries the
//! layout, network and logging settings. Installers build one from their
//! embedded slot, an optional TOML file and command line flags.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};

use crate::error::UpdateError;
use crate::paths::PathLayout;

/// Main update configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpdateConfig {
    /// Identifier of the package on the feed
    #[serde(default)]
    pub package_id: String,

    /// Feed location: a directory path or an http(s) URL
    #[serde(default)]
    pub package_source: String,

    /// Whether prerelease versions are candidates
    #[serde(default)]
    pub include_prereleases: bool,

    /// Install base override (defaults to local app data / package id)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub app_path_base: Option<PathBuf>,

    /// Package cache override (defaults to `{base}/packages`)
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub cache_path: Option<PathBuf>,

    /// Library framework folder whose files are installed
    #[serde(default = "default_target_framework")]
    pub target_framework: String,

    /// Network configuration
    #[serde(default)]
    pub network: NetworkConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

impl Default for UpdateConfig {
    fn default() -> Self {
        Self {
            package_id: String::new(),
            package_source: String::new(),
            include_prereleases: false,
            app_path_base: None,
            cache_path: None,
            target_framework: default_target_framework(),
            network: NetworkConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl UpdateConfig {
    pub fn new(package_id: impl Into<String>, package_source: impl Into<String>) -> Self {
        Self {
            package_id: package_id.into(),
            package_source: package_source.into(),
            ..Self::default()
        }
    }

    /// Load configuration from a TOML file.
    pub fn load_from_file(path: &Path) -> Result<Self, UpdateError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        Ok(config)
    }

    /// Save configuration to a TOML file.
    pub fn save_to_file(&self, path: &Path) -> Result<(), UpdateError> {
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        let content = toml::to_string_pretty(self).map_err(|e| UpdateError::ConfigError(e.to_string()))?;
        std::fs::write(path, content)?;
        Ok(())
    }

    /// Check the fields the engine cannot run without.
    pub fn validate(&self) -> Result<(), UpdateError> {
        if self.package_id.trim().is_empty() {
            return Err(UpdateError::ConfigError("package_id is empty".to_string()));
        }
        if self.package_source.trim().is_empty() {
            return Err(UpdateError::ConfigError("package_source is empty".to_string()));
        }
        if self.target_framework.trim().is_empty() || self.target_framework.contains(['/', '\\']) {
            return Err(UpdateError::ConfigError(format!(
                "invalid target_framework {:?}",
                self.target_framework
            )));
        }
        Ok(())
    }

    /// Resolve the install layout for this package.
    pub fn layout(&self) -> PathLayout {
        PathLayout::resolve(&self.package_id, self.app_path_base.clone(), self.cache_path.clone())
    }
}

/// Network configuration for feed access.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NetworkConfig {
    /// Connection timeout in seconds
    #[serde(default = "default_timeout")]
    pub timeout_seconds: u64,

    /// Read timeout for streaming downloads in seconds
    #[serde(default = "default_read_timeout")]
    pub read_timeout_seconds: u64,

    /// User agent sent to HTTP feeds
    #[serde(default = "default_user_agent")]
    pub user_agent: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            timeout_seconds: default_timeout(),
            read_timeout_seconds: default_read_timeout(),
            user_agent: default_user_agent(),
        }
    }
}

/// Logging configuration.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// Default filter directive, overridden by `RUST_LOG`
    #[serde(default = "default_log_level")]
    pub level: String,
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
        }
    }
}

fn default_target_framework() -> String {
    "net40".to_string()
}

fn default_timeout() -> u64 {
    30
}

fn default_read_timeout() -> u64 {
    60
}

fn default_user_agent() -> String {
    format!("upstage/{}", env!("CARGO_PKG_VERSION"))
}

fn default_log_level() -> String {
    "info".to_string()
}
