//! Configuration System
//!
//! Loads configuration from YAML files with a cascading priority system:
//! 1. `./krelay.yaml` (current directory - highest priority)
//! 2. `~/.config/krelay/krelay.yaml` (user config directory)
//! 3. `/etc/krelay/krelay.yaml` (system - lowest priority)
//!
//! Values from higher priority files override those from lower priority
//! files.
//!
//! # YAML Structure
//!
//! ```yaml
//! router:
//!   outer_bind_addr: "0.0.0.0:4100"
//!   inner_bind_ip: "10.0.0.2"
//!   session_timeout_secs: 30
//!   limits:
//!     packets_per_second: 1000
//!   buffers:
//!     socket_buffer_bytes: 16777216
//! ```

mod router;

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::{Path, PathBuf};
use thiserror::Error;

pub use router::{BuffersConfig, LimitsConfig, RouterConfig};

/// Default config filename.
const CONFIG_FILENAME: &str = "krelay.yaml";

/// Errors that can occur during configuration loading.
#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read config file {path}: {source}")]
    ReadFile {
        path: PathBuf,
        source: std::io::Error,
    },

    #[error("failed to parse config file {path}: {source}")]
    ParseYaml {
        path: PathBuf,
        source: serde_yaml::Error,
    },

    #[error("invalid {field} '{value}': {reason}")]
    InvalidAddr {
        field: &'static str,
        value: String,
        reason: String,
    },
}

/// Root configuration structure.
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Router configuration (`router.*`).
    #[serde(default)]
    pub router: RouterConfig,
}

impl Config {
    /// Create a new default configuration.
    pub fn new() -> Self {
        Self::default()
    }

    /// Load configuration from the standard search paths.
    ///
    /// Files are loaded in reverse priority order and merged. Returns a
    /// tuple of (config, paths_loaded) where paths_loaded contains the
    /// paths that were successfully loaded.
    pub fn load() -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let search_paths = Self::search_paths();
        Self::load_from_paths(&search_paths)
    }

    /// Load configuration from specific paths.
    ///
    /// Paths are processed in order, with later paths overriding earlier
    /// ones.
    pub fn load_from_paths(paths: &[PathBuf]) -> Result<(Self, Vec<PathBuf>), ConfigError> {
        let mut config = Config::default();
        let mut loaded_paths = Vec::new();

        for path in paths {
            if path.exists() {
                let file_config = Self::load_file(path)?;
                config.merge(file_config);
                loaded_paths.push(path.clone());
            }
        }

        Ok((config, loaded_paths))
    }

    /// Load configuration from a single file.
    pub fn load_file(path: &Path) -> Result<Self, ConfigError> {
        let contents = std::fs::read_to_string(path).map_err(|e| ConfigError::ReadFile {
            path: path.to_path_buf(),
            source: e,
        })?;

        serde_yaml::from_str(&contents).map_err(|e| ConfigError::ParseYaml {
            path: path.to_path_buf(),
            source: e,
        })
    }

    /// Get the standard search paths in priority order (lowest to highest).
    pub fn search_paths() -> Vec<PathBuf> {
        let mut paths = Vec::new();

        // System config (lowest priority)
        paths.push(PathBuf::from("/etc/krelay").join(CONFIG_FILENAME));

        // User config directory
        if let Some(config_dir) = dirs::config_dir() {
            paths.push(config_dir.join("krelay").join(CONFIG_FILENAME));
        }

        // Current directory (highest priority)
        paths.push(PathBuf::from(".").join(CONFIG_FILENAME));

        paths
    }

    /// Merge another configuration into this one.
    ///
    /// Values from `other` override values in `self` when present.
    pub fn merge(&mut self, other: Config) {
        self.router.merge(other.router);
    }

    /// Parse the configured outer bind endpoint.
    pub fn outer_bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let value = self.router.outer_bind_addr();
        value.parse().map_err(|e| ConfigError::InvalidAddr {
            field: "router.outer_bind_addr",
            value: value.to_string(),
            reason: format!("{}", e),
        })
    }

    /// Inner-side bind endpoint: the configured private IP on an
    /// ephemeral port.
    pub fn inner_bind_addr(&self) -> Result<SocketAddr, ConfigError> {
        let value = self.router.inner_bind_ip();
        let ip: std::net::IpAddr = value.parse().map_err(|e| ConfigError::InvalidAddr {
            field: "router.inner_bind_ip",
            value: value.to_string(),
            reason: format!("{}", e),
        })?;
        Ok(SocketAddr::new(ip, 0))
    }

    /// Serialize this configuration to YAML.
    pub fn to_yaml(&self) -> Result<String, serde_yaml::Error> {
        serde_yaml::to_string(self)
    }
}
