//! Host configuration, read from a TOML file.
//!
//! ```toml
//! broker_bind = "127.0.0.1:0"
//! handshake_timeout_secs = 10
//!
//! [[modules]]
//! name = "network-module"
//! path = "target/debug/network-module"
//!
//! [modules.config]
//! watch_networks = ["net-1"]
//!
//! [[networks]]
//! uuid = "net-1"
//! name = "Field bus"
//! ```

use modbridge_core::model::{Device, Network, Point};
use serde::Deserialize;
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::str::FromStr;
use std::time::Duration;

#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("invalid config: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Deserialize)]
pub struct HostConfig {
    /// Where callback listeners for modules are opened.
    #[serde(default = "default_broker_bind")]
    pub broker_bind: String,
    /// How long a module gets to print its handshake line.
    #[serde(default = "default_handshake_timeout")]
    pub handshake_timeout_secs: u64,
    #[serde(default)]
    pub modules: Vec<ModuleConfig>,
    #[serde(default)]
    pub networks: Vec<Network>,
    #[serde(default)]
    pub devices: Vec<Device>,
    #[serde(default)]
    pub points: Vec<Point>,
}

#[derive(Debug, Clone, Deserialize)]
pub struct ModuleConfig {
    pub name: String,
    pub path: PathBuf,
    #[serde(default)]
    pub args: Vec<String>,
    #[serde(default = "default_enabled")]
    pub enabled: bool,
    /// Sent to the module as JSON before it is enabled.
    #[serde(default)]
    pub config: Option<toml::Table>,
}

fn default_broker_bind() -> String {
    "127.0.0.1:0".to_string()
}

fn default_handshake_timeout() -> u64 {
    10
}

fn default_enabled() -> bool {
    true
}

impl Default for HostConfig {
    fn default() -> Self {
        Self {
            broker_bind: default_broker_bind(),
            handshake_timeout_secs: default_handshake_timeout(),
            modules: Vec::new(),
            networks: Vec::new(),
            devices: Vec::new(),
            points: Vec::new(),
        }
    }
}

impl HostConfig {
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let raw = std::fs::read_to_string(path).map_err(|source| ConfigError::Read {
            path: path.to_path_buf(),
            source,
        })?;
        raw.parse()
    }

    pub fn handshake_timeout(&self) -> Duration {
        Duration::from_secs(self.handshake_timeout_secs)
    }

    fn validate(&self) -> Result<(), ConfigError> {
        if self.handshake_timeout_secs == 0 {
            return Err(ConfigError::Invalid(
                "handshake_timeout_secs must be positive".into(),
            ));
        }
        let mut names = HashSet::new();
        for module in &self.modules {
            if module.name.is_empty() {
                return Err(ConfigError::Invalid("module with empty name".into()));
            }
            if !names.insert(module.name.as_str()) {
                return Err(ConfigError::Invalid(format!(
                    "duplicate module name: {}",
                    module.name
                )));
            }
        }
        Ok(())
    }
}

impl FromStr for HostConfig {
    type Err = ConfigError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let config: HostConfig = toml::from_str(s)?;
        config.validate()?;
        Ok(config)
    }
}

impl ModuleConfig {
    /// The module's config table as JSON, if one is set.
    pub fn config_json(&self) -> Result<Option<Vec<u8>>, ConfigError> {
        self.config
            .as_ref()
            .map(|table| {
                serde_json::to_vec(table).map_err(|e| {
                    ConfigError::Invalid(format!("config for {}: {e}", self.name))
                })
            })
            .transpose()
    }
}
