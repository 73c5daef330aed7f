//! Configuration management for LedgerChain

use crate::error::ChainError;
use crate::miner::{PowTarget, DEFAULT_TARGET_PREFIX};
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;
use thiserror::Error;

pub const DEFAULT_CONFIG_PATH: &str = "ledgerchain.toml";

#[derive(Debug, Error)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: String,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse config: {0}")]
    Parse(#[from] toml::de::Error),
    #[error("network.peer_timeout {value:?} is not a duration: {source}")]
    Timeout {
        value: String,
        #[source]
        source: humantime::DurationError,
    },
    #[error("{0}")]
    Invalid(String),
}

impl From<ConfigError> for ChainError {
    fn from(err: ConfigError) -> Self {
        ChainError::Config(err.to_string())
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub miner: MinerConfig,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct NetworkConfig {
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    /// Per-peer fetch timeout, humantime syntax (`"5s"`, `"750ms"`).
    #[serde(default = "default_peer_timeout")]
    pub peer_timeout: String,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    #[serde(default)]
    pub resolve_on_start: bool,
}

#[derive(Debug, Clone, Deserialize)]
#[serde(deny_unknown_fields)]
pub struct MinerConfig {
    #[serde(default = "default_difficulty_prefix")]
    pub difficulty_prefix: String,
    /// Proof search threads; 0 uses every core.
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_reward")]
    pub reward: i64,
    /// Recipient of mining rewards. Empty means a random id per process.
    #[serde(default)]
    pub node_identifier: String,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            api_port: default_api_port(),
            peer_timeout: default_peer_timeout(),
            bootstrap_peers: Vec::new(),
            resolve_on_start: false,
        }
    }
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty_prefix: default_difficulty_prefix(),
            threads: default_threads(),
            reward: default_reward(),
            node_identifier: String::new(),
        }
    }
}

fn default_api_port() -> u16 {
    5000
}

fn default_peer_timeout() -> String {
    "5s".to_string()
}

fn default_difficulty_prefix() -> String {
    DEFAULT_TARGET_PREFIX.to_string()
}

fn default_threads() -> usize {
    1
}

fn default_reward() -> i64 {
    1
}

impl Config {
    pub fn from_toml(text: &str) -> Result<Self, ConfigError> {
        let config: Config = toml::from_str(text)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<(), ConfigError> {
        if self.network.api_port == 0 {
            return Err(ConfigError::Invalid("network.api_port must be non-zero".to_string()));
        }
        self.peer_timeout()?;
        self.pow_target()
            .map_err(|e| ConfigError::Invalid(format!("miner.difficulty_prefix: {}", e)))?;
        Ok(())
    }

    pub fn peer_timeout(&self) -> Result<Duration, ConfigError> {
        humantime::parse_duration(&self.network.peer_timeout).map_err(|source| ConfigError::Timeout {
            value: self.network.peer_timeout.clone(),
            source,
        })
    }

    pub fn pow_target(&self) -> Result<PowTarget, ChainError> {
        PowTarget::new(&self.miner.difficulty_prefix)
    }
}

/// Load configuration from `path`, falling back to defaults when the file
/// does not exist.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config, ConfigError> {
    let path = path.as_ref();
    if !path.exists() {
        return Ok(Config::default());
    }
    let text = fs::read_to_string(path).map_err(|source| ConfigError::Read {
        path: path.display().to_string(),
        source,
    })?;
    Config::from_toml(&text)
}
