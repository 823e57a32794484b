//! Configuration management for LinkChain

use crate::error::{ChainError, Result};
use crate::miner::Difficulty;
use serde::Deserialize;
use std::fs;
use std::path::Path;
use std::time::Duration;

pub const DEFAULT_CONFIG_PATH: &str = "config.toml";

#[derive(Debug, Clone, Default, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub network: NetworkConfig,
    #[serde(default)]
    pub miner: MinerConfig,
    #[serde(default)]
    pub consensus: ConsensusConfig,
}

#[derive(Debug, Clone, Deserialize)]
pub struct NetworkConfig {
    #[serde(default = "default_bind_address")]
    pub bind_address: String,
    #[serde(default = "default_api_port")]
    pub api_port: u16,
    #[serde(default)]
    pub bootstrap_peers: Vec<String>,
    /// Upper bound on a single peer chain fetch.
    #[serde(default = "default_fetch_timeout_ms")]
    pub fetch_timeout_ms: u64,
}

impl Default for NetworkConfig {
    fn default() -> Self {
        Self {
            bind_address: default_bind_address(),
            api_port: default_api_port(),
            bootstrap_peers: Vec::new(),
            fetch_timeout_ms: default_fetch_timeout_ms(),
        }
    }
}

impl NetworkConfig {
    pub fn fetch_timeout(&self) -> Duration {
        Duration::from_millis(self.fetch_timeout_ms)
    }
}

#[derive(Debug, Clone, Deserialize)]
pub struct MinerConfig {
    #[serde(default = "default_difficulty_target")]
    pub difficulty_target: String,
    #[serde(default = "default_threads")]
    pub threads: usize,
    #[serde(default = "default_reward")]
    pub reward: u64,
    #[serde(default = "default_reward_sender")]
    pub reward_sender: String,
    /// Empty means a random identifier is generated at startup.
    #[serde(default)]
    pub node_id: String,
}

impl Default for MinerConfig {
    fn default() -> Self {
        Self {
            difficulty_target: default_difficulty_target(),
            threads: default_threads(),
            reward: default_reward(),
            reward_sender: default_reward_sender(),
            node_id: String::new(),
        }
    }
}

impl MinerConfig {
    pub fn difficulty(&self) -> Result<Difficulty> {
        Difficulty::new(&self.difficulty_target)
    }
}

#[derive(Debug, Clone, Default, Deserialize)]
pub struct ConsensusConfig {
    /// Zero disables periodic resolution.
    #[serde(default)]
    pub resolve_interval_secs: u64,
}

impl ConsensusConfig {
    pub fn resolve_interval(&self) -> Option<Duration> {
        (self.resolve_interval_secs > 0).then(|| Duration::from_secs(self.resolve_interval_secs))
    }
}

impl Config {
    /// Parse a TOML document and validate it.
    pub fn from_toml_str(source: &str) -> Result<Self> {
        let config: Config = toml::from_str(source)?;
        config.validate()?;
        Ok(config)
    }

    pub fn validate(&self) -> Result<()> {
        if self.network.fetch_timeout_ms == 0 {
            return Err(ChainError::ConfigError(
                "network.fetch_timeout_ms must be greater than zero".to_string(),
            ));
        }
        if self.miner.threads == 0 {
            return Err(ChainError::ConfigError(
                "miner.threads must be at least 1".to_string(),
            ));
        }
        if self.miner.reward_sender.is_empty() {
            return Err(ChainError::ConfigError(
                "miner.reward_sender must not be empty".to_string(),
            ));
        }
        self.miner.difficulty()?;
        Ok(())
    }
}

/// Load configuration from `path`, falling back to defaults when the file is absent.
pub fn load_config(path: impl AsRef<Path>) -> Result<Config> {
    let path = path.as_ref();
    if !path.exists() {
        tracing::debug!(path = %path.display(), "config file not found, using defaults");
        return Ok(Config::default());
    }

    let source = fs::read_to_string(path)?;
    Config::from_toml_str(&source)
}

fn default_bind_address() -> String {
    "0.0.0.0".to_string()
}

fn default_api_port() -> u16 {
    5000
}

fn default_fetch_timeout_ms() -> u64 {
    5000
}

fn default_difficulty_target() -> String {
    "0000".to_string()
}

fn default_threads() -> usize {
    1
}

fn default_reward() -> u64 {
    1
}

fn default_reward_sender() -> String {
    "0".to_string()
}
