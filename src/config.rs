//! Devnet Configuration
//!
//! Parameters for provisioning a local test network.
//! Defaults suit a handful of nodes on one machine.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use std::time::Duration;

/// Default chain name reported by every node
pub const DEFAULT_CHAIN_NAME: &str = "kratos-devnet";

/// Main configuration for a devnet
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct DevnetConfig {
    // === Layout ===

    /// Directory holding one `node-<i>` data directory per node
    pub base_dir: PathBuf,

    /// Chain name reported over RPC
    pub chain_name: String,

    // === Roles ===

    /// Provision a secret and an authenticated control endpoint per node
    pub enable_control: bool,

    /// Indexes of block producing nodes (normally exactly one)
    pub producers: Vec<usize>,

    /// Interval between synthetic blocks (milliseconds)
    pub block_time_ms: u64,

    // === Timing ===

    /// Delay between readiness probes (milliseconds)
    pub readiness_interval_ms: u64,

    /// Time a node has to answer its first probe (milliseconds)
    pub readiness_timeout_ms: u64,

    /// Interval for redialing disconnected static peers (milliseconds)
    pub redial_interval_ms: u64,
}

impl Default for DevnetConfig {
    fn default() -> Self {
        Self {
            base_dir: default_base_dir(),
            chain_name: DEFAULT_CHAIN_NAME.to_string(),

            enable_control: false,
            producers: vec![0],
            block_time_ms: 1_000,

            readiness_interval_ms: 100,
            readiness_timeout_ms: 5_000,
            redial_interval_ms: 500,
        }
    }
}

/// `<data dir>/kratos/devnet`, or a relative path when the platform has no data dir
pub fn default_base_dir() -> PathBuf {
    dirs::data_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join("kratos")
        .join("devnet")
}

impl DevnetConfig {
    /// Load configuration from TOML file
    pub fn load(path: &Path) -> Result<Self, ConfigError> {
        let content = std::fs::read_to_string(path)?;
        let config: Self = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save configuration to TOML file
    pub fn save(&self, path: &Path) -> Result<(), ConfigError> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }

    pub fn block_time(&self) -> Duration {
        Duration::from_millis(self.block_time_ms)
    }

    pub fn readiness_interval(&self) -> Duration {
        Duration::from_millis(self.readiness_interval_ms)
    }

    pub fn readiness_timeout(&self) -> Duration {
        Duration::from_millis(self.readiness_timeout_ms)
    }

    pub fn redial_interval(&self) -> Duration {
        Duration::from_millis(self.redial_interval_ms)
    }

    // Builder-style methods for CLI overrides

    pub fn with_base_dir(mut self, base_dir: impl Into<PathBuf>) -> Self {
        self.base_dir = base_dir.into();
        self
    }

    pub fn with_chain_name(mut self, chain_name: impl Into<String>) -> Self {
        self.chain_name = chain_name.into();
        self
    }

    pub fn with_control(mut self, enable: bool) -> Self {
        self.enable_control = enable;
        self
    }

    pub fn with_producers(mut self, producers: Vec<usize>) -> Self {
        self.producers = producers;
        self
    }

    pub fn with_block_time_ms(mut self, ms: u64) -> Self {
        self.block_time_ms = ms;
        self
    }

    pub fn with_readiness(mut self, interval_ms: u64, timeout_ms: u64) -> Self {
        self.readiness_interval_ms = interval_ms;
        self.readiness_timeout_ms = timeout_ms;
        self
    }

    pub fn with_redial_interval_ms(mut self, ms: u64) -> Self {
        self.redial_interval_ms = ms;
        self
    }
}

/// Configuration errors
#[derive(Debug, thiserror::Error)]
pub enum ConfigError {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Invalid config file: {0}")]
    Parse(#[from] toml::de::Error),

    #[error("Failed to serialize config: {0}")]
    Serialize(#[from] toml::ser::Error),
}
