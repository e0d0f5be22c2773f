// tally/node/src/config.rs

use crate::logging::{LogConfig, LogFormat, LogLevel};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tally_ledger::{LedgerConfig, LedgerParams};

/// Node configuration
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct NodeConfig {
    /// Ledger deployment
    pub ledger: LedgerConfig,

    /// Storage configuration
    #[serde(default)]
    pub storage: StorageConfig,

    /// Logging configuration
    #[serde(default)]
    pub logging: LoggingConfig,
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct StorageConfig {
    /// Data directory
    #[serde(default = "default_data_dir")]
    pub data_dir: PathBuf,

    /// Persist state after every commit; when false the ledger lives in memory only
    #[serde(default = "default_persist")]
    pub persist: bool,
}

fn default_data_dir() -> PathBuf {
    dirs::home_dir()
        .unwrap_or_else(|| PathBuf::from("."))
        .join(".tally")
}

fn default_persist() -> bool {
    true
}

impl Default for StorageConfig {
    fn default() -> Self {
        Self {
            data_dir: default_data_dir(),
            persist: default_persist(),
        }
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct LoggingConfig {
    /// trace, debug, info, warn or error
    #[serde(default = "default_log_level")]
    pub level: String,

    /// pretty, json or compact
    #[serde(default = "default_log_format")]
    pub format: String,
}

fn default_log_level() -> String {
    "info".to_string()
}

fn default_log_format() -> String {
    "pretty".to_string()
}

impl Default for LoggingConfig {
    fn default() -> Self {
        Self {
            level: default_log_level(),
            format: default_log_format(),
        }
    }
}

impl LoggingConfig {
    /// Overlay the file settings on the environment defaults
    pub fn to_log_config(&self) -> LogConfig {
        let mut config = LogConfig::from_env();
        config.level = LogLevel::parse(&self.level);
        config.format = LogFormat::parse(&self.format);
        if config.format == LogFormat::Json {
            config.ansi_colors = false;
        }
        config
    }
}

impl Default for NodeConfig {
    fn default() -> Self {
        let mut ledger = LedgerConfig::default();
        // Chain ID can be overridden via TALLY_CHAIN_ID
        if let Some(chain_id) = std::env::var("TALLY_CHAIN_ID")
            .ok()
            .and_then(|s| s.parse::<u64>().ok())
        {
            ledger.chain_id = chain_id;
        }

        Self {
            ledger,
            storage: StorageConfig::default(),
            logging: LoggingConfig::default(),
        }
    }
}

impl NodeConfig {
    /// Validate the entire configuration and return the typed ledger parameters
    pub fn validate(&self) -> anyhow::Result<LedgerParams> {
        if self.storage.persist && self.storage.data_dir.as_os_str().is_empty() {
            anyhow::bail!("storage.data_dir must be set when persistence is enabled");
        }
        Ok(self.ledger.validate()?)
    }

    /// Create devnet configuration: verbose logs, nothing on disk
    pub fn devnet() -> Self {
        let mut config = Self::default();
        config.storage.persist = false;
        config.logging.level = "debug".to_string();
        config
    }

    /// Load from file
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let config: NodeConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Load from file if it exists, defaults otherwise
    pub fn load(path: &Path) -> anyhow::Result<Self> {
        if path.exists() {
            Self::from_file(path)
        } else {
            Ok(Self::default())
        }
    }

    /// Save to file
    pub fn save(&self, path: &Path) -> anyhow::Result<()> {
        let content = toml::to_string_pretty(self)?;
        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)?;
        }
        std::fs::write(path, content)?;
        Ok(())
    }
}
