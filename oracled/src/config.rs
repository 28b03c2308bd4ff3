use std::path::{Path, PathBuf};
use std::time::Duration;

use oracle_common::http::FetcherConfig;
use oracle_common::retry::RetryPolicy;
use oracle_submitter::submitter::SubmitterConfig;
use oracle_worker::config::PoolConfig;
use serde::{Deserialize, Serialize};
use thiserror::Error;

#[derive(Error, Debug)]
pub enum ConfigError {
    #[error("failed to read {path}: {source}")]
    Read {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to write default config to {path}: {source}")]
    Write {
        path: PathBuf,
        #[source]
        source: std::io::Error,
    },
    #[error("failed to parse {path}: {source}")]
    Parse {
        path: PathBuf,
        #[source]
        source: toml::de::Error,
    },
    #[error("invalid configuration: {0}")]
    Invalid(String),
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct ChainSettings {
    pub id: String,
    pub endpoint: String,
}

impl Default for ChainSettings {
    fn default() -> Self {
        Self {
            id: "oracle-chain-1".to_string(),
            endpoint: "wss://127.0.0.1:26657/websocket".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct KeySettings {
    pub name: String,
    pub keyring_dir: String,
    pub keyring_backend: String,
}

impl Default for KeySettings {
    fn default() -> Self {
        Self {
            name: "oracle".to_string(),
            keyring_dir: "keyring-test".to_string(),
            keyring_backend: "test".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct GasSettings {
    pub limit: u64,
    pub adjustment: f64,
    pub prices: String,
}

impl Default for GasSettings {
    fn default() -> Self {
        Self {
            limit: 200_000,
            adjustment: 1.3,
            prices: "0.025uatom".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct RetrySettings {
    pub max_attempts: u32,
    pub max_delay_sec: u64,
}

impl Default for RetrySettings {
    fn default() -> Self {
        Self {
            max_attempts: 5,
            max_delay_sec: 30,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct WorkerSettings {
    pub pool_size: usize,
    pub channel_size: usize,
    pub timeout_sec: u64,
}

impl Default for WorkerSettings {
    fn default() -> Self {
        Self {
            pool_size: 2 * std::thread::available_parallelism().map(|n| n.get()).unwrap_or(4),
            channel_size: 1024,
            timeout_sec: 10,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct HealthSettings {
    pub probe_interval_sec: u64,
    pub max_attempts: u32,
}

impl Default for HealthSettings {
    fn default() -> Self {
        Self {
            probe_interval_sec: 15,
            max_attempts: 3,
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct MetricsSettings {
    pub bind: String,
}

impl Default for MetricsSettings {
    fn default() -> Self {
        Self {
            bind: "0.0.0.0:9090".to_string(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct LogSettings {
    pub level: String,
}

impl Default for LogSettings {
    fn default() -> Self {
        Self {
            level: "info".to_string(),
        }
    }
}

/// The TOML-file-shaped configuration. Deserialized with per-table
/// defaults so a partial file only overrides what it names.
#[derive(Debug, Clone, Serialize, Deserialize, Default)]
#[serde(default)]
pub struct Config {
    pub chain: ChainSettings,
    pub key: KeySettings,
    pub gas: GasSettings,
    pub retry: RetrySettings,
    pub worker: WorkerSettings,
    pub health: HealthSettings,
    pub metrics: MetricsSettings,
    pub log: LogSettings,
}

impl Config {
    /// Load `<home>/config.toml`, writing defaults if the file does not exist.
    pub fn load(home: &Path) -> Result<Self, ConfigError> {
        let path = home.join("config.toml");

        if !path.exists() {
            std::fs::create_dir_all(home).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
            let defaults = Config::default();
            let rendered = toml::to_string_pretty(&defaults).expect("Config always serializes");
            std::fs::write(&path, rendered).map_err(|source| ConfigError::Write {
                path: path.clone(),
                source,
            })?;
            return defaults.validated();
        }

        let raw = std::fs::read_to_string(&path).map_err(|source| ConfigError::Read {
            path: path.clone(),
            source,
        })?;
        let config: Config = toml::from_str(&raw).map_err(|source| ConfigError::Parse { path, source })?;
        config.validated()
    }

    fn validated(self) -> Result<Self, ConfigError> {
        if self.chain.id.is_empty() {
            return Err(ConfigError::Invalid("chain.id must not be empty".to_string()));
        }
        if self.chain.endpoint.is_empty() {
            return Err(ConfigError::Invalid("chain.endpoint must not be empty".to_string()));
        }
        if !matches!(self.key.keyring_backend.as_str(), "test" | "file" | "os") {
            return Err(ConfigError::Invalid(format!(
                "unknown keyring backend: {}",
                self.key.keyring_backend
            )));
        }
        if self.worker.pool_size == 0 {
            return Err(ConfigError::Invalid("worker.pool_size must be positive".to_string()));
        }
        if self.worker.timeout_sec == 0 {
            return Err(ConfigError::Invalid("worker.timeout_sec must be positive".to_string()));
        }
        if self.health.probe_interval_sec == 0 {
            return Err(ConfigError::Invalid(
                "health.probe_interval_sec must be positive".to_string(),
            ));
        }
        Ok(self)
    }

    pub fn fetcher_config(&self) -> FetcherConfig {
        FetcherConfig {
            timeout: Duration::from_secs(self.worker.timeout_sec),
            retry_policy: RetryPolicy::new(
                2,
                Duration::from_secs(1),
                Some(Duration::from_secs(self.retry.max_delay_sec)),
            )
            .with_max_attempts(self.retry.max_attempts),
            ..Default::default()
        }
    }

    pub fn pool_config(&self) -> PoolConfig {
        PoolConfig {
            max_concurrent_jobs: self.worker.pool_size,
            results_channel_capacity: self.worker.channel_size,
            ..Default::default()
        }
    }

    /// Builds the submitter's transaction-construction settings straight from
    /// the documented `[chain]`, `[gas]` and `[retry]` tables, so a chain id
    /// or gas value an operator edits here is the one actually signed.
    pub fn submitter_config(&self) -> SubmitterConfig {
        SubmitterConfig {
            chain_id: self.chain.id.clone(),
            gas_limit: self.gas.limit,
            gas_adjustment: self.gas.adjustment,
            default_gas_price: self.gas.prices.clone(),
            max_attempts: self.retry.max_attempts,
        }
    }
}
