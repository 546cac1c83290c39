//! Configuration for scatterfs components

use serde::{Deserialize, Serialize};
use std::net::SocketAddr;
use std::path::PathBuf;
use std::time::Duration;

/// Global configuration, loadable from a TOML file
#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct Config {
    /// Coordinator-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub coordinator: Option<CoordinatorConfig>,

    /// Node-agent-specific config
    #[serde(skip_serializing_if = "Option::is_none")]
    pub agent: Option<AgentConfig>,
}

impl Config {
    /// Load configuration from `SCATTERFS_CONFIG` or `./scatterfs.toml`,
    /// with `SCATTERFS_*` environment overrides. Missing files yield an
    /// empty config so CLI flags and defaults take over.
    pub fn load() -> Self {
        let path =
            std::env::var("SCATTERFS_CONFIG").unwrap_or_else(|_| "scatterfs.toml".to_string());

        let loaded = config::Config::builder()
            .add_source(config::File::with_name(&path).required(false))
            .add_source(config::Environment::with_prefix("SCATTERFS").separator("__"))
            .build()
            .and_then(|c| c.try_deserialize::<Config>());

        match loaded {
            Ok(config) => config,
            Err(e) => {
                tracing::warn!("failed to load config file: {}, using defaults", e);
                Config::default()
            }
        }
    }
}

/// Coordinator configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    /// Bind address for the HTTP API
    pub bind_addr: SocketAddr,

    /// RocksDB path for metadata
    pub db_path: PathBuf,

    /// Default replication factor for uploads that do not specify one
    #[serde(default = "default_replication_factor")]
    pub replication_factor: u32,

    /// Default chunk size in bytes
    #[serde(default = "default_chunk_size")]
    pub chunk_size: u64,

    /// Default placement strategy ("round_robin", "hash", "random")
    #[serde(default = "default_strategy")]
    pub strategy: String,

    /// Heartbeat evaluation interval
    #[serde(default = "default_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Time without a heartbeat before a node is considered failed
    #[serde(default = "default_heartbeat_timeout")]
    pub heartbeat_timeout_ms: u64,

    /// Timeout for every remote call to a node agent
    #[serde(default = "default_agent_timeout")]
    pub agent_timeout_ms: u64,

    /// Attempts per replica push before the upload fails
    #[serde(default = "default_push_attempts")]
    pub push_attempts: usize,

    /// Concurrent chunk transfers per upload/download
    #[serde(default = "default_transfer_concurrency")]
    pub transfer_concurrency: usize,

    /// Concurrent chunk recoveries
    #[serde(default = "default_recovery_concurrency")]
    pub recovery_concurrency: usize,

    /// Attempts per chunk within one recovery cycle
    #[serde(default = "default_recovery_attempts")]
    pub recovery_attempts: usize,

    /// Interval between periodic at-risk sweeps
    #[serde(default = "default_recovery_interval")]
    pub recovery_interval_ms: u64,

    /// Retries for versioned metadata writes that lose a race
    #[serde(default = "default_conflict_retry_budget")]
    pub conflict_retry_budget: usize,

    /// Largest accepted upload body
    #[serde(default = "default_max_upload_bytes")]
    pub max_upload_bytes: u64,
}

fn default_replication_factor() -> u32 {
    2
}
fn default_chunk_size() -> u64 {
    1024 * 1024
}
fn default_strategy() -> String {
    "round_robin".to_string()
}
fn default_heartbeat_interval() -> u64 {
    10_000
}
fn default_heartbeat_timeout() -> u64 {
    30_000
}
fn default_agent_timeout() -> u64 {
    5_000
}
fn default_push_attempts() -> usize {
    3
}
fn default_transfer_concurrency() -> usize {
    8
}
fn default_recovery_concurrency() -> usize {
    4
}
fn default_recovery_attempts() -> usize {
    3
}
fn default_recovery_interval() -> u64 {
    30_000
}
fn default_conflict_retry_budget() -> usize {
    5
}
fn default_max_upload_bytes() -> u64 {
    1024 * 1024 * 1024
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            bind_addr: "0.0.0.0:5000".parse().unwrap(),
            db_path: PathBuf::from("./coord-data"),
            replication_factor: default_replication_factor(),
            chunk_size: default_chunk_size(),
            strategy: default_strategy(),
            heartbeat_interval_ms: default_heartbeat_interval(),
            heartbeat_timeout_ms: default_heartbeat_timeout(),
            agent_timeout_ms: default_agent_timeout(),
            push_attempts: default_push_attempts(),
            transfer_concurrency: default_transfer_concurrency(),
            recovery_concurrency: default_recovery_concurrency(),
            recovery_attempts: default_recovery_attempts(),
            recovery_interval_ms: default_recovery_interval(),
            conflict_retry_budget: default_conflict_retry_budget(),
            max_upload_bytes: default_max_upload_bytes(),
        }
    }
}

impl CoordinatorConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }

    pub fn heartbeat_timeout(&self) -> Duration {
        Duration::from_millis(self.heartbeat_timeout_ms)
    }

    pub fn agent_timeout(&self) -> Duration {
        Duration::from_millis(self.agent_timeout_ms)
    }

    pub fn recovery_interval(&self) -> Duration {
        Duration::from_millis(self.recovery_interval_ms)
    }
}

/// Node agent configuration
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AgentConfig {
    /// Unique node identifier
    pub node_id: String,

    /// Bind address for the chunk API
    pub bind_addr: SocketAddr,

    /// Directory for stored chunk blobs
    pub data_dir: PathBuf,

    /// Coordinator base URL for registration and heartbeats
    pub coordinator_url: String,

    /// Address advertised to the coordinator (defaults to the bound one)
    #[serde(skip_serializing_if = "Option::is_none")]
    pub advertise_url: Option<String>,

    /// Interval between heartbeat pushes
    #[serde(default = "default_agent_heartbeat_interval")]
    pub heartbeat_interval_ms: u64,

    /// Largest accepted chunk body
    #[serde(default = "default_max_chunk_bytes")]
    pub max_chunk_bytes: u64,
}

fn default_agent_heartbeat_interval() -> u64 {
    5_000
}
fn default_max_chunk_bytes() -> u64 {
    256 * 1024 * 1024
}

impl AgentConfig {
    pub fn heartbeat_interval(&self) -> Duration {
        Duration::from_millis(self.heartbeat_interval_ms)
    }
}
