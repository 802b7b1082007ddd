use std::fs;
use std::path::{Path, PathBuf};
use std::time::Duration;

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CacheConfig {
    #[serde(default = "default_num_sets")]
    pub num_sets: usize,
    #[serde(default = "default_max_elems_per_set")]
    pub max_elems_per_set: usize,
}

impl Default for CacheConfig {
    fn default() -> Self {
        Self {
            num_sets: default_num_sets(),
            max_elems_per_set: default_max_elems_per_set(),
        }
    }
}

impl CacheConfig {
    pub fn validate(&self) -> Result<(), String> {
        if self.num_sets == 0 {
            return Err("cache.num_sets must be at least 1".to_string());
        }
        if self.max_elems_per_set == 0 {
            return Err("cache.max_elems_per_set must be at least 1".to_string());
        }
        Ok(())
    }
}

fn default_num_sets() -> usize {
    100
}

fn default_max_elems_per_set() -> usize {
    10
}

/// Settings for the master node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct CoordinatorConfig {
    /// Where replicas send their `register` messages.
    #[serde(default = "default_registration_addr")]
    pub registration_addr: String,

    /// Client-facing HTTP API.
    #[serde(default = "default_http_addr")]
    pub http_addr: String,

    /// Bound on every socket exchange with a replica.
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// First pause between decision delivery attempts; doubles up to `retry_max_ms`.
    #[serde(default = "default_retry_initial_ms")]
    pub retry_initial_ms: u64,

    #[serde(default = "default_retry_max_ms")]
    pub retry_max_ms: u64,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl Default for CoordinatorConfig {
    fn default() -> Self {
        Self {
            registration_addr: default_registration_addr(),
            http_addr: default_http_addr(),
            timeout_ms: default_timeout_ms(),
            workers: default_workers(),
            retry_initial_ms: default_retry_initial_ms(),
            retry_max_ms: default_retry_max_ms(),
            cache: CacheConfig::default(),
        }
    }
}

impl CoordinatorConfig {
    /// Load master configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let contents =
            fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: CoordinatorConfig =
            toml::from_str(&contents).map_err(|e| format!("Failed to parse config file: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn retry_initial(&self) -> Duration {
        Duration::from_millis(self.retry_initial_ms)
    }

    pub fn retry_max(&self) -> Duration {
        Duration::from_millis(self.retry_max_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if self.retry_initial_ms == 0 || self.retry_initial_ms > self.retry_max_ms {
            return Err("retry_initial_ms must be positive and not above retry_max_ms".to_string());
        }
        self.cache.validate()
    }
}

/// Settings for one replica node.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct ReplicaConfig {
    /// Ring position; also the replica's name in merged error messages.
    pub id: u64,

    #[serde(default = "default_bind_addr")]
    pub bind_addr: String,

    /// Host announced to the master. The port is the one actually bound.
    #[serde(default = "default_advertise_host")]
    pub advertise_host: String,

    #[serde(default = "default_master_addr")]
    pub master_addr: String,

    #[serde(default = "default_log_path")]
    pub log_path: PathBuf,

    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,

    #[serde(default = "default_workers")]
    pub workers: usize,

    /// Store dump restored before the log is replayed, and written on shutdown.
    #[serde(default)]
    pub snapshot_path: Option<PathBuf>,

    /// Simulated latency of every backing store access.
    #[serde(default)]
    pub store_latency_ms: u64,

    #[serde(default)]
    pub cache: CacheConfig,
}

impl ReplicaConfig {
    pub fn new(id: u64) -> Self {
        Self {
            id,
            bind_addr: default_bind_addr(),
            advertise_host: default_advertise_host(),
            master_addr: default_master_addr(),
            log_path: default_log_path(),
            snapshot_path: None,
            timeout_ms: default_timeout_ms(),
            workers: default_workers(),
            store_latency_ms: 0,
            cache: CacheConfig::default(),
        }
    }

    /// Load replica configuration from a TOML file
    pub fn load<P: AsRef<Path>>(path: P) -> Result<Self, String> {
        let contents =
            fs::read_to_string(path).map_err(|e| format!("Failed to read config file: {}", e))?;

        let config: ReplicaConfig =
            toml::from_str(&contents).map_err(|e| format!("Failed to parse config file: {}", e))?;

        config.validate()?;
        Ok(config)
    }

    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    pub fn store_latency(&self) -> Duration {
        Duration::from_millis(self.store_latency_ms)
    }

    pub fn validate(&self) -> Result<(), String> {
        if self.timeout_ms == 0 {
            return Err("timeout_ms must be greater than 0".to_string());
        }
        if self.workers == 0 {
            return Err("workers must be at least 1".to_string());
        }
        if self.advertise_host.is_empty() {
            return Err("advertise_host cannot be empty".to_string());
        }
        if self.log_path.as_os_str().is_empty() {
            return Err("log_path cannot be empty".to_string());
        }
        self.cache.validate()
    }
}

fn default_registration_addr() -> String {
    "0.0.0.0:9090".to_string()
}

fn default_http_addr() -> String {
    "0.0.0.0:8080".to_string()
}

fn default_bind_addr() -> String {
    "0.0.0.0:9100".to_string()
}

fn default_advertise_host() -> String {
    "127.0.0.1".to_string()
}

fn default_master_addr() -> String {
    "127.0.0.1:9090".to_string()
}

fn default_log_path() -> PathBuf {
    PathBuf::from("./data/replica.log")
}

fn default_timeout_ms() -> u64 {
    5000
}

fn default_workers() -> usize {
    8
}

fn default_retry_initial_ms() -> u64 {
    100
}

fn default_retry_max_ms() -> u64 {
    5000
}
