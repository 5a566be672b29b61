//! Configuration management for the transfer coordinator.
//!
//! Loads configuration from a TOML file with environment variable overrides.

use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};

/// Environment variable naming the data mover's base URL.
pub const MOVER_URL_ENV: &str = "CONVEYOR_MOVER_URL";

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct Config {
    pub mover: MoverConfig,
    pub credentials: CredentialsConfig,
    pub coordinator: CoordinatorConfig,
    pub log: LogConfig,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct MoverConfig {
    /// Base URL of the external data-mover's JSON-RPC endpoint.
    pub url: String,

    /// Timeout in seconds for control-plane RPCs.
    #[serde(default = "default_control_timeout_secs")]
    pub control_timeout_secs: u64,

    /// Poll interval in milliseconds for async copy job status.
    #[serde(default = "default_poll_interval_ms")]
    pub poll_interval_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CredentialsConfig {
    /// Directory scanned by `credentials import` on startup.
    #[serde(default)]
    pub import_dir: Option<PathBuf>,

    /// Default daily byte limit applied to imported credentials whose
    /// provider has no entry in `default_limits`. `None` means unlimited.
    #[serde(default)]
    pub default_limit: Option<u64>,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct CoordinatorConfig {
    #[serde(default = "default_true")]
    pub largest_first: bool,

    #[serde(default = "default_true")]
    pub enumerate_first: bool,

    #[serde(default = "default_max_retries")]
    pub max_retries: u32,

    /// Fixed offset (hours, negative = west) used for the Google-class
    /// "midnight Pacific" reset instant. Ignores DST; exposed as an
    /// override instead of being silently wrong half the year.
    #[serde(default = "default_pacific_offset_hours")]
    pub pacific_reset_offset_hours: i32,

    /// Whether a work item in flight on a worker that dies is re-queued.
    /// Defaults to off: the item is recorded as lost rather than retried.
    #[serde(default)]
    pub worker_death_requeue: bool,

    /// Whether a ghost-link collaborator failure demotes the file to a
    /// regular transfer instead of dropping it.
    #[serde(default = "default_true")]
    pub ghost_link_failure_demotes: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct LogConfig {
    #[serde(default = "default_log_level")]
    pub level: String,
}

fn default_true() -> bool {
    true
}

fn default_control_timeout_secs() -> u64 {
    60
}

fn default_poll_interval_ms() -> u64 {
    500
}

fn default_max_retries() -> u32 {
    3
}

fn default_pacific_offset_hours() -> i32 {
    -8
}

fn default_log_level() -> String {
    "info".to_string()
}

impl Config {
    /// Load configuration from a TOML file, then apply the environment
    /// variable override for the mover URL.
    pub fn from_file(path: &Path) -> anyhow::Result<Self> {
        let content = std::fs::read_to_string(path)?;
        let mut config: Config = toml::from_str(&content)?;
        config.apply_env_overrides();
        Ok(config)
    }

    /// Create a default configuration, then apply environment overrides.
    pub fn default_with_env() -> Self {
        let mut config = Config::default();
        config.apply_env_overrides();
        config
    }

    fn apply_env_overrides(&mut self) {
        if let Ok(url) = std::env::var(MOVER_URL_ENV) {
            self.mover.url = url;
        }
    }
}

impl Default for Config {
    fn default() -> Self {
        Config {
            mover: MoverConfig {
                url: "http://127.0.0.1:5572".to_string(),
                control_timeout_secs: default_control_timeout_secs(),
                poll_interval_ms: default_poll_interval_ms(),
            },
            credentials: CredentialsConfig {
                import_dir: None,
                default_limit: None,
            },
            coordinator: CoordinatorConfig {
                largest_first: true,
                enumerate_first: true,
                max_retries: default_max_retries(),
                pacific_reset_offset_hours: default_pacific_offset_hours(),
                worker_death_requeue: false,
                ghost_link_failure_demotes: true,
            },
            log: LogConfig {
                level: default_log_level(),
            },
        }
    }
}
