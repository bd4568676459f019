//! # Sync Configuration
//!
//! Configuration management for the sync engine and its collaborators.
//!
//! ## Configuration Sources
//! ```text
//! ┌─────────────────────────────────────────────────────────────────────────┐
//! │                    Configuration Priority                               │
//! │                                                                         │
//! │  1. Environment Variables (highest priority)                           │
//! │     TALLY_API_BASE_URL=https://staging.expenses.dev                    │
//! │     TALLY_FAILURE_RATE=0.5                                             │
//! │                                                                         │
//! │  2. TOML Config File                                                   │
//! │     ~/.config/tally/tally.toml (Linux)                                 │
//! │     ~/Library/Application Support/dev.tally.tally/tally.toml (macOS)   │
//! │                                                                         │
//! │  3. Default Values (lowest priority)                                   │
//! └─────────────────────────────────────────────────────────────────────────┘
//! ```
//!
//! ## Configuration File Format
//! ```toml
//! [api]
//! base_url = "https://api.expenses.dev"
//! timeout_ms = 10000
//!
//! [simulation]
//! enabled = true
//! latency_ms = 1000
//! failure_rate = 0.1
//! # seed = 42
//!
//! [engine]
//! seed_demo_data = true
//!
//! [worker]
//! poll_interval_secs = 30
//! initial_backoff_ms = 500
//! max_backoff_secs = 60
//! max_retry_attempts = 3
//!
//! [storage]
//! # database_path = "/var/lib/tally/tally.db"
//! ```

use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;
use tracing::{debug, info, warn};

use crate::client::SimulationConfig;
use crate::error::{SyncError, SyncResult};
use crate::remote::MEMORY_URL;

// =============================================================================
// API Settings
// =============================================================================

/// Where the records service lives.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ApiSettings {
    /// Base URL, or `memory://` for the in-process remote.
    #[serde(default = "default_base_url")]
    pub base_url: String,

    /// Per-call timeout (milliseconds).
    #[serde(default = "default_timeout_ms")]
    pub timeout_ms: u64,
}

fn default_base_url() -> String {
    "https://api.expenses.dev".to_string()
}

fn default_timeout_ms() -> u64 {
    10_000
}

impl Default for ApiSettings {
    fn default() -> Self {
        ApiSettings {
            base_url: default_base_url(),
            timeout_ms: default_timeout_ms(),
        }
    }
}

impl ApiSettings {
    pub fn timeout(&self) -> Duration {
        Duration::from_millis(self.timeout_ms)
    }

    /// True when the in-process remote should be used instead of HTTP.
    pub fn is_memory(&self) -> bool {
        self.base_url == MEMORY_URL
    }
}

// =============================================================================
// Simulation Settings
// =============================================================================

/// Artificial latency and failure injected in front of every remote call.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SimulationSettings {
    /// Enables the latency delay. Failure injection follows `failure_rate`
    /// regardless, so set it to 0 to disable failures.
    #[serde(default = "default_true")]
    pub enabled: bool,

    /// Upper bound of the uniform delay (milliseconds).
    #[serde(default = "default_latency_ms")]
    pub latency_ms: u64,

    /// Probability in `[0, 1]` that a call fails before reaching the remote.
    #[serde(default = "default_failure_rate")]
    pub failure_rate: f64,

    /// Fixed RNG seed for reproducible runs.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub seed: Option<u64>,
}

fn default_true() -> bool {
    true
}

fn default_latency_ms() -> u64 {
    1_000
}

fn default_failure_rate() -> f64 {
    0.1
}

impl Default for SimulationSettings {
    fn default() -> Self {
        SimulationSettings {
            enabled: true,
            latency_ms: default_latency_ms(),
            failure_rate: default_failure_rate(),
            seed: None,
        }
    }
}

impl SimulationSettings {
    /// Converts to the client-side simulation parameters.
    pub fn to_simulation_config(&self) -> SimulationConfig {
        SimulationConfig {
            latency: if self.enabled {
                Duration::from_millis(self.latency_ms)
            } else {
                Duration::ZERO
            },
            failure_rate: self.failure_rate,
            seed: self.seed,
        }
    }
}

// =============================================================================
// Engine Settings
// =============================================================================

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct EngineSettings {
    /// Seed the demonstration records on a cold start with no remote.
    #[serde(default = "default_true")]
    pub seed_demo_data: bool,
}

impl Default for EngineSettings {
    fn default() -> Self {
        EngineSettings {
            seed_demo_data: true,
        }
    }
}

// =============================================================================
// Worker Settings
// =============================================================================

/// Background flush worker timing.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct WorkerSettings {
    /// Interval between flush attempts while items are pending (seconds).
    #[serde(default = "default_poll_interval")]
    pub poll_interval_secs: u64,

    /// Initial backoff after a failed flush (milliseconds).
    #[serde(default = "default_initial_backoff")]
    pub initial_backoff_ms: u64,

    /// Maximum backoff between failed flushes (seconds).
    #[serde(default = "default_max_backoff")]
    pub max_backoff_secs: u64,

    /// Consecutive failed flushes before waiting for the next trigger.
    #[serde(default = "default_max_retry_attempts")]
    pub max_retry_attempts: u32,
}

fn default_poll_interval() -> u64 {
    30
}
fn default_initial_backoff() -> u64 {
    500
}
fn default_max_backoff() -> u64 {
    60
}
fn default_max_retry_attempts() -> u32 {
    3
}

impl Default for WorkerSettings {
    fn default() -> Self {
        WorkerSettings {
            poll_interval_secs: default_poll_interval(),
            initial_backoff_ms: default_initial_backoff(),
            max_backoff_secs: default_max_backoff(),
            max_retry_attempts: default_max_retry_attempts(),
        }
    }
}

// =============================================================================
// Storage Settings
// =============================================================================

#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct StorageSettings {
    /// SQLite file. Defaults to `tally.db` in the platform data directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub database_path: Option<PathBuf>,
}

// =============================================================================
// Main Sync Configuration
// =============================================================================

/// Complete configuration.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct SyncConfig {
    #[serde(default)]
    pub api: ApiSettings,

    #[serde(default)]
    pub simulation: SimulationSettings,

    #[serde(default)]
    pub engine: EngineSettings,

    #[serde(default)]
    pub worker: WorkerSettings,

    #[serde(default)]
    pub storage: StorageSettings,
}

impl SyncConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Loads configuration from file, environment, and defaults.
    ///
    /// ## Load Order (later overrides earlier)
    /// 1. Default values
    /// 2. Config file (tally.toml)
    /// 3. Environment variables
    pub fn load(config_path: Option<PathBuf>) -> SyncResult<Self> {
        let mut config = Self::default();

        if let Some(path) = config_path.or_else(Self::default_config_path) {
            if path.exists() {
                info!(?path, "Loading config from file");
                let contents = std::fs::read_to_string(&path)?;
                config = toml::from_str(&contents)?;
            } else {
                debug!(?path, "Config file not found, using defaults");
            }
        }

        config.apply_env_overrides(|name| std::env::var(name).ok());

        config.validate()?;

        Ok(config)
    }

    /// Loads config or returns default if load fails.
    pub fn load_or_default(config_path: Option<PathBuf>) -> Self {
        Self::load(config_path).unwrap_or_else(|e| {
            warn!("Failed to load config: {}. Using defaults.", e);
            Self::default()
        })
    }

    /// Saves configuration to file.
    pub fn save(&self, config_path: Option<PathBuf>) -> SyncResult<PathBuf> {
        let path = config_path
            .or_else(Self::default_config_path)
            .ok_or_else(|| SyncError::ConfigSaveFailed("No config path available".into()))?;

        if let Some(parent) = path.parent() {
            std::fs::create_dir_all(parent)
                .map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;
        }

        let contents = toml::to_string_pretty(self)?;
        std::fs::write(&path, contents).map_err(|e| SyncError::ConfigSaveFailed(e.to_string()))?;

        info!(?path, "Config saved");
        Ok(path)
    }

    /// Validates the configuration.
    pub fn validate(&self) -> SyncResult<()> {
        if !self.api.is_memory() {
            let url = url::Url::parse(&self.api.base_url)?;
            if url.scheme() != "http" && url.scheme() != "https" {
                return Err(SyncError::InvalidUrl(format!(
                    "API URL must use http://, https:// or {}, got: {}",
                    MEMORY_URL, self.api.base_url
                )));
            }
        }

        if self.api.timeout_ms == 0 {
            return Err(SyncError::InvalidConfig(
                "api.timeout_ms must be greater than 0".into(),
            ));
        }

        let rate = self.simulation.failure_rate;
        if !(0.0..=1.0).contains(&rate) {
            return Err(SyncError::InvalidConfig(format!(
                "simulation.failure_rate must be between 0 and 1, got {}",
                rate
            )));
        }

        if self.worker.poll_interval_secs == 0 {
            return Err(SyncError::InvalidConfig(
                "worker.poll_interval_secs must be greater than 0".into(),
            ));
        }

        Ok(())
    }

    /// Applies overrides using `lookup` to read variables.
    ///
    /// Unparseable values are logged and ignored.
    pub fn apply_env_overrides<F>(&mut self, lookup: F)
    where
        F: Fn(&str) -> Option<String>,
    {
        if let Some(url) = lookup("TALLY_API_BASE_URL") {
            debug!(url = %url, "Overriding API base URL from environment");
            self.api.base_url = url;
        }

        if let Some(raw) = lookup("TALLY_API_TIMEOUT_MS") {
            match raw.parse() {
                Ok(ms) => self.api.timeout_ms = ms,
                Err(_) => warn!(value = %raw, "Ignoring invalid TALLY_API_TIMEOUT_MS"),
            }
        }

        if let Some(raw) = lookup("TALLY_SIMULATE_LATENCY") {
            match raw.to_lowercase().as_str() {
                "1" | "true" | "yes" | "on" => self.simulation.enabled = true,
                "0" | "false" | "no" | "off" => self.simulation.enabled = false,
                _ => warn!(value = %raw, "Ignoring invalid TALLY_SIMULATE_LATENCY"),
            }
        }

        if let Some(raw) = lookup("TALLY_LATENCY_MS") {
            match raw.parse() {
                Ok(ms) => self.simulation.latency_ms = ms,
                Err(_) => warn!(value = %raw, "Ignoring invalid TALLY_LATENCY_MS"),
            }
        }

        if let Some(raw) = lookup("TALLY_FAILURE_RATE") {
            match raw.parse() {
                Ok(rate) => {
                    debug!(rate, "Overriding failure rate from environment");
                    self.simulation.failure_rate = rate;
                }
                Err(_) => warn!(value = %raw, "Ignoring invalid TALLY_FAILURE_RATE"),
            }
        }

        if let Some(raw) = lookup("TALLY_SIMULATION_SEED") {
            match raw.parse() {
                Ok(seed) => self.simulation.seed = Some(seed),
                Err(_) => warn!(value = %raw, "Ignoring invalid TALLY_SIMULATION_SEED"),
            }
        }

        if let Some(path) = lookup("TALLY_DB_PATH") {
            self.storage.database_path = Some(PathBuf::from(path));
        }
    }

    fn project_dirs() -> Option<directories::ProjectDirs> {
        directories::ProjectDirs::from("dev", "tally", "tally")
    }

    /// Returns the default config file path.
    pub fn default_config_path() -> Option<PathBuf> {
        Self::project_dirs().map(|dirs| dirs.config_dir().join("tally.toml"))
    }

    /// Resolves the database file, falling back to the platform data directory
    /// and finally the working directory.
    pub fn database_path(&self) -> PathBuf {
        if let Some(path) = &self.storage.database_path {
            return path.clone();
        }
        Self::project_dirs()
            .map(|dirs| dirs.data_dir().join("tally.db"))
            .unwrap_or_else(|| PathBuf::from("tally.db"))
    }
}
