//! Engine configuration.
//!
//! Plain numeric fields so the config round-trips cleanly through TOML;
//! accessor methods convert to [`Duration`] where the engine needs one.

use crate::worker::WorkerCategory;
use serde::{Deserialize, Serialize};
use std::path::Path;
use std::time::Duration;

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct EngineConfig {
    /// Fallback scheduler wake-up when no completion signal arrives.
    #[serde(default = "default_tick_interval_ms")]
    pub tick_interval_ms: u64,

    /// How often the progress reporter emits a summary.
    #[serde(default = "default_progress_interval_secs")]
    pub progress_interval_secs: u64,

    /// Attempt budget for tasks that don't declare their own.
    #[serde(default = "default_max_attempts")]
    pub default_max_attempts: u32,

    /// Base delay before re-running a failed task; scales with attempts.
    #[serde(default = "default_retry_backoff_ms")]
    pub retry_backoff_ms: u64,

    /// Per-attempt timeout for tasks that don't declare their own.
    /// `None` disables the default timeout entirely.
    #[serde(default = "default_timeout_secs")]
    pub default_timeout_secs: Option<u64>,

    /// Worker categories available to this engine.
    #[serde(default = "default_categories")]
    pub categories: Vec<WorkerCategory>,
}

fn default_tick_interval_ms() -> u64 {
    1_000
}

fn default_progress_interval_secs() -> u64 {
    120
}

fn default_max_attempts() -> u32 {
    3
}

fn default_retry_backoff_ms() -> u64 {
    1_000
}

fn default_timeout_secs() -> Option<u64> {
    Some(3_600)
}

fn default_categories() -> Vec<WorkerCategory> {
    vec![WorkerCategory::new("general", 3)]
}

impl Default for EngineConfig {
    fn default() -> Self {
        Self {
            tick_interval_ms: default_tick_interval_ms(),
            progress_interval_secs: default_progress_interval_secs(),
            default_max_attempts: default_max_attempts(),
            retry_backoff_ms: default_retry_backoff_ms(),
            default_timeout_secs: default_timeout_secs(),
            categories: default_categories(),
        }
    }
}

impl EngineConfig {
    pub fn tick_interval(&self) -> Duration {
        Duration::from_millis(self.tick_interval_ms.max(1))
    }

    pub fn progress_interval(&self) -> Duration {
        Duration::from_secs(self.progress_interval_secs.max(1))
    }

    pub fn retry_backoff(&self) -> Duration {
        Duration::from_millis(self.retry_backoff_ms)
    }

    pub fn default_timeout(&self) -> Option<Duration> {
        self.default_timeout_secs.map(Duration::from_secs)
    }

    /// Load from TOML file
    pub fn from_toml_file<P: AsRef<Path>>(path: P) -> Result<Self, Box<dyn std::error::Error>> {
        let content = std::fs::read_to_string(path)?;
        let config: EngineConfig = toml::from_str(&content)?;
        Ok(config)
    }

    /// Save to TOML file
    pub fn to_toml_file<P: AsRef<Path>>(&self, path: P) -> Result<(), Box<dyn std::error::Error>> {
        let content = toml::to_string_pretty(self)?;
        std::fs::write(path, content)?;
        Ok(())
    }
}
