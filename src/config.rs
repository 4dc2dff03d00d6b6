use serde::Deserialize;

use crate::error::{Error, Result};
use crate::loader::parser::parse_json_file;

/// Runtime configuration of the transfer scheduler.
///
/// Loaded once at startup from a JSON file (see [`SchedulerConfig::from_file`])
/// and snapshotted per scheduling round. Admission limits here are upper
/// bounds; the per-round flow allocation may grant fewer slots when recent
/// failure feedback derates a storage pair.
#[derive(Debug, Clone, Deserialize)]
#[serde(default)]
pub struct SchedulerConfig {
    /// Maximum concurrent transfers allowed on any (source, destination) pair.
    pub max_active_per_pair: i64,

    /// Maximum concurrent transfers allowed for a single VO across all pairs.
    pub max_active_per_vo: i64,

    /// Pause between scheduling rounds in milliseconds.
    pub scheduling_interval_ms: u64,

    /// Capacity of the bounded admission queue feeding the worker pool.
    pub queue_capacity: usize,

    /// Number of url-copy worker threads.
    pub worker_count: usize,

    /// Path of the url-copy executable spawned per admitted transfer.
    pub url_copy_binary: String,

    /// Success-rate floor below which a pair receives only a single probe slot.
    pub min_success_rate: f64,
}

impl Default for SchedulerConfig {
    fn default() -> Self {
        SchedulerConfig {
            max_active_per_pair: 60,
            max_active_per_vo: 100,
            scheduling_interval_ms: 2_000,
            queue_capacity: 1_000,
            worker_count: 10,
            url_copy_binary: "/usr/bin/fts-url-copy".to_string(),
            min_success_rate: 0.5,
        }
    }
}

impl SchedulerConfig {
    pub fn from_file(file_path: &str) -> Result<Self> {
        let config: SchedulerConfig = parse_json_file(file_path)?;
        config.validate()?;
        Ok(config)
    }

    /// Rejects configurations the scheduler cannot run with.
    pub fn validate(&self) -> Result<()> {
        if self.max_active_per_pair <= 0 {
            return Err(Error::ConfigError(format!("max_active_per_pair must be positive, got {}", self.max_active_per_pair)));
        }
        if self.max_active_per_vo <= 0 {
            return Err(Error::ConfigError(format!("max_active_per_vo must be positive, got {}", self.max_active_per_vo)));
        }
        if self.queue_capacity == 0 {
            return Err(Error::ConfigError("queue_capacity must be at least 1".to_string()));
        }
        if self.worker_count == 0 {
            return Err(Error::ConfigError("worker_count must be at least 1".to_string()));
        }
        if !(0.0..=1.0).contains(&self.min_success_rate) {
            return Err(Error::ConfigError(format!("min_success_rate must be within [0, 1], got {}", self.min_success_rate)));
        }
        Ok(())
    }
}
