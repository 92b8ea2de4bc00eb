//! Runtime configuration
//!
//! All knobs come from the environment, read once at startup.

use std::str::FromStr;
use std::time::Duration;

use thiserror::Error;

use crate::scheduler::SchedulerConfig;

/// Configuration error raised at startup.
#[derive(Debug, Error)]
pub enum ConfigError {
    /// An environment variable held a value that does not parse.
    #[error("invalid value `{value}` for {var}")]
    Invalid {
        /// Variable name.
        var: &'static str,
        /// Offending value.
        value: String,
    },
    /// A variable parsed but violates its constraint.
    #[error("{var} must be positive")]
    NotPositive {
        /// Variable name.
        var: &'static str,
    },
}

/// Server configuration.
#[derive(Debug, Clone)]
pub struct Config {
    /// Listen address, `BIND_ADDR` (default `0.0.0.0:8000`).
    pub bind_addr: String,
    /// Artifact bundle path, `ARTIFACTS_PATH` (default `artifacts/model.json`).
    pub artifacts_path: String,
    /// Batching parameters: `BATCH_SIZE` (64), `BATCH_WAIT_MS` (5),
    /// `ML_WORKERS` (8).
    pub scheduler: SchedulerConfig,
}

impl Config {
    /// Read configuration from the environment.
    pub fn from_env() -> Result<Self, ConfigError> {
        let max_batch_size: usize = read_var("BATCH_SIZE", 64)?;
        let wait_ms: u64 = read_var("BATCH_WAIT_MS", 5)?;
        let worker_concurrency: usize = read_var("ML_WORKERS", 8)?;

        if max_batch_size == 0 {
            return Err(ConfigError::NotPositive { var: "BATCH_SIZE" });
        }
        if wait_ms == 0 {
            return Err(ConfigError::NotPositive { var: "BATCH_WAIT_MS" });
        }
        if worker_concurrency == 0 {
            return Err(ConfigError::NotPositive { var: "ML_WORKERS" });
        }

        Ok(Self {
            bind_addr: std::env::var("BIND_ADDR").unwrap_or_else(|_| "0.0.0.0:8000".into()),
            artifacts_path: std::env::var("ARTIFACTS_PATH")
                .unwrap_or_else(|_| "artifacts/model.json".into()),
            scheduler: SchedulerConfig {
                max_batch_size,
                max_wait: Duration::from_millis(wait_ms),
                worker_concurrency,
            },
        })
    }
}

fn read_var<T: FromStr>(var: &'static str, default: T) -> Result<T, ConfigError> {
    match std::env::var(var) {
        Ok(value) => value
            .parse()
            .map_err(|_| ConfigError::Invalid { var, value }),
        Err(_) => Ok(default),
    }
}
