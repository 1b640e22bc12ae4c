//! Run configuration for the probe pipeline.
//!
//! Configuration is loaded from a JSON document and validated before any
//! pipeline thread is started. Every field has a default so partial documents
//! are accepted.

use crate::error::{Error, Result};
use serde::{Deserialize, Serialize};
use std::fs;
use std::path::Path;
use std::time::Duration;

/// Capacity of the shared task queue. Producers block once it is full.
pub const DEFAULT_QUEUE_CAPACITY: usize = 100;

/// Connection settings for one database instance.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct InstanceConfig {
    pub dsn: String,
    /// Number of workers executing statements against this instance.
    #[serde(default = "default_concurrency")]
    pub concurrency: usize,
}

fn default_concurrency() -> usize {
    4
}

#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct BenchConfig {
    pub queue_capacity: usize,
    pub slow_query_threshold_ms: u64,
    /// Statements the provider may leave unacknowledged before it blocks.
    pub max_pending_statements: usize,
    /// Derived count tasks the expander may keep in flight before it blocks.
    pub max_fanout_in_flight: usize,
    pub dedup: bool,
    pub worst_k: usize,
    pub p_error_threshold: f64,
    pub instances: Vec<InstanceConfig>,
}

impl Default for BenchConfig {
    fn default() -> Self {
        Self {
            queue_capacity: DEFAULT_QUEUE_CAPACITY,
            slow_query_threshold_ms: 3000,
            max_pending_statements: 64,
            max_fanout_in_flight: 256,
            dedup: true,
            worst_k: 10,
            p_error_threshold: 100.0,
            instances: Vec::new(),
        }
    }
}

impl BenchConfig {
    pub fn from_file<P: AsRef<Path>>(path: P) -> Result<Self> {
        let raw = fs::read_to_string(path.as_ref())?;
        let config: BenchConfig = serde_json::from_str(&raw)?;
        config.validate()?;
        Ok(config)
    }

    pub fn slow_query_threshold(&self) -> Duration {
        Duration::from_millis(self.slow_query_threshold_ms)
    }

    pub fn validate(&self) -> Result<()> {
        if self.queue_capacity == 0 {
            return Err(Error::Config(
                "Queue capacity must be greater than 0".into(),
            ));
        }

        if self.max_pending_statements == 0 || self.max_fanout_in_flight == 0 {
            return Err(Error::Config(
                "In-flight limits must allow at least 1 task".into(),
            ));
        }

        if !self.p_error_threshold.is_finite() || self.p_error_threshold < 0.0 {
            return Err(Error::Config(
                "P-error threshold must be a non-negative number".into(),
            ));
        }

        for instance in &self.instances {
            if instance.dsn.trim().is_empty() {
                return Err(Error::Config("Instance DSN must not be empty".into()));
            }
            if instance.concurrency == 0 {
                return Err(Error::Config(format!(
                    "Instance {} must have a concurrency of at least 1",
                    instance.dsn
                )));
            }
        }

        Ok(())
    }
}
