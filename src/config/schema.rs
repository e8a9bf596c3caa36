//! Settings for the runtime itself.
//!
//! Read from the `runtime` key of the merged configuration tree. Every field
//! has a default so a process can boot without any runtime section.

use std::time::Duration;

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// Root settings for the worker runtime.
#[derive(Debug, Clone, Deserialize, Serialize)]
#[serde(default)]
pub struct RuntimeConfig {
    /// Log level (trace, debug, info, warn, error). `RUST_LOG` wins when set.
    pub log_level: String,

    /// Emit JSON log lines instead of the human format.
    pub log_json: bool,

    /// Prometheus exporter bind address. Metrics are not exported when unset.
    pub metrics_address: Option<String>,

    /// Upper bound on waiting for in-flight work during shutdown.
    /// `None` waits until the critical section clears.
    pub shutdown_timeout_secs: Option<u64>,

    /// Status directory, relative to the process root.
    pub status_dir: String,
}

impl Default for RuntimeConfig {
    fn default() -> Self {
        Self {
            log_level: "info".to_string(),
            log_json: false,
            metrics_address: None,
            shutdown_timeout_secs: None,
            status_dir: "status".to_string(),
        }
    }
}

impl RuntimeConfig {
    /// Extract the `runtime` section of a configuration tree.
    pub fn from_tree(tree: &Value) -> Result<Self, serde_json::Error> {
        match tree.get("runtime") {
            Some(section) => serde_json::from_value(section.clone()),
            None => Ok(Self::default()),
        }
    }

    pub fn shutdown_timeout(&self) -> Option<Duration> {
        self.shutdown_timeout_secs.map(Duration::from_secs)
    }
}
