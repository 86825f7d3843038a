//! Synchronizer configuration.

use serde::{Deserialize, Serialize};
use std::time::Duration;

use crate::retry::Backoff;
use crate::scheduler::SyncMode;
use keyvault_common::{Error, Result};

/// Configuration for the sync worker.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(default)]
pub struct SyncConfig {
    /// When the worker pushes besides explicit requests.
    pub mode: SyncMode,
    /// Retries for transient push failures.
    pub max_retries: u32,
    /// Delay before the first retry, in milliseconds.
    pub initial_retry_delay_ms: u64,
    /// Upper bound for a single retry delay, in milliseconds.
    pub max_retry_delay_ms: u64,
    /// Randomize retry delays so clients do not retry in lockstep.
    pub retry_jitter: bool,
}

impl SyncConfig {
    /// Retry delays derived from this configuration.
    pub fn backoff(&self) -> Backoff {
        Backoff {
            max_retries: self.max_retries,
            initial_delay: Duration::from_millis(self.initial_retry_delay_ms),
            max_delay: Duration::from_millis(self.max_retry_delay_ms.max(self.initial_retry_delay_ms)),
            jitter: self.retry_jitter,
        }
    }

    /// Parse a configuration from JSON. Missing fields take their defaults.
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Serialization(format!("Invalid sync config: {}", e)))
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self)
            .map_err(|e| Error::Serialization(format!("Failed to serialize sync config: {}", e)))
    }
}

impl Default for SyncConfig {
    fn default() -> Self {
        Self {
            mode: SyncMode::OnDemand,
            max_retries: 3,
            initial_retry_delay_ms: 1000,
            max_retry_delay_ms: 60_000,
            retry_jitter: true,
        }
    }
}
