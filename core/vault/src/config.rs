//! Vault manager configuration.

use serde::{Deserialize, Serialize};

use keyvault_common::{Error, Result};

/// Default capacity of the vault event channel.
pub const DEFAULT_EVENT_CAPACITY: usize = 64;

/// Configuration for [`VaultManager`](crate::VaultManager).
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(default)]
pub struct VaultManagerConfig {
    /// Report a vault as locked until its lock state has been computed.
    ///
    /// Setting this to `false` reports unknown vaults as unlocked.
    pub assume_locked_until_computed: bool,
    /// Events buffered per subscriber before it starts missing some.
    pub event_capacity: usize,
}

impl VaultManagerConfig {
    /// Parse a configuration from JSON. Missing fields take their defaults.
    ///
    /// # Errors
    /// - `Serialization` if the JSON is malformed
    pub fn from_json(json: &str) -> Result<Self> {
        serde_json::from_str(json)
            .map_err(|e| Error::Serialization(format!("Invalid vault manager config: {}", e)))
    }

    /// Serialize the configuration to JSON.
    pub fn to_json(&self) -> Result<String> {
        serde_json::to_string_pretty(self).map_err(|e| {
            Error::Serialization(format!("Failed to serialize vault manager config: {}", e))
        })
    }
}

impl Default for VaultManagerConfig {
    fn default() -> Self {
        Self {
            assume_locked_until_computed: true,
            event_capacity: DEFAULT_EVENT_CAPACITY,
        }
    }
}
