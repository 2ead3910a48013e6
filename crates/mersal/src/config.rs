//! Application configuration (spec §8, "Configuration").
//!
//! Mirrors the teacher's `RuntimeConfig`/`StorageConfig` shape: a plain
//! serde-derived struct with a hand-written [`Default`] impl, deserialized
//! by whatever host (CLI, config file loader) embeds this crate rather than
//! read directly by `mersal` itself.

use serde::{Deserialize, Serialize};

/// Top-level configuration for one [`crate::App`] instance.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct AppConfig {
    /// The transport address this application receives on.
    pub own_address: String,
    /// How many incoming messages the worker processes concurrently.
    pub max_parallelism: usize,
    /// How long the worker waits before re-polling an empty queue.
    pub poll_interval_ms: u64,
    /// How many failed deliveries a message tolerates before being
    /// forwarded to the dead-letter address.
    pub retry_max_attempts: u32,
    /// Where messages that exhaust their retry budget are forwarded.
    pub dead_letter_address: String,
    /// Storage backend selection.
    pub storage: StorageConfig,
}

/// Which storage/transport backend an [`AppConfig`] wires up.
#[derive(Debug, Clone, Serialize, Deserialize)]
#[serde(tag = "backend", rename_all = "snake_case")]
pub enum StorageConfig {
    /// Everything lives in process memory; nothing survives a restart.
    Memory,
    /// Everything is persisted under a filesystem directory.
    FileSystem {
        /// The directory transports/storages read and write under.
        base_dir: String,
    },
}

impl Default for AppConfig {
    fn default() -> Self {
        Self {
            own_address: "app".to_string(),
            max_parallelism: 10,
            poll_interval_ms: 200,
            retry_max_attempts: 5,
            dead_letter_address: "dead-letter".to_string(),
            storage: StorageConfig::Memory,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn default_config_uses_in_memory_storage() {
        let config = AppConfig::default();
        assert!(matches!(config.storage, StorageConfig::Memory));
        assert_eq!(config.max_parallelism, 10);
    }
}
