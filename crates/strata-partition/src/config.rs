use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the partition registry.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct RegistryConfig {
    /// Maximum number of live partitions.
    pub max_partitions: usize,
    /// Evict a partition not accessed for this long.
    pub idle_timeout_ms: u64,
    /// How long `should_wait` callers wait for replay to finish.
    pub load_timeout_ms: u64,
    /// Capacity of the registry event broadcast channel.
    pub event_capacity: usize,
}

impl RegistryConfig {
    pub fn idle_timeout(&self) -> Duration {
        Duration::from_millis(self.idle_timeout_ms)
    }

    pub fn load_timeout(&self) -> Duration {
        Duration::from_millis(self.load_timeout_ms)
    }
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            max_partitions: 1000,
            idle_timeout_ms: 60_000,
            load_timeout_ms: 30_000,
            event_capacity: 256,
        }
    }
}
