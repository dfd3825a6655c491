use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the maintenance daemon.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct MaintenanceConfig {
    /// Grace period between scheduling a tombstone or merge and applying it.
    pub window_ms: u64,
    /// Minimum pause between passes.
    pub pause_ms: u64,
    /// Upper bound of the random addend to each pause.
    pub jitter_ms: u64,
}

impl MaintenanceConfig {
    pub fn window(&self) -> Duration {
        Duration::from_millis(self.window_ms)
    }

    /// Lent keys outlive the merges that need them.
    pub fn borrowed_rights_ttl(&self) -> Duration {
        Duration::from_millis(self.window_ms.saturating_mul(2))
    }
}

impl Default for MaintenanceConfig {
    fn default() -> Self {
        Self {
            window_ms: 8_000,
            pause_ms: 1_000,
            jitter_ms: 4_000,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn borrowed_rights_outlive_window() {
        let c = MaintenanceConfig::default();
        assert_eq!(c.window(), Duration::from_secs(8));
        assert_eq!(c.borrowed_rights_ttl(), Duration::from_secs(16));
    }
}
