use std::path::PathBuf;

use serde::{Deserialize, Serialize};

/// Which backing log a node uses for its partitions.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BridgeMode {
    /// Volatile, process-local storage.
    #[default]
    Ram,
    /// One write-ahead log file per partition.
    Log,
}

/// Configuration for the partition bridges.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct BridgeConfig {
    pub mode: BridgeMode,
    /// Directory holding partition log files (log mode only).
    pub log_dir: PathBuf,
    /// `fsync` after every append instead of relying on the page cache.
    pub sync_every_write: bool,
}

impl Default for BridgeConfig {
    fn default() -> Self {
        Self {
            mode: BridgeMode::Ram,
            log_dir: PathBuf::from("data/partitions"),
            sync_every_write: false,
        }
    }
}
