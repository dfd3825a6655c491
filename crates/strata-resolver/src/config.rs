use std::time::Duration;

use serde::{Deserialize, Serialize};

/// Configuration for the partition resolver.
#[derive(Clone, Debug, Serialize, Deserialize)]
#[serde(default)]
pub struct ResolverConfig {
    /// Topic that root objects are sharded into.
    pub topic: String,
    /// Number of partitions in `topic`.
    pub partitions: u32,
    /// Type names allowed to exist without a parent.
    pub parent_free_types: Vec<String>,
    pub cache_max_entries: usize,
    /// Cache entries expire this long after their last access.
    pub cache_ttl_ms: u64,
    /// Longest parent chain followed before giving up.
    pub max_depth: usize,
}

impl ResolverConfig {
    pub fn cache_ttl(&self) -> Duration {
        Duration::from_millis(self.cache_ttl_ms)
    }
}

impl Default for ResolverConfig {
    fn default() -> Self {
        Self {
            topic: "data".to_string(),
            partitions: 8,
            parent_free_types: Vec::new(),
            cache_max_entries: 10_000,
            cache_ttl_ms: 60_000,
            max_depth: 1024,
        }
    }
}
