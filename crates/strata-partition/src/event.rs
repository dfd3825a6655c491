use serde::{Deserialize, Serialize};
use strata_bridge::BridgeMode;
use strata_chain::ChainStore;
use strata_types::PartitionKey;

/// Why a partition left the registry.
#[derive(Clone, Copy, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RemovalCause {
    /// Idle longer than the configured timeout.
    Expired,
    /// Evicted to stay within the size bound.
    Size,
    /// Removed by `destroy_all` or an explicit call.
    Explicit,
    /// Replay failed or timed out.
    Failed,
}

/// Lifecycle events published by the registry.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum RegistryEvent {
    /// Construction of a partition has started.
    Loading { partition: PartitionKey },
    /// A partition was created and cached.
    Subscribed { partition: PartitionKey, mode: BridgeMode },
    /// A partition was evicted and its bridge released.
    Unsubscribed { partition: PartitionKey, cause: RemovalCause },
}

impl RegistryEvent {
    pub fn partition(&self) -> &PartitionKey {
        match self {
            Self::Loading { partition }
            | Self::Subscribed { partition, .. }
            | Self::Unsubscribed { partition, .. } => partition,
        }
    }
}

/// Synchronous observer of partition lifecycle.
pub trait PartitionListener: Send + Sync {
    /// A partition's chain store exists and its trust keys are seeded.
    /// Called before history replay starts.
    fn partition_created(&self, key: &PartitionKey, chain: &ChainStore);

    /// A partition was evicted or failed to load.
    fn partition_removed(&self, key: &PartitionKey);

    /// Whether the listener still has work for `key`. Held partitions are
    /// refreshed instead of expiring when idle. Size eviction ignores this.
    fn holds(&self, _key: &PartitionKey) -> bool {
        false
    }
}
