use std::sync::Arc;

use strata_chain::{ChainEvent, ChainStore, SignedRecord};
use strata_types::{PartitionKey, TopicAndPartition};
use tokio::sync::watch;

use crate::config::BridgeMode;
use crate::error::BridgeResult;

/// Progress of a partition's history replay.
#[derive(Clone, Debug, PartialEq, Eq)]
pub enum LoadState {
    Loading,
    Loaded,
    /// Replay stopped; the partition must not be used.
    Failed(String),
}

/// Connection between one partition's chain store and its backing log.
///
/// Implementations must:
/// - Apply every accepted write and delete to the partition's chain store
/// - Report replay progress through [`PartitionBridge::load_state`]
/// - Propagate every I/O error, never silently drop a write
pub trait PartitionBridge: Send + Sync {
    fn partition_key(&self) -> &PartitionKey;

    /// Watch the replay state of this partition.
    fn load_state(&self) -> watch::Receiver<LoadState>;

    /// `true` once history replay has completed successfully.
    fn has_loaded(&self) -> bool {
        matches!(*self.load_state().borrow(), LoadState::Loaded)
    }

    /// Append a signed record.
    fn write(&self, record: SignedRecord) -> BridgeResult<()>;

    /// Physically remove every record stored under each key.
    fn delete_many(&self, keys: &[String]) -> BridgeResult<()>;
}

/// Factory for partition bridges of one mode.
pub trait BridgeBuilder: Send + Sync {
    fn mode(&self) -> BridgeMode;

    /// Open the bridge for `key`, feeding into `chain`.
    fn create_for_key(
        &self,
        key: &PartitionKey,
        chain: Arc<ChainStore>,
    ) -> BridgeResult<Arc<dyn PartitionBridge>>;

    /// Release whatever the bridge for `key` holds.
    fn remove_for_key(&self, key: &PartitionKey);
}

/// Locally retained history used to pre-load a partition on creation.
pub trait ReadModel: Send + Sync {
    fn read(&self, partition: &TopicAndPartition) -> Vec<ChainEvent>;
}
