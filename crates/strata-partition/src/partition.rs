use std::sync::Arc;
use std::time::Duration;

use strata_bridge::{LoadState, PartitionBridge};
use strata_chain::{ChainEvent, ChainStore};
use strata_types::PartitionKey;

use crate::error::{RegistryError, RegistryResult};

/// In-memory materialization of one partition: its chain store and the
/// bridge to the backing log.
pub struct Partition {
    key: PartitionKey,
    chain: Arc<ChainStore>,
    bridge: Arc<dyn PartitionBridge>,
}

impl Partition {
    pub fn new(key: PartitionKey, chain: Arc<ChainStore>, bridge: Arc<dyn PartitionBridge>) -> Self {
        Self { key, chain, bridge }
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    pub fn chain(&self) -> &Arc<ChainStore> {
        &self.chain
    }

    pub fn bridge(&self) -> &Arc<dyn PartitionBridge> {
        &self.bridge
    }

    /// `true` once history replay has completed.
    pub fn is_loaded(&self) -> bool {
        self.bridge.has_loaded()
    }

    /// Wait until replay finishes, fails, or `timeout` passes.
    pub async fn wait_till_loaded(&self, timeout: Duration) -> RegistryResult<()> {
        let mut rx = self.bridge.load_state();
        let waited = tokio::time::timeout(timeout, async {
            rx.wait_for(|s| *s != LoadState::Loading)
                .await
                .map(|state| state.clone())
        })
        .await;

        match waited {
            Err(_) => Err(RegistryError::LoadTimeout {
                partition: self.key.to_string(),
                timeout_ms: timeout.as_millis() as u64,
            }),
            Ok(Err(_)) => Err(RegistryError::ReplayFailed {
                partition: self.key.to_string(),
                reason: "bridge closed before loading".to_string(),
            }),
            Ok(Ok(LoadState::Failed(reason))) => Err(RegistryError::ReplayFailed {
                partition: self.key.to_string(),
                reason,
            }),
            Ok(Ok(_)) => Ok(()),
        }
    }

    /// Apply received events to the chain store.
    pub fn feed(&self, events: Vec<ChainEvent>, throw_on_error: bool) -> RegistryResult<usize> {
        Ok(self.chain.feed(events, throw_on_error)?)
    }
}

impl std::fmt::Debug for Partition {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Partition")
            .field("key", &self.key.to_string())
            .field("loaded", &self.is_loaded())
            .field("objects", &self.chain.len())
            .finish()
    }
}
