use std::sync::Arc;

use dashmap::DashMap;
use strata_chain::{ChainEvent, ChainStore, SignedRecord};
use strata_types::{PartitionKey, TopicAndPartition};
use tokio::sync::watch;
use tracing::debug;

use crate::config::BridgeMode;
use crate::error::BridgeResult;
use crate::traits::{BridgeBuilder, LoadState, PartitionBridge, ReadModel};

/// Process-local record retention, keyed by partition.
///
/// Keeps every accepted data record until it is tombstoned, at which point
/// the records under that key are dropped outright (there is nothing to
/// compact later). Serves as the [`ReadModel`] for in-memory partitions.
#[derive(Default)]
pub struct RamRepository {
    partitions: DashMap<TopicAndPartition, Vec<SignedRecord>>,
}

impl RamRepository {
    pub fn new() -> Self {
        Self::default()
    }

    fn store(&self, partition: &TopicAndPartition, record: SignedRecord) {
        self.partitions
            .entry(partition.clone())
            .or_default()
            .push(record);
    }

    fn remove(&self, partition: &TopicAndPartition, key: &str) {
        if let Some(mut records) = self.partitions.get_mut(partition) {
            records.retain(|r| r.key != key);
        }
    }

    /// Number of records retained for a partition.
    pub fn record_count(&self, partition: &TopicAndPartition) -> usize {
        self.partitions.get(partition).map(|r| r.len()).unwrap_or(0)
    }
}

impl ReadModel for RamRepository {
    fn read(&self, partition: &TopicAndPartition) -> Vec<ChainEvent> {
        self.partitions
            .get(partition)
            .map(|records| records.iter().cloned().map(ChainEvent::Data).collect())
            .unwrap_or_default()
    }
}

impl std::fmt::Debug for RamRepository {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RamRepository")
            .field("partitions", &self.partitions.len())
            .finish()
    }
}

/// In-memory bridge: writes are applied directly to the chain store.
pub struct RamBridge {
    key: PartitionKey,
    tp: TopicAndPartition,
    chain: Arc<ChainStore>,
    repository: Arc<RamRepository>,
    loaded: watch::Sender<LoadState>,
}

impl PartitionBridge for RamBridge {
    fn partition_key(&self) -> &PartitionKey {
        &self.key
    }

    fn load_state(&self) -> watch::Receiver<LoadState> {
        self.loaded.subscribe()
    }

    fn write(&self, record: SignedRecord) -> BridgeResult<()> {
        self.chain.append(ChainEvent::Data(record.clone()))?;
        self.repository.store(&self.tp, record);
        Ok(())
    }

    fn delete_many(&self, keys: &[String]) -> BridgeResult<()> {
        for key in keys {
            self.chain.append(ChainEvent::Tombstone { key: key.clone() })?;
            self.repository.remove(&self.tp, key);
        }
        debug!(partition = %self.key, count = keys.len(), "records deleted");
        Ok(())
    }
}

/// Builds [`RamBridge`]s sharing one [`RamRepository`].
#[derive(Default)]
pub struct RamBridgeBuilder {
    repository: Arc<RamRepository>,
}

impl RamBridgeBuilder {
    pub fn new(repository: Arc<RamRepository>) -> Self {
        Self { repository }
    }

    pub fn repository(&self) -> Arc<RamRepository> {
        Arc::clone(&self.repository)
    }
}

impl BridgeBuilder for RamBridgeBuilder {
    fn mode(&self) -> BridgeMode {
        BridgeMode::Ram
    }

    fn create_for_key(
        &self,
        key: &PartitionKey,
        chain: Arc<ChainStore>,
    ) -> BridgeResult<Arc<dyn PartitionBridge>> {
        let (loaded, _) = watch::channel(LoadState::Loaded);
        Ok(Arc::new(RamBridge {
            key: key.clone(),
            tp: key.topic_and_partition(),
            chain,
            repository: Arc::clone(&self.repository),
            loaded,
        }))
    }

    fn remove_for_key(&self, key: &PartitionKey) {
        debug!(partition = %key, "in-memory bridge released");
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use strata_chain::RecordDraft;
    use strata_crypto::KeyPair;
    use strata_types::DataObject;

    fn setup() -> (RamBridgeBuilder, Arc<ChainStore>, KeyPair, PartitionKey) {
        let key = PartitionKey::new("accounts", 0);
        let kp = KeyPair::generate();
        let chain = Arc::new(ChainStore::new(key.clone()));
        chain.add_trust_key(kp.verifying_key().clone());
        (RamBridgeBuilder::default(), chain, kp, key)
    }

    #[test]
    fn ram_bridge_is_loaded_immediately() {
        let (builder, chain, _, key) = setup();
        let bridge = builder.create_for_key(&key, chain).unwrap();
        assert!(bridge.has_loaded());
        assert_eq!(bridge.partition_key(), &key);
    }

    #[test]
    fn write_reaches_chain_and_read_model() {
        let (builder, chain, kp, key) = setup();
        let bridge = builder.create_for_key(&key, Arc::clone(&chain)).unwrap();
        let obj = DataObject::root("Account", json!({"name": "alice"}));
        let record = RecordDraft::for_object(&obj, vec![]).unwrap().sign(&kp).unwrap();

        bridge.write(record).unwrap();
        assert!(chain.exists(&obj.id));
        assert_eq!(builder.repository().read(&key.topic_and_partition()).len(), 1);
    }

    #[test]
    fn rejected_write_is_not_retained() {
        let (builder, chain, _, key) = setup();
        let bridge = builder.create_for_key(&key, chain).unwrap();
        let obj = DataObject::root("Account", json!({}));
        let record = RecordDraft::for_object(&obj, vec![])
            .unwrap()
            .sign(&KeyPair::generate())
            .unwrap();

        assert!(bridge.write(record).is_err());
        assert_eq!(builder.repository().record_count(&key.topic_and_partition()), 0);
    }

    #[test]
    fn delete_many_drops_records() {
        let (builder, chain, kp, key) = setup();
        let bridge = builder.create_for_key(&key, Arc::clone(&chain)).unwrap();
        let obj = DataObject::root("Account", json!({}));
        let record = RecordDraft::for_object(&obj, vec![]).unwrap().sign(&kp).unwrap();
        bridge.write(record).unwrap();

        bridge.delete_many(&[obj.record_key()]).unwrap();
        assert!(!chain.exists(&obj.id));
        assert!(builder.repository().read(&key.topic_and_partition()).is_empty());
    }
}
