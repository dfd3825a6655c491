use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::thread;

use dashmap::DashMap;
use strata_chain::{ChainEvent, ChainStore, SignedRecord};
use strata_types::{PartitionKey, TopicAndPartition};
use tokio::sync::watch;
use tracing::{debug, info, warn};

use crate::config::{BridgeConfig, BridgeMode};
use crate::error::{BridgeError, BridgeResult};
use crate::traits::{BridgeBuilder, LoadState, PartitionBridge};
use crate::wal::{PartitionLog, SyncMode};

/// Durable bridge over a [`PartitionLog`].
///
/// History is replayed into the chain store on a background thread.
/// Writes are refused with [`BridgeError::NotLoaded`] until replay has
/// completed, so new entries can never interleave with replayed ones.
pub struct LogBridge {
    key: PartitionKey,
    chain: Arc<ChainStore>,
    log: Arc<PartitionLog>,
    state: Arc<watch::Sender<LoadState>>,
}

impl LogBridge {
    /// Open the log and start replaying it into `chain`.
    pub fn open(key: PartitionKey, chain: Arc<ChainStore>, log: Arc<PartitionLog>) -> BridgeResult<Self> {
        let (tx, _) = watch::channel(LoadState::Loading);
        let state = Arc::new(tx);

        let replay = Replay {
            key: key.clone(),
            chain: Arc::clone(&chain),
            log: Arc::clone(&log),
            state: Arc::clone(&state),
        };
        thread::Builder::new()
            .name(format!("replay-{}", key.topic_and_partition().file_stem()))
            .spawn(move || replay.run())?;

        Ok(Self { key, chain, log, state })
    }

    pub fn log_path(&self) -> &Path {
        self.log.path()
    }

    fn ensure_loaded(&self) -> BridgeResult<()> {
        if self.has_loaded() {
            Ok(())
        } else {
            Err(BridgeError::NotLoaded(self.key.to_string()))
        }
    }

    fn append_event(&self, event: ChainEvent) -> BridgeResult<()> {
        let bytes = event.encode()?;
        self.log.append(&bytes)?;
        self.chain.append(event)?;
        Ok(())
    }
}

impl PartitionBridge for LogBridge {
    fn partition_key(&self) -> &PartitionKey {
        &self.key
    }

    fn load_state(&self) -> watch::Receiver<LoadState> {
        self.state.subscribe()
    }

    fn write(&self, record: SignedRecord) -> BridgeResult<()> {
        self.ensure_loaded()?;
        // A rejected record must never reach the log, or replay would fail.
        self.chain.validate(&record)?;
        self.append_event(ChainEvent::Data(record))
    }

    fn delete_many(&self, keys: &[String]) -> BridgeResult<()> {
        self.ensure_loaded()?;
        for key in keys {
            self.append_event(ChainEvent::Tombstone { key: key.clone() })?;
        }

        let deleted: HashSet<&str> = keys.iter().map(String::as_str).collect();
        let dropped = self.log.retain(|payload| match ChainEvent::decode(payload) {
            Ok(event) => !deleted.contains(event.key()),
            Err(_) => true,
        })?;
        debug!(partition = %self.key, keys = keys.len(), dropped, "records purged from log");
        Ok(())
    }
}

struct Replay {
    key: PartitionKey,
    chain: Arc<ChainStore>,
    log: Arc<PartitionLog>,
    state: Arc<watch::Sender<LoadState>>,
}

impl Replay {
    fn run(self) {
        let outcome = self.replay();
        let next = match outcome {
            Ok(applied) => {
                info!(partition = %self.key, applied, "partition replay complete");
                LoadState::Loaded
            }
            Err(e) => {
                warn!(partition = %self.key, error = %e, "partition replay failed");
                LoadState::Failed(e.to_string())
            }
        };
        self.state.send_replace(next);
    }

    fn replay(&self) -> BridgeResult<usize> {
        let events = self
            .log
            .recover()?
            .iter()
            .map(|payload| ChainEvent::decode(payload))
            .collect::<Result<Vec<_>, _>>()?;
        Ok(self.chain.feed(events, true)?)
    }
}

/// Builds [`LogBridge`]s, one log file per partition under a directory.
pub struct LogBridgeBuilder {
    dir: PathBuf,
    sync_mode: SyncMode,
    open: DashMap<TopicAndPartition, Arc<PartitionLog>>,
}

impl LogBridgeBuilder {
    pub fn new(dir: impl Into<PathBuf>, sync_mode: SyncMode) -> Self {
        Self {
            dir: dir.into(),
            sync_mode,
            open: DashMap::new(),
        }
    }

    pub fn from_config(config: &BridgeConfig) -> Self {
        let sync_mode = if config.sync_every_write {
            SyncMode::EveryWrite
        } else {
            SyncMode::OsDefault
        };
        Self::new(&config.log_dir, sync_mode)
    }

    /// Path of the log file for a partition.
    pub fn log_path(&self, partition: &TopicAndPartition) -> PathBuf {
        self.dir.join(format!("{}.wal", partition.file_stem()))
    }

    /// Number of partition logs currently held open.
    pub fn open_logs(&self) -> usize {
        self.open.len()
    }
}

impl BridgeBuilder for LogBridgeBuilder {
    fn mode(&self) -> BridgeMode {
        BridgeMode::Log
    }

    fn create_for_key(
        &self,
        key: &PartitionKey,
        chain: Arc<ChainStore>,
    ) -> BridgeResult<Arc<dyn PartitionBridge>> {
        let tp = key.topic_and_partition();
        let log = Arc::new(PartitionLog::open(&self.log_path(&tp), self.sync_mode)?);
        self.open.insert(tp, Arc::clone(&log));
        let bridge = LogBridge::open(key.clone(), chain, log)?;
        Ok(Arc::new(bridge))
    }

    fn remove_for_key(&self, key: &PartitionKey) {
        if let Some((tp, log)) = self.open.remove(&key.topic_and_partition()) {
            debug!(partition = %tp, path = %log.path().display(), "partition log released");
        }
    }
}

impl std::fmt::Debug for LogBridgeBuilder {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("LogBridgeBuilder")
            .field("dir", &self.dir)
            .field("sync_mode", &self.sync_mode)
            .field("open", &self.open.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;
    use std::time::Duration;
    use strata_chain::RecordDraft;
    use strata_crypto::KeyPair;
    use strata_types::DataObject;

    fn chain_for(key: &PartitionKey, kp: &KeyPair) -> Arc<ChainStore> {
        let chain = Arc::new(ChainStore::new(key.clone()));
        chain.add_trust_key(kp.verifying_key().clone());
        chain
    }

    fn wait_for(bridge: &Arc<dyn PartitionBridge>) -> LoadState {
        let mut rx = bridge.load_state();
        for _ in 0..500 {
            let state = rx.borrow_and_update().clone();
            if state != LoadState::Loading {
                return state;
            }
            thread::sleep(Duration::from_millis(2));
        }
        LoadState::Loading
    }

    fn record(obj: &DataObject, kp: &KeyPair) -> SignedRecord {
        RecordDraft::for_object(obj, vec![]).unwrap().sign(kp).unwrap()
    }

    #[test]
    fn log_survives_reopen() {
        let dir = tempfile::tempdir().unwrap();
        let key = PartitionKey::new("accounts", 3);
        let kp = KeyPair::generate();
        let obj = DataObject::root("Account", json!({"name": "alice"}));

        let builder = LogBridgeBuilder::new(dir.path(), SyncMode::OsDefault);
        let bridge = builder.create_for_key(&key, chain_for(&key, &kp)).unwrap();
        assert_eq!(wait_for(&bridge), LoadState::Loaded);
        bridge.write(record(&obj, &kp)).unwrap();
        builder.remove_for_key(&key);
        assert_eq!(builder.open_logs(), 0);
        assert!(dir.path().join("accounts-3.wal").exists());

        let chain = chain_for(&key, &kp);
        let reopened = builder.create_for_key(&key, Arc::clone(&chain)).unwrap();
        assert_eq!(wait_for(&reopened), LoadState::Loaded);
        assert!(chain.exists(&obj.id));
    }

    #[test]
    fn untrusted_write_never_reaches_log() {
        let dir = tempfile::tempdir().unwrap();
        let key = PartitionKey::new("accounts", 0);
        let builder = LogBridgeBuilder::new(dir.path(), SyncMode::OsDefault);
        let bridge = builder
            .create_for_key(&key, chain_for(&key, &KeyPair::generate()))
            .unwrap();
        wait_for(&bridge);

        let obj = DataObject::root("Account", json!({}));
        let err = bridge.write(record(&obj, &KeyPair::generate())).unwrap_err();
        assert!(matches!(err, BridgeError::Rejected(_)));

        let log = PartitionLog::open(&builder.log_path(&key.topic_and_partition()), SyncMode::OsDefault).unwrap();
        assert!(log.recover().unwrap().is_empty());
    }

    #[test]
    fn replay_of_untrusted_history_fails() {
        let dir = tempfile::tempdir().unwrap();
        let key = PartitionKey::new("accounts", 1);
        let builder = LogBridgeBuilder::new(dir.path(), SyncMode::OsDefault);

        let stranger = KeyPair::generate();
        let obj = DataObject::root("Account", json!({}));
        let log = PartitionLog::open(&builder.log_path(&key.topic_and_partition()), SyncMode::OsDefault).unwrap();
        log.append(&ChainEvent::Data(record(&obj, &stranger)).encode().unwrap())
            .unwrap();
        drop(log);

        let bridge = builder
            .create_for_key(&key, chain_for(&key, &KeyPair::generate()))
            .unwrap();
        assert!(matches!(wait_for(&bridge), LoadState::Failed(_)));
        assert!(!bridge.has_loaded());

        let err = bridge.write(record(&obj, &stranger)).unwrap_err();
        assert!(matches!(err, BridgeError::NotLoaded(_)));
    }

    #[test]
    fn delete_many_purges_records_from_log() {
        let dir = tempfile::tempdir().unwrap();
        let key = PartitionKey::new("accounts", 2);
        let kp = KeyPair::generate();
        let builder = LogBridgeBuilder::new(dir.path(), SyncMode::OsDefault);
        let chain = chain_for(&key, &kp);
        let bridge = builder.create_for_key(&key, Arc::clone(&chain)).unwrap();
        wait_for(&bridge);

        let gone = DataObject::root("Account", json!({"n": 1}));
        let kept = DataObject::root("Account", json!({"n": 2}));
        bridge.write(record(&gone, &kp)).unwrap();
        bridge.write(record(&kept, &kp)).unwrap();
        bridge.delete_many(&[gone.record_key()]).unwrap();
        assert!(!chain.exists(&gone.id));

        let log = PartitionLog::open(&builder.log_path(&key.topic_and_partition()), SyncMode::OsDefault).unwrap();
        let events: Vec<ChainEvent> = log
            .recover()
            .unwrap()
            .iter()
            .map(|p| ChainEvent::decode(p).unwrap())
            .collect();
        assert_eq!(events.len(), 1);
        assert_eq!(events[0].key(), kept.record_key());
    }

    #[test]
    fn from_config_uses_log_dir() {
        let config = BridgeConfig {
            mode: BridgeMode::Log,
            log_dir: PathBuf::from("/var/lib/strata"),
            sync_every_write: true,
        };
        let builder = LogBridgeBuilder::from_config(&config);
        assert_eq!(builder.mode(), BridgeMode::Log);
        assert_eq!(
            builder.log_path(&TopicAndPartition::new("orders", 7)),
            PathBuf::from("/var/lib/strata/orders-7.wal")
        );
    }
}
