use std::collections::HashMap;
use std::sync::{Arc, RwLock};

use strata_crypto::{HashChainVerifier, PublicKeyHash, VerifyingKey};
use strata_types::PartitionKey;
use tracing::{debug, warn};
use uuid::Uuid;

use crate::container::DataContainer;
use crate::error::{ChainStoreError, ChainStoreResult};
use crate::record::{ChainEntry, ChainEvent, SignedRecord, Version};

/// Callback invoked with an object id whenever an append leaves that
/// object with more than one head.
pub type MergeHook = Arc<dyn Fn(Uuid) + Send + Sync>;

/// What an append did.
#[derive(Clone, Copy, Debug, PartialEq, Eq)]
pub enum AppendOutcome {
    /// A new version was stored. `conflict` is set when the object now
    /// requires a merge.
    Applied { conflict: bool },
    /// The version was already known; nothing changed.
    Duplicate,
    /// A tombstone was applied. `existed` is set when records were removed.
    Removed { existed: bool },
}

/// Chain-of-trust log for one partition.
///
/// Holds the partition's trust keys, its hash-linked history of events, and
/// the current [`DataContainer`] of every live object.
pub struct ChainStore {
    key: PartitionKey,
    inner: RwLock<ChainState>,
    merge_hook: RwLock<Option<MergeHook>>,
}

#[derive(Default)]
struct ChainState {
    trust: HashMap<PublicKeyHash, VerifyingKey>,
    history: Vec<ChainEntry>,
    containers: HashMap<Uuid, DataContainer>,
    keys: HashMap<String, Uuid>,
}

impl ChainStore {
    pub fn new(key: PartitionKey) -> Self {
        Self {
            key,
            inner: RwLock::new(ChainState::default()),
            merge_hook: RwLock::new(None),
        }
    }

    pub fn partition_key(&self) -> &PartitionKey {
        &self.key
    }

    /// Trust `key` to author records in this partition.
    pub fn add_trust_key(&self, key: VerifyingKey) {
        let hash = key.public_hash();
        let mut state = self.inner.write().expect("chain lock poisoned");
        if state.trust.insert(hash, key).is_none() {
            debug!(partition = %self.key, key = %hash.short_hex(), "trust key added");
        }
    }

    pub fn is_trusted(&self, hash: &PublicKeyHash) -> bool {
        self.inner
            .read()
            .expect("chain lock poisoned")
            .trust
            .contains_key(hash)
    }

    pub fn trust_keys(&self) -> Vec<PublicKeyHash> {
        let state = self.inner.read().expect("chain lock poisoned");
        let mut keys: Vec<_> = state.trust.keys().copied().collect();
        keys.sort();
        keys
    }

    pub fn set_merge_hook(&self, hook: MergeHook) {
        *self.merge_hook.write().expect("hook lock poisoned") = Some(hook);
    }

    /// Check that `record` would be accepted, without appending it.
    pub fn validate(&self, record: &SignedRecord) -> ChainStoreResult<()> {
        let state = self.inner.read().expect("chain lock poisoned");
        Self::check_record(&state, record)
    }

    /// Validate and append one event to the history.
    pub fn append(&self, event: ChainEvent) -> ChainStoreResult<AppendOutcome> {
        let (outcome, conflicted_id) = {
            let mut state = self.inner.write().expect("chain lock poisoned");
            match event {
                ChainEvent::Data(record) => {
                    Self::check_record(&state, &record)?;
                    let known = state
                        .containers
                        .get(&record.id)
                        .is_some_and(|c| c.versions().iter().any(|v| v.version == record.version));
                    if known {
                        return Ok(AppendOutcome::Duplicate);
                    }
                    let id = record.id;
                    Self::push_entry(&mut state, ChainEvent::Data(record.clone()))?;
                    state.keys.insert(record.key.clone(), id);
                    let conflict = match state.containers.get_mut(&id) {
                        Some(container) => {
                            container.push(record);
                            container.requires_merge()
                        }
                        None => {
                            state.containers.insert(id, DataContainer::new(record));
                            false
                        }
                    };
                    (AppendOutcome::Applied { conflict }, conflict.then_some(id))
                }
                ChainEvent::Tombstone { key } => {
                    Self::push_entry(&mut state, ChainEvent::Tombstone { key: key.clone() })?;
                    let existed = match state.keys.remove(&key) {
                        Some(id) => state.containers.remove(&id).is_some(),
                        None => false,
                    };
                    (AppendOutcome::Removed { existed }, None)
                }
            }
        };

        if let Some(id) = conflicted_id {
            debug!(partition = %self.key, %id, "append left object with multiple heads");
            let hook = self.merge_hook.read().expect("hook lock poisoned").clone();
            if let Some(hook) = hook {
                hook(id);
            }
        }

        Ok(outcome)
    }

    /// Apply a batch of events.
    ///
    /// With `throw_on_error` the first failure aborts the batch and is
    /// returned. Otherwise failures are logged and skipped. Returns the
    /// number of events that changed the store.
    pub fn feed(
        &self,
        events: impl IntoIterator<Item = ChainEvent>,
        throw_on_error: bool,
    ) -> ChainStoreResult<usize> {
        let mut applied = 0;
        for event in events {
            match self.append(event) {
                Ok(AppendOutcome::Duplicate) => {}
                Ok(_) => applied += 1,
                Err(e) if throw_on_error => return Err(e),
                Err(e) => {
                    warn!(partition = %self.key, error = %e, "skipping invalid event");
                }
            }
        }
        Ok(applied)
    }

    pub fn get_data(&self, id: &Uuid) -> Option<DataContainer> {
        self.inner
            .read()
            .expect("chain lock poisoned")
            .containers
            .get(id)
            .cloned()
    }

    pub fn exists(&self, id: &Uuid) -> bool {
        self.inner
            .read()
            .expect("chain lock poisoned")
            .containers
            .contains_key(id)
    }

    /// Whether the record stored under `key` is live.
    pub fn contains_key(&self, key: &str) -> bool {
        self.inner
            .read()
            .expect("chain lock poisoned")
            .keys
            .contains_key(key)
    }

    pub fn requires_merge(&self, id: &Uuid) -> bool {
        self.inner
            .read()
            .expect("chain lock poisoned")
            .containers
            .get(id)
            .is_some_and(DataContainer::requires_merge)
    }

    pub fn ids_requiring_merge(&self) -> Vec<Uuid> {
        let state = self.inner.read().expect("chain lock poisoned");
        let mut ids: Vec<Uuid> = state
            .containers
            .values()
            .filter(|c| c.requires_merge())
            .map(DataContainer::id)
            .collect();
        ids.sort();
        ids
    }

    /// Current head versions of an object (empty if unknown).
    pub fn head_versions(&self, id: &Uuid) -> Vec<Version> {
        self.get_data(id)
            .map(|c| c.head_versions())
            .unwrap_or_default()
    }

    /// Number of live objects.
    pub fn len(&self) -> usize {
        self.inner.read().expect("chain lock poisoned").containers.len()
    }

    pub fn is_empty(&self) -> bool {
        self.len() == 0
    }

    pub fn history_len(&self) -> u64 {
        self.inner.read().expect("chain lock poisoned").history.len() as u64
    }

    pub fn history(&self) -> Vec<ChainEntry> {
        self.inner.read().expect("chain lock poisoned").history.clone()
    }

    /// Verify the hash links of the whole history.
    pub fn verify_history(&self) -> ChainStoreResult<()> {
        let state = self.inner.read().expect("chain lock poisoned");
        HashChainVerifier::verify_chain(&state.history)?;
        Ok(())
    }

    fn check_record(state: &ChainState, record: &SignedRecord) -> ChainStoreResult<()> {
        let key = state
            .trust
            .get(&record.author)
            .ok_or(ChainStoreError::UntrustedAuthor {
                id: record.id,
                author: record.author,
            })?;
        record.verify(key)
    }

    fn push_entry(state: &mut ChainState, event: ChainEvent) -> ChainStoreResult<()> {
        let seq = state.history.len() as u64 + 1;
        let prev_hash = state.history.last().map(|e| e.entry_hash);
        let entry = ChainEntry::link(seq, prev_hash, event)?;
        state.history.push(entry);
        Ok(())
    }
}

impl std::fmt::Debug for ChainStore {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("ChainStore")
            .field("partition", &self.key.to_string())
            .field("objects", &self.len())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::record::RecordDraft;
    use serde_json::json;
    use std::sync::Mutex;
    use strata_crypto::KeyPair;
    use strata_types::DataObject;

    fn store_with(kp: &KeyPair) -> ChainStore {
        let store = ChainStore::new(PartitionKey::new("accounts", 0));
        store.add_trust_key(kp.verifying_key().clone());
        store
    }

    fn record(obj: &DataObject, prev: Vec<Version>, kp: &KeyPair) -> SignedRecord {
        RecordDraft::for_object(obj, prev).unwrap().sign(kp).unwrap()
    }

    #[test]
    fn append_trusted_record() {
        let kp = KeyPair::generate();
        let store = store_with(&kp);
        let obj = DataObject::root("Account", json!({"name": "alice"}));

        let outcome = store.append(ChainEvent::Data(record(&obj, vec![], &kp))).unwrap();
        assert_eq!(outcome, AppendOutcome::Applied { conflict: false });
        assert!(store.exists(&obj.id));
        assert!(store.contains_key(&obj.record_key()));
        assert_eq!(store.len(), 1);
        assert_eq!(store.history_len(), 1);
    }

    #[test]
    fn untrusted_author_rejected() {
        let store = store_with(&KeyPair::generate());
        let stranger = KeyPair::generate();
        let obj = DataObject::root("Account", json!({}));

        let err = store
            .append(ChainEvent::Data(record(&obj, vec![], &stranger)))
            .unwrap_err();
        assert!(matches!(err, ChainStoreError::UntrustedAuthor { .. }));
        assert!(!store.exists(&obj.id));
        assert_eq!(store.history_len(), 0);
    }

    #[test]
    fn duplicate_append_is_noop() {
        let kp = KeyPair::generate();
        let store = store_with(&kp);
        let obj = DataObject::root("Account", json!({}));
        let rec = record(&obj, vec![], &kp);

        store.append(ChainEvent::Data(rec.clone())).unwrap();
        assert_eq!(store.append(ChainEvent::Data(rec)).unwrap(), AppendOutcome::Duplicate);
        assert_eq!(store.history_len(), 1);
    }

    #[test]
    fn tombstone_removes_object() {
        let kp = KeyPair::generate();
        let store = store_with(&kp);
        let obj = DataObject::root("Account", json!({}));
        store.append(ChainEvent::Data(record(&obj, vec![], &kp))).unwrap();

        let outcome = store
            .append(ChainEvent::Tombstone { key: obj.record_key() })
            .unwrap();
        assert_eq!(outcome, AppendOutcome::Removed { existed: true });
        assert!(!store.exists(&obj.id));

        let again = store
            .append(ChainEvent::Tombstone { key: obj.record_key() })
            .unwrap();
        assert_eq!(again, AppendOutcome::Removed { existed: false });
        assert!(store.verify_history().is_ok());
    }

    #[test]
    fn conflict_fires_merge_hook() {
        let kp = KeyPair::generate();
        let store = store_with(&kp);
        let seen = Arc::new(Mutex::new(Vec::new()));
        let sink = Arc::clone(&seen);
        store.set_merge_hook(Arc::new(move |id| sink.lock().unwrap().push(id)));

        let mut obj = DataObject::root("Account", json!({"n": 0}));
        let base = record(&obj, vec![], &kp);
        store.append(ChainEvent::Data(base.clone())).unwrap();

        obj.payload = json!({"n": "left"});
        store
            .append(ChainEvent::Data(record(&obj, vec![base.version], &kp)))
            .unwrap();
        obj.payload = json!({"n": "right"});
        let outcome = store
            .append(ChainEvent::Data(record(&obj, vec![base.version], &kp)))
            .unwrap();

        assert_eq!(outcome, AppendOutcome::Applied { conflict: true });
        assert!(store.requires_merge(&obj.id));
        assert_eq!(store.ids_requiring_merge(), vec![obj.id]);
        assert_eq!(*seen.lock().unwrap(), vec![obj.id]);
    }

    #[test]
    fn feed_skips_bad_events_unless_asked_to_throw() {
        let kp = KeyPair::generate();
        let store = store_with(&kp);
        let good = DataObject::root("Account", json!({}));
        let bad = DataObject::root("Account", json!({}));
        let events = vec![
            ChainEvent::Data(record(&bad, vec![], &KeyPair::generate())),
            ChainEvent::Data(record(&good, vec![], &kp)),
        ];

        assert!(store.feed(events.clone(), true).is_err());
        assert!(!store.exists(&good.id));

        assert_eq!(store.feed(events, false).unwrap(), 1);
        assert!(store.exists(&good.id));
        assert!(!store.exists(&bad.id));
    }
}
