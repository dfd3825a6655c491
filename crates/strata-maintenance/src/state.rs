use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use strata_crypto::{KeyPair, PublicKeyHash, Rights};
use strata_partition::{ExpiryPolicy, TtlCache};
use strata_types::{Clock, PartitionKey, TopicAndPartition};
use tracing::debug;
use uuid::Uuid;

/// Pending maintenance for one partition, and the principal that performs
/// it.
///
/// Scheduling is insert-if-absent: scheduling an already pending key keeps
/// the earlier expiry. Cancelling removes the entry whatever its expiry.
/// Keys lent to the state expire on their own, independently of the
/// pending work.
pub struct MaintenanceState {
    id: Uuid,
    key: PartitionKey,
    window: chrono::Duration,
    tombstones: DashMap<String, DateTime<Utc>>,
    merges: DashMap<Uuid, DateTime<Utc>>,
    borrowed_read: TtlCache<PublicKeyHash, KeyPair>,
    borrowed_write: TtlCache<PublicKeyHash, KeyPair>,
    clock: Arc<dyn Clock>,
}

impl MaintenanceState {
    pub fn new(key: PartitionKey, window: Duration, rights_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        let borrowed = || TtlCache::new(usize::MAX, rights_ttl, ExpiryPolicy::AfterWrite, Arc::clone(&clock));
        Self {
            id: Uuid::new_v4(),
            borrowed_read: borrowed(),
            borrowed_write: borrowed(),
            key,
            window: chrono::Duration::from_std(window).unwrap_or(chrono::Duration::MAX),
            tombstones: DashMap::new(),
            merges: DashMap::new(),
            clock,
        }
    }

    pub fn key(&self) -> &PartitionKey {
        &self.key
    }

    fn expiry(&self) -> DateTime<Utc> {
        let now = self.clock.now();
        now.checked_add_signed(self.window).unwrap_or(now)
    }

    /// Schedule physical deletion of `record_key`.
    pub fn tombstone(&self, record_key: &str) {
        let expiry = self.expiry();
        self.tombstones.entry(record_key.to_string()).or_insert(expiry);
    }

    /// Cancel a pending deletion. Returns `true` if one was pending.
    pub fn cancel_tombstone(&self, record_key: &str) -> bool {
        self.tombstones.remove(record_key).is_some()
    }

    /// Schedule a merge of object `id`.
    pub fn schedule_merge(&self, id: Uuid) {
        let expiry = self.expiry();
        self.merges.entry(id).or_insert(expiry);
    }

    /// Cancel a pending merge. Returns `true` if one was pending.
    pub fn cancel_merge(&self, id: &Uuid) -> bool {
        self.merges.remove(id).is_some()
    }

    /// Take custody of `rights`' keys until they expire.
    pub fn lend_rights(&self, rights: &dyn Rights) {
        for key in rights.rights_read() {
            self.borrowed_read.insert(key.public_hash(), key);
        }
        for key in rights.rights_write() {
            self.borrowed_write.insert(key.public_hash(), key);
        }
        debug!(partition = %self.key, from = %rights.rights_alias(), "rights lent to maintenance");
    }

    /// Remove and return the tombstones whose expiry has passed.
    pub fn poll_tombstones(&self) -> Vec<String> {
        poll(&self.tombstones, self.clock.now())
    }

    /// Remove and return the merges whose expiry has passed.
    pub fn poll_merges(&self) -> Vec<Uuid> {
        poll(&self.merges, self.clock.now())
    }

    /// Move every pending expiry to `at`.
    pub fn force_expiry(&self, at: DateTime<Utc>) {
        self.tombstones.iter_mut().for_each(|mut e| *e.value_mut() = at);
        self.merges.iter_mut().for_each(|mut e| *e.value_mut() = at);
    }

    pub fn tombstone_expiry(&self, record_key: &str) -> Option<DateTime<Utc>> {
        self.tombstones.get(record_key).map(|e| *e)
    }

    pub fn merge_expiry(&self, id: &Uuid) -> Option<DateTime<Utc>> {
        self.merges.get(id).map(|e| *e)
    }

    pub fn pending_tombstones(&self) -> usize {
        self.tombstones.len()
    }

    pub fn pending_merges(&self) -> usize {
        self.merges.len()
    }
}

/// Snapshot the expired entries, then remove each one that is still
/// expired. Entries rescheduled in between are left for the next pass.
fn poll<K>(map: &DashMap<K, DateTime<Utc>>, now: DateTime<Utc>) -> Vec<K>
where
    K: Eq + std::hash::Hash + Clone,
{
    let expired: Vec<K> = map
        .iter()
        .filter(|e| now > *e.value())
        .map(|e| e.key().clone())
        .collect();
    expired
        .into_iter()
        .filter_map(|k| map.remove_if(&k, |_, expiry| now > *expiry))
        .map(|(k, _)| k)
        .collect()
}

impl Rights for MaintenanceState {
    fn rights_id(&self) -> Uuid {
        self.id
    }

    fn rights_read(&self) -> Vec<KeyPair> {
        self.borrowed_read.values()
    }

    fn rights_write(&self) -> Vec<KeyPair> {
        self.borrowed_write.values()
    }

    fn rights_alias(&self) -> String {
        format!("maintenance:{}", self.key)
    }

    fn partition_key(&self) -> Option<PartitionKey> {
        Some(self.key.clone())
    }
}

impl std::fmt::Debug for MaintenanceState {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceState")
            .field("key", &self.key.to_string())
            .field("tombstones", &self.tombstones.len())
            .field("merges", &self.merges.len())
            .finish()
    }
}

/// Maintenance states of every partition, created on first use.
pub struct StateTable {
    states: DashMap<TopicAndPartition, Arc<MaintenanceState>>,
    window: Duration,
    rights_ttl: Duration,
    clock: Arc<dyn Clock>,
}

impl StateTable {
    pub fn new(window: Duration, rights_ttl: Duration, clock: Arc<dyn Clock>) -> Self {
        Self {
            states: DashMap::new(),
            window,
            rights_ttl,
            clock,
        }
    }

    pub fn get_or_create(&self, key: &PartitionKey) -> Arc<MaintenanceState> {
        self.states
            .entry(key.topic_and_partition())
            .or_insert_with(|| {
                Arc::new(MaintenanceState::new(
                    key.clone(),
                    self.window,
                    self.rights_ttl,
                    Arc::clone(&self.clock),
                ))
            })
            .clone()
    }

    pub fn get(&self, tp: &TopicAndPartition) -> Option<Arc<MaintenanceState>> {
        self.states.get(tp).map(|s| Arc::clone(&s))
    }

    pub fn remove(&self, tp: &TopicAndPartition) -> Option<Arc<MaintenanceState>> {
        self.states.remove(tp).map(|(_, s)| s)
    }

    pub fn all(&self) -> Vec<Arc<MaintenanceState>> {
        self.states.iter().map(|e| Arc::clone(e.value())).collect()
    }

    pub fn len(&self) -> usize {
        self.states.len()
    }

    pub fn is_empty(&self) -> bool {
        self.states.is_empty()
    }
}

impl std::fmt::Debug for StateTable {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("StateTable")
            .field("states", &self.states.len())
            .field("window", &self.window)
            .finish()
    }
}
