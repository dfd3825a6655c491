//! Bounded, time-expiring concurrent cache.

use std::hash::Hash;
use std::sync::Arc;
use std::time::Duration;

use chrono::{DateTime, Utc};
use dashmap::DashMap;
use strata_types::Clock;

/// When an entry's TTL is measured from.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub enum ExpiryPolicy {
    /// Every read refreshes the entry.
    #[default]
    AfterAccess,
    /// Only inserts refresh the entry.
    AfterWrite,
}

#[derive(Debug)]
struct Slot<V> {
    value: V,
    touched: DateTime<Utc>,
}

/// Concurrent map with a size bound and per-entry TTL.
///
/// Expired entries are dropped lazily on lookup and in bulk by
/// [`TtlCache::evict_expired`]. When full, the least recently touched entry
/// is evicted. Every method that drops entries returns them so the caller
/// can run removal callbacks.
pub struct TtlCache<K, V> {
    entries: DashMap<K, Slot<V>>,
    ttl: chrono::Duration,
    max_entries: usize,
    policy: ExpiryPolicy,
    clock: Arc<dyn Clock>,
}

impl<K, V> TtlCache<K, V>
where
    K: Eq + Hash + Clone,
    V: Clone,
{
    pub fn new(max_entries: usize, ttl: Duration, policy: ExpiryPolicy, clock: Arc<dyn Clock>) -> Self {
        Self {
            entries: DashMap::new(),
            ttl: chrono::Duration::from_std(ttl).unwrap_or(chrono::Duration::MAX),
            max_entries: max_entries.max(1),
            policy,
            clock,
        }
    }

    fn expired(&self, touched: DateTime<Utc>, now: DateTime<Utc>) -> bool {
        now.signed_duration_since(touched) >= self.ttl
    }

    /// Look up a live entry, refreshing it under [`ExpiryPolicy::AfterAccess`].
    pub fn get(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        {
            let mut slot = self.entries.get_mut(key)?;
            if !self.expired(slot.touched, now) {
                if self.policy == ExpiryPolicy::AfterAccess {
                    slot.touched = now;
                }
                return Some(slot.value.clone());
            }
        }
        self.entries.remove_if(key, |_, slot| self.expired(slot.touched, now));
        None
    }

    /// Look up a live entry without refreshing it.
    pub fn peek(&self, key: &K) -> Option<V> {
        let now = self.clock.now();
        self.entries
            .get(key)
            .filter(|slot| !self.expired(slot.touched, now))
            .map(|slot| slot.value.clone())
    }

    pub fn contains_key(&self, key: &K) -> bool {
        self.peek(key).is_some()
    }

    /// Insert or replace an entry. Returns the entries evicted to make room.
    pub fn insert(&self, key: K, value: V) -> Vec<(K, V)> {
        let evicted = if self.entries.contains_key(&key) {
            Vec::new()
        } else {
            self.make_room()
        };
        let touched = self.clock.now();
        self.entries.insert(key, Slot { value, touched });
        evicted
    }

    /// Evict until one more entry fits: expired entries first, then the
    /// least recently touched.
    pub fn make_room(&self) -> Vec<(K, V)> {
        let mut evicted = Vec::new();
        if self.entries.len() >= self.max_entries {
            evicted = self.evict_expired();
        }
        while self.entries.len() >= self.max_entries {
            let oldest = self
                .entries
                .iter()
                .min_by_key(|e| e.value().touched)
                .map(|e| e.key().clone());
            match oldest.and_then(|k| self.entries.remove(&k)) {
                Some((k, slot)) => evicted.push((k, slot.value)),
                None => break,
            }
        }
        evicted
    }

    /// Drop every expired entry.
    pub fn evict_expired(&self) -> Vec<(K, V)> {
        self.evict_expired_unless(|_, _| false)
    }

    /// Drop every expired entry except those `keep` accepts, which are
    /// refreshed instead.
    pub fn evict_expired_unless(&self, keep: impl Fn(&K, &V) -> bool) -> Vec<(K, V)> {
        let now = self.clock.now();
        let stale: Vec<(K, V)> = self
            .entries
            .iter()
            .filter(|e| self.expired(e.value().touched, now))
            .map(|e| (e.key().clone(), e.value().value.clone()))
            .collect();

        let mut evicted = Vec::new();
        for (key, value) in stale {
            if keep(&key, &value) {
                if let Some(mut slot) = self.entries.get_mut(&key) {
                    slot.touched = now;
                }
            } else if let Some((key, slot)) = self
                .entries
                .remove_if(&key, |_, slot| self.expired(slot.touched, now))
            {
                evicted.push((key, slot.value));
            }
        }
        evicted
    }

    pub fn remove(&self, key: &K) -> Option<V> {
        self.entries.remove(key).map(|(_, slot)| slot.value)
    }

    /// Remove the entry only if `predicate` holds for its value.
    pub fn remove_if(&self, key: &K, predicate: impl FnOnce(&V) -> bool) -> Option<V> {
        self.entries
            .remove_if(key, |_, slot| predicate(&slot.value))
            .map(|(_, slot)| slot.value)
    }

    /// Remove and return every entry.
    pub fn drain(&self) -> Vec<(K, V)> {
        let keys: Vec<K> = self.entries.iter().map(|e| e.key().clone()).collect();
        keys.into_iter()
            .filter_map(|k| self.entries.remove(&k))
            .map(|(k, slot)| (k, slot.value))
            .collect()
    }

    /// Every live value, without refreshing.
    pub fn values(&self) -> Vec<V> {
        let now = self.clock.now();
        self.entries
            .iter()
            .filter(|e| !self.expired(e.value().touched, now))
            .map(|e| e.value().value.clone())
            .collect()
    }

    pub fn keys(&self) -> Vec<K> {
        self.entries.iter().map(|e| e.key().clone()).collect()
    }

    pub fn len(&self) -> usize {
        self.entries.len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.is_empty()
    }

    pub fn max_entries(&self) -> usize {
        self.max_entries
    }
}

impl<K: Eq + Hash, V> std::fmt::Debug for TtlCache<K, V> {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("TtlCache")
            .field("len", &self.entries.len())
            .field("max_entries", &self.max_entries)
            .field("ttl", &self.ttl)
            .field("policy", &self.policy)
            .finish()
    }
}
