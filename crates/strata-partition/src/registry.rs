use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, RwLock, Weak};

use dashmap::DashMap;
use strata_bridge::{BridgeBuilder, BridgeMode, ReadModel};
use strata_chain::{ChainEvent, ChainStore};
use strata_types::{Clock, PartitionKey, TopicAndPartition};
use tokio::sync::{broadcast, OnceCell};
use tracing::{debug, info, warn};

use crate::cache::{ExpiryPolicy, TtlCache};
use crate::config::RegistryConfig;
use crate::discovery::KeyDiscovery;
use crate::error::{RegistryError, RegistryResult};
use crate::event::{PartitionListener, RegistryEvent, RemovalCause};
use crate::partition::Partition;

type InFlight = Arc<OnceCell<Arc<Partition>>>;

/// Size- and time-bounded cache of live partitions.
///
/// `get_or_create` is single-flight per key: concurrent callers for a key
/// that is not cached share one in-flight construction, so exactly one
/// bridge is built. A finished partition is inserted into the cache before
/// its in-flight marker is cleared, and construction re-checks the cache,
/// so a late caller always finds one or the other. An in-flight marker that
/// is already initialised while the cache misses belongs to a partition
/// evicted in between and is replaced.
pub struct PartitionRegistry {
    config: RegistryConfig,
    builder: Arc<dyn BridgeBuilder>,
    read_model: Option<Arc<dyn ReadModel>>,
    discovery: Arc<dyn KeyDiscovery>,
    partitions: TtlCache<TopicAndPartition, Arc<Partition>>,
    in_flight: DashMap<TopicAndPartition, InFlight>,
    listeners: RwLock<Vec<Weak<dyn PartitionListener>>>,
    events: broadcast::Sender<RegistryEvent>,
    created: AtomicU64,
}

impl PartitionRegistry {
    pub fn new(
        config: RegistryConfig,
        builder: Arc<dyn BridgeBuilder>,
        discovery: Arc<dyn KeyDiscovery>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let partitions = TtlCache::new(
            config.max_partitions,
            config.idle_timeout(),
            ExpiryPolicy::AfterAccess,
            clock,
        );
        let (events, _) = broadcast::channel(config.event_capacity.max(1));
        Self {
            config,
            builder,
            read_model: None,
            discovery,
            partitions,
            in_flight: DashMap::new(),
            listeners: RwLock::new(Vec::new()),
            events,
            created: AtomicU64::new(0),
        }
    }

    /// Pre-load newly created partitions from `read_model`.
    pub fn with_read_model(mut self, read_model: Arc<dyn ReadModel>) -> Self {
        self.read_model = Some(read_model);
        self
    }

    pub fn config(&self) -> &RegistryConfig {
        &self.config
    }

    pub fn mode(&self) -> BridgeMode {
        self.builder.mode()
    }

    /// Register a lifecycle listener. Dropped listeners are pruned lazily.
    pub fn add_listener(&self, listener: Weak<dyn PartitionListener>) {
        self.listeners
            .write()
            .expect("listener lock poisoned")
            .push(listener);
    }

    /// Subscribe to registry events.
    pub fn subscribe(&self) -> broadcast::Receiver<RegistryEvent> {
        self.events.subscribe()
    }

    /// Return the live partition for `key`, creating it if needed.
    ///
    /// With `should_wait` the call returns only once history replay has
    /// completed. A partition whose replay fails or times out is evicted
    /// and the error returned.
    pub async fn get_or_create(&self, key: &PartitionKey, should_wait: bool) -> RegistryResult<Arc<Partition>> {
        self.evict_expired();
        let tp = key.topic_and_partition();

        let partition = match self.partitions.get(&tp) {
            Some(partition) => partition,
            None => {
                let cell = {
                    let mut cell = self
                        .in_flight
                        .entry(tp.clone())
                        .or_insert_with(|| Arc::new(OnceCell::new()));
                    if cell.initialized() {
                        debug!(partition = %key, "discarding in-flight marker of an evicted partition");
                        *cell = Arc::new(OnceCell::new());
                    }
                    cell.clone()
                };
                let result = cell.get_or_try_init(|| self.materialize(key)).await.cloned();
                self.in_flight.remove_if(&tp, |_, c| Arc::ptr_eq(c, &cell));
                result?
            }
        };

        if should_wait {
            self.await_loaded(&partition).await?;
        }
        Ok(partition)
    }

    /// Return the live partition for `key` without creating it.
    pub async fn get(&self, key: &PartitionKey, should_wait: bool) -> RegistryResult<Option<Arc<Partition>>> {
        self.evict_expired();
        let Some(partition) = self.partitions.get(&key.topic_and_partition()) else {
            return Ok(None);
        };
        if should_wait {
            self.await_loaded(&partition).await?;
        }
        Ok(Some(partition))
    }

    /// Look up a live partition without refreshing its idle timer.
    pub fn peek(&self, key: &PartitionKey) -> Option<Arc<Partition>> {
        self.partitions.peek(&key.topic_and_partition())
    }

    /// Feed events into a live partition. Partitions that are not cached
    /// are left alone; returns the number of events applied.
    pub fn feed(&self, key: &PartitionKey, events: Vec<ChainEvent>, throw_on_error: bool) -> RegistryResult<usize> {
        match self.peek(key) {
            Some(partition) => partition.feed(events, throw_on_error),
            None => {
                debug!(partition = %key, dropped = events.len(), "feed for partition not cached");
                Ok(0)
            }
        }
    }

    /// Keys of every live partition.
    pub fn partition_keys(&self) -> Vec<PartitionKey> {
        self.partitions
            .keys()
            .into_iter()
            .filter_map(|tp| self.partitions.peek(&tp))
            .map(|p| p.key().clone())
            .collect()
    }

    pub fn len(&self) -> usize {
        self.partitions.len()
    }

    pub fn is_empty(&self) -> bool {
        self.partitions.is_empty()
    }

    /// Number of partitions constructed since startup.
    pub fn created_count(&self) -> u64 {
        self.created.load(Ordering::Relaxed)
    }

    /// Evict partitions idle past the configured timeout. Partitions a
    /// listener still holds are refreshed instead.
    pub fn evict_expired(&self) -> usize {
        let listeners = self.live_listeners();
        let expired = self
            .partitions
            .evict_expired_unless(|_, p| listeners.iter().any(|l| l.holds(p.key())));
        let count = expired.len();
        for (_, partition) in expired {
            self.on_removed(&partition, RemovalCause::Expired);
        }
        count
    }

    /// Evict a single partition.
    pub fn remove(&self, key: &PartitionKey) -> bool {
        match self.partitions.remove(&key.topic_and_partition()) {
            Some(partition) => {
                self.on_removed(&partition, RemovalCause::Explicit);
                true
            }
            None => false,
        }
    }

    /// Evict every partition.
    pub fn destroy_all(&self) {
        let drained = self.partitions.drain();
        info!(count = drained.len(), "destroying all partitions");
        for (_, partition) in drained {
            self.on_removed(&partition, RemovalCause::Explicit);
        }
    }

    async fn await_loaded(&self, partition: &Arc<Partition>) -> RegistryResult<()> {
        match partition.wait_till_loaded(self.config.load_timeout()).await {
            Ok(()) => Ok(()),
            Err(e) => {
                warn!(partition = %partition.key(), error = %e, "partition not usable; evicting");
                let evicted = self
                    .partitions
                    .remove_if(&partition.key().topic_and_partition(), |p| Arc::ptr_eq(p, partition));
                if let Some(evicted) = evicted {
                    self.on_removed(&evicted, RemovalCause::Failed);
                }
                Err(e)
            }
        }
    }

    async fn materialize(&self, key: &PartitionKey) -> RegistryResult<Arc<Partition>> {
        let tp = key.topic_and_partition();
        if let Some(partition) = self.partitions.get(&tp) {
            return Ok(partition);
        }

        for (_, evicted) in self.partitions.make_room() {
            self.on_removed(&evicted, RemovalCause::Size);
        }

        info!(partition = %key, mode = ?self.builder.mode(), "loading partition");
        self.emit(RegistryEvent::Loading {
            partition: key.clone(),
        });

        let chain = Arc::new(ChainStore::new(key.clone()));
        let trust = self.discovery.discover(key).await?;
        for verifying_key in trust {
            chain.add_trust_key(verifying_key);
        }
        self.for_each_listener(|l| l.partition_created(key, &chain));

        let bridge = match self.builder.create_for_key(key, Arc::clone(&chain)) {
            Ok(bridge) => bridge,
            Err(e) => {
                warn!(partition = %key, error = %e, "bridge creation failed");
                self.for_each_listener(|l| l.partition_removed(key));
                return Err(RegistryError::Bridge(e));
            }
        };

        if let Some(read_model) = &self.read_model {
            let history = read_model.read(&tp);
            if !history.is_empty() {
                let applied = chain.feed(history, false)?;
                debug!(partition = %key, applied, "preloaded from read-model");
            }
        }

        let partition = Arc::new(Partition::new(key.clone(), chain, bridge));
        for (_, evicted) in self.partitions.insert(tp, Arc::clone(&partition)) {
            self.on_removed(&evicted, RemovalCause::Size);
        }
        self.created.fetch_add(1, Ordering::Relaxed);

        info!(partition = %key, "subscribed");
        self.emit(RegistryEvent::Subscribed {
            partition: key.clone(),
            mode: self.builder.mode(),
        });
        Ok(partition)
    }

    fn on_removed(&self, partition: &Arc<Partition>, cause: RemovalCause) {
        let key = partition.key();
        self.builder.remove_for_key(key);
        self.for_each_listener(|l| l.partition_removed(key));
        info!(partition = %key, ?cause, "unsubscribed");
        self.emit(RegistryEvent::Unsubscribed {
            partition: key.clone(),
            cause,
        });
    }

    fn live_listeners(&self) -> Vec<Arc<dyn PartitionListener>> {
        let mut listeners = self.listeners.write().expect("listener lock poisoned");
        listeners.retain(|l| l.strong_count() > 0);
        listeners.iter().filter_map(Weak::upgrade).collect()
    }

    fn for_each_listener(&self, f: impl Fn(&dyn PartitionListener)) {
        for listener in self.live_listeners() {
            f(listener.as_ref());
        }
    }

    fn emit(&self, event: RegistryEvent) {
        // No receivers is fine.
        let _ = self.events.send(event);
    }
}

impl std::fmt::Debug for PartitionRegistry {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionRegistry")
            .field("mode", &self.builder.mode())
            .field("partitions", &self.partitions.len())
            .field("in_flight", &self.in_flight.len())
            .finish()
    }
}
