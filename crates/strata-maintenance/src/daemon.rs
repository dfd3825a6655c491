use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use rand::Rng;
use strata_chain::ChainStore;
use strata_crypto::Rights;
use strata_partition::{Partition, PartitionListener, PartitionRegistry};
use strata_types::{Clock, PartitionKey, TopicAndPartition};
use tokio::sync::watch;
use tokio::task::JoinHandle;
use tracing::{debug, info, warn};
use uuid::Uuid;

use crate::authorizer::Authorizer;
use crate::config::MaintenanceConfig;
use crate::error::{MaintenanceError, MaintenanceResult};
use crate::state::{MaintenanceState, StateTable};

/// What one pass did.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq)]
pub struct TickReport {
    /// Loaded partitions with pending state that were visited.
    pub partitions: usize,
    pub deleted: usize,
    pub merged: usize,
    /// Merges dropped because the conflict was gone or the write not allowed.
    pub skipped: usize,
    pub failed: usize,
}

impl TickReport {
    fn absorb(&mut self, other: TickReport) {
        self.partitions += other.partitions;
        self.deleted += other.deleted;
        self.merged += other.merged;
        self.skipped += other.skipped;
        self.failed += other.failed;
    }

    pub fn did_work(&self) -> bool {
        self.deleted + self.merged + self.failed > 0
    }
}

/// Applies expired tombstones and merges across all live partitions.
///
/// The daemon learns about partitions by listening to the registry. It
/// installs a merge hook on every new chain store so conflicts are
/// scheduled as soon as they are appended, and drops a partition's
/// maintenance state when the registry evicts it.
pub struct MaintenanceDaemon {
    config: MaintenanceConfig,
    registry: Arc<PartitionRegistry>,
    authorizer: Arc<dyn Authorizer>,
    states: Arc<StateTable>,
    known: DashMap<TopicAndPartition, PartitionKey>,
    started: AtomicU64,
    ticks: watch::Sender<u64>,
    shutdown: watch::Sender<bool>,
    clock: Arc<dyn Clock>,
}

impl MaintenanceDaemon {
    /// Create the daemon and register it with `registry`. Partitions that
    /// are already live become known immediately.
    pub fn new(
        config: MaintenanceConfig,
        registry: Arc<PartitionRegistry>,
        authorizer: Arc<dyn Authorizer>,
        clock: Arc<dyn Clock>,
    ) -> Arc<Self> {
        let states = Arc::new(StateTable::new(
            config.window(),
            config.borrowed_rights_ttl(),
            Arc::clone(&clock),
        ));
        let (ticks, _) = watch::channel(0);
        let (shutdown, _) = watch::channel(false);
        let daemon = Arc::new(Self {
            config,
            registry: Arc::clone(&registry),
            authorizer,
            states,
            known: DashMap::new(),
            started: AtomicU64::new(0),
            ticks,
            shutdown,
            clock,
        });

        let listener: Weak<dyn PartitionListener> = Arc::downgrade(&daemon) as Weak<dyn PartitionListener>;
        registry.add_listener(listener);
        for key in registry.partition_keys() {
            if let Some(partition) = registry.peek(&key) {
                daemon.partition_created(&key, partition.chain());
            }
        }
        daemon
    }

    pub fn config(&self) -> &MaintenanceConfig {
        &self.config
    }

    // Scheduling API. Safe to call from any number of writers.

    pub fn tombstone(&self, partition: &PartitionKey, record_key: &str) {
        self.states.get_or_create(partition).tombstone(record_key);
    }

    pub fn cancel_tombstone(&self, partition: &PartitionKey, record_key: &str) -> bool {
        self.state(partition)
            .is_some_and(|s| s.cancel_tombstone(record_key))
    }

    pub fn schedule_merge(&self, partition: &PartitionKey, id: Uuid) {
        self.states.get_or_create(partition).schedule_merge(id);
    }

    pub fn cancel_merge(&self, partition: &PartitionKey, id: &Uuid) -> bool {
        self.state(partition).is_some_and(|s| s.cancel_merge(id))
    }

    pub fn lend_rights(&self, partition: &PartitionKey, rights: &dyn Rights) {
        self.states.get_or_create(partition).lend_rights(rights);
    }

    pub fn state(&self, partition: &PartitionKey) -> Option<Arc<MaintenanceState>> {
        self.states.get(&partition.topic_and_partition())
    }

    /// Partitions the daemon currently maintains.
    pub fn known_partitions(&self) -> Vec<PartitionKey> {
        self.known.iter().map(|e| e.value().clone()).collect()
    }

    /// Completed passes since startup.
    pub fn ticks(&self) -> u64 {
        *self.ticks.borrow()
    }

    /// Spawn the maintenance loop.
    pub fn start(self: &Arc<Self>) -> JoinHandle<()> {
        tokio::spawn(Arc::clone(self).run())
    }

    /// Ask the loop, and any `force_now` waiter, to stop.
    pub fn shutdown(&self) {
        self.shutdown.send_replace(true);
    }

    pub fn is_shut_down(&self) -> bool {
        *self.shutdown.borrow()
    }

    /// Run passes until shut down, pausing a randomized interval between
    /// passes.
    pub async fn run(self: Arc<Self>) {
        let mut shutdown = self.shutdown.subscribe();
        info!(window_ms = self.config.window_ms, "maintenance daemon started");

        loop {
            if *shutdown.borrow_and_update() {
                break;
            }

            let daemon = Arc::clone(&self);
            match tokio::task::spawn_blocking(move || daemon.run_tick()).await {
                Ok(Ok(report)) if report.did_work() => info!(?report, "maintenance pass"),
                Ok(Ok(report)) => debug!(?report, "maintenance pass"),
                Ok(Err(MaintenanceError::Interrupted)) => break,
                Ok(Err(e)) => warn!(error = %e, "maintenance pass failed"),
                Err(e) => warn!(error = %e, "maintenance pass aborted"),
            }

            let pause = self.next_pause();
            tokio::select! {
                _ = tokio::time::sleep(pause) => {}
                _ = shutdown.changed() => {}
            }
        }

        info!(ticks = self.ticks(), "maintenance daemon stopped");
    }

    /// One pass over every known partition. Blocks on bridge I/O.
    ///
    /// Failures are isolated per partition and per record. Only a shutdown
    /// aborts the pass, in which case the tick counter does not advance.
    pub fn run_tick(&self) -> MaintenanceResult<TickReport> {
        self.check_interrupt()?;
        self.started.fetch_add(1, Ordering::SeqCst);
        let mut report = TickReport::default();

        // Partitions with pending work are held, so only idle ones go.
        let idle = self.registry.evict_expired();
        if idle > 0 {
            debug!(count = idle, "idle partitions evicted");
        }

        let partitions: Vec<(TopicAndPartition, PartitionKey)> = self
            .known
            .iter()
            .map(|e| (e.key().clone(), e.value().clone()))
            .collect();

        for (tp, key) in partitions {
            self.check_interrupt()?;
            let Some(state) = self.states.get(&tp) else {
                continue;
            };
            match self.maintain(&key, &state) {
                Ok(r) => report.absorb(r),
                Err(MaintenanceError::Interrupted) => return Err(MaintenanceError::Interrupted),
                Err(e) => {
                    report.failed += 1;
                    warn!(partition = %key, error = %e, "partition maintenance failed");
                }
            }
        }

        self.ticks.send_modify(|t| *t += 1);
        Ok(report)
    }

    /// Expire everything pending, then wait for a pass that started after
    /// the expiries were rewritten to complete.
    pub async fn force_now(&self) -> MaintenanceResult<()> {
        let past = self.clock.now() - chrono::Duration::days(365);
        for state in self.states.all() {
            state.force_expiry(past);
        }

        let target = self.started.load(Ordering::SeqCst) + 1;
        let mut ticks = self.ticks.subscribe();
        let mut shutdown = self.shutdown.subscribe();
        loop {
            if *shutdown.borrow_and_update() {
                return Err(MaintenanceError::Interrupted);
            }
            if *ticks.borrow_and_update() >= target {
                return Ok(());
            }
            tokio::select! {
                changed = ticks.changed() => {
                    if changed.is_err() {
                        return Err(MaintenanceError::Interrupted);
                    }
                }
                _ = shutdown.changed() => {}
            }
        }
    }

    fn maintain(&self, key: &PartitionKey, state: &Arc<MaintenanceState>) -> MaintenanceResult<TickReport> {
        let mut report = TickReport::default();
        let Some(partition) = self.registry.peek(key) else {
            return Ok(report);
        };
        if !partition.is_loaded() {
            return Ok(report);
        }
        report.partitions = 1;

        let tombstones = state.poll_tombstones();
        if !tombstones.is_empty() {
            partition.bridge().delete_many(&tombstones)?;
            info!(partition = %key, count = tombstones.len(), "tombstones applied");
            report.deleted = tombstones.len();
        }

        let merges = state.poll_merges();
        if !merges.is_empty() {
            // Merges are written as the partition's maintenance principal,
            // using whatever keys writers have lent it.
            let principal: &dyn Rights = &**state;
            for id in merges {
                self.check_interrupt()?;
                match self.perform_merge(&partition, id, principal) {
                    Ok(true) => report.merged += 1,
                    Ok(false) => report.skipped += 1,
                    Err(e) => {
                        report.failed += 1;
                        warn!(partition = %key, %id, error = %e, "merge failed");
                    }
                }
            }
        }
        Ok(report)
    }

    /// Commit the reconciled form of `id`. Returns `false` when there was
    /// nothing to do or the principal may not write it.
    fn perform_merge(&self, partition: &Partition, id: Uuid, principal: &dyn Rights) -> MaintenanceResult<bool> {
        if !partition.is_loaded() {
            return Ok(false);
        }
        let chain = partition.chain();
        let Some(container) = chain.get_data(&id) else {
            return Ok(false);
        };
        if !container.requires_merge() {
            debug!(partition = %partition.key(), %id, "merge no longer required");
            return Ok(false);
        }
        if !self.authorizer.can_write(partition.key(), id, principal) {
            debug!(partition = %partition.key(), %id, principal = %principal.rights_alias(), "merge not permitted");
            return Ok(false);
        }

        let Some(draft) = container.fetch_data() else {
            return Ok(false);
        };
        let signer = principal
            .write_key_matching(&|hash| chain.is_trusted(hash))
            .ok_or_else(|| MaintenanceError::NoWriteKey {
                id,
                alias: principal.rights_alias(),
            })?;
        let record = draft.sign(&signer)?;
        partition.bridge().write(record)?;
        debug!(partition = %partition.key(), %id, "conflict merged");
        Ok(true)
    }

    fn check_interrupt(&self) -> MaintenanceResult<()> {
        if self.is_shut_down() {
            Err(MaintenanceError::Interrupted)
        } else {
            Ok(())
        }
    }

    fn next_pause(&self) -> Duration {
        let jitter = if self.config.jitter_ms == 0 {
            0
        } else {
            rand::thread_rng().gen_range(0..self.config.jitter_ms)
        };
        Duration::from_millis(self.config.pause_ms + jitter)
    }
}

impl PartitionListener for MaintenanceDaemon {
    fn partition_created(&self, key: &PartitionKey, chain: &ChainStore) {
        self.known.insert(key.topic_and_partition(), key.clone());
        let states = Arc::clone(&self.states);
        let key = key.clone();
        chain.set_merge_hook(Arc::new(move |id| {
            states.get_or_create(&key).schedule_merge(id);
        }));
    }

    fn partition_removed(&self, key: &PartitionKey) {
        let tp = key.topic_and_partition();
        self.known.remove(&tp);
        if self.states.remove(&tp).is_some() {
            debug!(partition = %key, "maintenance state dropped");
        }
    }

    fn holds(&self, key: &PartitionKey) -> bool {
        self.state(key)
            .is_some_and(|s| s.pending_tombstones() + s.pending_merges() > 0)
    }
}

impl std::fmt::Debug for MaintenanceDaemon {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("MaintenanceDaemon")
            .field("known", &self.known.len())
            .field("states", &self.states.len())
            .field("ticks", &self.ticks())
            .finish()
    }
}
