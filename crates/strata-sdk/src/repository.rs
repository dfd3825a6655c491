use std::sync::{Arc, Mutex};

use strata_bridge::{BridgeMode, LogBridgeBuilder, RamBridgeBuilder, RamRepository};
use strata_chain::{DataContainer, RecordDraft, Version};
use strata_crypto::{KeyPair, Rights};
use strata_maintenance::{MaintenanceDaemon, TrustedKeyAuthorizer};
use strata_partition::{KeyDiscovery, Partition, PartitionRegistry};
use strata_resolver::{HashRootMapper, HeadLookup, PartitionResolver, RequestScope};
use strata_types::{Clock, DataObject, PartitionKey, SystemClock};
use tokio::task::JoinHandle;
use tracing::{debug, info};
use uuid::Uuid;

use crate::config::NodeConfig;
use crate::error::{SdkError, SdkResult};

/// Outcome of a committed write.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct WriteReceipt {
    pub partition: PartitionKey,
    pub version: Version,
    /// The object now has concurrent heads and a merge is pending.
    pub conflict: bool,
}

/// High-level Strata repository API.
///
/// Writes are routed to the partition of the object's root, signed with a
/// write key the partition trusts, and the writer's rights are lent to the
/// partition's maintenance principal so conflicts can be merged later.
/// Deletions are deferred: [`Repository::remove`] schedules a tombstone
/// that the maintenance daemon applies once its window has passed.
pub struct Repository {
    config: NodeConfig,
    registry: Arc<PartitionRegistry>,
    resolver: PartitionResolver,
    daemon: Arc<MaintenanceDaemon>,
    maintenance: Mutex<Option<JoinHandle<()>>>,
}

impl Repository {
    /// Open a node with the system clock.
    pub fn open(config: NodeConfig, discovery: Arc<dyn KeyDiscovery>) -> SdkResult<Self> {
        Self::open_with_clock(config, discovery, Arc::new(SystemClock))
    }

    pub fn open_with_clock(
        config: NodeConfig,
        discovery: Arc<dyn KeyDiscovery>,
        clock: Arc<dyn Clock>,
    ) -> SdkResult<Self> {
        config.validate()?;

        let registry = match config.bridge.mode {
            BridgeMode::Ram => {
                let repository = Arc::new(RamRepository::new());
                PartitionRegistry::new(
                    config.registry.clone(),
                    Arc::new(RamBridgeBuilder::new(Arc::clone(&repository))),
                    discovery,
                    Arc::clone(&clock),
                )
                .with_read_model(repository)
            }
            BridgeMode::Log => PartitionRegistry::new(
                config.registry.clone(),
                Arc::new(LogBridgeBuilder::from_config(&config.bridge)),
                discovery,
                Arc::clone(&clock),
            ),
        };
        let registry = Arc::new(registry);

        let resolver = PartitionResolver::new(
            config.resolver.clone(),
            Arc::new(HashRootMapper::new(
                config.resolver.topic.clone(),
                config.resolver.partitions,
            )),
            Arc::clone(&registry) as Arc<dyn HeadLookup>,
            Arc::clone(&clock),
        );

        let daemon = MaintenanceDaemon::new(
            config.maintenance.clone(),
            Arc::clone(&registry),
            Arc::new(TrustedKeyAuthorizer::new(Arc::clone(&registry))),
            clock,
        );

        info!(mode = ?config.bridge.mode, topic = %config.resolver.topic, "repository opened");
        Ok(Self {
            config,
            registry,
            resolver,
            daemon,
            maintenance: Mutex::new(None),
        })
    }

    // ---- Maintenance lifecycle ----

    /// Start the maintenance loop if it is not already running. Must be
    /// called from within a tokio runtime.
    pub fn start_maintenance(&self) {
        let mut handle = self.maintenance.lock().expect("maintenance lock poisoned");
        if handle.is_none() && !self.daemon.is_shut_down() {
            *handle = Some(self.daemon.start());
        }
    }

    /// Expire every pending tombstone and merge and wait until a full
    /// maintenance pass has applied them. Starts the loop if needed.
    pub async fn force_maintenance(&self) -> SdkResult<()> {
        self.start_maintenance();
        self.daemon.force_now().await?;
        Ok(())
    }

    /// Stop maintenance and release every partition.
    pub async fn close(&self) {
        self.daemon.shutdown();
        let handle = self.maintenance.lock().expect("maintenance lock poisoned").take();
        if let Some(handle) = handle {
            let _ = handle.await;
        }
        self.registry.destroy_all();
        info!("repository closed");
    }

    // ---- Data operations ----

    /// Resolve the partition `object` belongs to within `scope`.
    pub fn partition_of(&self, object: &DataObject, scope: &RequestScope) -> SdkResult<PartitionKey> {
        Ok(self.resolver.resolve(object, scope.context())?)
    }

    /// Commit a new version of `object` on top of its current heads.
    pub async fn write(
        &self,
        object: &DataObject,
        rights: &dyn Rights,
        scope: &RequestScope,
    ) -> SdkResult<WriteReceipt> {
        let key = self.partition_of(object, scope)?;
        let partition = self.registry.get_or_create(&key, true).await?;
        let signer = trusted_write_key(&partition, rights)?;
        let chain = partition.chain();
        let record = RecordDraft::for_object(object, chain.head_versions(&object.id))?.sign(&signer)?;
        let version = record.version;
        partition.bridge().write(record)?;
        scope.remember(object.clone());
        scope.stage(key.clone(), object.id);

        self.daemon.lend_rights(&key, rights);
        let conflict = chain.requires_merge(&object.id);
        debug!(partition = %key, id = %object.id, conflict, "object written");
        Ok(WriteReceipt {
            partition: key,
            version,
            conflict,
        })
    }

    /// Current state of `object` in its partition.
    pub async fn read(&self, object: &DataObject, scope: &RequestScope) -> SdkResult<Option<DataContainer>> {
        let key = self.partition_of(object, scope)?;
        self.read_at(&key, &object.id).await
    }

    /// Current state of object `id` in `partition`.
    pub async fn read_at(&self, partition: &PartitionKey, id: &Uuid) -> SdkResult<Option<DataContainer>> {
        let partition = self.registry.get_or_create(partition, true).await?;
        Ok(partition.chain().get_data(id))
    }

    /// Schedule the physical deletion of `object`. It stays readable until
    /// the maintenance window has passed and a pass has run.
    pub async fn remove(
        &self,
        object: &DataObject,
        rights: &dyn Rights,
        scope: &RequestScope,
    ) -> SdkResult<PartitionKey> {
        let key = self.partition_of(object, scope)?;
        let partition = self.registry.get_or_create(&key, true).await?;
        trusted_write_key(&partition, rights)?;

        self.daemon.tombstone(&key, &object.record_key());
        self.daemon.lend_rights(&key, rights);
        debug!(partition = %key, id = %object.id, "tombstone scheduled");
        Ok(key)
    }

    /// Cancel a pending deletion. Returns `true` if one was pending.
    pub fn undelete(&self, object: &DataObject, scope: &RequestScope) -> SdkResult<bool> {
        let key = self.partition_of(object, scope)?;
        Ok(self.daemon.cancel_tombstone(&key, &object.record_key()))
    }

    /// Lend `rights` to the maintenance principal of `partition`.
    pub fn lend_rights(&self, partition: &PartitionKey, rights: &dyn Rights) {
        self.daemon.lend_rights(partition, rights);
    }

    // ---- Accessors ----

    pub fn config(&self) -> &NodeConfig {
        &self.config
    }

    pub fn registry(&self) -> &Arc<PartitionRegistry> {
        &self.registry
    }

    pub fn resolver(&self) -> &PartitionResolver {
        &self.resolver
    }

    pub fn daemon(&self) -> &Arc<MaintenanceDaemon> {
        &self.daemon
    }
}

impl Drop for Repository {
    fn drop(&mut self) {
        self.daemon.shutdown();
    }
}

fn trusted_write_key(partition: &Partition, rights: &dyn Rights) -> SdkResult<KeyPair> {
    let chain = partition.chain();
    rights
        .write_key_matching(&|hash| chain.is_trusted(hash))
        .ok_or_else(|| SdkError::NoWriteKey {
            alias: rights.rights_alias(),
            partition: partition.key().to_string(),
        })
}
