use std::sync::Arc;

use strata_crypto::Rights;
use strata_partition::PartitionRegistry;
use strata_types::PartitionKey;
use uuid::Uuid;

/// Decides whether a principal may write a record.
///
/// Consulted before every merge commit.
pub trait Authorizer: Send + Sync {
    fn can_write(&self, partition: &PartitionKey, id: Uuid, rights: &dyn Rights) -> bool;
}

/// Permits every write.
#[derive(Clone, Copy, Debug, Default)]
pub struct AllowAll;

impl Authorizer for AllowAll {
    fn can_write(&self, _partition: &PartitionKey, _id: Uuid, _rights: &dyn Rights) -> bool {
        true
    }
}

/// Permits a write when the principal holds a write key the partition's
/// chain of trust accepts.
#[derive(Debug)]
pub struct TrustedKeyAuthorizer {
    registry: Arc<PartitionRegistry>,
}

impl TrustedKeyAuthorizer {
    pub fn new(registry: Arc<PartitionRegistry>) -> Self {
        Self { registry }
    }
}

impl Authorizer for TrustedKeyAuthorizer {
    fn can_write(&self, partition: &PartitionKey, _id: Uuid, rights: &dyn Rights) -> bool {
        let Some(live) = self.registry.peek(partition) else {
            return false;
        };
        let chain = live.chain();
        rights
            .write_key_matching(&|hash| chain.is_trusted(hash))
            .is_some()
    }
}
