use strata_crypto::ContentHasher;
use strata_types::PartitionKey;
use uuid::Uuid;

/// Deterministic mapping from a root object's id to its partition.
pub trait RootMapper: Send + Sync {
    fn map_root(&self, root_id: &Uuid) -> PartitionKey;
}

/// Shards roots across `partitions` partitions of one topic by BLAKE3 hash.
#[derive(Clone, Debug)]
pub struct HashRootMapper {
    topic: String,
    partitions: u32,
}

impl HashRootMapper {
    pub fn new(topic: impl Into<String>, partitions: u32) -> Self {
        Self {
            topic: topic.into(),
            partitions: partitions.max(1),
        }
    }

    pub fn partitions(&self) -> u32 {
        self.partitions
    }
}

impl RootMapper for HashRootMapper {
    fn map_root(&self, root_id: &Uuid) -> PartitionKey {
        let digest = ContentHasher::SHARD.hash(root_id.as_bytes());
        let mut head = [0u8; 8];
        head.copy_from_slice(&digest[..8]);
        let index = (u64::from_le_bytes(head) % u64::from(self.partitions)) as u32;
        PartitionKey::new(self.topic.clone(), index)
    }
}
