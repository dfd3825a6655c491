use async_trait::async_trait;
use dashmap::DashMap;
use strata_crypto::VerifyingKey;
use strata_types::PartitionKey;

use crate::error::RegistryResult;

/// Source of the trust keys seeded into a partition when it is created.
#[async_trait]
pub trait KeyDiscovery: Send + Sync {
    async fn discover(&self, key: &PartitionKey) -> RegistryResult<Vec<VerifyingKey>>;
}

/// Key discovery from a fixed table: keys trusted everywhere plus keys
/// trusted for a single topic.
#[derive(Debug, Default)]
pub struct StaticKeyDiscovery {
    global: Vec<VerifyingKey>,
    per_topic: DashMap<String, Vec<VerifyingKey>>,
}

impl StaticKeyDiscovery {
    pub fn new(global: Vec<VerifyingKey>) -> Self {
        Self {
            global,
            per_topic: DashMap::new(),
        }
    }

    /// Trust `key` in every partition of `topic`.
    pub fn trust_for_topic(&self, topic: impl Into<String>, key: VerifyingKey) {
        self.per_topic.entry(topic.into()).or_default().push(key);
    }
}

#[async_trait]
impl KeyDiscovery for StaticKeyDiscovery {
    async fn discover(&self, key: &PartitionKey) -> RegistryResult<Vec<VerifyingKey>> {
        let mut keys = self.global.clone();
        if let Some(topic_keys) = self.per_topic.get(key.topic()) {
            keys.extend(topic_keys.iter().cloned());
        }
        Ok(keys)
    }
}
