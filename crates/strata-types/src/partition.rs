use std::fmt;
use std::str::FromStr;

use serde::{Deserialize, Serialize};

use crate::error::TypeError;

/// What a partition is used for.
///
/// The kind travels with a [`PartitionKey`] but takes no part in identity:
/// two keys naming the same topic and index address the same partition.
#[derive(Clone, Copy, Debug, Default, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum PartitionKind {
    /// Ordinary data objects.
    #[default]
    Data,
    /// Publicly readable data (no read keys required).
    Public,
}

/// Names one partition of the repository.
///
/// A partition key is an immutable value: a topic name plus a partition
/// index within that topic. Equality and hashing use the topic and index
/// only (see [`TopicAndPartition`]).
#[derive(Clone, Debug, Serialize, Deserialize)]
pub struct PartitionKey {
    topic: String,
    index: u32,
    kind: PartitionKind,
}

impl PartitionKey {
    /// Create a data partition key.
    pub fn new(topic: impl Into<String>, index: u32) -> Self {
        Self {
            topic: topic.into(),
            index,
            kind: PartitionKind::Data,
        }
    }

    /// Same key with a different kind.
    pub fn with_kind(mut self, kind: PartitionKind) -> Self {
        self.kind = kind;
        self
    }

    pub fn topic(&self) -> &str {
        &self.topic
    }

    pub fn index(&self) -> u32 {
        self.index
    }

    pub fn kind(&self) -> PartitionKind {
        self.kind
    }

    /// The identity portion of this key.
    pub fn topic_and_partition(&self) -> TopicAndPartition {
        TopicAndPartition::from(self)
    }
}

impl PartialEq for PartitionKey {
    fn eq(&self, other: &Self) -> bool {
        self.topic == other.topic && self.index == other.index
    }
}

impl Eq for PartitionKey {}

impl std::hash::Hash for PartitionKey {
    fn hash<H: std::hash::Hasher>(&self, state: &mut H) {
        self.topic.hash(state);
        self.index.hash(state);
    }
}

impl fmt::Display for PartitionKey {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.topic, self.index)
    }
}

impl FromStr for PartitionKey {
    type Err = TypeError;

    /// Parse `topic:index`.
    fn from_str(s: &str) -> Result<Self, Self::Err> {
        let (topic, index) = s
            .rsplit_once(':')
            .ok_or_else(|| TypeError::InvalidPartitionKey(s.to_string()))?;
        if topic.is_empty() {
            return Err(TypeError::InvalidPartitionKey(s.to_string()));
        }
        let index = index
            .parse::<u32>()
            .map_err(|e| TypeError::InvalidPartitionKey(format!("{s}: {e}")))?;
        Ok(Self::new(topic, index))
    }
}

/// Hashable identity of a partition: topic name and index.
///
/// Registry and maintenance maps are keyed by this type.
#[derive(Clone, Debug, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize)]
pub struct TopicAndPartition {
    pub topic: String,
    pub index: u32,
}

impl TopicAndPartition {
    pub fn new(topic: impl Into<String>, index: u32) -> Self {
        Self {
            topic: topic.into(),
            index,
        }
    }

    /// File-system friendly name (`topic-index`).
    pub fn file_stem(&self) -> String {
        format!("{}-{}", self.topic, self.index)
    }
}

impl From<&PartitionKey> for TopicAndPartition {
    fn from(key: &PartitionKey) -> Self {
        Self {
            topic: key.topic.clone(),
            index: key.index,
        }
    }
}

impl fmt::Display for TopicAndPartition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.topic, self.index)
    }
}
