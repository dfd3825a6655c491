use std::fmt;

use serde::{Deserialize, Serialize};
use uuid::Uuid;

use crate::error::TypeError;
use crate::partition::PartitionKey;

/// A record in the repository's object forest.
///
/// Objects link to their parent through `parent_id`. The root of each tree
/// (an object without a parent) decides which partition the whole subtree
/// lives in. Objects that carry their own `partition_key` are self-describing
/// roots and bypass the parent walk entirely.
#[derive(Clone, PartialEq, Serialize, Deserialize)]
pub struct DataObject {
    pub id: Uuid,
    pub parent_id: Option<Uuid>,
    /// Payload class tag (e.g. `"Account"`).
    pub type_name: String,
    pub payload: serde_json::Value,
    /// Set only for objects that name their own partition.
    pub partition_key: Option<PartitionKey>,
}

impl DataObject {
    /// A root object with a fresh id.
    pub fn root(type_name: impl Into<String>, payload: serde_json::Value) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: None,
            type_name: type_name.into(),
            payload,
            partition_key: None,
        }
    }

    /// A child of `parent` with a fresh id.
    pub fn child_of(
        parent: &DataObject,
        type_name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self::with_parent(parent.id, type_name, payload)
    }

    /// A child of the object with id `parent_id`.
    pub fn with_parent(
        parent_id: Uuid,
        type_name: impl Into<String>,
        payload: serde_json::Value,
    ) -> Self {
        Self {
            id: Uuid::new_v4(),
            parent_id: Some(parent_id),
            type_name: type_name.into(),
            payload,
            partition_key: None,
        }
    }

    /// Pin this object to an explicit partition.
    pub fn in_partition(mut self, key: PartitionKey) -> Self {
        self.partition_key = Some(key);
        self
    }

    pub fn is_root(&self) -> bool {
        self.parent_id.is_none()
    }

    /// The key used for this object's records in a partition log.
    pub fn record_key(&self) -> String {
        self.id.to_string()
    }

    /// Serialize the payload for storage.
    pub fn payload_bytes(&self) -> Result<Vec<u8>, TypeError> {
        serde_json::to_vec(&self.payload).map_err(|e| TypeError::Serialization(e.to_string()))
    }
}

impl fmt::Debug for DataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("DataObject")
            .field("id", &self.id)
            .field("parent_id", &self.parent_id)
            .field("type_name", &self.type_name)
            .finish_non_exhaustive()
    }
}

impl fmt::Display for DataObject {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}:{}", self.type_name, self.id)
    }
}
