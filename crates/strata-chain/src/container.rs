use std::collections::HashSet;

use uuid::Uuid;

use crate::record::{RecordDraft, SignedRecord, Version};

/// All known versions of one object within a partition.
///
/// Versions form a graph through `previous_versions`. A version nobody
/// supersedes is a *head*. Two writers that both built on the same version
/// leave two heads behind, and the container then requires a merge.
#[derive(Clone, Debug)]
pub struct DataContainer {
    id: Uuid,
    key: String,
    parent_id: Option<Uuid>,
    type_name: String,
    /// In append order.
    versions: Vec<SignedRecord>,
}

impl DataContainer {
    pub(crate) fn new(first: SignedRecord) -> Self {
        Self {
            id: first.id,
            key: first.key.clone(),
            parent_id: first.parent_id,
            type_name: first.type_name.clone(),
            versions: vec![first],
        }
    }

    /// Add a version. Returns `false` if the version was already known.
    pub(crate) fn push(&mut self, record: SignedRecord) -> bool {
        if self.versions.iter().any(|v| v.version == record.version) {
            return false;
        }
        self.versions.push(record);
        true
    }

    pub fn id(&self) -> Uuid {
        self.id
    }

    pub fn key(&self) -> &str {
        &self.key
    }

    pub fn parent_id(&self) -> Option<Uuid> {
        self.parent_id
    }

    pub fn type_name(&self) -> &str {
        &self.type_name
    }

    pub fn versions(&self) -> &[SignedRecord] {
        &self.versions
    }

    /// Versions not superseded by any other version, in append order.
    pub fn heads(&self) -> Vec<&SignedRecord> {
        let superseded: HashSet<&Version> = self
            .versions
            .iter()
            .flat_map(|v| v.previous_versions.iter())
            .collect();
        self.versions
            .iter()
            .filter(|v| !superseded.contains(&v.version))
            .collect()
    }

    pub fn head_versions(&self) -> Vec<Version> {
        self.heads().into_iter().map(|h| h.version).collect()
    }

    /// `true` while more than one head exists.
    pub fn requires_merge(&self) -> bool {
        self.heads().len() > 1
    }

    /// The most recently appended head.
    pub fn latest(&self) -> Option<&SignedRecord> {
        self.heads().into_iter().last()
    }

    /// The reconciled form of this object: the latest head's payload,
    /// superseding every current head.
    pub fn fetch_data(&self) -> Option<RecordDraft> {
        let latest = self.latest()?;
        Some(RecordDraft {
            id: self.id,
            key: self.key.clone(),
            parent_id: self.parent_id,
            type_name: self.type_name.clone(),
            payload: latest.payload.clone(),
            previous_versions: self.head_versions(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use strata_crypto::KeyPair;
    use strata_types::DataObject;

    fn write(obj: &DataObject, payload: serde_json::Value, prev: Vec<Version>, kp: &KeyPair) -> SignedRecord {
        let mut obj = obj.clone();
        obj.payload = payload;
        RecordDraft::for_object(&obj, prev).unwrap().sign(kp).unwrap()
    }

    #[test]
    fn linear_history_has_one_head() {
        let kp = KeyPair::generate();
        let obj = DataObject::root("Account", serde_json::json!({}));
        let v1 = write(&obj, serde_json::json!({"n": 1}), vec![], &kp);
        let v2 = write(&obj, serde_json::json!({"n": 2}), vec![v1.version], &kp);

        let mut c = DataContainer::new(v1);
        assert!(c.push(v2.clone()));
        assert_eq!(c.heads().len(), 1);
        assert!(!c.requires_merge());
        assert_eq!(c.latest().unwrap().version, v2.version);
    }

    #[test]
    fn concurrent_writes_require_merge() {
        let kp = KeyPair::generate();
        let obj = DataObject::root("Account", serde_json::json!({}));
        let v1 = write(&obj, serde_json::json!({"n": 1}), vec![], &kp);
        let a = write(&obj, serde_json::json!({"n": "a"}), vec![v1.version], &kp);
        let b = write(&obj, serde_json::json!({"n": "b"}), vec![v1.version], &kp);

        let mut c = DataContainer::new(v1);
        c.push(a.clone());
        c.push(b.clone());
        assert!(c.requires_merge());
        assert_eq!(c.head_versions(), vec![a.version, b.version]);

        let merged = c.fetch_data().unwrap();
        assert_eq!(merged.payload, b.payload);
        assert_eq!(merged.previous_versions, vec![a.version, b.version]);

        let m = merged.sign(&kp).unwrap();
        c.push(m.clone());
        assert!(!c.requires_merge());
        assert_eq!(c.latest().unwrap().version, m.version);
    }

    #[test]
    fn duplicate_version_is_ignored() {
        let kp = KeyPair::generate();
        let obj = DataObject::root("Account", serde_json::json!({}));
        let v1 = write(&obj, serde_json::json!({"n": 1}), vec![], &kp);
        let mut c = DataContainer::new(v1.clone());
        assert!(!c.push(v1));
        assert_eq!(c.versions().len(), 1);
    }
}
