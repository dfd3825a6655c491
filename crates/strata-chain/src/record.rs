use serde::{Deserialize, Serialize};
use strata_crypto::{
    ChainLinked, ContentHasher, KeyPair, PublicKeyHash, Signature, VerifyingKey,
};
use strata_types::DataObject;
use uuid::Uuid;

use crate::error::{ChainStoreError, ChainStoreResult};

/// Content hash of a signed record body. Identifies one version of an object.
pub type Version = [u8; 32];

/// An unsigned record ready to be signed by a writer.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct RecordDraft {
    pub id: Uuid,
    pub key: String,
    pub parent_id: Option<Uuid>,
    pub type_name: String,
    pub payload: Vec<u8>,
    /// Versions this write supersedes. Empty for a first write.
    pub previous_versions: Vec<Version>,
}

/// The bytes covered by a record's version hash and signature.
#[derive(Serialize)]
struct SignedBody<'a> {
    id: &'a Uuid,
    key: &'a str,
    parent_id: &'a Option<Uuid>,
    type_name: &'a str,
    payload: &'a [u8],
    previous_versions: &'a [Version],
    author: &'a PublicKeyHash,
}

impl RecordDraft {
    /// Draft a write of `object` on top of `previous_versions`.
    pub fn for_object(object: &DataObject, previous_versions: Vec<Version>) -> ChainStoreResult<Self> {
        let payload = object
            .payload_bytes()
            .map_err(|e| ChainStoreError::Serialization(e.to_string()))?;
        Ok(Self {
            id: object.id,
            key: object.record_key(),
            parent_id: object.parent_id,
            type_name: object.type_name.clone(),
            payload,
            previous_versions,
        })
    }

    fn body_bytes(&self, author: &PublicKeyHash) -> ChainStoreResult<Vec<u8>> {
        encode_body(
            &self.id,
            &self.key,
            &self.parent_id,
            &self.type_name,
            &self.payload,
            &self.previous_versions,
            author,
        )
    }

    /// Sign the draft with `key`, producing an appendable record.
    pub fn sign(self, key: &KeyPair) -> ChainStoreResult<SignedRecord> {
        let author = key.public_hash();
        let body = self.body_bytes(&author)?;
        let version = ContentHasher::RECORD.hash(&body);
        let signature = key.signing_key().sign(&version);
        Ok(SignedRecord {
            id: self.id,
            key: self.key,
            parent_id: self.parent_id,
            type_name: self.type_name,
            payload: self.payload,
            previous_versions: self.previous_versions,
            author,
            signature,
            version,
        })
    }
}

/// A record signed by its author.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub struct SignedRecord {
    pub id: Uuid,
    pub key: String,
    pub parent_id: Option<Uuid>,
    pub type_name: String,
    pub payload: Vec<u8>,
    pub previous_versions: Vec<Version>,
    pub author: PublicKeyHash,
    pub signature: Signature,
    pub version: Version,
}

impl SignedRecord {
    /// Check that `version` matches the body and the signature verifies
    /// against `author_key`.
    pub fn verify(&self, author_key: &VerifyingKey) -> ChainStoreResult<()> {
        let body = encode_body(
            &self.id,
            &self.key,
            &self.parent_id,
            &self.type_name,
            &self.payload,
            &self.previous_versions,
            &self.author,
        )?;
        if ContentHasher::RECORD.hash(&body) != self.version {
            return Err(ChainStoreError::VersionMismatch { id: self.id });
        }
        author_key
            .verify(&self.version, &self.signature)
            .map_err(|_| ChainStoreError::InvalidSignature { id: self.id })
    }

    /// Decode the payload as JSON.
    pub fn payload_json(&self) -> ChainStoreResult<serde_json::Value> {
        serde_json::from_slice(&self.payload).map_err(|e| ChainStoreError::Serialization(e.to_string()))
    }

    pub fn short_version(&self) -> String {
        hex::encode(&self.version[..4])
    }
}

fn encode_body(
    id: &Uuid,
    key: &str,
    parent_id: &Option<Uuid>,
    type_name: &str,
    payload: &[u8],
    previous_versions: &[Version],
    author: &PublicKeyHash,
) -> ChainStoreResult<Vec<u8>> {
    bincode::serialize(&SignedBody {
        id,
        key,
        parent_id,
        type_name,
        payload,
        previous_versions,
        author,
    })
    .map_err(|e| ChainStoreError::Serialization(e.to_string()))
}

/// One event in a partition log.
#[derive(Clone, Debug, PartialEq, Eq, Serialize, Deserialize)]
pub enum ChainEvent {
    /// A new version of an object.
    Data(SignedRecord),
    /// Physical removal of every version stored under `key`.
    Tombstone { key: String },
}

impl ChainEvent {
    /// The record key this event applies to.
    pub fn key(&self) -> &str {
        match self {
            Self::Data(record) => &record.key,
            Self::Tombstone { key } => key,
        }
    }

    pub fn encode(&self) -> ChainStoreResult<Vec<u8>> {
        bincode::serialize(self).map_err(|e| ChainStoreError::Serialization(e.to_string()))
    }

    pub fn decode(bytes: &[u8]) -> ChainStoreResult<Self> {
        bincode::deserialize(bytes).map_err(|e| ChainStoreError::Serialization(e.to_string()))
    }
}

/// A [`ChainEvent`] placed in a partition's history.
#[derive(Clone, Debug, PartialEq, Eq)]
pub struct ChainEntry {
    pub seq: u64,
    pub prev_hash: Option<[u8; 32]>,
    pub entry_hash: [u8; 32],
    pub event: ChainEvent,
    encoded: Vec<u8>,
}

impl ChainEntry {
    pub(crate) fn link(seq: u64, prev_hash: Option<[u8; 32]>, event: ChainEvent) -> ChainStoreResult<Self> {
        let encoded = event.encode()?;
        let entry_hash = strata_crypto::HashChainVerifier::compute_hash(seq, prev_hash, &encoded);
        Ok(Self {
            seq,
            prev_hash,
            entry_hash,
            event,
            encoded,
        })
    }
}

impl ChainLinked for ChainEntry {
    fn seq(&self) -> u64 {
        self.seq
    }

    fn entry_hash(&self) -> [u8; 32] {
        self.entry_hash
    }

    fn prev_hash(&self) -> Option<[u8; 32]> {
        self.prev_hash
    }

    fn body_bytes(&self) -> Vec<u8> {
        self.encoded.clone()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn draft() -> RecordDraft {
        let obj = DataObject::root("Account", json!({"name": "alice"}));
        RecordDraft::for_object(&obj, Vec::new()).unwrap()
    }

    #[test]
    fn signed_record_verifies_with_author_key() {
        let kp = KeyPair::generate();
        let record = draft().sign(&kp).unwrap();
        assert_eq!(record.author, kp.public_hash());
        assert!(record.verify(kp.verifying_key()).is_ok());
    }

    #[test]
    fn wrong_key_fails_verification() {
        let record = draft().sign(&KeyPair::generate()).unwrap();
        let other = KeyPair::generate();
        assert_eq!(
            record.verify(other.verifying_key()),
            Err(ChainStoreError::InvalidSignature { id: record.id })
        );
    }

    #[test]
    fn tampered_payload_changes_version() {
        let kp = KeyPair::generate();
        let mut record = draft().sign(&kp).unwrap();
        record.payload = b"{\"name\":\"mallory\"}".to_vec();
        assert_eq!(
            record.verify(kp.verifying_key()),
            Err(ChainStoreError::VersionMismatch { id: record.id })
        );
    }

    #[test]
    fn payload_decodes_as_json() {
        let record = draft().sign(&KeyPair::generate()).unwrap();
        assert_eq!(record.payload_json().unwrap(), json!({"name": "alice"}));
    }

    #[test]
    fn event_encoding_survives_bincode() {
        let record = draft().sign(&KeyPair::generate()).unwrap();
        let event = ChainEvent::Data(record);
        let decoded = ChainEvent::decode(&event.encode().unwrap()).unwrap();
        assert_eq!(decoded, event);
    }

    #[test]
    fn entry_links_hash_previous() {
        let e1 = ChainEntry::link(1, None, ChainEvent::Tombstone { key: "a".into() }).unwrap();
        let e2 = ChainEntry::link(2, Some(e1.entry_hash), ChainEvent::Tombstone { key: "b".into() })
            .unwrap();
        assert!(strata_crypto::HashChainVerifier::verify_chain(&[e1, e2]).is_ok());
    }
}
