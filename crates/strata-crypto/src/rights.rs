use std::fmt;

use strata_types::{DataObject, PartitionKey};
use uuid::Uuid;

use crate::signer::{PublicKeyHash, SigningKey, VerifyingKey};

/// A private key together with its public half and public hash.
#[derive(Clone)]
pub struct KeyPair {
    signing: SigningKey,
    verifying: VerifyingKey,
    public_hash: PublicKeyHash,
}

impl KeyPair {
    pub fn generate() -> Self {
        Self::from_signing_key(SigningKey::generate())
    }

    pub fn from_signing_key(signing: SigningKey) -> Self {
        let verifying = signing.verifying_key();
        let public_hash = verifying.public_hash();
        Self {
            signing,
            verifying,
            public_hash,
        }
    }

    pub fn signing_key(&self) -> &SigningKey {
        &self.signing
    }

    pub fn verifying_key(&self) -> &VerifyingKey {
        &self.verifying
    }

    pub fn public_hash(&self) -> PublicKeyHash {
        self.public_hash
    }
}

impl fmt::Debug for KeyPair {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "KeyPair({})", self.public_hash.short_hex())
    }
}

/// A principal's read and write key material.
///
/// Implemented by anything that can act as the author of a write: user
/// principals ([`RightsSet`]) and synthetic principals such as the
/// maintenance daemon's per-partition state, which holds rights lent to it.
pub trait Rights: Send + Sync {
    /// Stable identifier of the principal.
    fn rights_id(&self) -> Uuid;

    /// Keys that grant read access.
    fn rights_read(&self) -> Vec<KeyPair>;

    /// Keys that grant write access.
    fn rights_write(&self) -> Vec<KeyPair>;

    /// Human readable alias used in logs.
    fn rights_alias(&self) -> String;

    /// The data object backing this principal, if any.
    fn as_data_object(&self) -> Option<&DataObject> {
        None
    }

    /// The partition this principal is bound to, if it names one itself.
    fn partition_key(&self) -> Option<PartitionKey> {
        None
    }

    /// First write key whose public hash satisfies `trusted`.
    fn write_key_matching(&self, trusted: &dyn Fn(&PublicKeyHash) -> bool) -> Option<KeyPair> {
        self.rights_write()
            .into_iter()
            .find(|k| trusted(&k.public_hash()))
    }
}

/// A plain set of rights, optionally backed by a data object.
#[derive(Clone, Debug)]
pub struct RightsSet {
    id: Uuid,
    alias: String,
    read: Vec<KeyPair>,
    write: Vec<KeyPair>,
    object: Option<DataObject>,
}

impl RightsSet {
    pub fn new(alias: impl Into<String>) -> Self {
        Self {
            id: Uuid::new_v4(),
            alias: alias.into(),
            read: Vec::new(),
            write: Vec::new(),
            object: None,
        }
    }

    /// Rights owned by a data object (the object's id becomes the rights id).
    pub fn for_object(object: DataObject) -> Self {
        Self {
            id: object.id,
            alias: object.to_string(),
            read: Vec::new(),
            write: Vec::new(),
            object: Some(object),
        }
    }

    pub fn with_read_key(mut self, key: KeyPair) -> Self {
        self.read.push(key);
        self
    }

    pub fn with_write_key(mut self, key: KeyPair) -> Self {
        self.write.push(key);
        self
    }
}

impl Rights for RightsSet {
    fn rights_id(&self) -> Uuid {
        self.id
    }

    fn rights_read(&self) -> Vec<KeyPair> {
        self.read.clone()
    }

    fn rights_write(&self) -> Vec<KeyPair> {
        self.write.clone()
    }

    fn rights_alias(&self) -> String {
        self.alias.clone()
    }

    fn as_data_object(&self) -> Option<&DataObject> {
        self.object.as_ref()
    }
}
