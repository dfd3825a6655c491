/// Domain-separated BLAKE3 content hasher.
///
/// Each hasher carries a domain tag that is prepended to every hash
/// computation, so a record body and a public key with identical bytes
/// never hash to the same value.
pub struct ContentHasher {
    domain: &'static str,
}

impl ContentHasher {
    /// Hasher for signed record bodies (record versions).
    pub const RECORD: Self = Self {
        domain: "strata-record-v1",
    };
    /// Hasher for chain log entries.
    pub const ENTRY: Self = Self {
        domain: "strata-entry-v1",
    };
    /// Hasher for public keys (trust-set membership).
    pub const PUBLIC_KEY: Self = Self {
        domain: "strata-pubkey-v1",
    };
    /// Hasher for root ids (sharding).
    pub const SHARD: Self = Self {
        domain: "strata-shard-v1",
    };

    /// Hash raw bytes with domain separation.
    pub fn hash(&self, data: &[u8]) -> [u8; 32] {
        self.hash_parts(&[data])
    }

    /// Hash several byte slices as one message.
    pub fn hash_parts(&self, parts: &[&[u8]]) -> [u8; 32] {
        let mut hasher = blake3::Hasher::new();
        hasher.update(self.domain.as_bytes());
        hasher.update(b":");
        for part in parts {
            hasher.update(&(part.len() as u64).to_le_bytes());
            hasher.update(part);
        }
        *hasher.finalize().as_bytes()
    }
}
