use crate::hasher::ContentHasher;

/// An entry that participates in a partition's hash chain.
pub trait ChainLinked {
    /// Position of the entry in its log (first entry is 1).
    fn seq(&self) -> u64;
    /// The entry's own hash.
    fn entry_hash(&self) -> [u8; 32];
    /// The previous entry's hash (`None` for the first entry).
    fn prev_hash(&self) -> Option<[u8; 32]>;
    /// Canonical body bytes covered by the hash.
    fn body_bytes(&self) -> Vec<u8>;
}

/// Hash chain integrity verifier.
///
/// A valid chain has consecutive sequence numbers starting at 1, each
/// entry's `prev_hash` equal to its predecessor's `entry_hash`, and every
/// `entry_hash` recomputable from `(seq, prev_hash, body)`.
pub struct HashChainVerifier;

impl HashChainVerifier {
    pub fn verify_chain(entries: &[impl ChainLinked]) -> Result<(), ChainError> {
        let mut expected_prev: Option<[u8; 32]> = None;

        for (index, entry) in entries.iter().enumerate() {
            let expected_seq = index as u64 + 1;
            if entry.seq() != expected_seq {
                return Err(ChainError::SequenceGap {
                    expected: expected_seq,
                    found: entry.seq(),
                });
            }

            match (expected_prev, entry.prev_hash()) {
                (None, Some(_)) => return Err(ChainError::GenesisHasPrevHash),
                (Some(_), None) => return Err(ChainError::MissingPrevHash { seq: entry.seq() }),
                (Some(want), Some(got)) if want != got => {
                    return Err(ChainError::BrokenLink { seq: entry.seq() })
                }
                _ => {}
            }

            let computed = Self::compute_hash(entry.seq(), expected_prev, &entry.body_bytes());
            if computed != entry.entry_hash() {
                return Err(ChainError::HashMismatch { seq: entry.seq() });
            }

            expected_prev = Some(entry.entry_hash());
        }

        Ok(())
    }

    /// Compute the hash of an entry at `seq` following `prev_hash`.
    pub fn compute_hash(seq: u64, prev_hash: Option<[u8; 32]>, body: &[u8]) -> [u8; 32] {
        let prev = prev_hash.unwrap_or([0u8; 32]);
        ContentHasher::ENTRY.hash_parts(&[&seq.to_le_bytes(), &prev, body])
    }
}

/// Errors from chain verification.
#[derive(Debug, Clone, thiserror::Error, PartialEq, Eq)]
pub enum ChainError {
    #[error("first entry has a previous hash (should be None)")]
    GenesisHasPrevHash,

    #[error("sequence gap: expected {expected}, found {found}")]
    SequenceGap { expected: u64, found: u64 },

    #[error("broken link at seq {seq}: prev_hash does not match")]
    BrokenLink { seq: u64 },

    #[error("missing prev_hash at seq {seq}")]
    MissingPrevHash { seq: u64 },

    #[error("hash mismatch at seq {seq}: computed hash differs from stored")]
    HashMismatch { seq: u64 },
}

#[cfg(test)]
mod tests {
    use super::*;

    struct TestEntry {
        seq: u64,
        hash: [u8; 32],
        prev: Option<[u8; 32]>,
        body: Vec<u8>,
    }

    impl ChainLinked for TestEntry {
        fn seq(&self) -> u64 {
            self.seq
        }
        fn entry_hash(&self) -> [u8; 32] {
            self.hash
        }
        fn prev_hash(&self) -> Option<[u8; 32]> {
            self.prev
        }
        fn body_bytes(&self) -> Vec<u8> {
            self.body.clone()
        }
    }

    fn build_chain(count: u64) -> Vec<TestEntry> {
        let mut chain = Vec::new();
        let mut prev = None;
        for seq in 1..=count {
            let body = format!("entry-{seq}").into_bytes();
            let hash = HashChainVerifier::compute_hash(seq, prev, &body);
            chain.push(TestEntry {
                seq,
                hash,
                prev,
                body,
            });
            prev = Some(hash);
        }
        chain
    }

    #[test]
    fn empty_and_valid_chains_pass() {
        assert!(HashChainVerifier::verify_chain(&build_chain(0)).is_ok());
        assert!(HashChainVerifier::verify_chain(&build_chain(1)).is_ok());
        assert!(HashChainVerifier::verify_chain(&build_chain(10)).is_ok());
    }

    #[test]
    fn genesis_with_prev_hash_fails() {
        let mut chain = build_chain(1);
        chain[0].prev = Some([1; 32]);
        assert_eq!(
            HashChainVerifier::verify_chain(&chain),
            Err(ChainError::GenesisHasPrevHash)
        );
    }

    #[test]
    fn broken_link_detected() {
        let mut chain = build_chain(3);
        chain[2].prev = Some([99; 32]);
        assert_eq!(
            HashChainVerifier::verify_chain(&chain),
            Err(ChainError::BrokenLink { seq: 3 })
        );
    }

    #[test]
    fn sequence_gap_detected() {
        let mut chain = build_chain(3);
        chain.remove(1);
        assert_eq!(
            HashChainVerifier::verify_chain(&chain),
            Err(ChainError::SequenceGap {
                expected: 2,
                found: 3
            })
        );
    }

    #[test]
    fn tampered_body_detected() {
        let mut chain = build_chain(3);
        chain[1].body = b"tampered".to_vec();
        assert_eq!(
            HashChainVerifier::verify_chain(&chain),
            Err(ChainError::HashMismatch { seq: 2 })
        );
    }
}
