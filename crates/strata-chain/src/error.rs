use strata_crypto::{ChainError, PublicKeyHash};
use uuid::Uuid;

/// Errors produced by chain store operations.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum ChainStoreError {
    #[error("record {id} is signed by untrusted key {author:?}")]
    UntrustedAuthor { id: Uuid, author: PublicKeyHash },

    #[error("record {id} has an invalid signature")]
    InvalidSignature { id: Uuid },

    #[error("record {id} version does not match its content")]
    VersionMismatch { id: Uuid },

    #[error("history integrity violation: {0}")]
    Integrity(#[from] ChainError),

    #[error("serialization error: {0}")]
    Serialization(String),
}

/// Result alias for chain store operations.
pub type ChainStoreResult<T> = Result<T, ChainStoreError>;

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn integrity_errors_convert_and_clone() {
        let err = ChainStoreError::from(ChainError::BrokenLink { seq: 3 });
        assert_eq!(err.clone(), err);
        assert_eq!(err.to_string(), "history integrity violation: broken link at seq 3: prev_hash does not match");
    }
}
