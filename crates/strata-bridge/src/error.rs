use std::io;

use strata_chain::ChainStoreError;

/// Errors produced by partition bridges.
#[derive(Debug, thiserror::Error)]
pub enum BridgeError {
    /// I/O error on the backing log.
    #[error("io error: {0}")]
    Io(#[from] io::Error),

    /// The chain store refused the event.
    #[error("event rejected: {0}")]
    Rejected(#[from] ChainStoreError),

    /// The partition has not finished replaying its history.
    #[error("partition {0} has not finished loading")]
    NotLoaded(String),
}

/// Result alias for bridge operations.
pub type BridgeResult<T> = std::result::Result<T, BridgeError>;
