use strata_bridge::BridgeError;
use strata_chain::ChainStoreError;

/// Errors produced by the partition registry.
///
/// None of these are cached: a caller may retry and a fresh creation
/// attempt is made.
#[derive(Debug, thiserror::Error)]
pub enum RegistryError {
    /// The backing bridge could not be created or refused an operation.
    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    /// The partition did not finish loading in time.
    #[error("partition {partition} did not load within {timeout_ms} ms")]
    LoadTimeout { partition: String, timeout_ms: u64 },

    /// History replay failed.
    #[error("partition {partition} failed to replay: {reason}")]
    ReplayFailed { partition: String, reason: String },

    /// Trust key discovery failed.
    #[error("key discovery failed for {partition}: {reason}")]
    Discovery { partition: String, reason: String },

    /// The chain store rejected fed events.
    #[error("chain rejected events: {0}")]
    Rejected(#[from] ChainStoreError),
}

/// Result alias for registry operations.
pub type RegistryResult<T> = std::result::Result<T, RegistryError>;
