use strata_bridge::BridgeError;
use strata_chain::ChainStoreError;
use strata_partition::RegistryError;
use uuid::Uuid;

/// Errors produced by the maintenance daemon.
///
/// Only [`MaintenanceError::Interrupted`] aborts a pass. Everything else is
/// logged against the partition or record that caused it.
#[derive(Debug, thiserror::Error)]
pub enum MaintenanceError {
    /// The daemon is shutting down.
    #[error("maintenance interrupted")]
    Interrupted,

    #[error("registry error: {0}")]
    Registry(#[from] RegistryError),

    #[error("bridge error: {0}")]
    Bridge(#[from] BridgeError),

    #[error("chain error: {0}")]
    Chain(#[from] ChainStoreError),

    /// None of the borrowed write keys is trusted by the partition.
    #[error("no trusted write key available to merge {id} as {alias}")]
    NoWriteKey { id: Uuid, alias: String },
}

/// Result alias for maintenance operations.
pub type MaintenanceResult<T> = std::result::Result<T, MaintenanceError>;
