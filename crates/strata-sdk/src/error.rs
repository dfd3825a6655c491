use thiserror::Error;

#[derive(Debug, Error)]
pub enum SdkError {
    #[error("invalid configuration: {0}")]
    Config(String),

    #[error("{alias} holds no write key trusted by partition {partition}")]
    NoWriteKey { alias: String, partition: String },

    #[error("resolve error: {0}")]
    Resolve(#[from] strata_resolver::ResolveError),

    #[error("registry error: {0}")]
    Registry(#[from] strata_partition::RegistryError),

    #[error("bridge error: {0}")]
    Bridge(#[from] strata_bridge::BridgeError),

    #[error("chain error: {0}")]
    Chain(#[from] strata_chain::ChainStoreError),

    #[error("maintenance error: {0}")]
    Maintenance(#[from] strata_maintenance::MaintenanceError),

    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),
}

pub type SdkResult<T> = Result<T, SdkError>;
