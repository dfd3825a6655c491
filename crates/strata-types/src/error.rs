use thiserror::Error;

/// Errors produced by type operations.
#[derive(Debug, Error, PartialEq, Eq)]
pub enum TypeError {
    #[error("invalid partition key: {0}")]
    InvalidPartitionKey(String),

    #[error("invalid object id: {0}")]
    InvalidObjectId(String),

    #[error("serialization error: {0}")]
    Serialization(String),
}
