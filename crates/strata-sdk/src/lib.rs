//! High-level SDK for Strata.
//!
//! Ties the partition resolver, the partition registry and the maintenance
//! daemon into one [`Repository`]. This is the main entry point for
//! applications embedding a Strata node.

pub mod config;
pub mod error;
pub mod repository;

pub use config::NodeConfig;
pub use error::{SdkError, SdkResult};
pub use repository::{Repository, WriteReceipt};

// Re-export key types
pub use strata_bridge::BridgeMode;
pub use strata_chain::{DataContainer, SignedRecord, Version};
pub use strata_crypto::{KeyPair, Rights, RightsSet};
pub use strata_resolver::RequestScope;
pub use strata_types::{DataObject, PartitionKey};
