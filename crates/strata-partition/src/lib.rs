//! Partition registry for Strata.
//!
//! The [`PartitionRegistry`] is the single owner of live [`Partition`]s.
//! It materializes a partition on first access (bridge, read-model preload,
//! trust key discovery), guarantees that concurrent requests for the same
//! key build it exactly once, and evicts partitions that exceed the size
//! bound or sit idle past their TTL.
//!
//! Lifecycle changes are published twice: as [`RegistryEvent`]s on a
//! broadcast channel and through registered [`PartitionListener`]s.

pub mod cache;
pub mod config;
pub mod discovery;
pub mod error;
pub mod event;
pub mod partition;
pub mod registry;

pub use cache::{ExpiryPolicy, TtlCache};
pub use config::RegistryConfig;
pub use discovery::{KeyDiscovery, StaticKeyDiscovery};
pub use error::{RegistryError, RegistryResult};
pub use event::{PartitionListener, RegistryEvent, RemovalCause};
pub use partition::Partition;
pub use registry::PartitionRegistry;
