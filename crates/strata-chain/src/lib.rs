//! Chain-of-trust log for Strata partitions.
//!
//! Every partition owns one [`ChainStore`]. It provides:
//! - Signed data records ([`SignedRecord`]) authored by trusted keys only
//! - An append-only, hash-linked history of [`ChainEvent`]s
//! - Per-object [`DataContainer`]s that track concurrent versions and
//!   report when an object needs merging
//! - Tombstone events that physically remove an object's records

pub mod container;
pub mod error;
pub mod record;
pub mod store;

pub use container::DataContainer;
pub use error::{ChainStoreError, ChainStoreResult};
pub use record::{ChainEntry, ChainEvent, RecordDraft, SignedRecord, Version};
pub use store::{AppendOutcome, ChainStore, MergeHook};
