//! Foundation types for Strata.
//!
//! This crate provides the identifiers and records shared by every other
//! Strata crate.
//!
//! # Key Types
//!
//! - [`PartitionKey`] -- Names a partition (topic + index) and how it is used
//! - [`TopicAndPartition`] -- Hashable map key derived from a [`PartitionKey`]
//! - [`DataObject`] -- A record in the parent/child forest that decides sharding
//! - [`Clock`] -- Injectable wall clock ([`SystemClock`], [`ManualClock`])

pub mod clock;
pub mod error;
pub mod object;
pub mod partition;

pub use clock::{Clock, ManualClock, SystemClock};
pub use error::TypeError;
pub use object::DataObject;
pub use partition::{PartitionKey, PartitionKind, TopicAndPartition};
