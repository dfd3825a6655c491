//! Backing log bridges for Strata partitions.
//!
//! A bridge connects one partition's [`ChainStore`](strata_chain::ChainStore)
//! to the log that stores it durably. Two modes are provided:
//!
//! - [`RamBridgeBuilder`] -- writes go straight to the chain and are mirrored
//!   in a [`RamRepository`], which doubles as the read-model used to
//!   pre-load a partition that is created again after eviction
//! - [`LogBridgeBuilder`] -- one CRC-framed [`PartitionLog`] file per
//!   partition, replayed on a background thread when the partition opens
//!
//! Core logic only sees the [`BridgeBuilder`] and [`PartitionBridge`] traits.

pub mod config;
pub mod error;
pub mod log;
pub mod memory;
pub mod traits;
pub mod wal;

pub use config::{BridgeConfig, BridgeMode};
pub use error::{BridgeError, BridgeResult};
pub use log::{LogBridge, LogBridgeBuilder};
pub use memory::{RamBridge, RamBridgeBuilder, RamRepository};
pub use traits::{BridgeBuilder, LoadState, PartitionBridge, ReadModel};
pub use wal::{PartitionLog, SyncMode};
