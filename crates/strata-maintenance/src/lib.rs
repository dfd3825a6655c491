//! Maintenance daemon for Strata.
//!
//! Deletions and conflict merges are not applied when they are requested.
//! Writers schedule them with an expiry one maintenance window in the
//! future; the [`MaintenanceDaemon`] applies whatever has expired on each
//! pass over the live partitions. Merges are committed with keys that
//! writers lent to the partition's [`MaintenanceState`].
//!
//! One background task runs every pass sequentially. Passes are separated
//! by a randomized pause so replicas do not merge in lock-step.

pub mod authorizer;
pub mod config;
pub mod daemon;
pub mod error;
pub mod state;

pub use authorizer::{AllowAll, Authorizer, TrustedKeyAuthorizer};
pub use config::MaintenanceConfig;
pub use daemon::{MaintenanceDaemon, TickReport};
pub use error::{MaintenanceError, MaintenanceResult};
pub use state::{MaintenanceState, StateTable};
