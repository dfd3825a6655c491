//! Partition resolution for Strata.
//!
//! Every object lives in the partition of the root of its tree. The
//! [`PartitionResolver`] finds that partition by walking parent links
//! iteratively, using a memoizing cache, the request's own objects, staged
//! writes, and the caller's partition scopes to bridge gaps where a parent
//! is not at hand. Roots are mapped to partitions by a [`RootMapper`].

pub mod config;
pub mod context;
pub mod error;
pub mod mapper;
pub mod resolver;

pub use config::ResolverConfig;
pub use context::{HeadLookup, RequestCache, RequestScope, ResolveContext, ScopeProvider, StagingView};
pub use error::{ResolveError, ResolveResult};
pub use mapper::{HashRootMapper, RootMapper};
pub use resolver::PartitionResolver;
