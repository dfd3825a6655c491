use uuid::Uuid;

/// Resolution failures. All are configuration errors: retrying the same
/// object in the same context fails the same way.
#[derive(Clone, Debug, PartialEq, Eq, thiserror::Error)]
pub enum ResolveError {
    /// A parentless object whose type may not act as a root.
    #[error("{type_name} {id} is not attached to a valid root type")]
    NotPermittedRoot { id: Uuid, type_name: String },

    /// The parent chain could not be followed to any known partition.
    #[error("unable to traverse up the tree from {id}: parent {parent_id} not found in any partition scope")]
    Unreachable { id: Uuid, parent_id: Uuid },

    /// The parent chain is longer than the configured limit.
    #[error("parent chain of {id} exceeds {max_depth} hops")]
    DepthExceeded { id: Uuid, max_depth: usize },

    /// The parent chain loops back on itself.
    #[error("parent chain of {id} contains a cycle at {repeated}")]
    Cycle { id: Uuid, repeated: Uuid },

    /// A rights holder that is neither a data object nor bound to a partition.
    #[error("cannot determine the partition for rights holder {alias}")]
    UnsupportedRights { alias: String },
}

/// Result alias for resolution.
pub type ResolveResult<T> = std::result::Result<T, ResolveError>;
