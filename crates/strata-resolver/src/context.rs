use std::sync::RwLock;

use dashmap::DashMap;
use strata_partition::PartitionRegistry;
use strata_types::{DataObject, PartitionKey};
use uuid::Uuid;

/// Objects already resident in the current request.
pub trait RequestCache: Send + Sync {
    fn get_or_null(&self, id: &Uuid) -> Option<DataObject>;
}

/// Partitions touched by the current request and the ids queued to be
/// written into each.
pub trait StagingView: Send + Sync {
    fn active_partitions(&self) -> Vec<PartitionKey>;

    fn is_staged(&self, partition: &PartitionKey, id: &Uuid) -> bool;
}

/// The caller's partition scopes.
pub trait ScopeProvider: Send + Sync {
    fn current_scope(&self) -> Option<PartitionKey>;

    fn other_scopes(&self) -> Vec<PartitionKey>;
}

/// Whether an object is committed in a partition.
pub trait HeadLookup: Send + Sync {
    fn exists(&self, partition: &PartitionKey, id: &Uuid) -> bool;
}

impl HeadLookup for PartitionRegistry {
    fn exists(&self, partition: &PartitionKey, id: &Uuid) -> bool {
        self.peek(partition)
            .is_some_and(|p| p.chain().exists(id))
    }
}

/// The request-scoped collaborators a resolution consults.
#[derive(Clone, Copy)]
pub struct ResolveContext<'a> {
    pub objects: &'a dyn RequestCache,
    pub staging: &'a dyn StagingView,
    pub scope: &'a dyn ScopeProvider,
}

impl<'a> ResolveContext<'a> {
    pub fn new(
        objects: &'a dyn RequestCache,
        staging: &'a dyn StagingView,
        scope: &'a dyn ScopeProvider,
    ) -> Self {
        Self { objects, staging, scope }
    }
}

/// State of one request: the objects it has seen, the writes it has staged,
/// and the partition scopes it runs in.
#[derive(Debug, Default)]
pub struct RequestScope {
    objects: DashMap<Uuid, DataObject>,
    staged: DashMap<PartitionKey, Vec<Uuid>>,
    current: RwLock<Option<PartitionKey>>,
    others: RwLock<Vec<PartitionKey>>,
}

impl RequestScope {
    pub fn new() -> Self {
        Self::default()
    }

    /// A scope whose current partition is `key`.
    pub fn in_partition(key: PartitionKey) -> Self {
        let scope = Self::default();
        scope.set_current_scope(Some(key));
        scope
    }

    /// Make `object` resolvable as a parent within this request.
    pub fn remember(&self, object: DataObject) {
        self.objects.insert(object.id, object);
    }

    /// Queue `id` for writing into `partition`.
    pub fn stage(&self, partition: PartitionKey, id: Uuid) {
        let mut ids = self.staged.entry(partition).or_default();
        if !ids.contains(&id) {
            ids.push(id);
        }
    }

    /// Drop everything staged for `partition`.
    pub fn clear_staged(&self, partition: &PartitionKey) {
        self.staged.remove(partition);
    }

    pub fn set_current_scope(&self, key: Option<PartitionKey>) {
        *self.current.write().expect("scope lock poisoned") = key;
    }

    pub fn add_other_scope(&self, key: PartitionKey) {
        let mut others = self.others.write().expect("scope lock poisoned");
        if !others.contains(&key) {
            others.push(key);
        }
    }

    pub fn context(&self) -> ResolveContext<'_> {
        ResolveContext::new(self, self, self)
    }
}

impl RequestCache for RequestScope {
    fn get_or_null(&self, id: &Uuid) -> Option<DataObject> {
        self.objects.get(id).map(|o| o.clone())
    }
}

impl StagingView for RequestScope {
    fn active_partitions(&self) -> Vec<PartitionKey> {
        self.staged.iter().map(|e| e.key().clone()).collect()
    }

    fn is_staged(&self, partition: &PartitionKey, id: &Uuid) -> bool {
        self.staged
            .get(partition)
            .is_some_and(|ids| ids.contains(id))
    }
}

impl ScopeProvider for RequestScope {
    fn current_scope(&self) -> Option<PartitionKey> {
        self.current.read().expect("scope lock poisoned").clone()
    }

    fn other_scopes(&self) -> Vec<PartitionKey> {
        self.others.read().expect("scope lock poisoned").clone()
    }
}
