use std::collections::HashSet;
use std::sync::Arc;

use strata_crypto::Rights;
use strata_partition::{ExpiryPolicy, TtlCache};
use strata_types::{Clock, DataObject, PartitionKey};
use tracing::{debug, trace};
use uuid::Uuid;

use crate::config::ResolverConfig;
use crate::context::{HeadLookup, ResolveContext};
use crate::error::{ResolveError, ResolveResult};
use crate::mapper::RootMapper;

/// Maps data objects to the partition of their root.
///
/// Resolution is a pure function of the object and the context, so
/// concurrent resolutions of the same object are not coordinated; the
/// memoizing cache absorbs the duplicate work. Cached keys are never
/// invalidated when a partition is evicted and go stale only within the
/// cache's TTL and size bound.
pub struct PartitionResolver {
    config: ResolverConfig,
    parent_free: HashSet<String>,
    root_mapper: Arc<dyn RootMapper>,
    heads: Arc<dyn HeadLookup>,
    cache: TtlCache<Uuid, PartitionKey>,
}

impl PartitionResolver {
    pub fn new(
        config: ResolverConfig,
        root_mapper: Arc<dyn RootMapper>,
        heads: Arc<dyn HeadLookup>,
        clock: Arc<dyn Clock>,
    ) -> Self {
        let cache = TtlCache::new(
            config.cache_max_entries,
            config.cache_ttl(),
            ExpiryPolicy::AfterAccess,
            clock,
        );
        let parent_free = config.parent_free_types.iter().cloned().collect();
        Self {
            config,
            parent_free,
            root_mapper,
            heads,
            cache,
        }
    }

    /// Whether objects of `type_name` may exist without a parent.
    pub fn is_parent_free(&self, type_name: &str) -> bool {
        self.parent_free.contains(type_name)
    }

    /// Resolve the partition `object` belongs to.
    pub fn resolve(&self, object: &DataObject, ctx: ResolveContext<'_>) -> ResolveResult<PartitionKey> {
        if let Some(key) = &object.partition_key {
            return Ok(key.clone());
        }
        if let Some(key) = self.cache.get(&object.id) {
            return Ok(key);
        }

        let key = self.walk(object, ctx)?;
        self.cache.insert(object.id, key.clone());
        debug!(id = %object.id, partition = %key, "resolved partition");
        Ok(key)
    }

    /// Resolve the partition of a rights holder.
    ///
    /// Holders backed by a data object resolve like that object. Holders
    /// bound to a partition (such as the maintenance principal) return it.
    pub fn resolve_rights(&self, rights: &dyn Rights, ctx: ResolveContext<'_>) -> ResolveResult<PartitionKey> {
        if let Some(object) = rights.as_data_object() {
            return self.resolve(object, ctx);
        }
        rights.partition_key().ok_or_else(|| ResolveError::UnsupportedRights {
            alias: rights.rights_alias(),
        })
    }

    /// Forget the cached partition of `id`.
    pub fn invalidate(&self, id: &Uuid) {
        self.cache.remove(id);
    }

    pub fn cached_len(&self) -> usize {
        self.cache.len()
    }

    fn walk(&self, start: &DataObject, ctx: ResolveContext<'_>) -> ResolveResult<PartitionKey> {
        let mut visited = HashSet::new();
        let mut current = start.clone();

        loop {
            if visited.len() > self.config.max_depth {
                return Err(ResolveError::DepthExceeded {
                    id: start.id,
                    max_depth: self.config.max_depth,
                });
            }
            if !visited.insert(current.id) {
                return Err(ResolveError::Cycle {
                    id: start.id,
                    repeated: current.id,
                });
            }

            if let Some(key) = &current.partition_key {
                return Ok(key.clone());
            }
            if let Some(key) = self.cache.get(&current.id) {
                return Ok(key);
            }

            let Some(parent_id) = current.parent_id else {
                if !self.is_parent_free(&current.type_name) {
                    return Err(ResolveError::NotPermittedRoot {
                        id: current.id,
                        type_name: current.type_name.clone(),
                    });
                }
                return Ok(self.root_mapper.map_root(&current.id));
            };

            if let Some(key) = self.cache.get(&parent_id) {
                return Ok(key);
            }

            match ctx.objects.get_or_null(&parent_id) {
                Some(parent) => {
                    trace!(id = %current.id, %parent_id, "following parent from request cache");
                    current = parent;
                }
                None => return self.search_scopes(start, parent_id, ctx),
            }
        }
    }

    /// Find the partition holding `parent_id` when the parent is not at hand.
    fn search_scopes(&self, start: &DataObject, parent_id: Uuid, ctx: ResolveContext<'_>) -> ResolveResult<PartitionKey> {
        // Scan order over active partitions is unspecified.
        for key in ctx.staging.active_partitions() {
            if self.heads.exists(&key, &parent_id) || ctx.staging.is_staged(&key, &parent_id) {
                return Ok(key);
            }
        }

        if let Some(key) = ctx.scope.current_scope() {
            if self.heads.exists(&key, &parent_id) {
                return Ok(key);
            }
        }

        for key in ctx.scope.other_scopes() {
            if self.heads.exists(&key, &parent_id) {
                return Ok(key);
            }
        }

        Err(ResolveError::Unreachable {
            id: start.id,
            parent_id,
        })
    }
}

impl std::fmt::Debug for PartitionResolver {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PartitionResolver")
            .field("parent_free", &self.parent_free)
            .field("cached", &self.cache.len())
            .field("max_depth", &self.config.max_depth)
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::context::RequestScope;
    use crate::mapper::HashRootMapper;
    use dashmap::DashSet;
    use proptest::prelude::*;
    use serde_json::json;
    use std::time::Duration;
    use strata_crypto::{KeyPair, RightsSet};
    use strata_types::ManualClock;

    /// Committed objects per partition.
    #[derive(Default)]
    struct FakeHeads {
        committed: DashSet<(PartitionKey, Uuid)>,
    }

    impl FakeHeads {
        fn commit(&self, key: &PartitionKey, id: Uuid) {
            self.committed.insert((key.clone(), id));
        }
    }

    impl HeadLookup for FakeHeads {
        fn exists(&self, partition: &PartitionKey, id: &Uuid) -> bool {
            self.committed.contains(&(partition.clone(), *id))
        }
    }

    struct Fixture {
        resolver: PartitionResolver,
        mapper: HashRootMapper,
        heads: Arc<FakeHeads>,
        clock: Arc<ManualClock>,
    }

    fn fixture(config: ResolverConfig) -> Fixture {
        let config = ResolverConfig {
            parent_free_types: vec!["Account".to_string()],
            ..config
        };
        let mapper = HashRootMapper::new(config.topic.clone(), config.partitions);
        let heads = Arc::new(FakeHeads::default());
        let clock = Arc::new(ManualClock::starting_now());
        let resolver = PartitionResolver::new(
            config,
            Arc::new(mapper.clone()),
            heads.clone(),
            clock.clone(),
        );
        Fixture {
            resolver,
            mapper,
            heads,
            clock,
        }
    }

    #[test]
    fn self_describing_object_uses_its_key() {
        let f = fixture(ResolverConfig::default());
        let key = PartitionKey::new("special", 42);
        let obj = DataObject::root("Anything", json!({})).in_partition(key.clone());
        assert_eq!(f.resolver.resolve(&obj, RequestScope::new().context()).unwrap(), key);
    }

    #[test]
    fn parent_free_root_maps_by_id() {
        let f = fixture(ResolverConfig::default());
        let root = DataObject::root("Account", json!({}));
        let key = f.resolver.resolve(&root, RequestScope::new().context()).unwrap();
        assert_eq!(key, f.mapper.map_root(&root.id));
        assert_eq!(f.resolver.cached_len(), 1);
    }

    #[test]
    fn parentless_non_root_type_is_rejected() {
        let f = fixture(ResolverConfig::default());
        let orphan = DataObject::root("Invoice", json!({}));
        let err = f.resolver.resolve(&orphan, RequestScope::new().context()).unwrap_err();
        assert_eq!(
            err,
            ResolveError::NotPermittedRoot {
                id: orphan.id,
                type_name: "Invoice".into()
            }
        );
        assert_eq!(f.resolver.cached_len(), 0);
    }

    #[test]
    fn uncommitted_parent_found_in_request_cache() {
        let f = fixture(ResolverConfig::default());
        let root = DataObject::root("Account", json!({}));
        let child = DataObject::child_of(&root, "Invoice", json!({}));
        let scope = RequestScope::new();
        scope.remember(root.clone());

        let key = f.resolver.resolve(&child, scope.context()).unwrap();
        assert_eq!(key, f.mapper.map_root(&root.id));
    }

    #[test]
    fn cached_parent_short_circuits() {
        let f = fixture(ResolverConfig::default());
        let root = DataObject::root("Account", json!({}));
        let root_key = f.resolver.resolve(&root, RequestScope::new().context()).unwrap();

        let child = DataObject::child_of(&root, "Invoice", json!({}));
        assert_eq!(f.resolver.resolve(&child, RequestScope::new().context()).unwrap(), root_key);
    }

    #[test]
    fn parent_committed_in_active_partition() {
        let f = fixture(ResolverConfig::default());
        let key = PartitionKey::new("data", 5);
        let parent_id = Uuid::new_v4();
        f.heads.commit(&key, parent_id);
        let scope = RequestScope::new();
        scope.stage(key.clone(), Uuid::new_v4());

        let child = DataObject::with_parent(parent_id, "Invoice", json!({}));
        assert_eq!(f.resolver.resolve(&child, scope.context()).unwrap(), key);
    }

    #[test]
    fn parent_staged_in_active_partition() {
        let f = fixture(ResolverConfig::default());
        let key = PartitionKey::new("data", 2);
        let parent_id = Uuid::new_v4();
        let scope = RequestScope::new();
        scope.stage(key.clone(), parent_id);

        let child = DataObject::with_parent(parent_id, "Invoice", json!({}));
        assert_eq!(f.resolver.resolve(&child, scope.context()).unwrap(), key);
    }

    #[test]
    fn falls_back_to_current_then_other_scopes() {
        let f = fixture(ResolverConfig::default());
        let current = PartitionKey::new("data", 1);
        let other = PartitionKey::new("data", 6);

        let in_current = Uuid::new_v4();
        f.heads.commit(&current, in_current);
        let in_other = Uuid::new_v4();
        f.heads.commit(&other, in_other);

        let scope = RequestScope::in_partition(current.clone());
        scope.add_other_scope(other.clone());

        let a = DataObject::with_parent(in_current, "Invoice", json!({}));
        let b = DataObject::with_parent(in_other, "Invoice", json!({}));
        assert_eq!(f.resolver.resolve(&a, scope.context()).unwrap(), current);
        assert_eq!(f.resolver.resolve(&b, scope.context()).unwrap(), other);
    }

    #[test]
    fn unknown_parent_is_unreachable() {
        let f = fixture(ResolverConfig::default());
        let parent_id = Uuid::new_v4();
        let child = DataObject::with_parent(parent_id, "Invoice", json!({}));
        let scope = RequestScope::in_partition(PartitionKey::new("data", 0));

        let err = f.resolver.resolve(&child, scope.context()).unwrap_err();
        assert_eq!(err, ResolveError::Unreachable { id: child.id, parent_id });
    }

    #[test]
    fn cycles_are_detected() {
        let f = fixture(ResolverConfig::default());
        let a_id = Uuid::new_v4();
        let b = DataObject::with_parent(a_id, "Node", json!({}));
        let mut a = DataObject::with_parent(b.id, "Node", json!({}));
        a.id = a_id;
        let scope = RequestScope::new();
        scope.remember(a.clone());
        scope.remember(b.clone());

        let err = f.resolver.resolve(&a, scope.context()).unwrap_err();
        assert!(matches!(err, ResolveError::Cycle { .. }));
    }

    #[test]
    fn depth_limit_is_enforced() {
        let f = fixture(ResolverConfig {
            max_depth: 3,
            ..ResolverConfig::default()
        });
        let scope = RequestScope::new();
        let mut node = DataObject::root("Account", json!({}));
        scope.remember(node.clone());
        for _ in 0..5 {
            node = DataObject::child_of(&node, "Node", json!({}));
            scope.remember(node.clone());
        }

        let err = f.resolver.resolve(&node, scope.context()).unwrap_err();
        assert_eq!(err, ResolveError::DepthExceeded { id: node.id, max_depth: 3 });
    }

    #[test]
    fn cache_entries_expire_after_access_window() {
        let f = fixture(ResolverConfig::default());
        let root = DataObject::root("Account", json!({}));
        let child = DataObject::child_of(&root, "Invoice", json!({}));
        let scope = RequestScope::new();
        scope.remember(root.clone());
        f.resolver.resolve(&child, scope.context()).unwrap();

        f.clock.advance(Duration::from_secs(61));
        // Root no longer in scope and the cached key has expired.
        let err = f.resolver.resolve(&child, RequestScope::new().context()).unwrap_err();
        assert!(matches!(err, ResolveError::Unreachable { .. }));
    }

    #[test]
    fn rights_resolution() {
        let f = fixture(ResolverConfig::default());
        let root = DataObject::root("Account", json!({}));
        let owned = RightsSet::for_object(root.clone()).with_write_key(KeyPair::generate());
        assert_eq!(
            f.resolver.resolve_rights(&owned, RequestScope::new().context()).unwrap(),
            f.mapper.map_root(&root.id)
        );

        let detached = RightsSet::new("operator");
        let err = f
            .resolver
            .resolve_rights(&detached, RequestScope::new().context())
            .unwrap_err();
        assert_eq!(err, ResolveError::UnsupportedRights { alias: "operator".into() });
    }

    proptest! {
        #[test]
        fn descendants_resolve_to_their_root(depth in 1usize..64) {
            let f = fixture(ResolverConfig::default());
            let scope = RequestScope::new();
            let root = DataObject::root("Account", json!({}));
            scope.remember(root.clone());

            let mut chain = vec![root.clone()];
            for i in 0..depth {
                let child = DataObject::child_of(&chain[i], "Node", json!({"depth": i}));
                scope.remember(child.clone());
                chain.push(child);
            }

            let expected = f.resolver.resolve(&root, scope.context()).unwrap();
            for object in chain.iter().rev() {
                prop_assert_eq!(f.resolver.resolve(object, scope.context()).unwrap(), expected.clone());
            }
        }
    }
}
