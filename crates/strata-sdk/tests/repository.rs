use std::sync::Arc;
use std::time::Duration;

use serde_json::json;
use strata_chain::RecordDraft;
use strata_partition::{RegistryEvent, RemovalCause, StaticKeyDiscovery};
use strata_resolver::ResolveError;
use strata_types::ManualClock;
use strata_sdk::{
    BridgeMode, DataObject, KeyPair, NodeConfig, PartitionKey, Repository, RequestScope, RightsSet,
    SdkError,
};

fn config() -> NodeConfig {
    let mut config = NodeConfig::default();
    config.resolver.parent_free_types = vec!["Account".into()];
    config.maintenance.pause_ms = 5;
    config.maintenance.jitter_ms = 0;
    config
}

fn open(config: NodeConfig, kp: &KeyPair) -> Repository {
    Repository::open(
        config,
        Arc::new(StaticKeyDiscovery::new(vec![kp.verifying_key().clone()])),
    )
    .unwrap()
}

fn rights(kp: &KeyPair) -> RightsSet {
    RightsSet::new("alice").with_write_key(kp.clone())
}

#[tokio::test]
async fn descendants_share_the_root_partition() {
    let kp = KeyPair::generate();
    let repo = open(config(), &kp);
    let scope = RequestScope::new();

    let root = DataObject::root("Account", json!({"name": "alice"}));
    let mut chain = vec![root.clone()];
    for depth in 0..6 {
        let parent = chain.last().unwrap().clone();
        chain.push(DataObject::child_of(&parent, "Entry", json!({"depth": depth})));
    }

    let root_key = repo.write(&root, &rights(&kp), &scope).await.unwrap().partition;
    for object in &chain[1..] {
        let receipt = repo.write(object, &rights(&kp), &scope).await.unwrap();
        assert_eq!(receipt.partition, root_key);
    }

    // A fresh request finds the committed parent through the caller's scope.
    let later = RequestScope::in_partition(root_key.clone());
    let leaf = DataObject::child_of(chain.last().unwrap(), "Entry", json!({}));
    assert_eq!(repo.partition_of(&leaf, &later).unwrap(), root_key);
}

#[tokio::test]
async fn child_resolves_before_root_is_committed() {
    let kp = KeyPair::generate();
    let repo = open(config(), &kp);
    let scope = RequestScope::new();

    let root = DataObject::root("Account", json!({}));
    let child = DataObject::child_of(&root, "Order", json!({}));
    scope.remember(root.clone());

    let key = repo.partition_of(&child, &scope).unwrap();
    assert_eq!(key, repo.partition_of(&root, &RequestScope::new()).unwrap());
    assert!(repo.read_at(&key, &root.id).await.unwrap().is_none());
}

#[tokio::test]
async fn orphan_and_unreachable_objects_fail() {
    let kp = KeyPair::generate();
    let repo = open(config(), &kp);
    let scope = RequestScope::new();

    let orphan = DataObject::root("Order", json!({}));
    let err = repo.write(&orphan, &rights(&kp), &scope).await.unwrap_err();
    assert!(matches!(err, SdkError::Resolve(ResolveError::NotPermittedRoot { .. })));

    let stray = DataObject::with_parent(uuid::Uuid::new_v4(), "Order", json!({}));
    let err = repo.write(&stray, &rights(&kp), &scope).await.unwrap_err();
    assert!(matches!(err, SdkError::Resolve(ResolveError::Unreachable { .. })));
}

#[tokio::test]
async fn tombstone_waits_for_maintenance() {
    let kp = KeyPair::generate();
    let repo = open(config(), &kp);
    let scope = RequestScope::new();
    let obj = DataObject::root("Account", json!({}));
    repo.write(&obj, &rights(&kp), &scope).await.unwrap();

    let key = repo.remove(&obj, &rights(&kp), &scope).await.unwrap();
    assert!(repo.read(&obj, &scope).await.unwrap().is_some());

    repo.force_maintenance().await.unwrap();
    assert!(repo.read(&obj, &scope).await.unwrap().is_none());
    assert_eq!(repo.daemon().state(&key).unwrap().pending_tombstones(), 0);
    repo.close().await;
}

#[tokio::test]
async fn tombstone_survives_idle_timeout() {
    let kp = KeyPair::generate();
    let clock = Arc::new(ManualClock::starting_now());
    let repo = Repository::open_with_clock(
        config(),
        Arc::new(StaticKeyDiscovery::new(vec![kp.verifying_key().clone()])),
        clock.clone(),
    )
    .unwrap();
    let scope = RequestScope::new();
    let obj = DataObject::root("Account", json!({}));
    repo.write(&obj, &rights(&kp), &scope).await.unwrap();
    let key = repo.remove(&obj, &rights(&kp), &scope).await.unwrap();

    // Idle past the registry timeout while the deletion is pending.
    clock.advance(Duration::from_secs(61));
    repo.force_maintenance().await.unwrap();

    assert_eq!(repo.daemon().state(&key).unwrap().pending_tombstones(), 0);
    assert!(repo.read(&obj, &scope).await.unwrap().is_none());
    repo.close().await;
}

#[tokio::test]
async fn conflicts_are_merged_with_lent_rights() {
    let kp = KeyPair::generate();
    let repo = open(config(), &kp);
    let scope = RequestScope::new();
    let mut obj = DataObject::root("Account", json!({"n": 0}));
    let base = repo.write(&obj, &rights(&kp), &scope).await.unwrap();

    // Two replicas edit the same version concurrently.
    let partition = repo.registry().peek(&base.partition).unwrap();
    for side in ["left", "right"] {
        obj.payload = json!({ "n": side });
        let record = RecordDraft::for_object(&obj, vec![base.version])
            .unwrap()
            .sign(&kp)
            .unwrap();
        partition.bridge().write(record).unwrap();
    }
    assert!(partition.chain().requires_merge(&obj.id));

    repo.force_maintenance().await.unwrap();
    let data = repo.read(&obj, &scope).await.unwrap().unwrap();
    assert!(!data.requires_merge());
    repo.close().await;
}

#[tokio::test]
async fn resolved_conflict_needs_no_merge() {
    let kp = KeyPair::generate();
    let repo = open(config(), &kp);
    let scope = RequestScope::new();
    let mut obj = DataObject::root("Account", json!({"n": 0}));
    let base = repo.write(&obj, &rights(&kp), &scope).await.unwrap();

    let partition = repo.registry().peek(&base.partition).unwrap();
    for side in ["left", "right"] {
        obj.payload = json!({ "n": side });
        let record = RecordDraft::for_object(&obj, vec![base.version])
            .unwrap()
            .sign(&kp)
            .unwrap();
        partition.bridge().write(record).unwrap();
    }
    // A direct write supersedes both heads before the window passes.
    let fixed = repo.write(&obj, &rights(&kp), &scope).await.unwrap();
    assert!(!fixed.conflict);

    let history = partition.chain().history_len();
    repo.force_maintenance().await.unwrap();
    assert_eq!(partition.chain().history_len(), history);
    repo.close().await;
}

#[tokio::test]
async fn single_partition_registry_evicts_before_creating() {
    let kp = KeyPair::generate();
    let mut config = config();
    config.registry.max_partitions = 1;
    let repo = open(config, &kp);
    let mut events = repo.registry().subscribe();

    let a = PartitionKey::new("data", 0);
    let b = PartitionKey::new("data", 1);
    repo.read_at(&a, &uuid::Uuid::new_v4()).await.unwrap();
    repo.daemon().tombstone(&a, "k1");
    repo.read_at(&b, &uuid::Uuid::new_v4()).await.unwrap();

    let mut seen = Vec::new();
    while let Ok(event) = events.try_recv() {
        seen.push(event);
    }
    let unsubscribed = seen
        .iter()
        .position(|e| matches!(e, RegistryEvent::Unsubscribed { partition, cause: RemovalCause::Size } if *partition == a))
        .unwrap();
    let loading_b = seen
        .iter()
        .position(|e| matches!(e, RegistryEvent::Loading { partition } if *partition == b))
        .unwrap();
    assert!(unsubscribed < loading_b);
    assert!(repo.daemon().state(&a).is_none());
}

#[tokio::test]
async fn log_mode_survives_restart() {
    let dir = tempfile::tempdir().unwrap();
    let kp = KeyPair::generate();
    let mut config = config();
    config.bridge.mode = BridgeMode::Log;
    config.bridge.log_dir = dir.path().to_path_buf();

    let obj = DataObject::root("Account", json!({"name": "alice"}));
    let key = {
        let repo = open(config.clone(), &kp);
        let receipt = repo
            .write(&obj, &rights(&kp), &RequestScope::new())
            .await
            .unwrap();
        repo.close().await;
        receipt.partition
    };

    let repo = open(config, &kp);
    let data = repo.read_at(&key, &obj.id).await.unwrap().unwrap();
    assert_eq!(data.latest().unwrap().payload_json().unwrap(), json!({"name": "alice"}));
    repo.close().await;
}
