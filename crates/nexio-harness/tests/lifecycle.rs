//! Orchestrator lifecycle tests against a simulated cluster

mod common;

use common::{node, start_cluster, three_nodes};
use nexio_control::Error as ControlError;
use nexio_control::uri::BdevUri;
use nexio_harness::{
    BuildSpec, Error, LifecycleOrchestrator, NexusSpec, PoolSpec, ReplicaSpec, check_size,
    two_replica_spec,
};

#[tokio::test]
async fn build_creates_the_expected_cluster_state() {
    let mut cluster = start_cluster(&["ms1", "ms2", "ms3"]).await;
    let spec = two_replica_spec(&three_nodes());
    let mut orchestrator = LifecycleOrchestrator::new(&mut cluster.registry);

    let built = orchestrator.build(&spec).await.unwrap();
    assert_eq!(built.children.len(), 2);
    let device_uri = built.device_uri.expect("publish was requested");
    assert!(device_uri.nqn().contains(nexio_harness::NEXUS_UUID));

    orchestrator.verify_built(&spec).await.unwrap();

    // disk + shared replica on each worker, just the nexus on ms3
    let mut worker_counts = Vec::new();
    for name in ["ms1", "ms2", "ms3"] {
        let handle = cluster.registry.node(&node(name)).unwrap();
        worker_counts.push(handle.bdev_list().await.unwrap().len());
    }
    assert_eq!(worker_counts, [2, 2, 1]);
}

#[tokio::test]
async fn nexus_preserves_child_order() {
    let mut cluster = start_cluster(&["ms1", "ms2", "ms3"]).await;
    let nodes = three_nodes();
    let mut spec = two_replica_spec(&nodes);
    // reverse the caller's child order; it must come back reversed
    spec.nexus.children = vec![1, 0];

    let mut orchestrator = LifecycleOrchestrator::new(&mut cluster.registry);
    let built = orchestrator.build(&spec).await.unwrap();

    let listed = cluster
        .registry
        .node(&nodes.nexus)
        .unwrap()
        .nexus_list()
        .await
        .unwrap();
    let children: Vec<String> = listed[0].children.iter().map(|c| c.uri.clone()).collect();
    assert_eq!(children, built.children);
    // child 0 of the nexus now lives on ms2
    let ms2_port: u16 = cluster.servers[1].addr().rsplit(':').next().unwrap().parse().unwrap();
    assert!(children[0].contains(&format!(":{ms2_port}")));
}

#[tokio::test]
async fn pool_accounting_tracks_replica_lifecycle() {
    let mut cluster = start_cluster(&["ms1"]).await;
    let ms1 = node("ms1");
    let handle = cluster.registry.node(&ms1).unwrap();

    handle
        .pool_create("tpool", &BdevUri::malloc("disk0", 100))
        .await
        .unwrap();

    let mut orchestrator = LifecycleOrchestrator::new(&mut cluster.registry);
    let before = orchestrator.pool_used(&ms1, "tpool").await.unwrap();
    assert_eq!(before, 0);

    cluster
        .registry
        .node(&ms1)
        .unwrap()
        .replica_create("tpool", "r1", 64 << 20)
        .await
        .unwrap();

    let mut orchestrator = LifecycleOrchestrator::new(&mut cluster.registry);
    let after = orchestrator.pool_used(&ms1, "tpool").await.unwrap();
    check_size(before, after, 64).unwrap();

    cluster
        .registry
        .node(&ms1)
        .unwrap()
        .replica_destroy("r1")
        .await
        .unwrap();

    let mut orchestrator = LifecycleOrchestrator::new(&mut cluster.registry);
    let emptied = orchestrator.pool_used(&ms1, "tpool").await.unwrap();
    check_size(after, emptied, 64).unwrap();
    assert_eq!(emptied, before);
}

#[tokio::test]
async fn replica_create_respects_pool_capacity() {
    let mut cluster = start_cluster(&["ms1"]).await;
    let handle = cluster.registry.node(&node("ms1")).unwrap();

    handle
        .pool_create("tpool", &BdevUri::malloc("disk0", 100))
        .await
        .unwrap();
    handle
        .replica_create("tpool", "r1", 64 << 20)
        .await
        .unwrap();

    // 36 MiB free; a second 64 MiB replica cannot fit
    let err = handle
        .replica_create("tpool", "r2", 64 << 20)
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::InvalidArgument(_)));
}

#[tokio::test]
async fn duplicate_creates_are_rejected() {
    let mut cluster = start_cluster(&["ms1"]).await;
    let handle = cluster.registry.node(&node("ms1")).unwrap();
    let disk = BdevUri::malloc("disk0", 100);

    handle.pool_create("tpool", &disk).await.unwrap();
    let err = handle.pool_create("tpool", &disk).await.unwrap_err();
    assert!(matches!(err, ControlError::AlreadyExists(_)));

    handle.replica_create("tpool", "r1", 8 << 20).await.unwrap();
    let err = handle
        .replica_create("tpool", "r1", 8 << 20)
        .await
        .unwrap_err();
    assert!(matches!(err, ControlError::AlreadyExists(_)));
}

#[tokio::test]
async fn destroy_of_absent_resources_reports_not_found() {
    let mut cluster = start_cluster(&["ms1"]).await;
    let handle = cluster.registry.node(&node("ms1")).unwrap();

    assert!(handle.pool_destroy("nope").await.unwrap_err().is_not_found());
    assert!(
        handle
            .replica_destroy("nope")
            .await
            .unwrap_err()
            .is_not_found()
    );
    assert!(handle.nexus_destroy("nope").await.unwrap_err().is_not_found());
    assert!(
        handle
            .nexus_publish("nope")
            .await
            .unwrap_err()
            .is_not_found()
    );
}

#[tokio::test]
async fn destroying_a_nexus_leaves_its_children_alone() {
    let mut cluster = start_cluster(&["ms1", "ms2", "ms3"]).await;
    let nodes = three_nodes();
    let spec = two_replica_spec(&nodes);
    let mut orchestrator = LifecycleOrchestrator::new(&mut cluster.registry);
    orchestrator.build(&spec).await.unwrap();

    cluster
        .registry
        .node(&nodes.nexus)
        .unwrap()
        .nexus_destroy(nexio_harness::NEXUS_UUID)
        .await
        .unwrap();

    // composition, not containment: both replicas still listed
    for worker in &nodes.workers {
        let handle = cluster.registry.node(worker).unwrap();
        assert_eq!(handle.replica_list().await.unwrap().len(), 1);
        assert_eq!(handle.bdev_list().await.unwrap().len(), 2);
    }
    let handle = cluster.registry.node(&nodes.nexus).unwrap();
    assert!(handle.bdev_list().await.unwrap().is_empty());
}

#[tokio::test]
async fn teardown_converges_to_empty_and_probes_idempotence() {
    let mut cluster = start_cluster(&["ms1", "ms2", "ms3"]).await;
    let spec = two_replica_spec(&three_nodes());
    let mut orchestrator = LifecycleOrchestrator::new(&mut cluster.registry);

    orchestrator.build(&spec).await.unwrap();
    // teardown itself destroys every resource twice and then asserts
    // pool and bdev lists are empty on every involved node
    orchestrator.teardown(&spec).await.unwrap();

    for name in ["ms1", "ms2", "ms3"] {
        let handle = cluster.registry.node(&node(name)).unwrap();
        assert!(handle.bdev_list().await.unwrap().is_empty());
        assert!(handle.pool_list().await.unwrap().is_empty());
        assert!(handle.replica_list().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn build_after_teardown_reuses_identities() {
    let mut cluster = start_cluster(&["ms1", "ms2", "ms3"]).await;
    let spec = two_replica_spec(&three_nodes());

    for _ in 0..3 {
        let mut orchestrator = LifecycleOrchestrator::new(&mut cluster.registry);
        orchestrator.build(&spec).await.unwrap();
        orchestrator.verify_built(&spec).await.unwrap();
        orchestrator.teardown(&spec).await.unwrap();
    }
}

#[tokio::test]
async fn failed_build_leaves_earlier_resources_for_inspection() {
    let mut cluster = start_cluster(&["ms1", "ms2", "ms3"]).await;
    let nodes = three_nodes();
    let mut spec = two_replica_spec(&nodes);
    // second replica cannot fit its pool
    spec.replicas[1].size = 200 << 20;

    let mut orchestrator = LifecycleOrchestrator::new(&mut cluster.registry);
    let err = orchestrator.build(&spec).await.unwrap_err();
    assert!(matches!(
        err,
        Error::Control(ControlError::InvalidArgument(_))
    ));

    // fail-fast without rollback: pools and the first replica remain
    let ms1 = cluster.registry.node(&nodes.workers[0]).unwrap();
    assert_eq!(ms1.pool_list().await.unwrap().len(), 1);
    assert_eq!(ms1.replica_list().await.unwrap().len(), 1);
    let ms2 = cluster.registry.node(&nodes.workers[1]).unwrap();
    assert_eq!(ms2.pool_list().await.unwrap().len(), 1);
    assert!(ms2.replica_list().await.unwrap().is_empty());
}

#[tokio::test]
async fn publish_is_repeatable_and_reversible() {
    let mut cluster = start_cluster(&["ms1", "ms2", "ms3"]).await;
    let nodes = three_nodes();
    let mut spec = two_replica_spec(&nodes);
    spec.publish = false;

    let built = LifecycleOrchestrator::new(&mut cluster.registry)
        .build(&spec)
        .await
        .unwrap();
    assert!(built.device_uri.is_none());

    let handle = cluster.registry.node(&nodes.nexus).unwrap();
    let first = handle.nexus_publish(nexio_harness::NEXUS_UUID).await.unwrap();
    // publishing a published nexus hands back the same target
    let second = handle.nexus_publish(nexio_harness::NEXUS_UUID).await.unwrap();
    assert_eq!(first, second);

    handle
        .nexus_unpublish(nexio_harness::NEXUS_UUID)
        .await
        .unwrap();
    let listed = handle.nexus_list().await.unwrap();
    assert_eq!(listed[0].device_uri, "");
}

#[tokio::test]
async fn spec_validation_rejects_unknown_pool_reference() {
    let mut cluster = start_cluster(&["ms1"]).await;
    let spec = BuildSpec {
        pools: vec![PoolSpec {
            node: node("ms1"),
            name: "tpool".to_string(),
            disk: BdevUri::malloc("disk0", 100),
        }],
        replicas: vec![ReplicaSpec {
            node: node("ms1"),
            pool: "other".to_string(),
            uuid: "r1".to_string(),
            size: 8 << 20,
        }],
        nexus: NexusSpec {
            node: node("ms1"),
            uuid: "n1".to_string(),
            size: 8 << 20,
            children: vec![0],
        },
        publish: false,
    };

    let mut orchestrator = LifecycleOrchestrator::new(&mut cluster.registry);
    let err = orchestrator.build(&spec).await.unwrap_err();
    assert!(matches!(err, Error::Spec(_)));

    // validation failed before any RPC went out
    let handle = cluster.registry.node(&node("ms1")).unwrap();
    assert!(handle.pool_list().await.unwrap().is_empty());
}
