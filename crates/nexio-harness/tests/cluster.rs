//! Registry construction and lookup tests

mod common;

use common::{node, start_cluster};
use nexio_control::{ClusterHandleRegistry, ClusterTopology, Error};

#[tokio::test]
async fn registry_serves_every_topology_node() {
    let mut cluster = start_cluster(&["ms1", "ms2", "ms3"]).await;
    assert_eq!(cluster.registry.len(), 3);

    let ids = cluster.registry.node_ids();
    assert_eq!(ids, vec![node("ms1"), node("ms2"), node("ms3")]);

    for id in ids {
        let handle = cluster.registry.node(&id).unwrap();
        assert!(handle.bdev_list().await.unwrap().is_empty());
        assert!(handle.pool_list().await.unwrap().is_empty());
    }
}

#[tokio::test]
async fn registry_rejects_unknown_nodes() {
    let mut cluster = start_cluster(&["ms1"]).await;
    let err = cluster.registry.node(&node("ms9")).unwrap_err();
    assert!(matches!(err, Error::NodeUnknown(_)));
}

#[tokio::test]
async fn registry_is_all_or_nothing() {
    // one sound node plus one unusable endpoint: no registry at all
    let good = nexio_sim::SimServer::start().await.unwrap();
    let topology =
        ClusterTopology::new([("ms1", good.addr()), ("ms2", "not a valid endpoint".to_string())]);

    let err = ClusterHandleRegistry::connect(&topology).await.unwrap_err();
    match err {
        Error::PartialClusterUnavailable { node, .. } => assert_eq!(node, "ms2"),
        other => panic!("expected PartialClusterUnavailable, got {other}"),
    }
}

#[tokio::test]
async fn readiness_probe_waits_for_a_late_node() {
    use std::time::Duration;

    // reserve a port, then start connecting before anything listens on
    // it: the probe must keep retrying instead of failing
    let probe = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
    let addr = probe.local_addr().unwrap();
    drop(probe);

    let topology = ClusterTopology::new([("ms1", addr.to_string())]);
    let connect =
        tokio::spawn(async move { ClusterHandleRegistry::connect(&topology).await });

    tokio::time::sleep(Duration::from_millis(300)).await;
    let _server = nexio_sim::SimServer::start_at(addr).await.unwrap();

    let registry = tokio::time::timeout(Duration::from_secs(5), connect)
        .await
        .expect("registry should come up once the node listens")
        .unwrap()
        .unwrap();
    assert_eq!(registry.len(), 1);
}
