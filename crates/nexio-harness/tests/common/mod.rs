//! Shared test support: an in-process simulated cluster

use nexio_control::{ClusterHandleRegistry, ClusterTopology, NodeId};
use nexio_harness::ScenarioNodes;
use nexio_sim::SimServer;

/// A running simulated cluster plus a ready registry over it.
///
/// Servers shut down on drop, after the registry.
pub struct SimCluster {
    pub registry: ClusterHandleRegistry,
    pub servers: Vec<SimServer>,
}

/// Start one sim node per name and connect a registry to all of them
pub async fn start_cluster(names: &[&str]) -> SimCluster {
    let mut servers = Vec::with_capacity(names.len());
    let mut pairs = Vec::with_capacity(names.len());
    for name in names {
        let server = SimServer::start().await.expect("bind sim node");
        pairs.push(((*name).to_string(), server.addr()));
        servers.push(server);
    }
    let topology = ClusterTopology::new(pairs);
    let registry = ClusterHandleRegistry::connect(&topology)
        .await
        .expect("cluster should become ready");
    SimCluster { registry, servers }
}

pub fn node(name: &str) -> NodeId {
    NodeId::new(name).unwrap()
}

/// The standard three-node layout: data on ms1/ms2, nexus on ms3
pub fn three_nodes() -> ScenarioNodes {
    ScenarioNodes {
        workers: [node("ms1"), node("ms2")],
        nexus: node("ms3"),
    }
}
