//! Scenario topologies
//!
//! Scenarios compose orchestrated builds into the shapes the cluster is
//! validated against: the canonical two-replica nexus cycle and the
//! many-nexus scale topology. Each scenario tracks the identities it
//! allocates so teardown can be asserted exact, not approximate.

use crate::error::{Error, Result};
use crate::orchestrator::{
    BuildSpec, LifecycleOrchestrator, NexusSpec, PoolSpec, ReplicaSpec, check_size,
    tolerate_missing,
};
use nexio_control::uri::BdevUri;
use nexio_control::{ClusterHandleRegistry, NodeHandle, NodeId, NvmeSession};
use nexio_proto::control::{ChildState, NexusState};
use std::collections::HashSet;
use tracing::info;
use uuid::Uuid;

/// Replica UUID used by the canonical two-replica cycle. Replicas of
/// one volume share a UUID across nodes; uniqueness is per node.
pub const REPLICA_UUID: &str = "0000000-0000-0000-0000-000000000001";

/// Nexus UUID used by the canonical two-replica cycle
pub const NEXUS_UUID: &str = "3ae73410-6136-4430-a7b5-cbec9fe2d273";

const POOL_NAME: &str = "tpool";
const POOL_SIZE_MB: u64 = 100;
const REPLICA_SIZE_MB: u64 = 64;
const NULL_BLK_SIZE: u32 = 512;
const NULL_SIZE_MB: u64 = 100;
const NULL_NEXUS_SIZE_MB: u64 = 94;

/// Node roles for a scenario: two worker nodes holding the data, one
/// node hosting the nexus.
#[derive(Debug, Clone)]
pub struct ScenarioNodes {
    pub workers: [NodeId; 2],
    pub nexus: NodeId,
}

/// Runs scenario topologies against a cluster registry
pub struct ScenarioRunner<'a> {
    registry: &'a mut ClusterHandleRegistry,
}

impl<'a> ScenarioRunner<'a> {
    pub fn new(registry: &'a mut ClusterHandleRegistry) -> Self {
        Self { registry }
    }

    /// The canonical end-to-end cycle, repeated `iterations` times:
    /// a 100 MiB pool on each worker, one 64 MiB replica per pool, a
    /// nexus over both replicas on the third node, published, verified,
    /// then torn down to empty. With `attach` the published target is
    /// also exercised through the local NVMe initiator: discover,
    /// connect, disconnect.
    pub async fn two_replica_nexus(
        &mut self,
        nodes: &ScenarioNodes,
        iterations: u32,
        attach: bool,
    ) -> Result<()> {
        let spec = two_replica_spec(nodes);
        for iteration in 0..iterations {
            info!(iteration, "two-replica nexus cycle");
            let mut orchestrator = LifecycleOrchestrator::new(self.registry);

            let built = orchestrator.build(&spec).await?;
            orchestrator.verify_built(&spec).await?;

            // Fresh pools start at zero used, so the post-create counter
            // is also the create delta.
            for worker in &nodes.workers {
                let used = orchestrator.pool_used(worker, POOL_NAME).await?;
                check_size(0, used, REPLICA_SIZE_MB)?;
            }

            if attach {
                let target = built.device_uri.clone().ok_or_else(|| {
                    Error::Verification("published build returned no device URI".to_string())
                })?;
                let session = NvmeSession::new(target);
                session.discover()?;
                session.connect()?;
                session.disconnect();
            }

            orchestrator.teardown(&spec).await?;
        }
        Ok(())
    }

    /// Scale topology: `count` null-backed bdevs on each worker, shared
    /// and composed pairwise into `count` independent nexus instances
    /// on the third node, each published. Verifies no identity
    /// collisions, all states online, then tears everything down and
    /// asserts the involved nodes are empty.
    pub async fn null_scale(
        &mut self,
        nodes: &ScenarioNodes,
        count: usize,
        attach: bool,
    ) -> Result<()> {
        // Null bdevs per worker, shared over NVMe-oF. Creation URIs are
        // tracked verbatim; teardown destroys exactly these.
        let mut disk_uris = Vec::with_capacity(count);
        let mut shares: [Vec<String>; 2] = [Vec::with_capacity(count), Vec::with_capacity(count)];
        for i in 0..count {
            disk_uris.push(BdevUri::null(format!("null{i}"), NULL_BLK_SIZE, NULL_SIZE_MB));
        }
        for (w, worker) in nodes.workers.iter().enumerate() {
            let handle = self.registry.node(worker)?;
            for uri in &disk_uris {
                handle.bdev_create(uri).await?;
                shares[w].push(handle.bdev_share(uri.name()).await?);
            }
        }

        // One nexus per device pair, child order worker0 then worker1.
        let mut nexus_uuids = Vec::with_capacity(count);
        for i in 0..count {
            let uuid = Uuid::new_v4().to_string();
            let children = vec![shares[0][i].clone(), shares[1][i].clone()];
            self.registry
                .node(&nodes.nexus)?
                .nexus_create(&uuid, NULL_NEXUS_SIZE_MB << 20, &children)
                .await?;
            nexus_uuids.push(uuid);
        }

        let mut device_uris = Vec::with_capacity(count);
        for uuid in &nexus_uuids {
            device_uris.push(self.registry.node(&nodes.nexus)?.nexus_publish(uuid).await?);
        }
        let distinct: HashSet<String> = device_uris.iter().map(ToString::to_string).collect();
        if distinct.len() != count {
            return Err(Error::Verification(format!(
                "{count} published nexus instances share {} device URIs",
                distinct.len()
            )));
        }

        let listed = self.registry.node(&nodes.nexus)?.nexus_list().await?.len();
        if listed != count {
            return Err(Error::Verification(format!(
                "expected {count} nexus instances, listed {listed}"
            )));
        }
        check_nexus_states(self.registry.node(&nodes.nexus)?, NexusState::NexusOnline).await?;

        if attach {
            for target in &device_uris {
                let session = NvmeSession::new(target.clone());
                session.discover()?;
                session.connect()?;
            }
            for target in &device_uris {
                NvmeSession::new(target.clone()).disconnect();
            }
        }

        // Teardown, each destroy issued twice.
        for pass in 0..2u8 {
            let expect_missing = pass == 1;
            for uuid in &nexus_uuids {
                tolerate_missing(
                    self.registry.node(&nodes.nexus)?.nexus_destroy(uuid).await,
                    expect_missing,
                )?;
            }
            for worker in &nodes.workers {
                let handle = self.registry.node(worker)?;
                for uri in &disk_uris {
                    tolerate_missing(
                        handle.bdev_destroy(&uri.to_string()).await,
                        expect_missing,
                    )?;
                }
            }
        }

        let remaining = self.registry.node(&nodes.nexus)?.nexus_list().await?.len();
        if remaining != 0 {
            return Err(Error::Verification(format!(
                "{remaining} nexus instances remain after teardown"
            )));
        }
        let mut orchestrator = LifecycleOrchestrator::new(self.registry);
        orchestrator
            .verify_empty(
                [
                    nodes.workers[0].clone(),
                    nodes.workers[1].clone(),
                    nodes.nexus.clone(),
                ]
                .into(),
            )
            .await?;
        info!(count, "null scale cycle converged to empty");
        Ok(())
    }
}

/// The canonical two-replica build spec
#[must_use]
pub fn two_replica_spec(nodes: &ScenarioNodes) -> BuildSpec {
    BuildSpec {
        pools: nodes
            .workers
            .iter()
            .map(|node| PoolSpec {
                node: node.clone(),
                name: POOL_NAME.to_string(),
                disk: BdevUri::malloc("disk0", POOL_SIZE_MB),
            })
            .collect(),
        replicas: nodes
            .workers
            .iter()
            .map(|node| ReplicaSpec {
                node: node.clone(),
                pool: POOL_NAME.to_string(),
                uuid: REPLICA_UUID.to_string(),
                size: REPLICA_SIZE_MB << 20,
            })
            .collect(),
        nexus: NexusSpec {
            node: nodes.nexus.clone(),
            uuid: NEXUS_UUID.to_string(),
            size: REPLICA_SIZE_MB << 20,
            children: vec![0, 1],
        },
        publish: true,
    }
}

/// Assert every nexus on the node is in the expected state. For an
/// online nexus every child must be online too; a faulted nexus may
/// legitimately mix child states.
pub async fn check_nexus_states(handle: &mut NodeHandle, expected: NexusState) -> Result<()> {
    for nexus in handle.nexus_list().await? {
        if nexus.state != expected as i32 {
            return Err(Error::Verification(format!(
                "nexus {} is in state {}, expected {}",
                nexus.uuid,
                nexus.state,
                expected as i32
            )));
        }
        if expected == NexusState::NexusOnline {
            for child in &nexus.children {
                if child.state != ChildState::ChildOnline as i32 {
                    return Err(Error::Verification(format!(
                        "nexus {} child {} is not online",
                        nexus.uuid, child.uri
                    )));
                }
            }
        }
    }
    Ok(())
}
