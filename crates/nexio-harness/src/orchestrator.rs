//! Dependency-ordered build and teardown of storage resources
//!
//! The orchestrator takes the full dependency graph up front as a
//! [`BuildSpec`] and enforces pool → replica → nexus ordering
//! internally, instead of leaving the ordering to caller discipline.
//! Build is fail-fast without rollback: a failed step leaves earlier
//! steps' resources in place for inspection. Teardown runs the reverse
//! order and issues every destroy twice, because destroy is contracted
//! to be idempotent and the harness probes that on every run.

use crate::error::{Error, Result};
use nexio_control::uri::{BdevUri, TargetUri};
use nexio_control::{ClusterHandleRegistry, NodeId};
use nexio_proto::control::PoolState;
use std::collections::{BTreeMap, BTreeSet};
use tracing::info;

/// One pool to create on one node
#[derive(Debug, Clone)]
pub struct PoolSpec {
    pub node: NodeId,
    pub name: String,
    pub disk: BdevUri,
}

/// One replica to create on an already-built pool
#[derive(Debug, Clone)]
pub struct ReplicaSpec {
    pub node: NodeId,
    pub pool: String,
    pub uuid: String,
    pub size: u64,
}

/// The nexus composed over the spec's replicas
#[derive(Debug, Clone)]
pub struct NexusSpec {
    pub node: NodeId,
    pub uuid: String,
    pub size: u64,
    /// Indices into [`BuildSpec::replicas`]. The order given here
    /// becomes the nexus child order; it is never sorted.
    pub children: Vec<usize>,
}

/// Declarative build request: the whole dependency graph up front
#[derive(Debug, Clone)]
pub struct BuildSpec {
    pub pools: Vec<PoolSpec>,
    pub replicas: Vec<ReplicaSpec>,
    pub nexus: NexusSpec,
    /// Publish the nexus after creation and return its device URI
    pub publish: bool,
}

impl BuildSpec {
    /// Every node the spec touches, in name order
    #[must_use]
    pub fn nodes(&self) -> BTreeSet<NodeId> {
        let mut nodes: BTreeSet<NodeId> = BTreeSet::new();
        nodes.extend(self.pools.iter().map(|p| p.node.clone()));
        nodes.extend(self.replicas.iter().map(|r| r.node.clone()));
        nodes.insert(self.nexus.node.clone());
        nodes
    }

    fn validate(&self) -> Result<()> {
        for (i, replica) in self.replicas.iter().enumerate() {
            if !self
                .pools
                .iter()
                .any(|p| p.node == replica.node && p.name == replica.pool)
            {
                return Err(Error::Spec(format!(
                    "replica #{i} references pool {} on {}, which the spec does not create",
                    replica.pool, replica.node
                )));
            }
        }
        if self.nexus.children.is_empty() {
            return Err(Error::Spec("nexus lists no children".to_string()));
        }
        for &child in &self.nexus.children {
            if child >= self.replicas.len() {
                return Err(Error::Spec(format!(
                    "nexus child #{child} is out of range ({} replicas)",
                    self.replicas.len()
                )));
            }
        }
        Ok(())
    }
}

/// Result of a successful build
#[derive(Debug, Clone)]
pub struct BuiltVolume {
    /// Resolved child share URIs, in the spec's child order
    pub children: Vec<String>,
    /// Device URI of the published nexus, when publishing was requested
    pub device_uri: Option<TargetUri>,
}

/// Executes build and teardown against a cluster registry
pub struct LifecycleOrchestrator<'a> {
    registry: &'a mut ClusterHandleRegistry,
}

impl<'a> LifecycleOrchestrator<'a> {
    pub fn new(registry: &'a mut ClusterHandleRegistry) -> Self {
        Self { registry }
    }

    /// Execute the create chain: pools, then replicas, then the nexus,
    /// then optionally publish. Each step is a precondition for the
    /// next and the first failure propagates immediately.
    pub async fn build(&mut self, spec: &BuildSpec) -> Result<BuiltVolume> {
        spec.validate()?;

        for pool in &spec.pools {
            let created = self
                .registry
                .node(&pool.node)?
                .pool_create(&pool.name, &pool.disk)
                .await?;
            if created.state != PoolState::PoolOnline as i32 {
                return Err(Error::Verification(format!(
                    "pool {} on {} is not online after create",
                    pool.name, pool.node
                )));
            }
        }

        // Share URIs come back positionally aligned with spec.replicas.
        let mut shares = Vec::with_capacity(spec.replicas.len());
        for replica in &spec.replicas {
            let created = self
                .registry
                .node(&replica.node)?
                .replica_create(&replica.pool, &replica.uuid, replica.size)
                .await?;
            shares.push(created.uri);
        }

        let children: Vec<String> = spec
            .nexus
            .children
            .iter()
            .map(|&i| shares[i].clone())
            .collect();

        let nexus = self
            .registry
            .node(&spec.nexus.node)?
            .nexus_create(&spec.nexus.uuid, spec.nexus.size, &children)
            .await?;

        let reported: Vec<String> = nexus.children.iter().map(|c| c.uri.clone()).collect();
        if reported != children {
            return Err(Error::Verification(format!(
                "nexus {} did not preserve child order: sent {children:?}, got {reported:?}",
                spec.nexus.uuid
            )));
        }

        let device_uri = if spec.publish {
            Some(
                self.registry
                    .node(&spec.nexus.node)?
                    .nexus_publish(&spec.nexus.uuid)
                    .await?,
            )
        } else {
            None
        };

        info!(nexus = %spec.nexus.uuid, children = children.len(), "volume built");
        Ok(BuiltVolume {
            children,
            device_uri,
        })
    }

    /// Assert the cluster state the spec implies, per node and summed
    /// across nodes: bdev counts (pool disks, replicas, the nexus),
    /// pool counts, and the cluster-wide replica count.
    pub async fn verify_built(&mut self, spec: &BuildSpec) -> Result<()> {
        let mut expected_bdevs: BTreeMap<NodeId, usize> = BTreeMap::new();
        let mut expected_pools: BTreeMap<NodeId, usize> = BTreeMap::new();
        for pool in &spec.pools {
            *expected_bdevs.entry(pool.node.clone()).or_default() += 1;
            *expected_pools.entry(pool.node.clone()).or_default() += 1;
        }
        for replica in &spec.replicas {
            *expected_bdevs.entry(replica.node.clone()).or_default() += 1;
        }
        *expected_bdevs.entry(spec.nexus.node.clone()).or_default() += 1;
        // nodes without pools still get their (empty) lists checked
        for node in spec.nodes() {
            expected_bdevs.entry(node.clone()).or_default();
            expected_pools.entry(node).or_default();
        }

        for (node, want) in &expected_bdevs {
            let got = self.registry.node(node)?.bdev_list().await?.len();
            if got != *want {
                return Err(Error::Verification(format!(
                    "{node}: expected {want} bdevs, listed {got}"
                )));
            }
        }
        for (node, want) in &expected_pools {
            let got = self.registry.node(node)?.pool_list().await?.len();
            if got != *want {
                return Err(Error::Verification(format!(
                    "{node}: expected {want} pools, listed {got}"
                )));
            }
        }

        let mut replicas_alive = 0;
        for node in spec.nodes() {
            replicas_alive += self.registry.node(&node)?.replica_list().await?.len();
        }
        if replicas_alive != spec.replicas.len() {
            return Err(Error::Verification(format!(
                "cluster reports {replicas_alive} replicas, spec created {}",
                spec.replicas.len()
            )));
        }
        Ok(())
    }

    /// Read one pool's `used` counter
    pub async fn pool_used(&mut self, node: &NodeId, pool: &str) -> Result<u64> {
        let pools = self.registry.node(node)?.pool_list().await?;
        pools
            .iter()
            .find(|p| p.name == pool)
            .map(|p| p.used)
            .ok_or_else(|| Error::Verification(format!("pool {pool} not reported by {node}")))
    }

    /// Destroy everything in reverse dependency order (nexus, then
    /// replicas, then pools), issuing each destroy twice. The second
    /// call probes the control plane's idempotence contract: its
    /// `NotFound` is the expected answer, anything else propagates.
    /// Afterwards the involved nodes must list no pools and no bdevs.
    pub async fn teardown(&mut self, spec: &BuildSpec) -> Result<()> {
        for pass in 0..2u8 {
            let expect_missing = pass == 1;
            tolerate_missing(
                self.registry
                    .node(&spec.nexus.node)?
                    .nexus_destroy(&spec.nexus.uuid)
                    .await,
                expect_missing,
            )?;
            for replica in &spec.replicas {
                tolerate_missing(
                    self.registry
                        .node(&replica.node)?
                        .replica_destroy(&replica.uuid)
                        .await,
                    expect_missing,
                )?;
            }
            for pool in &spec.pools {
                tolerate_missing(
                    self.registry
                        .node(&pool.node)?
                        .pool_destroy(&pool.name)
                        .await,
                    expect_missing,
                )?;
            }
        }

        self.verify_empty(spec.nodes()).await?;
        info!(nexus = %spec.nexus.uuid, "teardown complete");
        Ok(())
    }

    /// Assert pool and bdev lists are empty on every given node
    pub async fn verify_empty(&mut self, nodes: BTreeSet<NodeId>) -> Result<()> {
        for node in nodes {
            let handle = self.registry.node(&node)?;
            let pools = handle.pool_list().await?.len();
            if pools != 0 {
                return Err(Error::Verification(format!(
                    "{node}: {pools} pools remain after teardown"
                )));
            }
            let bdevs = handle.bdev_list().await?.len();
            if bdevs != 0 {
                return Err(Error::Verification(format!(
                    "{node}: {bdevs} bdevs remain after teardown"
                )));
            }
        }
        Ok(())
    }
}

/// Pool accounting check: `used` must move by exactly the requested
/// size between two snapshots. Granularity is MiB; byte counts are
/// compared after a 20-bit shift.
pub fn check_size(before: u64, after: u64, expect_mb: u64) -> Result<()> {
    let delta_mb = nexio_control::types::bytes_to_mb(after.abs_diff(before));
    if delta_mb != expect_mb {
        return Err(Error::Verification(format!(
            "pool used moved by {delta_mb} MiB, expected {expect_mb} MiB"
        )));
    }
    Ok(())
}

/// Second-pass destroy tolerance: a destroy repeated on an absent
/// resource answers `NotFound`, which must not read as failure.
pub(crate) fn tolerate_missing(
    result: nexio_control::Result<()>,
    expect_missing: bool,
) -> Result<()> {
    match result {
        Ok(()) => Ok(()),
        Err(e) if expect_missing && e.is_not_found() => Ok(()),
        Err(e) => Err(e.into()),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn node(name: &str) -> NodeId {
        NodeId::new(name).unwrap()
    }

    fn spec() -> BuildSpec {
        BuildSpec {
            pools: vec![PoolSpec {
                node: node("ms1"),
                name: "tpool".to_string(),
                disk: BdevUri::malloc("disk0", 100),
            }],
            replicas: vec![ReplicaSpec {
                node: node("ms1"),
                pool: "tpool".to_string(),
                uuid: "r1".to_string(),
                size: 64 << 20,
            }],
            nexus: NexusSpec {
                node: node("ms3"),
                uuid: "n1".to_string(),
                size: 64 << 20,
                children: vec![0],
            },
            publish: false,
        }
    }

    #[test]
    fn spec_validation_catches_unknown_pool() {
        let mut s = spec();
        s.replicas[0].pool = "other".to_string();
        assert!(matches!(s.validate(), Err(Error::Spec(_))));
    }

    #[test]
    fn spec_validation_catches_child_out_of_range() {
        let mut s = spec();
        s.nexus.children = vec![3];
        assert!(matches!(s.validate(), Err(Error::Spec(_))));
    }

    #[test]
    fn spec_nodes_are_deduplicated() {
        let nodes = spec().nodes();
        assert_eq!(nodes.len(), 2);
        assert!(nodes.contains(&node("ms1")));
        assert!(nodes.contains(&node("ms3")));
    }

    #[test]
    fn check_size_is_mib_granular() {
        assert!(check_size(0, 64 << 20, 64).is_ok());
        // destruction moves the counter back down
        assert!(check_size(64 << 20, 0, 64).is_ok());
        assert!(check_size(0, 63 << 20, 64).is_err());
    }

    #[test]
    fn second_not_found_is_tolerated() {
        let missing = || nexio_control::Error::NotFound("gone".to_string());
        assert!(tolerate_missing(Err(missing()), true).is_ok());
        // the first pass must not mask a vanished resource
        assert!(tolerate_missing(Err(missing()), false).is_err());
        assert!(tolerate_missing(Ok(()), false).is_ok());
    }
}
