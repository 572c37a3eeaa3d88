//! Nexio lifecycle harness
//!
//! Drives the full lifecycle of distributed block-storage resources
//! across a cluster of storage nodes and verifies the cluster's state
//! along the way. The dependency chain is strict: a bdev backs a pool, a
//! pool holds replicas, replicas on any mix of nodes compose into a
//! nexus, and a published nexus is reachable by a remote initiator.
//!
//! [`LifecycleOrchestrator`] executes one declarative [`BuildSpec`]
//! forwards (create) and backwards (destroy, probing idempotence), and
//! [`ScenarioRunner`] composes orchestrated builds into end-to-end and
//! scale topologies.

pub mod error;
pub mod orchestrator;
pub mod scenario;

pub use error::{Error, Result};
pub use orchestrator::{
    BuildSpec, BuiltVolume, LifecycleOrchestrator, NexusSpec, PoolSpec, ReplicaSpec, check_size,
};
pub use scenario::{
    NEXUS_UUID, REPLICA_UUID, ScenarioNodes, ScenarioRunner, check_nexus_states, two_replica_spec,
};
