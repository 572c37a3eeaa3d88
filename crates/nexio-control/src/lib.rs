//! Nexio control plane client
//!
//! This crate provides the client side of the per-node storage control
//! plane: typed handles for the gRPC services every storage node exposes,
//! a cluster-wide registry of those handles, and a wrapper around the
//! local NVMe-oF initiator tool for attaching to published volumes.
//!
//! # Architecture
//!
//! ```text
//! ┌──────────────────────┐
//! │ ClusterHandleRegistry│  (one per test run / deployment)
//! └──────────┬───────────┘
//!            │ owns
//! ┌──────────▼───────────┐
//! │      NodeHandle      │  (one per node, two service clients)
//! └──────────┬───────────┘
//!            │ gRPC
//! ┌──────────▼───────────┐
//! │  storage node daemon │  (bdevs, pools, replicas, nexus)
//! └──────────────────────┘
//! ```

pub mod cluster;
pub mod error;
pub mod initiator;
pub mod node;
pub mod types;
pub mod uri;

pub use cluster::{ClusterHandleRegistry, ClusterTopology};
pub use error::{Error, Result};
pub use initiator::NvmeSession;
pub use node::NodeHandle;
pub use types::NodeId;
pub use uri::{BdevUri, TargetUri};
