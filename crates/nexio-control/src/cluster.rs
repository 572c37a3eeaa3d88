//! Cluster topology and handle registry
//!
//! The registry is the sole entry point to a node's control plane: it is
//! built once per run from an explicit topology, owns every
//! [`NodeHandle`], and hands them out by typed id. There is no ambient or
//! global handle state.

use crate::error::{Error, Result};
use crate::node::NodeHandle;
use crate::types::NodeId;
use serde::Deserialize;
use std::collections::{BTreeMap, HashMap};
use std::path::Path;
use tracing::info;

/// Cluster topology: logical node name to control plane address.
///
/// Loadable from a TOML file:
///
/// ```toml
/// [nodes]
/// ms1 = "10.0.0.2:10124"
/// ms2 = "10.0.0.3:10124"
/// ms3 = "10.0.0.4:10124"
/// ```
#[derive(Debug, Clone, Deserialize)]
pub struct ClusterTopology {
    nodes: BTreeMap<String, String>,
}

impl ClusterTopology {
    /// Build a topology from (name, address) pairs
    pub fn new<I, N, A>(nodes: I) -> Self
    where
        I: IntoIterator<Item = (N, A)>,
        N: Into<String>,
        A: Into<String>,
    {
        Self {
            nodes: nodes
                .into_iter()
                .map(|(n, a)| (n.into(), a.into()))
                .collect(),
        }
    }

    /// Load a topology from a TOML file
    pub fn from_file(path: impl AsRef<Path>) -> Result<Self> {
        let raw = std::fs::read_to_string(path.as_ref())?;
        Self::from_toml(&raw)
    }

    /// Parse a topology from a TOML string
    pub fn from_toml(raw: &str) -> Result<Self> {
        let topology: Self =
            toml::from_str(raw).map_err(|e| Error::Config(e.to_string()))?;
        if topology.nodes.is_empty() {
            return Err(Error::Config("topology lists no nodes".to_string()));
        }
        Ok(topology)
    }

    /// Resolve a node name to its address
    #[must_use]
    pub fn resolve(&self, name: &str) -> Option<&str> {
        self.nodes.get(name).map(String::as_str)
    }

    /// Iterate over (name, address) pairs in name order
    pub fn iter(&self) -> impl Iterator<Item = (&str, &str)> {
        self.nodes.iter().map(|(n, a)| (n.as_str(), a.as_str()))
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.nodes.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.nodes.is_empty()
    }
}

/// Registry of ready node handles, one per topology entry
#[derive(Debug)]
pub struct ClusterHandleRegistry {
    handles: HashMap<NodeId, NodeHandle>,
}

impl ClusterHandleRegistry {
    /// Connect to every node in the topology and wait for each control
    /// plane to answer its readiness probe.
    ///
    /// All-or-nothing: if any single node fails, the error names it and
    /// no partially-ready mapping is returned.
    pub async fn connect(topology: &ClusterTopology) -> Result<Self> {
        let mut handles = HashMap::new();
        for (name, addr) in topology.iter() {
            let id = NodeId::new(name)
                .map_err(|e| Error::Config(format!("bad node name {name:?}: {e}")))?;
            let handle = NodeHandle::connect(id.clone(), addr).await.map_err(|e| {
                Error::PartialClusterUnavailable {
                    node: name.to_string(),
                    reason: e.to_string(),
                }
            })?;
            handles.insert(id, handle);
        }
        info!(nodes = handles.len(), "cluster control plane ready");
        Ok(Self { handles })
    }

    /// Look up the handle for a node.
    ///
    /// The mutable borrow serializes all use of one node's control
    /// connection through the registry.
    pub fn node(&mut self, id: &NodeId) -> Result<&mut NodeHandle> {
        self.handles
            .get_mut(id)
            .ok_or_else(|| Error::NodeUnknown(id.to_string()))
    }

    /// Ids of all registered nodes, in name order
    #[must_use]
    pub fn node_ids(&self) -> Vec<NodeId> {
        let mut ids: Vec<_> = self.handles.keys().cloned().collect();
        ids.sort();
        ids
    }

    #[must_use]
    pub fn len(&self) -> usize {
        self.handles.len()
    }

    #[must_use]
    pub fn is_empty(&self) -> bool {
        self.handles.is_empty()
    }
}
