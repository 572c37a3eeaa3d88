//! Core identifier types for the nexio control plane

use derive_more::Display;
use serde::{Deserialize, Serialize};
use std::fmt;

/// Logical name of a storage node (e.g. "ms1")
///
/// Validated once at construction; the registry only hands out handles
/// for ids it was built with, so an unknown name fails at lookup rather
/// than on first RPC.
#[derive(Clone, PartialEq, Eq, Hash, PartialOrd, Ord, Serialize, Deserialize, Display)]
#[display("{_0}")]
pub struct NodeId(String);

impl NodeId {
    /// Create a new node id, validating the name
    pub fn new(name: impl Into<String>) -> Result<Self, NodeIdError> {
        let name = name.into();
        Self::validate(&name)?;
        Ok(Self(name))
    }

    /// Get the node name as a string slice
    #[must_use]
    pub fn as_str(&self) -> &str {
        &self.0
    }

    fn validate(name: &str) -> Result<(), NodeIdError> {
        if name.is_empty() {
            return Err(NodeIdError::Empty);
        }
        for c in name.chars() {
            if !c.is_ascii_alphanumeric() && c != '-' && c != '_' {
                return Err(NodeIdError::InvalidChar(c));
            }
        }
        Ok(())
    }
}

impl fmt::Debug for NodeId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "NodeId({:?})", self.0)
    }
}

/// Errors that can occur when creating a node id
#[derive(Debug, Clone, thiserror::Error)]
pub enum NodeIdError {
    #[error("node name must not be empty")]
    Empty,
    #[error("node name contains invalid character {0:?}")]
    InvalidChar(char),
}

/// Convert a mebibyte count to bytes
#[must_use]
pub const fn mb_to_bytes(mb: u64) -> u64 {
    mb << 20
}

/// Convert a byte count to whole mebibytes
///
/// Pool accounting is asserted at MiB granularity only, so the
/// truncation is deliberate.
#[must_use]
pub const fn bytes_to_mb(bytes: u64) -> u64 {
    bytes >> 20
}
