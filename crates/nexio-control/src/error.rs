//! Error types for the nexio control plane client
//!
//! One taxonomy covers node RPCs, registry construction and the remote
//! initiator tool, so callers can match on semantic categories instead
//! of transport details.

use thiserror::Error;
use tonic::Code;

/// Common result type for control plane operations
pub type Result<T> = std::result::Result<T, Error>;

/// Control plane error
#[derive(Debug, Error)]
pub enum Error {
    /// Create on a name or UUID that is already present
    #[error("already exists: {0}")]
    AlreadyExists(String),

    /// Destroy or lookup on an absent resource
    #[error("not found: {0}")]
    NotFound(String),

    /// Bad size, URI or unmet state prerequisite
    #[error("invalid argument: {0}")]
    InvalidArgument(String),

    /// Transport or control plane unreachable
    #[error("unavailable: {0}")]
    Unavailable(String),

    /// URI failed to parse into its typed form
    #[error("invalid URI {uri:?}: {reason}")]
    InvalidUri { uri: String, reason: String },

    /// Node name absent from the cluster topology
    #[error("unknown node: {0}")]
    NodeUnknown(String),

    /// Registry construction failed for one node; no handles are returned
    #[error("cluster partially unavailable, node {node}: {reason}")]
    PartialClusterUnavailable { node: String, reason: String },

    /// Target NQN did not appear in the initiator's discovery listing
    #[error("target not discovered: {0}")]
    NotDiscovered(String),

    /// Initiator connect command failed
    #[error("connect failed: {0}")]
    ConnectFailed(String),

    /// Configuration error (topology file)
    #[error("configuration error: {0}")]
    Config(String),

    /// I/O error (spawning the initiator tool, reading config)
    #[error("I/O error: {0}")]
    Io(#[from] std::io::Error),

    /// gRPC status not covered by the taxonomy above
    #[error("control plane error: {0}")]
    Grpc(tonic::Status),
}

impl Error {
    /// Map a gRPC status onto the taxonomy. Codes the harness reasons
    /// about become typed variants; everything else stays a raw status.
    pub fn from_status(status: tonic::Status) -> Self {
        let msg = status.message().to_string();
        match status.code() {
            Code::AlreadyExists => Self::AlreadyExists(msg),
            Code::NotFound => Self::NotFound(msg),
            Code::InvalidArgument | Code::ResourceExhausted | Code::FailedPrecondition => {
                Self::InvalidArgument(msg)
            }
            Code::Unavailable => Self::Unavailable(msg),
            _ => Self::Grpc(status),
        }
    }

    /// Check if this is a not found error
    #[must_use]
    pub fn is_not_found(&self) -> bool {
        matches!(self, Self::NotFound(_))
    }

    /// Check if this is a retryable (wait-for-ready) error
    #[must_use]
    pub fn is_retryable(&self) -> bool {
        matches!(self, Self::Unavailable(_))
    }
}

impl From<tonic::Status> for Error {
    fn from(status: tonic::Status) -> Self {
        Self::from_status(status)
    }
}

impl From<tonic::transport::Error> for Error {
    fn from(err: tonic::transport::Error) -> Self {
        Self::Unavailable(err.to_string())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_codes_map_to_taxonomy() {
        let err = Error::from_status(tonic::Status::not_found("no such pool"));
        assert!(err.is_not_found());

        let err = Error::from_status(tonic::Status::already_exists("tpool"));
        assert!(matches!(err, Error::AlreadyExists(_)));

        let err = Error::from_status(tonic::Status::resource_exhausted("pool full"));
        assert!(matches!(err, Error::InvalidArgument(_)));

        let err = Error::from_status(tonic::Status::unavailable("connecting"));
        assert!(err.is_retryable());
    }

    #[test]
    fn unlisted_codes_stay_raw() {
        let err = Error::from_status(tonic::Status::internal("boom"));
        assert!(matches!(err, Error::Grpc(_)));
        assert!(!err.is_not_found());
        assert!(!err.is_retryable());
    }
}
