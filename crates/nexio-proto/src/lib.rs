//! Nexio Protocol - gRPC service definitions
//!
//! This crate contains the protobuf-generated code for the per-node
//! storage control plane.

/// Block-device management service
pub mod bdev {
    tonic::include_proto!("nexio.bdev");
}

/// Storage control service (pools, replicas, nexus volumes)
pub mod control {
    tonic::include_proto!("nexio.control");
}
