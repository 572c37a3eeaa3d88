//! In-memory storage node control plane
//!
//! `nexio-sim` implements both per-node gRPC services (bdev management
//! and storage control) against in-memory state, with the observable
//! semantics the harness verifies on a real engine: implicit disk-bdev
//! registration on pool create, pool capacity accounting, replica share
//! URIs, caller-ordered nexus children and typed failure codes.
//!
//! Integration tests start one [`SimServer`] per simulated node on an
//! ephemeral localhost port and point a `ClusterHandleRegistry` at them.

pub mod node;
pub mod server;

pub use node::SimNode;
pub use server::SimServer;
