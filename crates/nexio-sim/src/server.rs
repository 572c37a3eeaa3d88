//! In-process gRPC server for a simulated node

use crate::node::SimNode;
use nexio_proto::bdev::bdev_rpc_server::BdevRpcServer;
use nexio_proto::control::storage_control_server::StorageControlServer;
use std::net::SocketAddr;
use std::sync::Arc;
use tokio::net::TcpListener;
use tokio::task::JoinHandle;
use tokio_stream::wrappers::TcpListenerStream;
use tonic::transport::Server;
use tracing::{debug, error};

/// One simulated storage node served on an ephemeral localhost port.
///
/// Both control services share the listener, mirroring a real node's
/// single control endpoint. The server task is aborted on drop.
pub struct SimServer {
    node: Arc<SimNode>,
    addr: SocketAddr,
    handle: JoinHandle<()>,
}

impl SimServer {
    /// Bind an ephemeral port and start serving both control services
    pub async fn start() -> std::io::Result<Self> {
        Self::start_at("127.0.0.1:0".parse().expect("valid bind address")).await
    }

    /// Bind a specific address, e.g. to bring a node up late on a port
    /// a client is already waiting on
    pub async fn start_at(bind: SocketAddr) -> std::io::Result<Self> {
        let listener = TcpListener::bind(bind).await?;
        let addr = listener.local_addr()?;
        // The gRPC port doubles as the advertised NVMe-oF port so share
        // URIs stay unique across simulated nodes on one host.
        let node = Arc::new(SimNode::new(addr.ip().to_string(), addr.port()));

        let service_node = node.clone();
        let handle = tokio::spawn(async move {
            let result = Server::builder()
                .add_service(BdevRpcServer::from_arc(service_node.clone()))
                .add_service(StorageControlServer::from_arc(service_node))
                .serve_with_incoming(TcpListenerStream::new(listener))
                .await;
            if let Err(e) = result {
                error!("sim node server exited: {e}");
            }
        });

        debug!(%addr, "sim node listening");
        Ok(Self { node, addr, handle })
    }

    /// Control plane address in `host:port` form
    #[must_use]
    pub fn addr(&self) -> String {
        self.addr.to_string()
    }

    /// Direct access to the simulated node, e.g. for fault injection
    #[must_use]
    pub const fn node(&self) -> &Arc<SimNode> {
        &self.node
    }
}

impl Drop for SimServer {
    fn drop(&mut self) {
        self.handle.abort();
    }
}
