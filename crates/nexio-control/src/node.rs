//! Per-node control handle
//!
//! A [`NodeHandle`] owns the only connection the harness holds to one
//! storage node and exposes its two control services as typed, 1:1 RPC
//! wrappers. Every method takes `&mut self`: operations against a single
//! node are serialized by the borrow checker, which is the concurrency
//! contract the node's pool/replica namespace relies on.

use crate::error::{Error, Result};
use crate::types::NodeId;
use crate::uri::{BdevUri, TargetUri};
use nexio_proto::bdev::{self, bdev_rpc_client::BdevRpcClient};
use nexio_proto::control::{self, storage_control_client::StorageControlClient};
use std::time::Duration;
use tonic::transport::{Channel, Endpoint};
use tracing::{debug, trace};

/// Delay between readiness probes while the control plane comes up
const PROBE_INTERVAL: Duration = Duration::from_millis(250);

/// Handle to one storage node's control plane
#[derive(Debug)]
pub struct NodeHandle {
    id: NodeId,
    endpoint: String,
    bdev: BdevRpcClient<Channel>,
    control: StorageControlClient<Channel>,
}

impl NodeHandle {
    /// Connect to a node and block until its control plane answers.
    ///
    /// The readiness probe is a no-op list on both services, retried for
    /// as long as the transport reports unavailable (wait-for-ready).
    /// Construction fails immediately only when the endpoint itself is
    /// unusable or the node answers with a non-transport error. Callers
    /// needing bounded startup wrap this in `tokio::time::timeout`.
    pub async fn connect(id: NodeId, addr: &str) -> Result<Self> {
        let endpoint = if addr.contains("://") {
            addr.to_string()
        } else {
            format!("http://{addr}")
        };

        let channel = Endpoint::from_shared(endpoint.clone())
            .map_err(|e| Error::InvalidUri {
                uri: endpoint.clone(),
                reason: e.to_string(),
            })?
            .connect_lazy();

        let mut handle = Self {
            id,
            endpoint,
            bdev: BdevRpcClient::new(channel.clone()),
            control: StorageControlClient::new(channel),
        };
        handle.wait_until_ready().await?;
        Ok(handle)
    }

    async fn wait_until_ready(&mut self) -> Result<()> {
        loop {
            match self.bdev_list().await {
                Ok(_) => break,
                Err(e) if e.is_retryable() => {
                    trace!(node = %self.id, "bdev service not ready: {e}");
                    tokio::time::sleep(PROBE_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
        loop {
            match self.pool_list().await {
                Ok(_) => break,
                Err(e) if e.is_retryable() => {
                    trace!(node = %self.id, "control service not ready: {e}");
                    tokio::time::sleep(PROBE_INTERVAL).await;
                }
                Err(e) => return Err(e),
            }
        }
        debug!(node = %self.id, endpoint = %self.endpoint, "control plane ready");
        Ok(())
    }

    /// Logical node id this handle is bound to
    #[must_use]
    pub const fn id(&self) -> &NodeId {
        &self.id
    }

    /// Endpoint the handle is connected to
    #[must_use]
    pub fn endpoint(&self) -> &str {
        &self.endpoint
    }

    // --- bdev operations ---

    /// Create a bdev from a device URI
    pub async fn bdev_create(&mut self, uri: &BdevUri) -> Result<bdev::Bdev> {
        debug!(node = %self.id, %uri, "create bdev");
        let reply = self
            .bdev
            .create(bdev::BdevUri {
                uri: uri.to_string(),
            })
            .await?;
        Ok(reply.into_inner())
    }

    /// Destroy a bdev by the URI the control plane reported for it
    pub async fn bdev_destroy(&mut self, uri: &str) -> Result<()> {
        debug!(node = %self.id, uri, "destroy bdev");
        self.bdev
            .destroy(bdev::BdevUri {
                uri: uri.to_string(),
            })
            .await?;
        Ok(())
    }

    /// List all bdevs on the node
    pub async fn bdev_list(&mut self) -> Result<Vec<bdev::Bdev>> {
        let reply = self.bdev.list(bdev::Null {}).await?;
        Ok(reply.into_inner().bdevs)
    }

    /// Share a bdev over NVMe-oF, returning its share URI
    pub async fn bdev_share(&mut self, name: &str) -> Result<String> {
        debug!(node = %self.id, name, "share bdev");
        let reply = self
            .bdev
            .share(bdev::BdevShareRequest {
                name: name.to_string(),
                protocol: bdev::ShareProtocol::ShareNvmf as i32,
            })
            .await?;
        Ok(reply.into_inner().share_uri)
    }

    // --- pool operations ---

    /// Create a pool backed by one disk URI
    pub async fn pool_create(&mut self, name: &str, disk: &BdevUri) -> Result<control::Pool> {
        debug!(node = %self.id, name, %disk, "create pool");
        let reply = self
            .control
            .create_pool(control::CreatePoolRequest {
                name: name.to_string(),
                disks: vec![disk.to_string()],
            })
            .await?;
        Ok(reply.into_inner())
    }

    /// Destroy a pool by name
    pub async fn pool_destroy(&mut self, name: &str) -> Result<()> {
        debug!(node = %self.id, name, "destroy pool");
        self.control
            .destroy_pool(control::DestroyPoolRequest {
                name: name.to_string(),
            })
            .await?;
        Ok(())
    }

    /// List all pools on the node
    pub async fn pool_list(&mut self) -> Result<Vec<control::Pool>> {
        let reply = self.control.list_pools(control::Null {}).await?;
        Ok(reply.into_inner().pools)
    }

    // --- replica operations ---

    /// Create a replica on a pool, shared over NVMe-oF.
    ///
    /// Sharing is fixed to NVMe-oF and provisioning to thick; the harness
    /// does not exercise other modes.
    pub async fn replica_create(
        &mut self,
        pool: &str,
        uuid: &str,
        size: u64,
    ) -> Result<control::Replica> {
        debug!(node = %self.id, pool, uuid, size, "create replica");
        let reply = self
            .control
            .create_replica(control::CreateReplicaRequest {
                pool: pool.to_string(),
                uuid: uuid.to_string(),
                size,
                thin: false,
                share: control::ShareProtocol::ShareNvmf as i32,
            })
            .await?;
        Ok(reply.into_inner())
    }

    /// Destroy a replica by UUID
    pub async fn replica_destroy(&mut self, uuid: &str) -> Result<()> {
        debug!(node = %self.id, uuid, "destroy replica");
        self.control
            .destroy_replica(control::DestroyReplicaRequest {
                uuid: uuid.to_string(),
            })
            .await?;
        Ok(())
    }

    /// List all replicas on the node
    pub async fn replica_list(&mut self) -> Result<Vec<control::Replica>> {
        let reply = self.control.list_replicas(control::Null {}).await?;
        Ok(reply.into_inner().replicas)
    }

    // --- nexus operations ---

    /// Create a nexus over the given child URIs.
    ///
    /// The child order is caller-significant and preserved by the nexus.
    pub async fn nexus_create(
        &mut self,
        uuid: &str,
        size: u64,
        children: &[String],
    ) -> Result<control::Nexus> {
        debug!(node = %self.id, uuid, size, children = children.len(), "create nexus");
        let reply = self
            .control
            .create_nexus(control::CreateNexusRequest {
                uuid: uuid.to_string(),
                size,
                children: children.to_vec(),
            })
            .await?;
        Ok(reply.into_inner())
    }

    /// Destroy a nexus by UUID
    pub async fn nexus_destroy(&mut self, uuid: &str) -> Result<()> {
        debug!(node = %self.id, uuid, "destroy nexus");
        self.control
            .destroy_nexus(control::DestroyNexusRequest {
                uuid: uuid.to_string(),
            })
            .await?;
        Ok(())
    }

    /// List all nexus instances on the node
    pub async fn nexus_list(&mut self) -> Result<Vec<control::Nexus>> {
        let reply = self.control.list_nexus(control::Null {}).await?;
        Ok(reply.into_inner().nexus_list)
    }

    /// Publish a nexus over NVMe-oF, returning its typed device URI
    pub async fn nexus_publish(&mut self, uuid: &str) -> Result<TargetUri> {
        debug!(node = %self.id, uuid, "publish nexus");
        let reply = self
            .control
            .publish_nexus(control::PublishNexusRequest {
                uuid: uuid.to_string(),
                key: String::new(),
                share: control::ShareProtocol::ShareNvmf as i32,
            })
            .await?;
        TargetUri::parse(&reply.into_inner().device_uri)
    }

    /// Unpublish a nexus
    pub async fn nexus_unpublish(&mut self, uuid: &str) -> Result<()> {
        debug!(node = %self.id, uuid, "unpublish nexus");
        self.control
            .unpublish_nexus(control::UnpublishNexusRequest {
                uuid: uuid.to_string(),
            })
            .await?;
        Ok(())
    }
}
