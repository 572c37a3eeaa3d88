//! Simulated storage node state and service implementations

use nexio_control::uri::{BdevUri, TargetUri};
use nexio_proto::bdev::{
    self, Bdev, BdevShareReply, BdevShareRequest, Bdevs, bdev_rpc_server::BdevRpc,
};
use nexio_proto::control::{
    self, Child, ChildState, CreateNexusRequest, CreatePoolRequest, CreateReplicaRequest,
    DestroyNexusRequest, DestroyPoolRequest, DestroyReplicaRequest, ListNexusReply,
    ListPoolsReply, ListReplicasReply, Nexus, NexusState, Pool, PoolState, PublishNexusReply,
    PublishNexusRequest, Replica, ShareProtocol, UnpublishNexusRequest,
    storage_control_server::StorageControl,
};
use parking_lot::RwLock;
use std::collections::HashMap;
use tonic::{Request, Response, Status};
use tracing::debug;
use uuid::Uuid;

/// NQN prefix for simulated NVMe-oF shares
const NQN_BASE: &str = "nqn.2019-05.io.nexio";

/// Default block size for devices that do not specify one
const DEFAULT_BLK_SIZE: u32 = 512;

#[derive(Clone, Debug)]
struct StoredBdev {
    name: String,
    uuid: String,
    num_blocks: u64,
    blk_size: u32,
    uri: String,
    share_uri: Option<String>,
}

#[derive(Clone, Debug)]
struct StoredPool {
    name: String,
    disks: Vec<String>,
    disk_names: Vec<String>,
    capacity: u64,
    used: u64,
}

#[derive(Clone, Debug)]
struct StoredReplica {
    uuid: String,
    pool: String,
    size: u64,
    uri: String,
}

#[derive(Clone, Debug)]
struct StoredChild {
    uri: String,
    state: i32,
}

#[derive(Clone, Debug)]
struct StoredNexus {
    uuid: String,
    size: u64,
    state: i32,
    children: Vec<StoredChild>,
    device_uri: Option<String>,
}

/// One simulated storage node
///
/// Implements both control services against in-memory maps. A node only
/// sees its own state, so nexus child URIs are validated for form, not
/// for cross-node liveness.
pub struct SimNode {
    host: String,
    nvmf_port: u16,
    bdevs: RwLock<HashMap<String, StoredBdev>>,
    pools: RwLock<HashMap<String, StoredPool>>,
    replicas: RwLock<HashMap<String, StoredReplica>>,
    nexus: RwLock<HashMap<String, StoredNexus>>,
}

impl SimNode {
    /// Create a node advertising share URIs at `host:nvmf_port`
    #[must_use]
    pub fn new(host: impl Into<String>, nvmf_port: u16) -> Self {
        Self {
            host: host.into(),
            nvmf_port,
            bdevs: RwLock::new(HashMap::new()),
            pools: RwLock::new(HashMap::new()),
            replicas: RwLock::new(HashMap::new()),
            nexus: RwLock::new(HashMap::new()),
        }
    }

    fn share_uri_for(&self, name: &str) -> String {
        format!("nvmf://{}:{}/{NQN_BASE}:{name}", self.host, self.nvmf_port)
    }

    /// Mark every nexus child with this URI faulted, and its nexus with
    /// it. Stands in for a child node dying mid-run.
    pub fn fault_child(&self, child_uri: &str) {
        let mut nexus = self.nexus.write();
        for n in nexus.values_mut() {
            let mut hit = false;
            for child in &mut n.children {
                if child.uri == child_uri {
                    child.state = ChildState::ChildFaulted as i32;
                    hit = true;
                }
            }
            if hit {
                n.state = NexusState::NexusFaulted as i32;
            }
        }
    }

    fn insert_bdev(
        bdevs: &mut HashMap<String, StoredBdev>,
        name: &str,
        uri: String,
        size_bytes: u64,
        blk_size: u32,
        share_uri: Option<String>,
    ) {
        bdevs.insert(
            name.to_string(),
            StoredBdev {
                name: name.to_string(),
                uuid: Uuid::new_v4().to_string(),
                num_blocks: size_bytes / u64::from(blk_size),
                blk_size,
                uri,
                share_uri,
            },
        );
    }

    fn bdev_to_proto(bdev: &StoredBdev) -> Bdev {
        Bdev {
            name: bdev.name.clone(),
            uuid: bdev.uuid.clone(),
            num_blocks: bdev.num_blocks,
            blk_size: bdev.blk_size,
            uri: bdev.uri.clone(),
            share_uri: bdev.share_uri.clone().unwrap_or_default(),
        }
    }

    fn pool_to_proto(pool: &StoredPool) -> Pool {
        Pool {
            name: pool.name.clone(),
            disks: pool.disks.clone(),
            state: PoolState::PoolOnline as i32,
            capacity: pool.capacity,
            used: pool.used,
        }
    }

    fn replica_to_proto(replica: &StoredReplica) -> Replica {
        Replica {
            uuid: replica.uuid.clone(),
            pool: replica.pool.clone(),
            size: replica.size,
            thin: false,
            share: ShareProtocol::ShareNvmf as i32,
            uri: replica.uri.clone(),
        }
    }

    fn nexus_to_proto(nexus: &StoredNexus) -> Nexus {
        Nexus {
            uuid: nexus.uuid.clone(),
            size: nexus.size,
            state: nexus.state,
            children: nexus
                .children
                .iter()
                .map(|c| Child {
                    uri: c.uri.clone(),
                    state: c.state,
                })
                .collect(),
            device_uri: nexus.device_uri.clone().unwrap_or_default(),
        }
    }
}

#[tonic::async_trait]
impl BdevRpc for SimNode {
    async fn create(&self, request: Request<bdev::BdevUri>) -> Result<Response<Bdev>, Status> {
        let req = request.into_inner();
        let uri = BdevUri::parse(&req.uri)
            .map_err(|e| Status::invalid_argument(e.to_string()))?;

        let mut bdevs = self.bdevs.write();
        if bdevs.contains_key(uri.name()) {
            return Err(Status::already_exists(format!(
                "bdev {} already exists",
                uri.name()
            )));
        }

        let blk_size = uri.blk_size().unwrap_or(DEFAULT_BLK_SIZE);
        Self::insert_bdev(
            &mut bdevs,
            uri.name(),
            uri.to_string(),
            uri.size_bytes(),
            blk_size,
            None,
        );
        debug!(bdev = uri.name(), "created bdev");
        Ok(Response::new(Self::bdev_to_proto(&bdevs[uri.name()])))
    }

    async fn destroy(
        &self,
        request: Request<bdev::BdevUri>,
    ) -> Result<Response<bdev::Null>, Status> {
        let req = request.into_inner();
        let mut bdevs = self.bdevs.write();
        let name = bdevs
            .values()
            .find(|b| b.uri == req.uri)
            .map(|b| b.name.clone())
            .ok_or_else(|| Status::not_found(format!("bdev {} not found", req.uri)))?;
        bdevs.remove(&name);
        debug!(bdev = %name, "destroyed bdev");
        Ok(Response::new(bdev::Null {}))
    }

    async fn list(&self, _request: Request<bdev::Null>) -> Result<Response<Bdevs>, Status> {
        let bdevs = self.bdevs.read();
        Ok(Response::new(Bdevs {
            bdevs: bdevs.values().map(Self::bdev_to_proto).collect(),
        }))
    }

    async fn share(
        &self,
        request: Request<BdevShareRequest>,
    ) -> Result<Response<BdevShareReply>, Status> {
        let req = request.into_inner();
        if req.protocol != bdev::ShareProtocol::ShareNvmf as i32 {
            return Err(Status::invalid_argument("only NVMe-oF sharing is supported"));
        }

        let mut bdevs = self.bdevs.write();
        let entry = bdevs
            .get_mut(&req.name)
            .ok_or_else(|| Status::not_found(format!("bdev {} not found", req.name)))?;

        let share_uri = self.share_uri_for(&entry.name);
        entry.share_uri = Some(share_uri.clone());
        Ok(Response::new(BdevShareReply { share_uri }))
    }
}

#[tonic::async_trait]
impl StorageControl for SimNode {
    async fn create_pool(
        &self,
        request: Request<CreatePoolRequest>,
    ) -> Result<Response<Pool>, Status> {
        let req = request.into_inner();
        if req.name.is_empty() {
            return Err(Status::invalid_argument("pool name is required"));
        }
        if req.disks.is_empty() {
            return Err(Status::invalid_argument("pool needs at least one disk"));
        }

        let mut pools = self.pools.write();
        if pools.contains_key(&req.name) {
            return Err(Status::already_exists(format!(
                "pool {} already exists",
                req.name
            )));
        }

        // The engine creates the backing bdevs itself when they are not
        // already present.
        let mut bdevs = self.bdevs.write();
        let mut capacity = 0u64;
        let mut disk_names = Vec::with_capacity(req.disks.len());
        for disk in &req.disks {
            let uri = BdevUri::parse(disk)
                .map_err(|e| Status::invalid_argument(e.to_string()))?;
            capacity += uri.size_bytes();
            if !bdevs.contains_key(uri.name()) {
                let blk_size = uri.blk_size().unwrap_or(DEFAULT_BLK_SIZE);
                Self::insert_bdev(
                    &mut bdevs,
                    uri.name(),
                    uri.to_string(),
                    uri.size_bytes(),
                    blk_size,
                    None,
                );
            }
            disk_names.push(uri.name().to_string());
        }

        let pool = StoredPool {
            name: req.name.clone(),
            disks: req.disks,
            disk_names,
            capacity,
            used: 0,
        };
        let reply = Self::pool_to_proto(&pool);
        pools.insert(req.name.clone(), pool);
        debug!(pool = %req.name, capacity, "created pool");
        Ok(Response::new(reply))
    }

    async fn destroy_pool(
        &self,
        request: Request<DestroyPoolRequest>,
    ) -> Result<Response<control::Null>, Status> {
        let req = request.into_inner();
        let mut pools = self.pools.write();
        let pool = pools
            .get(&req.name)
            .ok_or_else(|| Status::not_found(format!("pool {} not found", req.name)))?;

        if self.replicas.read().values().any(|r| r.pool == req.name) {
            return Err(Status::failed_precondition(format!(
                "pool {} still has replicas",
                req.name
            )));
        }

        let disk_names = pool.disk_names.clone();
        pools.remove(&req.name);
        let mut bdevs = self.bdevs.write();
        for name in &disk_names {
            bdevs.remove(name);
        }
        debug!(pool = %req.name, "destroyed pool");
        Ok(Response::new(control::Null {}))
    }

    async fn list_pools(
        &self,
        _request: Request<control::Null>,
    ) -> Result<Response<ListPoolsReply>, Status> {
        let pools = self.pools.read();
        Ok(Response::new(ListPoolsReply {
            pools: pools.values().map(Self::pool_to_proto).collect(),
        }))
    }

    async fn create_replica(
        &self,
        request: Request<CreateReplicaRequest>,
    ) -> Result<Response<Replica>, Status> {
        let req = request.into_inner();
        if req.uuid.is_empty() {
            return Err(Status::invalid_argument("replica uuid is required"));
        }
        if req.size == 0 {
            return Err(Status::invalid_argument("replica size must be positive"));
        }

        // Lock order is pools, replicas, bdevs throughout.
        let mut pools = self.pools.write();
        let mut replicas = self.replicas.write();
        if replicas.contains_key(&req.uuid) {
            return Err(Status::already_exists(format!(
                "replica {} already exists",
                req.uuid
            )));
        }

        let pool = pools
            .get_mut(&req.pool)
            .ok_or_else(|| Status::not_found(format!("pool {} not found", req.pool)))?;

        let free = pool.capacity - pool.used;
        if req.size > free {
            return Err(Status::resource_exhausted(format!(
                "pool {}: requested {} bytes, {} free",
                req.pool, req.size, free
            )));
        }
        pool.used += req.size;

        let uri = if req.share == ShareProtocol::ShareNvmf as i32 {
            self.share_uri_for(&req.uuid)
        } else {
            format!("bdev:///{}", req.uuid)
        };

        let mut bdevs = self.bdevs.write();
        Self::insert_bdev(
            &mut bdevs,
            &req.uuid,
            format!("bdev:///{}", req.uuid),
            req.size,
            DEFAULT_BLK_SIZE,
            Some(uri.clone()),
        );

        let replica = StoredReplica {
            uuid: req.uuid.clone(),
            pool: req.pool.clone(),
            size: req.size,
            uri,
        };
        let reply = Self::replica_to_proto(&replica);
        replicas.insert(req.uuid.clone(), replica);
        debug!(replica = %req.uuid, pool = %req.pool, size = req.size, "created replica");
        Ok(Response::new(reply))
    }

    async fn destroy_replica(
        &self,
        request: Request<DestroyReplicaRequest>,
    ) -> Result<Response<control::Null>, Status> {
        let req = request.into_inner();
        let mut pools = self.pools.write();
        let mut replicas = self.replicas.write();
        let replica = replicas
            .remove(&req.uuid)
            .ok_or_else(|| Status::not_found(format!("replica {} not found", req.uuid)))?;

        if let Some(pool) = pools.get_mut(&replica.pool) {
            pool.used = pool.used.saturating_sub(replica.size);
        }
        self.bdevs.write().remove(&replica.uuid);
        debug!(replica = %req.uuid, "destroyed replica");
        Ok(Response::new(control::Null {}))
    }

    async fn list_replicas(
        &self,
        _request: Request<control::Null>,
    ) -> Result<Response<ListReplicasReply>, Status> {
        let replicas = self.replicas.read();
        Ok(Response::new(ListReplicasReply {
            replicas: replicas.values().map(Self::replica_to_proto).collect(),
        }))
    }

    async fn create_nexus(
        &self,
        request: Request<CreateNexusRequest>,
    ) -> Result<Response<Nexus>, Status> {
        let req = request.into_inner();
        if req.uuid.is_empty() {
            return Err(Status::invalid_argument("nexus uuid is required"));
        }
        if req.children.is_empty() {
            return Err(Status::invalid_argument("nexus needs at least one child"));
        }
        for child in &req.children {
            TargetUri::parse(child)
                .map_err(|e| Status::invalid_argument(e.to_string()))?;
        }

        let mut nexus = self.nexus.write();
        if nexus.contains_key(&req.uuid) {
            return Err(Status::already_exists(format!(
                "nexus {} already exists",
                req.uuid
            )));
        }

        let stored = StoredNexus {
            uuid: req.uuid.clone(),
            size: req.size,
            state: NexusState::NexusOnline as i32,
            children: req
                .children
                .iter()
                .map(|uri| StoredChild {
                    uri: uri.clone(),
                    state: ChildState::ChildOnline as i32,
                })
                .collect(),
            device_uri: None,
        };

        let mut bdevs = self.bdevs.write();
        Self::insert_bdev(
            &mut bdevs,
            &req.uuid,
            format!("bdev:///{}", req.uuid),
            req.size,
            DEFAULT_BLK_SIZE,
            None,
        );

        let reply = Self::nexus_to_proto(&stored);
        nexus.insert(req.uuid.clone(), stored);
        debug!(nexus = %req.uuid, children = req.children.len(), "created nexus");
        Ok(Response::new(reply))
    }

    async fn destroy_nexus(
        &self,
        request: Request<DestroyNexusRequest>,
    ) -> Result<Response<control::Null>, Status> {
        let req = request.into_inner();
        let mut nexus = self.nexus.write();
        nexus
            .remove(&req.uuid)
            .ok_or_else(|| Status::not_found(format!("nexus {} not found", req.uuid)))?;
        // Children are referenced, not owned: only the nexus bdev goes.
        self.bdevs.write().remove(&req.uuid);
        debug!(nexus = %req.uuid, "destroyed nexus");
        Ok(Response::new(control::Null {}))
    }

    async fn list_nexus(
        &self,
        _request: Request<control::Null>,
    ) -> Result<Response<ListNexusReply>, Status> {
        let nexus = self.nexus.read();
        Ok(Response::new(ListNexusReply {
            nexus_list: nexus.values().map(Self::nexus_to_proto).collect(),
        }))
    }

    async fn publish_nexus(
        &self,
        request: Request<PublishNexusRequest>,
    ) -> Result<Response<PublishNexusReply>, Status> {
        let req = request.into_inner();
        if req.share != ShareProtocol::ShareNvmf as i32 {
            return Err(Status::invalid_argument("only NVMe-oF publishing is supported"));
        }

        let mut nexus = self.nexus.write();
        let entry = nexus
            .get_mut(&req.uuid)
            .ok_or_else(|| Status::not_found(format!("nexus {} not found", req.uuid)))?;

        let device_uri = entry
            .device_uri
            .get_or_insert_with(|| self.share_uri_for(&req.uuid))
            .clone();
        debug!(nexus = %req.uuid, %device_uri, "published nexus");
        Ok(Response::new(PublishNexusReply { device_uri }))
    }

    async fn unpublish_nexus(
        &self,
        request: Request<UnpublishNexusRequest>,
    ) -> Result<Response<control::Null>, Status> {
        let req = request.into_inner();
        let mut nexus = self.nexus.write();
        let entry = nexus
            .get_mut(&req.uuid)
            .ok_or_else(|| Status::not_found(format!("nexus {} not found", req.uuid)))?;
        entry.device_uri = None;
        Ok(Response::new(control::Null {}))
    }
}
