//! Shared fixtures for controller integration tests.

#![allow(dead_code)]

use async_trait::async_trait;
use ferrostor_controller::backup::{
    BackupL2LDstHandler, BackupMetadata, BackupShippingMgr, BackupShippingRequest,
    BackupVolumeMetadata, ShortIdSource,
};
use ferrostor_controller::objects::{CoreObjects, ProviderKind, Remote, StorPool};
use ferrostor_controller::satellite::{FreeCapacityFetcher, SatelliteUpdater, ThinFreeCapacities};
use ferrostor_controller::{CtrlError, CtrlResult, LockGuardBuilder, LockManager, LockObj, ScopeRunner};
use ferrostor_core::{NetInterfaceName, NodeName, PortPool, RemoteName, StorPoolName, Version};
use ferrostor_metadata::{CrdBackend, DbBackend, TransactionMgrFactory};
use ferrostor_storage::MemoryBackend;
use std::collections::{BTreeMap, BTreeSet, VecDeque};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex};

pub const LOCAL_VERSION: Version = Version::new(1, 0, 0);

/// Records every remote pushed to the satellites; can be told to fail.
#[derive(Default)]
pub struct RecordingSatellites {
    pub updates: Mutex<Vec<RemoteName>>,
    pub fail: AtomicBool,
}

#[async_trait]
impl SatelliteUpdater for RecordingSatellites {
    async fn update_satellites(&self, remote: &Remote) -> CtrlResult<()> {
        self.updates.lock().unwrap().push(remote.name().clone());
        if self.fail.load(Ordering::SeqCst) {
            return Err(CtrlError::Satellite("satellite did not acknowledge".to_string()));
        }
        Ok(())
    }
}

/// Answers capacity queries from a fixed table and records the queried node sets.
#[derive(Default)]
pub struct FixedCapacities {
    pub capacities: Mutex<ThinFreeCapacities>,
    pub queries: Mutex<Vec<BTreeSet<NodeName>>>,
}

impl FixedCapacities {
    pub fn set(&self, node: &str, pool: &str, kib: u64) {
        self.capacities
            .lock()
            .unwrap()
            .entry(NodeName::new(node).unwrap())
            .or_default()
            .insert(StorPoolName::new(pool).unwrap(), kib);
    }
}

#[async_trait]
impl FreeCapacityFetcher for FixedCapacities {
    async fn fetch_thin_free_capacities(
        &self,
        nodes: &BTreeSet<NodeName>,
    ) -> CtrlResult<ThinFreeCapacities> {
        self.queries.lock().unwrap().push(nodes.clone());
        Ok(self.capacities.lock().unwrap().clone())
    }
}

/// Hands out queued ids first, then `id0`, `id1`, ...
#[derive(Default)]
pub struct SequenceShortIds {
    pub queued: Mutex<VecDeque<String>>,
    pub generated: AtomicUsize,
}

impl SequenceShortIds {
    pub fn with(ids: &[&str]) -> Self {
        Self {
            queued: Mutex::new(ids.iter().map(|s| s.to_string()).collect()),
            generated: AtomicUsize::new(0),
        }
    }
}

impl ShortIdSource for SequenceShortIds {
    fn generate(&self) -> String {
        let n = self.generated.fetch_add(1, Ordering::SeqCst);
        self.queued
            .lock()
            .unwrap()
            .pop_front()
            .unwrap_or_else(|| format!("id{n}"))
    }
}

/// A controller over an in-memory document store with mock collaborators.
pub struct Cluster {
    pub backend: Arc<dyn DbBackend>,
    pub objects: Arc<CoreObjects>,
    pub scopes: ScopeRunner,
    pub ports: Arc<PortPool>,
    pub shipping: Arc<BackupShippingMgr>,
    pub satellites: Arc<RecordingSatellites>,
    pub capacities: Arc<FixedCapacities>,
    pub short_ids: Arc<SequenceShortIds>,
}

impl Cluster {
    pub fn new(port_start: u16, port_end: u16) -> Self {
        Self::with_short_ids(port_start, port_end, SequenceShortIds::with(&["k3x9a"]))
    }

    pub fn with_short_ids(port_start: u16, port_end: u16, short_ids: SequenceShortIds) -> Self {
        let backend: Arc<dyn DbBackend> =
            Arc::new(CrdBackend::new(Arc::new(MemoryBackend::new())));
        Self::on_backend(backend, port_start, port_end, short_ids)
    }

    pub fn on_backend(
        backend: Arc<dyn DbBackend>,
        port_start: u16,
        port_end: u16,
        short_ids: SequenceShortIds,
    ) -> Self {
        let objects = Arc::new(CoreObjects::new());
        let scopes = ScopeRunner::new(
            Arc::new(TransactionMgrFactory::new(Arc::clone(&backend))),
            Arc::new(LockManager::new()),
        );
        let ports = Arc::new(PortPool::new(port_start, port_end).unwrap());
        let shipping = Arc::new(BackupShippingMgr::new(
            Arc::clone(&objects),
            scopes.clone(),
            Arc::clone(&ports),
        ));
        Self {
            backend,
            objects,
            scopes,
            ports,
            shipping,
            satellites: Arc::new(RecordingSatellites::default()),
            capacities: Arc::new(FixedCapacities::default()),
            short_ids: Arc::new(short_ids),
        }
    }

    pub fn handler(&self) -> BackupL2LDstHandler {
        BackupL2LDstHandler::new(
            Arc::clone(&self.objects),
            self.scopes.clone(),
            Arc::clone(&self.ports),
            self.satellites.clone(),
            self.capacities.clone(),
            Arc::clone(&self.shipping),
        )
        .with_short_ids(self.short_ids.clone())
        .with_local_version(LOCAL_VERSION)
    }

    /// Create a node with the given interfaces `(name, address)` and pools.
    pub async fn add_node(&self, name: &str, net_ifs: &[(&str, &str)], pools: &[StorPool]) {
        let objects = Arc::clone(&self.objects);
        self.scopes
            .run(
                "test_add_node",
                LockGuardBuilder::new()
                    .write(LockObj::NodesMap)
                    .write(LockObj::StorPoolDfnMap),
                |tx, locks| {
                    let node =
                        objects.create_node(tx, locks, NodeName::new(name).unwrap(), "SATELLITE")?;
                    for (nic, address) in net_ifs {
                        node.add_net_interface(
                            tx,
                            locks,
                            NetInterfaceName::new(*nic).unwrap(),
                            *address,
                        )?;
                    }
                    for pool in pools {
                        node.add_stor_pool(tx, locks, pool.clone())?;
                    }
                    Ok(())
                },
            )
            .await
            .unwrap();
    }

    /// Set a controller-wide property.
    pub async fn set_ctrl_prop(&self, key: &str, value: &str) {
        let objects = Arc::clone(&self.objects);
        self.scopes
            .run(
                "test_ctrl_prop",
                LockGuardBuilder::new().write(LockObj::CtrlConfig),
                |tx, _| Ok(objects.ctrl_conf().set_prop(tx, key, value, None)?),
            )
            .await
            .unwrap();
    }

    /// Set a node property.
    pub async fn set_node_prop(&self, node: &str, key: &str, value: &str) {
        let node = self.objects.node(&NodeName::new(node).unwrap()).unwrap();
        self.scopes
            .run(
                "test_node_prop",
                LockGuardBuilder::new().write(LockObj::NodesMap),
                |tx, _| Ok(node.props().set_prop(tx, key, value, None)?),
            )
            .await
            .unwrap();
    }
}

pub fn thin_pool(name: &str) -> StorPool {
    StorPool {
        name: StorPoolName::new(name).unwrap(),
        provider_kind: ProviderKind::LvmThin,
        free_capacity_kib: None,
    }
}

pub fn thick_pool(name: &str, free_kib: u64) -> StorPool {
    StorPool {
        name: StorPoolName::new(name).unwrap(),
        provider_kind: ProviderKind::Lvm,
        free_capacity_kib: Some(free_kib),
    }
}

/// A request for one 1 GiB volume from pool `thin`.
pub fn request(backup: &str, rsc: &str, cluster_id: &str) -> BackupShippingRequest {
    BackupShippingRequest {
        src_version: LOCAL_VERSION,
        dst_rsc_name: rsc.to_string(),
        metadata: BackupMetadata {
            rsc_name: "src-rsc".to_string(),
            rsc_dfn_props: BTreeMap::from([("Aux/origin".to_string(), "remote".to_string())]),
            snap_dfn_props: BTreeMap::new(),
            volumes: vec![BackupVolumeMetadata {
                vlm_nr: 0,
                size_kib: 1024 * 1024,
                stor_pool_name: "thin".to_string(),
            }],
        },
        src_backup_name: backup.to_string(),
        src_cluster_id: cluster_id.to_string(),
        dst_node_name: None,
        dst_node_net_if_name: None,
        dst_stor_pool: None,
        stor_pool_rename_map: BTreeMap::new(),
        use_zstd: false,
    }
}
