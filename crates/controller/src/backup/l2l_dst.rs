//! Destination side of a cluster-to-cluster backup shipment.
//!
//! A source cluster asks this controller to receive a backup. The handler
//! checks the versions, reserves a TCP port, records the session in two lock
//! scopes and answers with the address and port the source should send to:
//!
//! 1. version check and port allocation, before any lock is taken
//! 2. first scope: cluster short id, resource definition, tracking remote
//! 3. satellites learn about the remote
//! 4. thin pool capacities are fetched
//! 5. second scope: snapshot definition and snapshot on the receiving node
//! 6. the receiving interface is picked under read locks
//!
//! Whatever fails after the port was taken gives the port back. Once the
//! tracking remote is committed, the session is aborted through the
//! [`BackupShippingMgr`], which also releases the port.

use super::restore::{KEY_SHIPPING_REMOTE, RestoreInput, restore_backup};
use super::shipping_mgr::{BackupShippingMgr, TrackedSession};
use super::short_id::{RandomShortIds, ShortIdSource, resolve_short_id};
use super::types::{BackupShippingData, BackupShippingRequest, BackupShippingResponse};
use super::{KEY_PREF_NIC, NAMESPC_BACKUP_SHIPPING, NAMESPC_SHIPPING_REMOTES};
use crate::error::{CtrlError, CtrlResult};
use crate::locks::{LockGuard, LockGuardBuilder, LockObj};
use crate::metrics;
use crate::objects::{
    CoreObjects, NetInterface, Node, Remote, RemoteType, ResourceDefinition, Snapshot,
    SnapshotDefinition, StltRemote,
};
use crate::satellite::{FreeCapacityFetcher, SatelliteUpdater};
use crate::scope::ScopeRunner;
use ferrostor_core::{
    ApiCallRc, ApiCallRcEntry, NetInterfaceName, PortPool, PriorityProps, ReadOnlyProps,
    RemoteName, RetCode, SnapshotName, Version,
};
use std::collections::BTreeSet;
use std::sync::Arc;

/// Handles inbound shipping requests of other clusters.
pub struct BackupL2LDstHandler {
    objects: Arc<CoreObjects>,
    scopes: ScopeRunner,
    ports: Arc<PortPool>,
    satellites: Arc<dyn SatelliteUpdater>,
    capacities: Arc<dyn FreeCapacityFetcher>,
    shipping: Arc<BackupShippingMgr>,
    short_ids: Arc<dyn ShortIdSource>,
    local_version: Version,
}

/// Everything the response is built from.
struct Prepared {
    remote_name: RemoteName,
    snap_name: SnapshotName,
    node: String,
    address: String,
    port: u16,
}

impl BackupL2LDstHandler {
    pub fn new(
        objects: Arc<CoreObjects>,
        scopes: ScopeRunner,
        ports: Arc<PortPool>,
        satellites: Arc<dyn SatelliteUpdater>,
        capacities: Arc<dyn FreeCapacityFetcher>,
        shipping: Arc<BackupShippingMgr>,
    ) -> Self {
        Self {
            objects,
            scopes,
            ports,
            satellites,
            capacities,
            shipping,
            short_ids: Arc::new(RandomShortIds),
            local_version: Version::current(),
        }
    }

    pub fn with_short_ids(mut self, short_ids: Arc<dyn ShortIdSource>) -> Self {
        self.short_ids = short_ids;
        self
    }

    pub fn with_local_version(mut self, version: Version) -> Self {
        self.local_version = version;
        self
    }

    pub fn local_version(&self) -> Version {
        self.local_version
    }

    /// Negotiate an inbound shipping session.
    pub async fn start_receiving(&self, req: BackupShippingRequest) -> BackupShippingResponse {
        metrics::SHIPPING_SESSIONS_STARTED.inc();
        let src_backup = req.src_backup_name.clone();
        match self.try_start_receiving(req).await {
            Ok(prepared) => {
                metrics::SHIPPING_SESSIONS_SUCCEEDED.inc();
                tracing::info!(
                    backup = %src_backup,
                    snapshot = %prepared.snap_name,
                    remote = %prepared.remote_name,
                    node = %prepared.node,
                    address = %prepared.address,
                    port = prepared.port,
                    "ready to receive backup"
                );
                let rc = ApiCallRc::single(
                    ApiCallRcEntry::new(
                        RetCode::Created,
                        format!(
                            "snapshot {} is ready to receive backup {src_backup}",
                            prepared.snap_name
                        ),
                    )
                    .with_obj_ref("snapshot", prepared.snap_name.as_str())
                    .with_obj_ref("node", prepared.node.as_str()),
                );
                BackupShippingResponse::success(rc, prepared.address, prepared.port)
            }
            Err(e) => {
                metrics::record_shipping_failed(e.code());
                BackupShippingResponse::failure(e.to_api_call_rc())
            }
        }
    }

    async fn try_start_receiving(&self, req: BackupShippingRequest) -> CtrlResult<Prepared> {
        if !self.local_version.is_compatible_with(&req.src_version) {
            return Err(CtrlError::api(
                RetCode::FailBackupIncompatibleVersion,
                format!(
                    "source cluster runs version {}, this cluster runs {}",
                    req.src_version, self.local_version
                ),
            ));
        }
        let data = BackupShippingData::from_request(req)?;

        let port = self.ports.allocate().map_err(|_| {
            let (start, end) = self.ports.range();
            CtrlError::api(
                RetCode::FailPoolExhaustedBackupShippingTcpPort,
                format!("all backup shipping ports in {start}..={end} are in use"),
            )
        })?;
        metrics::SHIPPING_PORTS_ALLOCATED.set(self.ports.allocated_count() as i64);
        let data = BackupShippingData {
            port: Some(port),
            ..data
        };

        let mut committed_remote = None;
        match self.prepare(data, port, &mut committed_remote).await {
            Ok(prepared) => Ok(prepared),
            Err(e) => {
                self.release_session(port, committed_remote).await;
                Err(e)
            }
        }
    }

    async fn release_session(&self, port: u16, committed_remote: Option<RemoteName>) {
        match committed_remote {
            Some(remote) => {
                if let Err(e) = self.shipping.abort_session(&remote).await {
                    // The port stays with the remote until that remote is finished.
                    tracing::error!(
                        remote = %remote,
                        port,
                        error = %e,
                        "failed to clean up aborted shipping session"
                    );
                }
            }
            None => {
                self.ports.release(port);
                metrics::SHIPPING_PORTS_ALLOCATED.set(self.ports.allocated_count() as i64);
            }
        }
    }

    async fn prepare(
        &self,
        mut data: BackupShippingData,
        port: u16,
        committed_remote: &mut Option<RemoteName>,
    ) -> CtrlResult<Prepared> {
        let objects = Arc::clone(&self.objects);

        let (snap_name, remote) = self
            .scopes
            .run(
                "backup_l2l_dst_prepare",
                LockGuardBuilder::new()
                    .read(LockObj::NodesMap)
                    .write(LockObj::RscDfnMap)
                    .write(LockObj::CtrlConfig),
                |tx, locks| {
                    let short_id = resolve_short_id(
                        tx,
                        locks,
                        objects.ctrl_conf(),
                        &data.src_cluster_id,
                        self.short_ids.as_ref(),
                    )?;
                    let snap_name =
                        SnapshotName::new(format!("{}_{short_id}", data.src_backup_name))?;

                    let (rsc_dfn, created) =
                        objects.get_or_create_rsc_dfn(tx, locks, &data.dst_rsc_name)?;
                    if rsc_dfn.snapshot_dfn(&snap_name).is_some() {
                        return Err(CtrlError::api(
                            RetCode::FailExistsSnapshotDfn,
                            format!(
                                "snapshot {snap_name} of resource {} already exists",
                                data.dst_rsc_name
                            ),
                        ));
                    }
                    if created {
                        for (key, value) in &data.metadata.rsc_dfn_props {
                            rsc_dfn.props().set_prop(tx, key, value.as_str(), None)?;
                        }
                    }

                    let remote = objects.create_remote(
                        tx,
                        locks,
                        Remote::Satellite(StltRemote {
                            name: RemoteName::new(format!("stlt-{snap_name}"))?,
                            cluster_id: data.src_cluster_id.clone(),
                            port,
                            rsc_name: data.dst_rsc_name.clone(),
                            snap_name: snap_name.clone(),
                            use_zstd: data.use_zstd,
                        }),
                    )?;
                    rsc_dfn.props().set_prop(
                        tx,
                        remote.name().as_str(),
                        snap_name.as_str(),
                        Some(NAMESPC_SHIPPING_REMOTES),
                    )?;
                    Ok((snap_name, remote))
                },
            )
            .await?;
        *committed_remote = Some(remote.name().clone());
        data.snap_name = Some(snap_name.clone());

        self.satellites.update_satellites(&remote).await?;

        let nodes: BTreeSet<_> = data.dst_node_name.iter().cloned().collect();
        let capacities = self.capacities.fetch_thin_free_capacities(&nodes).await?;

        let (snap_dfn, snapshot) = self
            .scopes
            .run(
                "backup_l2l_dst_restore",
                LockGuardBuilder::new()
                    .write(LockObj::NodesMap)
                    .write(LockObj::RscDfnMap),
                |tx, locks| {
                    restore_backup(
                        tx,
                        locks,
                        &objects,
                        RestoreInput {
                            data: &data,
                            snap_name: &snap_name,
                            remote_name: remote.name(),
                            capacities: &capacities,
                        },
                    )
                },
            )
            .await?;

        let net_if = self
            .scopes
            .run(
                "backup_l2l_dst_response",
                LockGuardBuilder::new()
                    .read(LockObj::NodesMap)
                    .read(LockObj::RscDfnMap),
                |_, locks| {
                    self.resolve_net_interface(
                        locks,
                        &snap_dfn,
                        &snapshot,
                        data.dst_net_if_name.as_ref(),
                    )
                },
            )
            .await?;

        self.shipping.track(
            RemoteType::Satellite,
            TrackedSession {
                remote_name: remote.name().clone(),
                rsc_name: data.dst_rsc_name.clone(),
                snap_name: snap_name.clone(),
                port: Some(port),
            },
        )?;

        Ok(Prepared {
            remote_name: remote.name().clone(),
            snap_name,
            node: snapshot.node_name().to_string(),
            address: net_if.address,
            port,
        })
    }

    /// Pick the interface the source cluster should send to.
    fn resolve_net_interface(
        &self,
        locks: &LockGuard,
        snap_dfn: &SnapshotDefinition,
        snapshot: &Snapshot,
        requested: Option<&NetInterfaceName>,
    ) -> CtrlResult<NetInterface> {
        locks.ensure_read(LockObj::NodesMap)?;
        locks.ensure_read(LockObj::RscDfnMap)?;

        let remote = snap_dfn
            .props()
            .get_prop(KEY_SHIPPING_REMOTE, None)
            .and_then(|name| RemoteName::new(name).ok())
            .and_then(|name| self.objects.remote(&name));
        if remote.is_none() {
            return Err(CtrlError::implementation(format!(
                "snapshot definition {}/{} references a remote that does not exist",
                snap_dfn.rsc_name(),
                snap_dfn.name()
            )));
        }

        let node = self.objects.node(snapshot.node_name()).ok_or_else(|| {
            CtrlError::implementation(format!(
                "snapshot {} was created on unknown node {}",
                snapshot.snap_name(),
                snapshot.node_name()
            ))
        })?;
        let rsc_dfn = self.objects.rsc_dfn(snapshot.rsc_name()).ok_or_else(|| {
            CtrlError::implementation(format!(
                "snapshot {} belongs to unknown resource definition {}",
                snapshot.snap_name(),
                snapshot.rsc_name()
            ))
        })?;
        choose_net_interface(&node, &rsc_dfn, &self.objects, requested)
    }
}

/// Requested interface, then the `PrefNic` prop, then the node's first interface.
fn choose_net_interface(
    node: &Node,
    rsc_dfn: &ResourceDefinition,
    objects: &CoreObjects,
    requested: Option<&NetInterfaceName>,
) -> CtrlResult<NetInterface> {
    if let Some(name) = requested {
        if let Some(net_if) = node.net_interface(name) {
            return Ok(net_if);
        }
        tracing::warn!(
            node = %node.name(),
            net_if = %name,
            "requested network interface not found, falling back"
        );
    }

    let props = PriorityProps::with_props([
        (node.props() as &dyn ReadOnlyProps, format!("node {}", node.name())),
        (
            rsc_dfn.props() as &dyn ReadOnlyProps,
            format!("resource definition {}", rsc_dfn.name()),
        ),
        (
            objects.ctrl_conf() as &dyn ReadOnlyProps,
            "controller".to_string(),
        ),
    ]);
    if let Some(pref) = props.get_prop(KEY_PREF_NIC, Some(NAMESPC_BACKUP_SHIPPING)) {
        match NetInterfaceName::new(pref.as_str())
            .ok()
            .and_then(|name| node.net_interface(&name))
        {
            Some(net_if) => return Ok(net_if),
            None => tracing::warn!(
                node = %node.name(),
                pref_nic = %pref,
                "preferred network interface not found on node"
            ),
        }
    }

    node.net_interfaces().into_iter().next().ok_or_else(|| {
        CtrlError::api(
            RetCode::FailNotFoundNetIf,
            format!("node {} has no network interface", node.name()),
        )
    })
}
