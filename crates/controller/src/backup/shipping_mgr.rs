//! Completion of shipping sessions, dispatched by remote type.

use super::restore::KEY_SHIPPING_REMOTE;
use super::NAMESPC_SHIPPING_REMOTES;
use crate::error::{CtrlError, CtrlResult};
use crate::locks::{LockGuard, LockGuardBuilder, LockObj};
use crate::metrics;
use crate::objects::{CoreObjects, Remote, RemoteType, SnapshotDfnFlags};
use crate::scope::ScopeRunner;
use async_trait::async_trait;
use ferrostor_core::{PortPool, ReadOnlyProps, RemoteName, ResourceName, RetCode, SnapshotName};
use ferrostor_metadata::TransactionMgr;
use std::collections::BTreeMap;
use std::sync::{Arc, Mutex, PoisonError};

/// A shipping session this controller is waiting on.
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct TrackedSession {
    pub remote_name: RemoteName,
    pub rsc_name: ResourceName,
    pub snap_name: SnapshotName,
    pub port: Option<u16>,
}

/// Handles the sessions of one kind of remote.
#[async_trait]
pub trait BackupShippingService: Send + Sync {
    fn remote_type(&self) -> RemoteType;

    fn track(&self, session: TrackedSession);

    fn active_sessions(&self) -> Vec<TrackedSession>;

    /// Settle every snapshot definition shipped through `remote`.
    async fn shipping_finished(&self, remote: &Remote, success: bool) -> CtrlResult<()>;
}

#[derive(Default)]
struct SessionTable(Mutex<BTreeMap<RemoteName, TrackedSession>>);

impl SessionTable {
    fn insert(&self, session: TrackedSession) {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .insert(session.remote_name.clone(), session);
    }

    fn remove(&self, remote: &RemoteName) -> Option<TrackedSession> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .remove(remote)
    }

    fn list(&self) -> Vec<TrackedSession> {
        self.0
            .lock()
            .unwrap_or_else(PoisonError::into_inner)
            .values()
            .cloned()
            .collect()
    }
}

/// Flip the shipping flags of every snapshot definition receiving through
/// `remote`. With `detach` the settled definitions also drop their reference
/// to the remote. Returns how many were settled.
fn settle_snapshot_dfns(
    tx: &mut TransactionMgr,
    locks: &LockGuard,
    objects: &CoreObjects,
    remote: &RemoteName,
    success: bool,
    detach: bool,
) -> CtrlResult<usize> {
    let outcome = if success {
        SnapshotDfnFlags::SHIPPED
    } else {
        SnapshotDfnFlags::SHIPPING_ABORTED
    };
    let mut settled = 0;
    for rsc_dfn in objects.rsc_dfns() {
        for snap_dfn in rsc_dfn.snapshot_dfns() {
            let shipping_remote = snap_dfn.props().get_prop(KEY_SHIPPING_REMOTE, None);
            if shipping_remote.as_deref() != Some(remote.as_str())
                || !snap_dfn.flags().contains(SnapshotDfnFlags::SHIPPING)
            {
                continue;
            }
            snap_dfn.update_flags(tx, locks, outcome, SnapshotDfnFlags::SHIPPING)?;
            if detach {
                snap_dfn.props().remove_prop(tx, KEY_SHIPPING_REMOTE, None)?;
            }
            settled += 1;
        }
    }
    Ok(settled)
}

/// Sessions received from another cluster through a temporary satellite remote.
///
/// Finishing a session deletes the remote and returns its port to the pool.
pub struct L2lShippingService {
    objects: Arc<CoreObjects>,
    scopes: ScopeRunner,
    ports: Arc<PortPool>,
    sessions: SessionTable,
}

impl L2lShippingService {
    pub fn new(objects: Arc<CoreObjects>, scopes: ScopeRunner, ports: Arc<PortPool>) -> Self {
        Self {
            objects,
            scopes,
            ports,
            sessions: SessionTable::default(),
        }
    }
}

#[async_trait]
impl BackupShippingService for L2lShippingService {
    fn remote_type(&self) -> RemoteType {
        RemoteType::Satellite
    }

    fn track(&self, session: TrackedSession) {
        tracing::debug!(remote = %session.remote_name, port = ?session.port, "tracking shipping session");
        self.sessions.insert(session);
    }

    fn active_sessions(&self) -> Vec<TrackedSession> {
        self.sessions.list()
    }

    async fn shipping_finished(&self, remote: &Remote, success: bool) -> CtrlResult<()> {
        let Some(stlt) = remote.as_satellite() else {
            return Err(CtrlError::implementation(format!(
                "{} remote {} routed to the satellite shipping service",
                remote.remote_type(),
                remote.name()
            )));
        };
        let name = stlt.name.clone();
        let objects = Arc::clone(&self.objects);
        let settled = self
            .scopes
            .run(
                "shipping_finished",
                LockGuardBuilder::new().write(LockObj::RscDfnMap),
                |tx, locks| {
                    let settled = settle_snapshot_dfns(tx, locks, &objects, &name, success, true)?;
                    for rsc_dfn in objects.rsc_dfns() {
                        rsc_dfn
                            .props()
                            .remove_prop(tx, name.as_str(), Some(NAMESPC_SHIPPING_REMOTES))?;
                    }
                    objects.delete_remote(tx, locks, &name)?;
                    Ok(settled)
                },
            )
            .await?;

        self.sessions.remove(&name);
        self.ports.release(stlt.port);
        metrics::SHIPPING_PORTS_ALLOCATED.set(self.ports.allocated_count() as i64);
        tracing::info!(
            remote = %name,
            port = stlt.port,
            success,
            settled,
            "shipping session finished"
        );
        Ok(())
    }
}

/// Sessions shipped to or from an S3 bucket. The remote outlives the session.
pub struct S3ShippingService {
    objects: Arc<CoreObjects>,
    scopes: ScopeRunner,
    sessions: SessionTable,
}

impl S3ShippingService {
    pub fn new(objects: Arc<CoreObjects>, scopes: ScopeRunner) -> Self {
        Self {
            objects,
            scopes,
            sessions: SessionTable::default(),
        }
    }
}

#[async_trait]
impl BackupShippingService for S3ShippingService {
    fn remote_type(&self) -> RemoteType {
        RemoteType::S3
    }

    fn track(&self, session: TrackedSession) {
        self.sessions.insert(session);
    }

    fn active_sessions(&self) -> Vec<TrackedSession> {
        self.sessions.list()
    }

    async fn shipping_finished(&self, remote: &Remote, success: bool) -> CtrlResult<()> {
        let name = remote.name().clone();
        let objects = Arc::clone(&self.objects);
        let settled = self
            .scopes
            .run(
                "shipping_finished",
                LockGuardBuilder::new().write(LockObj::RscDfnMap),
                |tx, locks| settle_snapshot_dfns(tx, locks, &objects, &name, success, false),
            )
            .await?;
        self.sessions.remove(&name);
        tracing::info!(remote = %name, success, settled, "S3 shipping finished");
        Ok(())
    }
}

/// Registry of shipping services keyed by the remote type they handle.
pub struct BackupShippingMgr {
    services: BTreeMap<RemoteType, Arc<dyn BackupShippingService>>,
    objects: Arc<CoreObjects>,
    scopes: ScopeRunner,
}

impl BackupShippingMgr {
    /// Registry with the satellite and S3 services.
    pub fn new(objects: Arc<CoreObjects>, scopes: ScopeRunner, ports: Arc<PortPool>) -> Self {
        let services: [Arc<dyn BackupShippingService>; 2] = [
            Arc::new(L2lShippingService::new(
                Arc::clone(&objects),
                scopes.clone(),
                ports,
            )),
            Arc::new(S3ShippingService::new(Arc::clone(&objects), scopes.clone())),
        ];
        Self::with_services(objects, scopes, services)
    }

    pub fn with_services(
        objects: Arc<CoreObjects>,
        scopes: ScopeRunner,
        services: impl IntoIterator<Item = Arc<dyn BackupShippingService>>,
    ) -> Self {
        Self {
            services: services
                .into_iter()
                .map(|service| (service.remote_type(), service))
                .collect(),
            objects,
            scopes,
        }
    }

    pub fn service(&self, remote_type: RemoteType) -> CtrlResult<&Arc<dyn BackupShippingService>> {
        self.services.get(&remote_type).ok_or_else(|| {
            CtrlError::implementation(format!("no shipping service for {remote_type} remotes"))
        })
    }

    pub fn track(&self, remote_type: RemoteType, session: TrackedSession) -> CtrlResult<()> {
        self.service(remote_type)?.track(session);
        Ok(())
    }

    /// Every session still in flight, across all services.
    pub fn active_sessions(&self) -> Vec<TrackedSession> {
        self.services
            .values()
            .flat_map(|service| service.active_sessions())
            .collect()
    }

    /// Settle the session shipped through `remote_name`.
    pub async fn shipping_finished(&self, remote_name: &RemoteName, success: bool) -> CtrlResult<()> {
        let Some(remote) = self.objects.remote(remote_name) else {
            return Err(self.missing_remote(remote_name).await);
        };
        let remote_type = remote.remote_type();
        self.service(remote_type)?
            .shipping_finished(&remote, success)
            .await?;
        metrics::record_shipping_finished(remote_type.as_str(), success);
        Ok(())
    }

    /// Compensating cleanup for an inbound session that failed after its
    /// remote was committed.
    pub async fn abort_session(&self, remote_name: &RemoteName) -> CtrlResult<()> {
        let Some(remote) = self.objects.remote(remote_name) else {
            tracing::warn!(remote = %remote_name, "nothing to abort, remote is gone");
            return Ok(());
        };
        self.service(RemoteType::Satellite)?
            .shipping_finished(&remote, false)
            .await?;
        metrics::record_shipping_finished(RemoteType::Satellite.as_str(), false);
        Ok(())
    }

    /// Error for a finish notification naming an unknown remote. Snapshot
    /// definitions still shipping through it mean an earlier commit went wrong.
    async fn missing_remote(&self, remote_name: &RemoteName) -> CtrlError {
        let objects = Arc::clone(&self.objects);
        let referencing = self
            .scopes
            .run(
                "shipping_finished",
                LockGuardBuilder::new().read(LockObj::RscDfnMap),
                |_, _| {
                    let mut out = Vec::new();
                    for rsc_dfn in objects.rsc_dfns() {
                        for snap_dfn in rsc_dfn.snapshot_dfns() {
                            let prop = snap_dfn.props().get_prop(KEY_SHIPPING_REMOTE, None);
                            if prop.as_deref() == Some(remote_name.as_str())
                                && snap_dfn.flags().contains(SnapshotDfnFlags::SHIPPING)
                            {
                                out.push(format!("{}/{}", snap_dfn.rsc_name(), snap_dfn.name()));
                            }
                        }
                    }
                    Ok(out)
                },
            )
            .await;
        match referencing {
            Ok(refs) if refs.is_empty() => CtrlError::api(
                RetCode::FailNotFoundRemote,
                format!("remote {remote_name} not found"),
            ),
            Ok(refs) => CtrlError::implementation(format!(
                "snapshot definition(s) {} reference remote {remote_name}, which does not exist",
                refs.join(", ")
            )),
            Err(e) => e,
        }
    }
}
