//! Controller state shared by the daemon's components.

use crate::backup::{BackupL2LDstHandler, BackupShippingMgr, TrackedSession};
use crate::error::CtrlResult;
use crate::locks::LockManager;
use crate::metrics;
use crate::objects::{CoreObjects, RemoteType};
use crate::satellite::{BroadcastSatelliteUpdater, StoredCapacityFetcher};
use crate::scope::ScopeRunner;
use ferrostor_core::PortPool;
use ferrostor_core::config::AppConfig;
use ferrostor_metadata::{DbBackend, TransactionMgrFactory};
use std::sync::Arc;

/// Capacity of the satellite update channel.
const SATELLITE_UPDATE_BUFFER: usize = 64;

#[derive(Clone)]
pub struct CtrlState {
    pub config: Arc<AppConfig>,
    pub backend: Arc<dyn DbBackend>,
    pub objects: Arc<CoreObjects>,
    pub scopes: ScopeRunner,
    pub ports: Arc<PortPool>,
    pub satellites: Arc<BroadcastSatelliteUpdater>,
    pub shipping: Arc<BackupShippingMgr>,
    pub l2l_dst: Arc<BackupL2LDstHandler>,
}

impl CtrlState {
    /// Wire up the controller around a loaded object model.
    ///
    /// Ports held by satellite remotes that survived a restart are reserved
    /// again and their sessions tracked, so they are released when those
    /// sessions finish.
    pub fn new(
        config: AppConfig,
        backend: Arc<dyn DbBackend>,
        objects: CoreObjects,
    ) -> CtrlResult<Self> {
        let objects = Arc::new(objects);
        let scopes = ScopeRunner::new(
            Arc::new(TransactionMgrFactory::new(Arc::clone(&backend))),
            Arc::new(LockManager::new()),
        );
        let ports = Arc::new(PortPool::new(
            config.shipping.port_range_start,
            config.shipping.port_range_end,
        )?);
        let shipping = Arc::new(BackupShippingMgr::new(
            Arc::clone(&objects),
            scopes.clone(),
            Arc::clone(&ports),
        ));

        for remote in objects.remotes() {
            let Some(stlt) = remote.as_satellite() else {
                continue;
            };
            if let Err(e) = ports.mark_allocated(stlt.port) {
                tracing::warn!(
                    remote = %stlt.name,
                    port = stlt.port,
                    error = %e,
                    "could not reserve port of persisted shipping session"
                );
            }
            shipping.track(
                RemoteType::Satellite,
                TrackedSession {
                    remote_name: stlt.name.clone(),
                    rsc_name: stlt.rsc_name.clone(),
                    snap_name: stlt.snap_name.clone(),
                    port: Some(stlt.port),
                },
            )?;
        }
        metrics::SHIPPING_PORTS_ALLOCATED.set(ports.allocated_count() as i64);

        let satellites = Arc::new(BroadcastSatelliteUpdater::new(SATELLITE_UPDATE_BUFFER));
        let l2l_dst = Arc::new(BackupL2LDstHandler::new(
            Arc::clone(&objects),
            scopes.clone(),
            Arc::clone(&ports),
            satellites.clone(),
            Arc::new(StoredCapacityFetcher::new(Arc::clone(&objects))),
            Arc::clone(&shipping),
        ));

        Ok(Self {
            config: Arc::new(config),
            backend,
            objects,
            scopes,
            ports,
            satellites,
            shipping,
            l2l_dst,
        })
    }
}
