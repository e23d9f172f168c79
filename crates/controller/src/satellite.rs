//! Seams to the satellites: pushing updated objects and fetching pool capacities.

use crate::error::{CtrlError, CtrlResult};
use crate::objects::{CoreObjects, Remote};
use async_trait::async_trait;
use ferrostor_core::{NodeName, StorPoolName};
use std::collections::{BTreeMap, BTreeSet};
use std::sync::Arc;
use tokio::sync::broadcast;

/// Free capacity in KiB per thin pool, per node.
pub type ThinFreeCapacities = BTreeMap<NodeName, BTreeMap<StorPoolName, u64>>;

/// Pushes changed objects to the satellites that need them.
#[async_trait]
pub trait SatelliteUpdater: Send + Sync {
    /// Distribute `remote` and wait until every interested satellite applied it.
    async fn update_satellites(&self, remote: &Remote) -> CtrlResult<()>;
}

/// Queries satellites for the current free space of their thin pools.
#[async_trait]
pub trait FreeCapacityFetcher: Send + Sync {
    /// An empty `nodes` set means every node.
    async fn fetch_thin_free_capacities(
        &self,
        nodes: &BTreeSet<NodeName>,
    ) -> CtrlResult<ThinFreeCapacities>;
}

/// Publishes remote updates on a broadcast channel that satellite connections
/// subscribe to.
pub struct BroadcastSatelliteUpdater {
    tx: broadcast::Sender<Remote>,
}

impl BroadcastSatelliteUpdater {
    pub fn new(capacity: usize) -> Self {
        let (tx, _) = broadcast::channel(capacity.max(1));
        Self { tx }
    }

    pub fn subscribe(&self) -> broadcast::Receiver<Remote> {
        self.tx.subscribe()
    }
}

#[async_trait]
impl SatelliteUpdater for BroadcastSatelliteUpdater {
    async fn update_satellites(&self, remote: &Remote) -> CtrlResult<()> {
        match self.tx.send(remote.clone()) {
            Ok(receivers) => {
                tracing::debug!(remote = %remote.name(), receivers, "remote update published");
            }
            // No satellite is connected; it receives the full state on connect.
            Err(_) => {
                tracing::debug!(remote = %remote.name(), "no satellite connected for remote update");
            }
        }
        Ok(())
    }
}

/// Answers capacity queries from the capacities satellites last reported.
pub struct StoredCapacityFetcher {
    objects: Arc<CoreObjects>,
}

impl StoredCapacityFetcher {
    pub fn new(objects: Arc<CoreObjects>) -> Self {
        Self { objects }
    }
}

#[async_trait]
impl FreeCapacityFetcher for StoredCapacityFetcher {
    async fn fetch_thin_free_capacities(
        &self,
        nodes: &BTreeSet<NodeName>,
    ) -> CtrlResult<ThinFreeCapacities> {
        let mut out = ThinFreeCapacities::new();
        for name in nodes {
            if self.objects.node(name).is_none() {
                return Err(CtrlError::Satellite(format!("node {name} is not connected")));
            }
        }
        for node in self.objects.nodes() {
            if !nodes.is_empty() && !nodes.contains(node.name()) {
                continue;
            }
            let pools: BTreeMap<_, _> = node
                .stor_pools()
                .into_iter()
                .filter(|pool| pool.provider_kind.is_thin())
                .filter_map(|pool| pool.free_capacity_kib.map(|kib| (pool.name, kib)))
                .collect();
            if !pools.is_empty() {
                out.insert(node.name().clone(), pools);
            }
        }
        Ok(out)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::objects::StltRemote;
    use ferrostor_core::{RemoteName, ResourceName, SnapshotName};

    #[tokio::test]
    async fn test_broadcast_without_receivers_is_ok() {
        let updater = BroadcastSatelliteUpdater::new(4);
        let remote = Remote::Satellite(StltRemote {
            name: RemoteName::new("stlt-snap").unwrap(),
            cluster_id: "c1".to_string(),
            port: 12000,
            rsc_name: ResourceName::new("rsc").unwrap(),
            snap_name: SnapshotName::new("snap").unwrap(),
            use_zstd: false,
        });
        updater.update_satellites(&remote).await.unwrap();

        let mut rx = updater.subscribe();
        updater.update_satellites(&remote).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), remote);
    }

    #[tokio::test]
    async fn test_unknown_node_fails_capacity_fetch() {
        let fetcher = StoredCapacityFetcher::new(Arc::new(CoreObjects::new()));
        assert!(
            fetcher
                .fetch_thin_free_capacities(&BTreeSet::new())
                .await
                .unwrap()
                .is_empty()
        );
        let nodes = BTreeSet::from([NodeName::new("ghost").unwrap()]);
        let err = fetcher.fetch_thin_free_capacities(&nodes).await.unwrap_err();
        assert!(matches!(err, CtrlError::Satellite(_)));
    }
}
