//! Controller-side object model.
//!
//! Every mutable field lives in a transactional container, so a failed scope
//! leaves the in-memory model exactly as it was before the scope started.

mod node;
mod remote;
mod rsc_dfn;

pub use node::{NetInterface, Node, ProviderKind, StorPool};
pub use remote::{LinstorRemote, Remote, RemoteType, S3Remote, StltRemote};
pub use rsc_dfn::{
    ResourceDefinition, Snapshot, SnapshotDefinition, SnapshotDfnFlags, SnapshotVolume,
};

use crate::error::{CtrlError, CtrlResult};
use crate::locks::{LockGuard, LockObj};
use ferrostor_core::{NodeName, RemoteName, ResourceName, RetCode};
use ferrostor_metadata::models::{
    NetInterfaceRow, NodeRow, PropRow, RemoteRow, ResourceDefinitionRow, SnapshotDefinitionRow,
    SnapshotRow, SnapshotVolumeRow, StorPoolRow, TableRow,
};
use ferrostor_metadata::{DbBackend, PropsContainer, TransactionMgr, TxMap};
use std::collections::BTreeMap;
use std::sync::Arc;

/// Props instance of the controller-wide configuration.
pub const CTRL_CONF_INSTANCE: &str = "/CTRLCFG";

async fn load_rows<R: TableRow>(backend: &dyn DbBackend) -> CtrlResult<Vec<R>> {
    backend
        .load_table(R::table())
        .await?
        .iter()
        .map(|row| R::from_row(row).map_err(CtrlError::from))
        .collect()
}

/// Persisted property rows grouped by props instance.
struct PropRows(BTreeMap<String, Vec<PropRow>>);

impl PropRows {
    fn container(&self, instance: String) -> PropsContainer {
        let rows = self.0.get(&instance).map(Vec::as_slice).unwrap_or_default();
        PropsContainer::from_rows(instance, rows)
    }
}

/// Root of the object model: nodes, resource definitions, remotes and the
/// controller configuration.
pub struct CoreObjects {
    nodes: TxMap<NodeName, Arc<Node>>,
    rsc_dfns: TxMap<ResourceName, Arc<ResourceDefinition>>,
    remotes: TxMap<RemoteName, Arc<Remote>>,
    ctrl_conf: PropsContainer,
}

impl Default for CoreObjects {
    fn default() -> Self {
        Self::new()
    }
}

impl CoreObjects {
    /// An empty model.
    pub fn new() -> Self {
        Self {
            nodes: TxMap::new(),
            rsc_dfns: TxMap::new(),
            remotes: TxMap::new(),
            ctrl_conf: PropsContainer::new(CTRL_CONF_INSTANCE),
        }
    }

    /// Rebuild the model from every persisted row.
    pub async fn load(backend: &dyn DbBackend) -> CtrlResult<Self> {
        let mut props = BTreeMap::<String, Vec<PropRow>>::new();
        for row in load_rows::<PropRow>(backend).await? {
            props.entry(row.props_instance.clone()).or_default().push(row);
        }
        let props = PropRows(props);

        let mut net_ifs = BTreeMap::<NodeName, Vec<NetInterfaceRow>>::new();
        for row in load_rows::<NetInterfaceRow>(backend).await? {
            net_ifs.entry(row.node_name.clone()).or_default().push(row);
        }
        let mut pools = BTreeMap::<NodeName, Vec<StorPoolRow>>::new();
        for row in load_rows::<StorPoolRow>(backend).await? {
            pools.entry(row.node_name.clone()).or_default().push(row);
        }
        let mut nodes = BTreeMap::new();
        for row in load_rows::<NodeRow>(backend).await? {
            let name = row.node_name.clone();
            let node = Node::restore(
                row,
                net_ifs.remove(&name).unwrap_or_default(),
                pools.remove(&name).unwrap_or_default(),
                props.container(Node::props_instance(&name)),
            )?;
            nodes.insert(name, Arc::new(node));
        }

        let mut volumes = BTreeMap::<(NodeName, ResourceName, String), Vec<SnapshotVolumeRow>>::new();
        for row in load_rows::<SnapshotVolumeRow>(backend).await? {
            volumes
                .entry((
                    row.node_name.clone(),
                    row.rsc_name.clone(),
                    row.snap_name.to_string(),
                ))
                .or_default()
                .push(row);
        }
        let mut snapshots = BTreeMap::<(ResourceName, String), Vec<Snapshot>>::new();
        for row in load_rows::<SnapshotRow>(backend).await? {
            let vlm_key = (
                row.node_name.clone(),
                row.rsc_name.clone(),
                row.snap_name.to_string(),
            );
            let instance = Snapshot::props_instance(&row.node_name, &row.rsc_name, &row.snap_name);
            let dfn_key = (row.rsc_name.clone(), row.snap_name.to_string());
            let snapshot = Snapshot::restore(
                row,
                volumes.remove(&vlm_key).unwrap_or_default(),
                props.container(instance),
            );
            snapshots.entry(dfn_key).or_default().push(snapshot);
        }
        let mut snap_dfns = BTreeMap::<ResourceName, BTreeMap<_, _>>::new();
        for row in load_rows::<SnapshotDefinitionRow>(backend).await? {
            let rsc_name = row.rsc_name.clone();
            let snap_name = row.snap_name.clone();
            let instance = SnapshotDefinition::props_instance(&rsc_name, &snap_name);
            let dfn = SnapshotDefinition::restore(
                row,
                props.container(instance),
                snapshots
                    .remove(&(rsc_name.clone(), snap_name.to_string()))
                    .unwrap_or_default(),
            );
            snap_dfns
                .entry(rsc_name)
                .or_default()
                .insert(snap_name, Arc::new(dfn));
        }
        let mut rsc_dfns = BTreeMap::new();
        for row in load_rows::<ResourceDefinitionRow>(backend).await? {
            let name = row.rsc_name.clone();
            let rsc_dfn = ResourceDefinition::new(
                row.rsc_name,
                row.flags,
                props.container(ResourceDefinition::props_instance(&name)),
                snap_dfns.remove(&name).unwrap_or_default(),
            );
            rsc_dfns.insert(name, Arc::new(rsc_dfn));
        }

        let mut remotes = BTreeMap::new();
        for row in load_rows::<RemoteRow>(backend).await? {
            let remote = Remote::from_row(&row)?;
            remotes.insert(remote.name().clone(), Arc::new(remote));
        }

        tracing::info!(
            nodes = nodes.len(),
            rsc_dfns = rsc_dfns.len(),
            remotes = remotes.len(),
            "object model loaded"
        );
        Ok(Self {
            nodes: TxMap::from_committed(nodes),
            rsc_dfns: TxMap::from_committed(rsc_dfns),
            remotes: TxMap::from_committed(remotes),
            ctrl_conf: props.container(CTRL_CONF_INSTANCE.to_string()),
        })
    }

    pub fn ctrl_conf(&self) -> &PropsContainer {
        &self.ctrl_conf
    }

    // -------------------------------------------------------------------------
    // Nodes
    // -------------------------------------------------------------------------

    pub fn node(&self, name: &NodeName) -> Option<Arc<Node>> {
        self.nodes.get(name)
    }

    /// Nodes in name order.
    pub fn nodes(&self) -> Vec<Arc<Node>> {
        self.nodes.values()
    }

    pub fn create_node(
        &self,
        tx: &mut TransactionMgr,
        locks: &LockGuard,
        name: NodeName,
        node_type: impl Into<String>,
    ) -> CtrlResult<Arc<Node>> {
        locks.ensure_write(LockObj::NodesMap)?;
        if self.nodes.contains_key(&name) {
            return Err(CtrlError::implementation(format!("node {name} already exists")));
        }
        let node = Arc::new(Node::new(
            name.clone(),
            node_type.into(),
            PropsContainer::new(Node::props_instance(&name)),
        ));
        tx.create_row(&node.to_row())?;
        self.nodes.insert(tx, name, Arc::clone(&node))?;
        Ok(node)
    }

    pub fn delete_node(
        &self,
        tx: &mut TransactionMgr,
        locks: &LockGuard,
        name: &NodeName,
    ) -> CtrlResult<Arc<Node>> {
        locks.ensure_write(LockObj::NodesMap)?;
        let Some(node) = self.nodes.get(name) else {
            return Err(CtrlError::api(
                RetCode::FailNotFoundNode,
                format!("node {name} not found"),
            ));
        };
        node.delete_rows(tx)?;
        self.nodes.remove(tx, name)?;
        Ok(node)
    }

    // -------------------------------------------------------------------------
    // Resource definitions
    // -------------------------------------------------------------------------

    pub fn rsc_dfn(&self, name: &ResourceName) -> Option<Arc<ResourceDefinition>> {
        self.rsc_dfns.get(name)
    }

    pub fn rsc_dfns(&self) -> Vec<Arc<ResourceDefinition>> {
        self.rsc_dfns.values()
    }

    /// Look up a resource definition, creating it if it does not exist yet.
    /// The flag tells whether it was created.
    pub fn get_or_create_rsc_dfn(
        &self,
        tx: &mut TransactionMgr,
        locks: &LockGuard,
        name: &ResourceName,
    ) -> CtrlResult<(Arc<ResourceDefinition>, bool)> {
        locks.ensure_write(LockObj::RscDfnMap)?;
        if let Some(existing) = self.rsc_dfns.get(name) {
            return Ok((existing, false));
        }
        let rsc_dfn = Arc::new(ResourceDefinition::new(
            name.clone(),
            0,
            PropsContainer::new(ResourceDefinition::props_instance(name)),
            BTreeMap::new(),
        ));
        tx.create_row(&rsc_dfn.to_row())?;
        self.rsc_dfns.insert(tx, name.clone(), Arc::clone(&rsc_dfn))?;
        Ok((rsc_dfn, true))
    }

    // -------------------------------------------------------------------------
    // Remotes
    // -------------------------------------------------------------------------

    pub fn remote(&self, name: &RemoteName) -> Option<Arc<Remote>> {
        self.remotes.get(name)
    }

    pub fn remotes(&self) -> Vec<Arc<Remote>> {
        self.remotes.values()
    }

    pub fn create_remote(
        &self,
        tx: &mut TransactionMgr,
        locks: &LockGuard,
        remote: Remote,
    ) -> CtrlResult<Arc<Remote>> {
        locks.ensure_write(LockObj::RscDfnMap)?;
        let name = remote.name().clone();
        if self.remotes.contains_key(&name) {
            return Err(CtrlError::api(
                RetCode::FailExistsRemote,
                format!("remote {name} already exists"),
            ));
        }
        tx.create_row(&remote.to_row())?;
        let remote = Arc::new(remote);
        self.remotes.insert(tx, name, Arc::clone(&remote))?;
        Ok(remote)
    }

    /// Delete a remote, returning it if it existed.
    pub fn delete_remote(
        &self,
        tx: &mut TransactionMgr,
        locks: &LockGuard,
        name: &RemoteName,
    ) -> CtrlResult<Option<Arc<Remote>>> {
        locks.ensure_write(LockObj::RscDfnMap)?;
        let Some(remote) = self.remotes.get(name) else {
            return Ok(None);
        };
        tx.delete_row(&remote.to_row())?;
        self.remotes.remove(tx, name)?;
        Ok(Some(remote))
    }
}

impl std::fmt::Debug for CoreObjects {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("CoreObjects")
            .field("nodes", &self.nodes.keys())
            .field("rsc_dfns", &self.rsc_dfns.keys())
            .field("remotes", &self.remotes.keys())
            .finish()
    }
}
