//! Resource definitions, snapshot definitions and snapshots.

use crate::error::{CtrlError, CtrlResult};
use crate::locks::{LockGuard, LockObj};
use ferrostor_core::{NodeName, ResourceName, RetCode, SnapshotName, StorPoolName};
use ferrostor_metadata::models::{
    ResourceDefinitionRow, SnapshotDefinitionRow, SnapshotRow, SnapshotVolumeRow,
};
use ferrostor_metadata::{PropsContainer, TransactionMgr, TxCell, TxMap};
use std::collections::BTreeMap;
use std::fmt;
use std::ops::BitOr;
use std::sync::Arc;

/// Snapshot definition state flags.
#[derive(Clone, Copy, Default, PartialEq, Eq, Hash)]
pub struct SnapshotDfnFlags(u64);

impl SnapshotDfnFlags {
    pub const SUCCESSFUL: Self = Self(1 << 0);
    pub const DELETE: Self = Self(1 << 2);
    pub const SHIPPING: Self = Self(1 << 3);
    pub const SHIPPED: Self = Self(1 << 4);
    pub const SHIPPING_ABORTED: Self = Self(1 << 5);
    pub const SHIPPING_TARGET: Self = Self(1 << 6);
    pub const BACKUP: Self = Self(1 << 7);

    pub const fn empty() -> Self {
        Self(0)
    }

    pub const fn from_bits(bits: u64) -> Self {
        Self(bits)
    }

    pub const fn bits(self) -> u64 {
        self.0
    }

    pub const fn contains(self, other: Self) -> bool {
        self.0 & other.0 == other.0
    }

    pub const fn with(self, other: Self) -> Self {
        Self(self.0 | other.0)
    }

    pub const fn without(self, other: Self) -> Self {
        Self(self.0 & !other.0)
    }
}

impl BitOr for SnapshotDfnFlags {
    type Output = Self;

    fn bitor(self, rhs: Self) -> Self {
        self.with(rhs)
    }
}

impl fmt::Debug for SnapshotDfnFlags {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        const NAMES: [(SnapshotDfnFlags, &str); 7] = [
            (SnapshotDfnFlags::SUCCESSFUL, "SUCCESSFUL"),
            (SnapshotDfnFlags::DELETE, "DELETE"),
            (SnapshotDfnFlags::SHIPPING, "SHIPPING"),
            (SnapshotDfnFlags::SHIPPED, "SHIPPED"),
            (SnapshotDfnFlags::SHIPPING_ABORTED, "SHIPPING_ABORTED"),
            (SnapshotDfnFlags::SHIPPING_TARGET, "SHIPPING_TARGET"),
            (SnapshotDfnFlags::BACKUP, "BACKUP"),
        ];
        let set: Vec<&str> = NAMES
            .iter()
            .filter(|(flag, _)| self.contains(*flag))
            .map(|(_, name)| *name)
            .collect();
        write!(f, "SnapshotDfnFlags({})", set.join(" | "))
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotVolume {
    pub vlm_nr: u32,
    pub size_kib: u64,
    pub stor_pool_name: StorPoolName,
}

/// A snapshot of one resource on one node.
pub struct Snapshot {
    node_name: NodeName,
    rsc_name: ResourceName,
    snap_name: SnapshotName,
    volumes: TxMap<u32, SnapshotVolume>,
    props: PropsContainer,
}

impl Snapshot {
    pub fn props_instance(node: &NodeName, rsc: &ResourceName, snap: &SnapshotName) -> String {
        format!("/SNAPSHOTS/{node}/{rsc}/{snap}")
    }

    /// Rebuild a persisted snapshot.
    pub(crate) fn restore(
        row: SnapshotRow,
        volumes: impl IntoIterator<Item = SnapshotVolumeRow>,
        props: PropsContainer,
    ) -> Self {
        let volumes = volumes
            .into_iter()
            .map(|v| {
                (
                    v.vlm_nr,
                    SnapshotVolume {
                        vlm_nr: v.vlm_nr,
                        size_kib: v.size_kib,
                        stor_pool_name: v.stor_pool_name,
                    },
                )
            })
            .collect();
        Self {
            node_name: row.node_name,
            rsc_name: row.rsc_name,
            snap_name: row.snap_name,
            volumes: TxMap::from_committed(volumes),
            props,
        }
    }

    pub fn node_name(&self) -> &NodeName {
        &self.node_name
    }

    pub fn rsc_name(&self) -> &ResourceName {
        &self.rsc_name
    }

    pub fn snap_name(&self) -> &SnapshotName {
        &self.snap_name
    }

    pub fn props(&self) -> &PropsContainer {
        &self.props
    }

    pub fn volumes(&self) -> Vec<SnapshotVolume> {
        self.volumes.values()
    }

    fn row(&self) -> SnapshotRow {
        SnapshotRow {
            node_name: self.node_name.clone(),
            rsc_name: self.rsc_name.clone(),
            snap_name: self.snap_name.clone(),
            flags: 0,
        }
    }

    fn volume_row(&self, vlm: &SnapshotVolume) -> SnapshotVolumeRow {
        SnapshotVolumeRow {
            node_name: self.node_name.clone(),
            rsc_name: self.rsc_name.clone(),
            snap_name: self.snap_name.clone(),
            vlm_nr: vlm.vlm_nr,
            size_kib: vlm.size_kib,
            stor_pool_name: vlm.stor_pool_name.clone(),
        }
    }

    pub fn add_volume(&self, tx: &mut TransactionMgr, vlm: SnapshotVolume) -> CtrlResult<()> {
        if self.volumes.contains_key(&vlm.vlm_nr) {
            return Err(CtrlError::implementation(format!(
                "volume {} of snapshot {}/{} already exists",
                vlm.vlm_nr, self.rsc_name, self.snap_name
            )));
        }
        tx.create_row(&self.volume_row(&vlm))?;
        self.volumes.insert(tx, vlm.vlm_nr, vlm)?;
        Ok(())
    }
}

impl fmt::Debug for Snapshot {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Snapshot")
            .field("node_name", &self.node_name)
            .field("rsc_name", &self.rsc_name)
            .field("snap_name", &self.snap_name)
            .field("volumes", &self.volumes)
            .finish()
    }
}

pub struct SnapshotDefinition {
    rsc_name: ResourceName,
    name: SnapshotName,
    flags: TxCell<SnapshotDfnFlags>,
    props: PropsContainer,
    snapshots: TxMap<NodeName, Arc<Snapshot>>,
}

impl SnapshotDefinition {
    pub fn props_instance(rsc: &ResourceName, snap: &SnapshotName) -> String {
        format!("/SNAPSHOTDEFINITIONS/{rsc}/{snap}")
    }

    pub fn rsc_name(&self) -> &ResourceName {
        &self.rsc_name
    }

    pub fn name(&self) -> &SnapshotName {
        &self.name
    }

    pub fn flags(&self) -> SnapshotDfnFlags {
        self.flags.get()
    }

    pub fn props(&self) -> &PropsContainer {
        &self.props
    }

    pub fn snapshot(&self, node: &NodeName) -> Option<Arc<Snapshot>> {
        self.snapshots.get(node)
    }

    pub fn snapshots(&self) -> Vec<Arc<Snapshot>> {
        self.snapshots.values()
    }

    /// Rebuild a persisted snapshot definition.
    pub(crate) fn restore(
        row: SnapshotDefinitionRow,
        props: PropsContainer,
        snapshots: impl IntoIterator<Item = Snapshot>,
    ) -> Self {
        let snapshots = snapshots
            .into_iter()
            .map(|snapshot| (snapshot.node_name.clone(), Arc::new(snapshot)))
            .collect();
        Self {
            rsc_name: row.rsc_name,
            name: row.snap_name,
            flags: TxCell::new(SnapshotDfnFlags::from_bits(row.flags)),
            props,
            snapshots: TxMap::from_committed(snapshots),
        }
    }

    fn row(&self, flags: SnapshotDfnFlags) -> SnapshotDefinitionRow {
        SnapshotDefinitionRow {
            rsc_name: self.rsc_name.clone(),
            snap_name: self.name.clone(),
            flags: flags.bits(),
        }
    }

    /// Replace the flags: `set` is added after `clear` is removed.
    pub fn update_flags(
        &self,
        tx: &mut TransactionMgr,
        locks: &LockGuard,
        set: SnapshotDfnFlags,
        clear: SnapshotDfnFlags,
    ) -> CtrlResult<SnapshotDfnFlags> {
        locks.ensure_write(LockObj::RscDfnMap)?;
        let flags = self.flags.get().without(clear).with(set);
        tx.update_row(&self.row(flags))?;
        self.flags.set(tx, flags)?;
        Ok(flags)
    }

    /// Create the snapshot of this definition on `node`.
    pub fn create_snapshot(
        &self,
        tx: &mut TransactionMgr,
        locks: &LockGuard,
        node: &NodeName,
        volumes: impl IntoIterator<Item = SnapshotVolume>,
    ) -> CtrlResult<Arc<Snapshot>> {
        locks.ensure_write(LockObj::RscDfnMap)?;
        if self.snapshots.contains_key(node) {
            return Err(CtrlError::implementation(format!(
                "snapshot {}/{} already exists on node {node}",
                self.rsc_name, self.name
            )));
        }
        let snapshot = Arc::new(Snapshot {
            node_name: node.clone(),
            rsc_name: self.rsc_name.clone(),
            snap_name: self.name.clone(),
            volumes: TxMap::new(),
            props: PropsContainer::new(Snapshot::props_instance(node, &self.rsc_name, &self.name)),
        });
        tx.create_row(&snapshot.row())?;
        for vlm in volumes {
            snapshot.add_volume(tx, vlm)?;
        }
        self.snapshots.insert(tx, node.clone(), Arc::clone(&snapshot))?;
        Ok(snapshot)
    }
}

impl fmt::Debug for SnapshotDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("SnapshotDefinition")
            .field("rsc_name", &self.rsc_name)
            .field("name", &self.name)
            .field("flags", &self.flags.get())
            .field("snapshots", &self.snapshots.keys())
            .finish()
    }
}

pub struct ResourceDefinition {
    name: ResourceName,
    flags: TxCell<u64>,
    props: PropsContainer,
    snapshot_dfns: TxMap<SnapshotName, Arc<SnapshotDefinition>>,
}

impl ResourceDefinition {
    pub fn props_instance(name: &ResourceName) -> String {
        format!("/RESOURCEDEFINITIONS/{name}")
    }

    pub(crate) fn new(
        name: ResourceName,
        flags: u64,
        props: PropsContainer,
        snapshot_dfns: BTreeMap<SnapshotName, Arc<SnapshotDefinition>>,
    ) -> Self {
        Self {
            name,
            flags: TxCell::new(flags),
            props,
            snapshot_dfns: TxMap::from_committed(snapshot_dfns),
        }
    }

    pub fn name(&self) -> &ResourceName {
        &self.name
    }

    pub fn flags(&self) -> u64 {
        self.flags.get()
    }

    pub fn props(&self) -> &PropsContainer {
        &self.props
    }

    pub(crate) fn to_row(&self) -> ResourceDefinitionRow {
        ResourceDefinitionRow {
            rsc_name: self.name.clone(),
            flags: self.flags.get(),
        }
    }

    pub fn snapshot_dfn(&self, name: &SnapshotName) -> Option<Arc<SnapshotDefinition>> {
        self.snapshot_dfns.get(name)
    }

    pub fn snapshot_dfns(&self) -> Vec<Arc<SnapshotDefinition>> {
        self.snapshot_dfns.values()
    }

    pub fn create_snapshot_dfn(
        &self,
        tx: &mut TransactionMgr,
        locks: &LockGuard,
        name: SnapshotName,
        flags: SnapshotDfnFlags,
    ) -> CtrlResult<Arc<SnapshotDefinition>> {
        locks.ensure_write(LockObj::RscDfnMap)?;
        if self.snapshot_dfns.contains_key(&name) {
            return Err(CtrlError::api(
                RetCode::FailExistsSnapshotDfn,
                format!("snapshot definition {}/{name} already exists", self.name),
            ));
        }
        let snap_dfn = Arc::new(SnapshotDefinition {
            rsc_name: self.name.clone(),
            props: PropsContainer::new(SnapshotDefinition::props_instance(&self.name, &name)),
            name: name.clone(),
            flags: TxCell::new(flags),
            snapshots: TxMap::new(),
        });
        tx.create_row(&snap_dfn.row(flags))?;
        self.snapshot_dfns.insert(tx, name, Arc::clone(&snap_dfn))?;
        Ok(snap_dfn)
    }
}

impl fmt::Debug for ResourceDefinition {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("ResourceDefinition")
            .field("name", &self.name)
            .field("flags", &self.flags.get())
            .field("snapshot_dfns", &self.snapshot_dfns.keys())
            .finish()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_flag_ops() {
        let flags = SnapshotDfnFlags::SHIPPING_TARGET | SnapshotDfnFlags::SHIPPING;
        assert!(flags.contains(SnapshotDfnFlags::SHIPPING));
        let done = flags
            .without(SnapshotDfnFlags::SHIPPING)
            .with(SnapshotDfnFlags::SHIPPED);
        assert!(done.contains(SnapshotDfnFlags::SHIPPING_TARGET | SnapshotDfnFlags::SHIPPED));
        assert!(!done.contains(SnapshotDfnFlags::SHIPPING));
        assert_eq!(
            format!("{done:?}"),
            "SnapshotDfnFlags(SHIPPED | SHIPPING_TARGET)"
        );
    }
}
