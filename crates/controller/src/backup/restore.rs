//! Restore step of an inbound shipment: snapshot definition and snapshot on
//! the receiving node.

use super::types::BackupShippingData;
use crate::error::{CtrlError, CtrlResult};
use crate::locks::{LockGuard, LockObj};
use crate::objects::{CoreObjects, Node, Snapshot, SnapshotDefinition, SnapshotDfnFlags, SnapshotVolume};
use crate::satellite::ThinFreeCapacities;
use ferrostor_core::{RemoteName, RetCode, SnapshotName, StorPoolName};
use ferrostor_metadata::TransactionMgr;
use std::collections::BTreeMap;
use std::sync::Arc;

/// Snapshot definition prop naming the remote that ships into it.
pub const KEY_SHIPPING_REMOTE: &str = "Backup/Shipping/Remote";
/// Snapshot definition prop naming the backup on the source cluster.
pub const KEY_SOURCE_BACKUP: &str = "Backup/SourceBackup";

pub struct RestoreInput<'a> {
    pub data: &'a BackupShippingData,
    pub snap_name: &'a SnapshotName,
    pub remote_name: &'a RemoteName,
    pub capacities: &'a ThinFreeCapacities,
}

/// Resolve the local pool a source pool maps to.
fn target_pool(data: &BackupShippingData, src_pool: &str) -> CtrlResult<StorPoolName> {
    if let Some(pool) = &data.dst_stor_pool {
        return Ok(pool.clone());
    }
    let src_pool = StorPoolName::new(src_pool)?;
    Ok(data
        .stor_pool_rename_map
        .get(&src_pool)
        .cloned()
        .unwrap_or(src_pool))
}

/// KiB needed per local pool.
fn required_space(data: &BackupShippingData) -> CtrlResult<BTreeMap<StorPoolName, u64>> {
    let mut out = BTreeMap::new();
    for vlm in &data.metadata.volumes {
        *out.entry(target_pool(data, &vlm.stor_pool_name)?).or_insert(0) += vlm.size_kib;
    }
    Ok(out)
}

enum Fit {
    /// Smallest free space left over across the target pools.
    Headroom(u64),
    /// Some target pool has not reported its capacity.
    Unknown,
}

fn evaluate(
    node: &Node,
    required: &BTreeMap<StorPoolName, u64>,
    capacities: &ThinFreeCapacities,
) -> CtrlResult<Fit> {
    let mut headroom: Option<u64> = None;
    let mut unknown = false;
    for (pool_name, needed) in required {
        let Some(pool) = node.stor_pool(pool_name) else {
            return Err(CtrlError::api(
                RetCode::FailNotFoundStorPool,
                format!("storage pool {pool_name} not found on node {}", node.name()),
            ));
        };
        if !pool.provider_kind.has_backing_storage() {
            return Err(CtrlError::api(
                RetCode::FailNotFoundStorPool,
                format!(
                    "storage pool {pool_name} on node {} is diskless and cannot receive a backup",
                    node.name()
                ),
            ));
        }
        let free = capacities
            .get(node.name())
            .and_then(|pools| pools.get(pool_name))
            .copied()
            .or(pool.free_capacity_kib);
        match free {
            Some(free) if free < *needed => {
                return Err(CtrlError::api(
                    RetCode::FailInsufficientCapacity,
                    format!(
                        "storage pool {pool_name} on node {} has {free} KiB free, {needed} KiB needed",
                        node.name()
                    ),
                ));
            }
            Some(free) => {
                let left = free - needed;
                headroom = Some(headroom.map_or(left, |h| h.min(left)));
            }
            None => unknown = true,
        }
    }
    Ok(match (unknown, headroom) {
        (false, Some(h)) => Fit::Headroom(h),
        (false, None) => Fit::Headroom(u64::MAX),
        (true, _) => Fit::Unknown,
    })
}

fn choose_node(
    objects: &CoreObjects,
    data: &BackupShippingData,
    required: &BTreeMap<StorPoolName, u64>,
    capacities: &ThinFreeCapacities,
) -> CtrlResult<Arc<Node>> {
    if let Some(name) = &data.dst_node_name {
        let Some(node) = objects.node(name) else {
            return Err(CtrlError::api(
                RetCode::FailNotFoundNode,
                format!("target node {name} not found"),
            ));
        };
        evaluate(&node, required, capacities)?;
        return Ok(node);
    }

    let mut best: Option<(Arc<Node>, Option<u64>)> = None;
    for node in objects.nodes() {
        let headroom = match evaluate(&node, required, capacities) {
            Ok(Fit::Headroom(h)) => Some(h),
            Ok(Fit::Unknown) => None,
            Err(e) => {
                tracing::debug!(node = %node.name(), error = %e, "node cannot receive backup");
                continue;
            }
        };
        // Nodes come in name order, so only a strictly better node replaces the current pick.
        let better = match &best {
            None => true,
            Some((_, best_headroom)) => headroom > *best_headroom,
        };
        if better {
            best = Some((node, headroom));
        }
    }
    best.map(|(node, _)| node).ok_or_else(|| {
        let pools: Vec<String> = required.keys().map(ToString::to_string).collect();
        CtrlError::api(
            RetCode::FailNotFoundStorPool,
            format!(
                "no node has enough free space in storage pool(s) {}",
                pools.join(", ")
            ),
        )
    })
}

/// Create the snapshot definition and snapshot that receive the shipped backup.
pub fn restore_backup(
    tx: &mut TransactionMgr,
    locks: &LockGuard,
    objects: &CoreObjects,
    input: RestoreInput<'_>,
) -> CtrlResult<(Arc<SnapshotDefinition>, Arc<Snapshot>)> {
    locks.ensure_write(LockObj::NodesMap)?;
    locks.ensure_write(LockObj::RscDfnMap)?;
    let data = input.data;

    if data.metadata.volumes.is_empty() {
        return Err(CtrlError::api(
            RetCode::FailInvalidBackupMetadata,
            format!("backup {} describes no volumes", data.src_backup_name),
        ));
    }
    let Some(rsc_dfn) = objects.rsc_dfn(&data.dst_rsc_name) else {
        return Err(CtrlError::api(
            RetCode::FailNotFoundRscDfn,
            format!("resource definition {} not found", data.dst_rsc_name),
        ));
    };

    let required = required_space(data)?;
    let node = choose_node(objects, data, &required, input.capacities)?;

    let snap_dfn = rsc_dfn.create_snapshot_dfn(
        tx,
        locks,
        input.snap_name.clone(),
        SnapshotDfnFlags::SHIPPING_TARGET | SnapshotDfnFlags::SHIPPING,
    )?;
    for (key, value) in &data.metadata.snap_dfn_props {
        snap_dfn.props().set_prop(tx, key, value.as_str(), None)?;
    }
    snap_dfn
        .props()
        .set_prop(tx, KEY_SOURCE_BACKUP, data.src_backup_name.as_str(), None)?;
    snap_dfn
        .props()
        .set_prop(tx, KEY_SHIPPING_REMOTE, input.remote_name.as_str(), None)?;

    let volumes = data
        .metadata
        .volumes
        .iter()
        .map(|vlm| -> CtrlResult<_> {
            Ok(SnapshotVolume {
                vlm_nr: vlm.vlm_nr,
                size_kib: vlm.size_kib,
                stor_pool_name: target_pool(data, &vlm.stor_pool_name)?,
            })
        })
        .collect::<CtrlResult<Vec<_>>>()?;
    let snapshot = snap_dfn.create_snapshot(tx, locks, node.name(), volumes)?;

    tracing::info!(
        rsc = %data.dst_rsc_name,
        snapshot = %input.snap_name,
        node = %node.name(),
        "prepared snapshot to receive backup"
    );
    Ok((snap_dfn, snapshot))
}
