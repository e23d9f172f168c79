//! Nodes with their network interfaces and storage pools.

use crate::error::{CtrlError, CtrlResult};
use crate::locks::{LockGuard, LockObj};
use ferrostor_core::{NetInterfaceName, NodeName, StorPoolName};
use ferrostor_metadata::models::{NetInterfaceRow, NodeRow, StorPoolRow};
use ferrostor_metadata::{PropsContainer, TransactionMgr, TxMap};
use std::fmt;
use std::str::FromStr;

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterface {
    pub name: NetInterfaceName,
    pub address: String,
}

/// Storage provider behind a pool.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum ProviderKind {
    Diskless,
    Lvm,
    LvmThin,
    Zfs,
    ZfsThin,
    FileThin,
}

impl ProviderKind {
    pub fn as_str(self) -> &'static str {
        match self {
            Self::Diskless => "DISKLESS",
            Self::Lvm => "LVM",
            Self::LvmThin => "LVM_THIN",
            Self::Zfs => "ZFS",
            Self::ZfsThin => "ZFS_THIN",
            Self::FileThin => "FILE_THIN",
        }
    }

    /// Thin pools report free capacity that changes independently of allocations.
    pub fn is_thin(self) -> bool {
        matches!(self, Self::LvmThin | Self::ZfsThin | Self::FileThin)
    }

    pub fn has_backing_storage(self) -> bool {
        !matches!(self, Self::Diskless)
    }
}

impl fmt::Display for ProviderKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

impl FromStr for ProviderKind {
    type Err = CtrlError;

    fn from_str(s: &str) -> CtrlResult<Self> {
        Ok(match s {
            "DISKLESS" => Self::Diskless,
            "LVM" => Self::Lvm,
            "LVM_THIN" => Self::LvmThin,
            "ZFS" => Self::Zfs,
            "ZFS_THIN" => Self::ZfsThin,
            "FILE_THIN" => Self::FileThin,
            other => {
                return Err(CtrlError::implementation(format!(
                    "unknown storage provider kind '{other}'"
                )));
            }
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorPool {
    pub name: StorPoolName,
    pub provider_kind: ProviderKind,
    /// Last free capacity reported by the satellite, in KiB.
    pub free_capacity_kib: Option<u64>,
}

pub struct Node {
    name: NodeName,
    node_type: String,
    net_interfaces: TxMap<NetInterfaceName, NetInterface>,
    stor_pools: TxMap<StorPoolName, StorPool>,
    props: PropsContainer,
}

impl Node {
    pub fn props_instance(name: &NodeName) -> String {
        format!("/NODES/{name}")
    }

    pub(crate) fn new(name: NodeName, node_type: String, props: PropsContainer) -> Self {
        Self {
            name,
            node_type,
            net_interfaces: TxMap::new(),
            stor_pools: TxMap::new(),
            props,
        }
    }

    pub(crate) fn restore(
        row: NodeRow,
        net_interfaces: impl IntoIterator<Item = NetInterfaceRow>,
        stor_pools: impl IntoIterator<Item = StorPoolRow>,
        props: PropsContainer,
    ) -> CtrlResult<Self> {
        let net_interfaces = net_interfaces
            .into_iter()
            .map(|r| {
                (
                    r.net_if_name.clone(),
                    NetInterface {
                        name: r.net_if_name,
                        address: r.address,
                    },
                )
            })
            .collect();
        let stor_pools = stor_pools
            .into_iter()
            .map(|r| -> CtrlResult<_> {
                Ok((
                    r.stor_pool_name.clone(),
                    StorPool {
                        name: r.stor_pool_name,
                        provider_kind: r.provider_kind.parse()?,
                        free_capacity_kib: r.free_capacity_kib,
                    },
                ))
            })
            .collect::<CtrlResult<_>>()?;
        Ok(Self {
            name: row.node_name,
            node_type: row.node_type,
            net_interfaces: TxMap::from_committed(net_interfaces),
            stor_pools: TxMap::from_committed(stor_pools),
            props,
        })
    }

    pub fn name(&self) -> &NodeName {
        &self.name
    }

    pub fn node_type(&self) -> &str {
        &self.node_type
    }

    pub fn props(&self) -> &PropsContainer {
        &self.props
    }

    pub(crate) fn to_row(&self) -> NodeRow {
        NodeRow {
            node_name: self.name.clone(),
            node_type: self.node_type.clone(),
            flags: 0,
        }
    }

    pub fn net_interface(&self, name: &NetInterfaceName) -> Option<NetInterface> {
        self.net_interfaces.get(name)
    }

    /// Interfaces in name order.
    pub fn net_interfaces(&self) -> Vec<NetInterface> {
        self.net_interfaces.values()
    }

    pub fn add_net_interface(
        &self,
        tx: &mut TransactionMgr,
        locks: &LockGuard,
        name: NetInterfaceName,
        address: impl Into<String>,
    ) -> CtrlResult<()> {
        locks.ensure_write(LockObj::NodesMap)?;
        let net_if = NetInterface {
            name: name.clone(),
            address: address.into(),
        };
        let row = NetInterfaceRow {
            node_name: self.name.clone(),
            net_if_name: name.clone(),
            address: net_if.address.clone(),
        };
        if self.net_interfaces.contains_key(&name) {
            tx.update_row(&row)?;
        } else {
            tx.create_row(&row)?;
        }
        self.net_interfaces.insert(tx, name, net_if)?;
        Ok(())
    }

    pub fn stor_pool(&self, name: &StorPoolName) -> Option<StorPool> {
        self.stor_pools.get(name)
    }

    pub fn stor_pools(&self) -> Vec<StorPool> {
        self.stor_pools.values()
    }

    fn stor_pool_row(&self, pool: &StorPool) -> StorPoolRow {
        StorPoolRow {
            node_name: self.name.clone(),
            stor_pool_name: pool.name.clone(),
            provider_kind: pool.provider_kind.as_str().to_string(),
            free_capacity_kib: pool.free_capacity_kib,
        }
    }

    pub fn add_stor_pool(
        &self,
        tx: &mut TransactionMgr,
        locks: &LockGuard,
        pool: StorPool,
    ) -> CtrlResult<()> {
        locks.ensure_write(LockObj::StorPoolDfnMap)?;
        if self.stor_pools.contains_key(&pool.name) {
            return Err(CtrlError::implementation(format!(
                "storage pool {} already exists on node {}",
                pool.name, self.name
            )));
        }
        tx.create_row(&self.stor_pool_row(&pool))?;
        self.stor_pools.insert(tx, pool.name.clone(), pool)?;
        Ok(())
    }

    /// Record the free capacity a satellite reported for one of its pools.
    pub fn set_free_capacity(
        &self,
        tx: &mut TransactionMgr,
        locks: &LockGuard,
        pool_name: &StorPoolName,
        free_capacity_kib: u64,
    ) -> CtrlResult<()> {
        locks.ensure_write(LockObj::StorPoolDfnMap)?;
        let Some(mut pool) = self.stor_pools.get(pool_name) else {
            return Err(CtrlError::api(
                ferrostor_core::RetCode::FailNotFoundStorPool,
                format!("storage pool {pool_name} not found on node {}", self.name),
            ));
        };
        pool.free_capacity_kib = Some(free_capacity_kib);
        tx.update_row(&self.stor_pool_row(&pool))?;
        self.stor_pools.insert(tx, pool_name.clone(), pool)?;
        Ok(())
    }

    /// Rows to delete when the node goes away.
    pub(crate) fn delete_rows(&self, tx: &mut TransactionMgr) -> CtrlResult<()> {
        for net_if in self.net_interfaces.values() {
            tx.delete_row(&NetInterfaceRow {
                node_name: self.name.clone(),
                net_if_name: net_if.name,
                address: net_if.address,
            })?;
        }
        for pool in self.stor_pools.values() {
            tx.delete_row(&self.stor_pool_row(&pool))?;
        }
        self.props.clear(tx)?;
        tx.delete_row(&self.to_row())?;
        Ok(())
    }
}

impl fmt::Debug for Node {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.debug_struct("Node")
            .field("name", &self.name)
            .field("node_type", &self.node_type)
            .field("net_interfaces", &self.net_interfaces)
            .field("stor_pools", &self.stor_pools)
            .finish()
    }
}
