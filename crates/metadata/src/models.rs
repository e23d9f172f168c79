//! Typed rows mapping to the schema registry.

use crate::error::{MetadataError, MetadataResult};
use crate::row::Row;
use crate::schema::{
    NODE_NET_INTERFACES, NODE_STOR_POOLS, NODES, PROPS_CONTAINERS, REMOTES, RESOURCE_DEFINITIONS,
    SNAPSHOT_DEFINITIONS, SNAPSHOT_VOLUMES, SNAPSHOTS, Table,
};
use ferrostor_core::{NetInterfaceName, NodeName, RemoteName, ResourceName, SnapshotName, StorPoolName};

/// Conversion between a typed record and its generic [`Row`].
pub trait TableRow: Sized {
    fn table() -> &'static Table;
    fn to_row(&self) -> Row;
    fn from_row(row: &Row) -> MetadataResult<Self>;
}

fn to_u64(table: &Table, column: &str, value: i64) -> MetadataResult<u64> {
    u64::try_from(value).map_err(|_| {
        MetadataError::implementation(format!("negative value {value} in {}.{column}", table.name))
    })
}

fn to_i64(value: u64) -> i64 {
    // Persisted counters (flags, KiB sizes) stay far below i64::MAX.
    i64::try_from(value).unwrap_or(i64::MAX)
}

// =============================================================================
// Nodes
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NodeRow {
    pub node_name: NodeName,
    pub node_type: String,
    pub flags: u64,
}

impl TableRow for NodeRow {
    fn table() -> &'static Table {
        &NODES
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("node_name", self.node_name.as_str())
            .with("node_type", self.node_type.as_str())
            .with("flags", to_i64(self.flags))
    }

    fn from_row(row: &Row) -> MetadataResult<Self> {
        Ok(Self {
            node_name: NodeName::new(row.text("node_name")?)?,
            node_type: row.text("node_type")?.to_string(),
            flags: to_u64(&NODES, "flags", row.int("flags")?)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct NetInterfaceRow {
    pub node_name: NodeName,
    pub net_if_name: NetInterfaceName,
    pub address: String,
}

impl TableRow for NetInterfaceRow {
    fn table() -> &'static Table {
        &NODE_NET_INTERFACES
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("node_name", self.node_name.as_str())
            .with("net_if_name", self.net_if_name.as_str())
            .with("address", self.address.as_str())
    }

    fn from_row(row: &Row) -> MetadataResult<Self> {
        Ok(Self {
            node_name: NodeName::new(row.text("node_name")?)?,
            net_if_name: NetInterfaceName::new(row.text("net_if_name")?)?,
            address: row.text("address")?.to_string(),
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct StorPoolRow {
    pub node_name: NodeName,
    pub stor_pool_name: StorPoolName,
    pub provider_kind: String,
    pub free_capacity_kib: Option<u64>,
}

impl TableRow for StorPoolRow {
    fn table() -> &'static Table {
        &NODE_STOR_POOLS
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("node_name", self.node_name.as_str())
            .with("stor_pool_name", self.stor_pool_name.as_str())
            .with("provider_kind", self.provider_kind.as_str())
            .with("free_capacity_kib", self.free_capacity_kib.map(to_i64))
    }

    fn from_row(row: &Row) -> MetadataResult<Self> {
        Ok(Self {
            node_name: NodeName::new(row.text("node_name")?)?,
            stor_pool_name: StorPoolName::new(row.text("stor_pool_name")?)?,
            provider_kind: row.text("provider_kind")?.to_string(),
            free_capacity_kib: row
                .opt_int("free_capacity_kib")?
                .map(|v| to_u64(&NODE_STOR_POOLS, "free_capacity_kib", v))
                .transpose()?,
        })
    }
}

// =============================================================================
// Resource and snapshot definitions
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ResourceDefinitionRow {
    pub rsc_name: ResourceName,
    pub flags: u64,
}

impl TableRow for ResourceDefinitionRow {
    fn table() -> &'static Table {
        &RESOURCE_DEFINITIONS
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("rsc_name", self.rsc_name.as_str())
            .with("flags", to_i64(self.flags))
    }

    fn from_row(row: &Row) -> MetadataResult<Self> {
        Ok(Self {
            rsc_name: ResourceName::new(row.text("rsc_name")?)?,
            flags: to_u64(&RESOURCE_DEFINITIONS, "flags", row.int("flags")?)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotDefinitionRow {
    pub rsc_name: ResourceName,
    pub snap_name: SnapshotName,
    pub flags: u64,
}

impl TableRow for SnapshotDefinitionRow {
    fn table() -> &'static Table {
        &SNAPSHOT_DEFINITIONS
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("rsc_name", self.rsc_name.as_str())
            .with("snap_name", self.snap_name.as_str())
            .with("flags", to_i64(self.flags))
    }

    fn from_row(row: &Row) -> MetadataResult<Self> {
        Ok(Self {
            rsc_name: ResourceName::new(row.text("rsc_name")?)?,
            snap_name: SnapshotName::new(row.text("snap_name")?)?,
            flags: to_u64(&SNAPSHOT_DEFINITIONS, "flags", row.int("flags")?)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotRow {
    pub node_name: NodeName,
    pub rsc_name: ResourceName,
    pub snap_name: SnapshotName,
    pub flags: u64,
}

impl TableRow for SnapshotRow {
    fn table() -> &'static Table {
        &SNAPSHOTS
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("node_name", self.node_name.as_str())
            .with("rsc_name", self.rsc_name.as_str())
            .with("snap_name", self.snap_name.as_str())
            .with("flags", to_i64(self.flags))
    }

    fn from_row(row: &Row) -> MetadataResult<Self> {
        Ok(Self {
            node_name: NodeName::new(row.text("node_name")?)?,
            rsc_name: ResourceName::new(row.text("rsc_name")?)?,
            snap_name: SnapshotName::new(row.text("snap_name")?)?,
            flags: to_u64(&SNAPSHOTS, "flags", row.int("flags")?)?,
        })
    }
}

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct SnapshotVolumeRow {
    pub node_name: NodeName,
    pub rsc_name: ResourceName,
    pub snap_name: SnapshotName,
    pub vlm_nr: u32,
    pub size_kib: u64,
    pub stor_pool_name: StorPoolName,
}

impl TableRow for SnapshotVolumeRow {
    fn table() -> &'static Table {
        &SNAPSHOT_VOLUMES
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("node_name", self.node_name.as_str())
            .with("rsc_name", self.rsc_name.as_str())
            .with("snap_name", self.snap_name.as_str())
            .with("vlm_nr", i64::from(self.vlm_nr))
            .with("size_kib", to_i64(self.size_kib))
            .with("stor_pool_name", self.stor_pool_name.as_str())
    }

    fn from_row(row: &Row) -> MetadataResult<Self> {
        let vlm_nr = row.int("vlm_nr")?;
        Ok(Self {
            node_name: NodeName::new(row.text("node_name")?)?,
            rsc_name: ResourceName::new(row.text("rsc_name")?)?,
            snap_name: SnapshotName::new(row.text("snap_name")?)?,
            vlm_nr: u32::try_from(vlm_nr).map_err(|_| {
                MetadataError::implementation(format!("volume number {vlm_nr} out of range"))
            })?,
            size_kib: to_u64(&SNAPSHOT_VOLUMES, "size_kib", row.int("size_kib")?)?,
            stor_pool_name: StorPoolName::new(row.text("stor_pool_name")?)?,
        })
    }
}

// =============================================================================
// Remotes
// =============================================================================

/// Flat persisted form of every remote kind; which optional columns are set
/// depends on `remote_type`.
#[derive(Debug, Clone, Default, PartialEq, Eq)]
pub struct RemoteRow {
    pub remote_name: String,
    pub remote_type: String,
    pub url: Option<String>,
    pub bucket: Option<String>,
    pub region: Option<String>,
    pub cluster_id: Option<String>,
    pub port: Option<u16>,
    pub rsc_name: Option<String>,
    pub snap_name: Option<String>,
    pub use_zstd: bool,
}

impl RemoteRow {
    pub fn name(&self) -> MetadataResult<RemoteName> {
        Ok(RemoteName::new(self.remote_name.as_str())?)
    }
}

impl TableRow for RemoteRow {
    fn table() -> &'static Table {
        &REMOTES
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("remote_name", self.remote_name.as_str())
            .with("remote_type", self.remote_type.as_str())
            .with("url", self.url.clone())
            .with("bucket", self.bucket.clone())
            .with("region", self.region.clone())
            .with("cluster_id", self.cluster_id.clone())
            .with("port", self.port.map(i64::from))
            .with("rsc_name", self.rsc_name.clone())
            .with("snap_name", self.snap_name.clone())
            .with("use_zstd", self.use_zstd)
    }

    fn from_row(row: &Row) -> MetadataResult<Self> {
        let port = row
            .opt_int("port")?
            .map(|p| {
                u16::try_from(p)
                    .map_err(|_| MetadataError::implementation(format!("port {p} out of range")))
            })
            .transpose()?;
        Ok(Self {
            remote_name: row.text("remote_name")?.to_string(),
            remote_type: row.text("remote_type")?.to_string(),
            url: row.opt_text("url")?.map(str::to_string),
            bucket: row.opt_text("bucket")?.map(str::to_string),
            region: row.opt_text("region")?.map(str::to_string),
            cluster_id: row.opt_text("cluster_id")?.map(str::to_string),
            port,
            rsc_name: row.opt_text("rsc_name")?.map(str::to_string),
            snap_name: row.opt_text("snap_name")?.map(str::to_string),
            use_zstd: row.bool("use_zstd")?,
        })
    }
}

// =============================================================================
// Properties
// =============================================================================

#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PropRow {
    pub props_instance: String,
    pub prop_key: String,
    pub prop_value: String,
}

impl TableRow for PropRow {
    fn table() -> &'static Table {
        &PROPS_CONTAINERS
    }

    fn to_row(&self) -> Row {
        Row::new()
            .with("props_instance", self.props_instance.as_str())
            .with("prop_key", self.prop_key.as_str())
            .with("prop_value", self.prop_value.as_str())
    }

    fn from_row(row: &Row) -> MetadataResult<Self> {
        Ok(Self {
            props_instance: row.text("props_instance")?.to_string(),
            prop_key: row.text("prop_key")?.to_string(),
            prop_value: row.text("prop_value")?.to_string(),
        })
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_rows_fit_their_tables() {
        let remote = RemoteRow {
            remote_name: "stlt-back_1".to_string(),
            remote_type: "SATELLITE".to_string(),
            cluster_id: Some("c0ffee".to_string()),
            port: Some(12000),
            ..Default::default()
        };
        let row = remote.to_row();
        REMOTES.validate(&row).unwrap();
        assert_eq!(RemoteRow::from_row(&row).unwrap(), remote);

        let vlm = SnapshotVolumeRow {
            node_name: NodeName::new("n1").unwrap(),
            rsc_name: ResourceName::new("r1").unwrap(),
            snap_name: SnapshotName::new("s1").unwrap(),
            vlm_nr: 0,
            size_kib: 1 << 20,
            stor_pool_name: StorPoolName::new("thin").unwrap(),
        };
        SNAPSHOT_VOLUMES.validate(&vlm.to_row()).unwrap();
    }

    #[test]
    fn test_invalid_persisted_name_is_rejected() {
        let row = Row::new()
            .with("rsc_name", "bad name")
            .with("flags", 0i64);
        assert!(ResourceDefinitionRow::from_row(&row).is_err());
    }
}
