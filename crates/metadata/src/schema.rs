//! Declarative schema registry.
//!
//! Every persisted object kind is described once as a [`Table`]. Both backends
//! derive their storage layout (SQL DDL, document paths) and row validation from
//! these descriptors.

use crate::error::{MetadataError, MetadataResult};
use crate::row::{DbValue, Row};

/// Column value type.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ColumnType {
    Bool,
    Int,
    Text,
}

impl ColumnType {
    pub fn sql_type(self) -> &'static str {
        match self {
            ColumnType::Bool | ColumnType::Int => "INTEGER",
            ColumnType::Text => "TEXT",
        }
    }
}

#[derive(Debug, Clone, Copy)]
pub struct Column {
    pub name: &'static str,
    pub ty: ColumnType,
    pub primary_key: bool,
    pub nullable: bool,
}

impl Column {
    pub const fn key(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            primary_key: true,
            nullable: false,
        }
    }

    pub const fn required(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            primary_key: false,
            nullable: false,
        }
    }

    pub const fn optional(name: &'static str, ty: ColumnType) -> Self {
        Self {
            name,
            ty,
            primary_key: false,
            nullable: true,
        }
    }

    fn accepts(&self, value: &DbValue) -> bool {
        matches!(
            (self.ty, value),
            (_, DbValue::Null)
                | (ColumnType::Bool, DbValue::Bool(_))
                | (ColumnType::Int, DbValue::Int(_))
                | (ColumnType::Text, DbValue::Text(_))
        )
    }
}

#[derive(Debug)]
pub struct Table {
    pub name: &'static str,
    pub columns: &'static [Column],
}

impl Table {
    pub fn column(&self, name: &str) -> Option<&Column> {
        self.columns.iter().find(|c| c.name == name)
    }

    pub fn primary_key(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| c.primary_key)
    }

    pub fn non_key_columns(&self) -> impl Iterator<Item = &Column> {
        self.columns.iter().filter(|c| !c.primary_key)
    }

    /// Check that `row` fits this table.
    pub fn validate(&self, row: &Row) -> MetadataResult<()> {
        for name in row.column_names() {
            if self.column(name).is_none() {
                return Err(MetadataError::implementation(format!(
                    "unknown column '{name}' for table {}",
                    self.name
                )));
            }
        }
        for column in self.columns {
            match row.get(column.name) {
                None | Some(DbValue::Null) if !column.nullable => {
                    return Err(MetadataError::implementation(format!(
                        "missing value for {}.{}",
                        self.name, column.name
                    )));
                }
                Some(value) if !column.accepts(value) => {
                    return Err(MetadataError::implementation(format!(
                        "type mismatch for {}.{}: expected {:?}, got {value:?}",
                        self.name, column.name, column.ty
                    )));
                }
                _ => {}
            }
        }
        Ok(())
    }
}

impl PartialEq for Table {
    fn eq(&self, other: &Self) -> bool {
        self.name == other.name
    }
}

impl Eq for Table {}

use ColumnType::{Bool, Int, Text};

pub static NODES: Table = Table {
    name: "nodes",
    columns: &[
        Column::key("node_name", Text),
        Column::required("node_type", Text),
        Column::required("flags", Int),
    ],
};

pub static NODE_NET_INTERFACES: Table = Table {
    name: "node_net_interfaces",
    columns: &[
        Column::key("node_name", Text),
        Column::key("net_if_name", Text),
        Column::required("address", Text),
    ],
};

pub static NODE_STOR_POOLS: Table = Table {
    name: "node_stor_pools",
    columns: &[
        Column::key("node_name", Text),
        Column::key("stor_pool_name", Text),
        Column::required("provider_kind", Text),
        Column::optional("free_capacity_kib", Int),
    ],
};

pub static RESOURCE_DEFINITIONS: Table = Table {
    name: "resource_definitions",
    columns: &[
        Column::key("rsc_name", Text),
        Column::required("flags", Int),
    ],
};

pub static SNAPSHOT_DEFINITIONS: Table = Table {
    name: "snapshot_definitions",
    columns: &[
        Column::key("rsc_name", Text),
        Column::key("snap_name", Text),
        Column::required("flags", Int),
    ],
};

pub static SNAPSHOTS: Table = Table {
    name: "snapshots",
    columns: &[
        Column::key("node_name", Text),
        Column::key("rsc_name", Text),
        Column::key("snap_name", Text),
        Column::required("flags", Int),
    ],
};

pub static SNAPSHOT_VOLUMES: Table = Table {
    name: "snapshot_volumes",
    columns: &[
        Column::key("node_name", Text),
        Column::key("rsc_name", Text),
        Column::key("snap_name", Text),
        Column::key("vlm_nr", Int),
        Column::required("size_kib", Int),
        Column::required("stor_pool_name", Text),
    ],
};

pub static REMOTES: Table = Table {
    name: "remotes",
    columns: &[
        Column::key("remote_name", Text),
        Column::required("remote_type", Text),
        Column::optional("url", Text),
        Column::optional("bucket", Text),
        Column::optional("region", Text),
        Column::optional("cluster_id", Text),
        Column::optional("port", Int),
        Column::optional("rsc_name", Text),
        Column::optional("snap_name", Text),
        Column::required("use_zstd", Bool),
    ],
};

pub static PROPS_CONTAINERS: Table = Table {
    name: "props_containers",
    columns: &[
        Column::key("props_instance", Text),
        Column::key("prop_key", Text),
        Column::required("prop_value", Text),
    ],
};

/// Every table, in creation order.
pub static ALL_TABLES: &[&Table] = &[
    &NODES,
    &NODE_NET_INTERFACES,
    &NODE_STOR_POOLS,
    &RESOURCE_DEFINITIONS,
    &SNAPSHOT_DEFINITIONS,
    &SNAPSHOTS,
    &SNAPSHOT_VOLUMES,
    &REMOTES,
    &PROPS_CONTAINERS,
];

/// Look up a table by its identifier.
pub fn table_by_name(name: &str) -> MetadataResult<&'static Table> {
    ALL_TABLES
        .iter()
        .copied()
        .find(|t| t.name == name)
        .ok_or_else(|| MetadataError::implementation(format!("unknown table identifier '{name}'")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_table_lookup() {
        assert_eq!(table_by_name("remotes").unwrap().name, "remotes");
        assert!(table_by_name("volumes").unwrap_err().is_implementation_error());
    }

    #[test]
    fn test_every_table_has_a_primary_key() {
        for table in ALL_TABLES {
            assert!(table.primary_key().count() > 0, "{} has no key", table.name);
        }
    }

    #[test]
    fn test_validate_row() {
        let ok = Row::new()
            .with("rsc_name", "rsc1")
            .with("flags", 0i64);
        RESOURCE_DEFINITIONS.validate(&ok).unwrap();

        let missing = Row::new().with("rsc_name", "rsc1");
        assert!(RESOURCE_DEFINITIONS.validate(&missing).is_err());

        let wrong_type = Row::new()
            .with("rsc_name", "rsc1")
            .with("flags", "zero");
        assert!(RESOURCE_DEFINITIONS.validate(&wrong_type).is_err());

        let unknown = ok.clone().with("color", "blue");
        assert!(RESOURCE_DEFINITIONS.validate(&unknown).is_err());

        let nullable = Row::new()
            .with("node_name", "n1")
            .with("stor_pool_name", "pool")
            .with("provider_kind", "LVM_THIN")
            .with("free_capacity_kib", DbValue::Null);
        NODE_STOR_POOLS.validate(&nullable).unwrap();
    }
}
