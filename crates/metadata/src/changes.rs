//! Pending row changes of one transaction.

use crate::error::{MetadataError, MetadataResult};
use crate::row::Row;
use crate::schema::Table;
use std::collections::BTreeMap;

/// One pending change to a row. Each variant carries the full row.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum RowChange {
    Create(Row),
    Update(Row),
    Delete(Row),
}

impl RowChange {
    pub fn row(&self) -> &Row {
        match self {
            RowChange::Create(row) | RowChange::Update(row) | RowChange::Delete(row) => row,
        }
    }

    fn kind(&self) -> &'static str {
        match self {
            RowChange::Create(_) => "create",
            RowChange::Update(_) => "update",
            RowChange::Delete(_) => "delete",
        }
    }
}

/// Changes to a single table, keyed by row key.
#[derive(Debug, Clone)]
pub struct TableChanges {
    pub table: &'static Table,
    pub rows: BTreeMap<String, RowChange>,
}

/// Every pending change of a transaction, merged per row.
#[derive(Debug, Clone, Default)]
pub struct ChangeSet {
    tables: BTreeMap<&'static str, TableChanges>,
}

impl ChangeSet {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record a change, merging it with an earlier change to the same row.
    ///
    /// Merge rules:
    /// - create + update = create (new contents)
    /// - create + delete = nothing
    /// - update + update = update (new contents)
    /// - update + delete = delete
    /// - delete + create = update
    ///
    /// Any other sequence means the caller lost track of the row's state.
    pub fn record(&mut self, table: &'static Table, change: RowChange) -> MetadataResult<()> {
        table.validate(change.row())?;
        let key = change.row().key(table)?;
        let entry = self.tables.entry(table.name).or_insert_with(|| TableChanges {
            table,
            rows: BTreeMap::new(),
        });

        let merged = match entry.rows.remove(&key) {
            None => Some(change),
            Some(previous) => match (previous, change) {
                (RowChange::Create(_), RowChange::Update(row)) => Some(RowChange::Create(row)),
                (RowChange::Create(_), RowChange::Delete(_)) => None,
                (RowChange::Update(_), RowChange::Update(row)) => Some(RowChange::Update(row)),
                (RowChange::Update(_), RowChange::Delete(row)) => Some(RowChange::Delete(row)),
                (RowChange::Delete(_), RowChange::Create(row)) => Some(RowChange::Update(row)),
                (previous, change) => {
                    // Put the earlier change back so the set stays consistent.
                    let (prev_kind, next_kind) = (previous.kind(), change.kind());
                    entry.rows.insert(key.clone(), previous);
                    return Err(MetadataError::implementation(format!(
                        "{next_kind} after {prev_kind} for {}:{key}",
                        table.name
                    )));
                }
            },
        };

        if let Some(change) = merged {
            entry.rows.insert(key, change);
        }
        if entry.rows.is_empty() {
            self.tables.remove(table.name);
        }
        Ok(())
    }

    pub fn is_empty(&self) -> bool {
        self.tables.is_empty()
    }

    /// Total number of row changes.
    pub fn len(&self) -> usize {
        self.tables.values().map(|t| t.rows.len()).sum()
    }

    pub fn tables(&self) -> impl Iterator<Item = &TableChanges> {
        self.tables.values()
    }

    pub fn get(&self, table: &Table, key: &str) -> Option<&RowChange> {
        self.tables.get(table.name).and_then(|t| t.rows.get(key))
    }

    pub fn clear(&mut self) {
        self.tables.clear();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::RESOURCE_DEFINITIONS;

    fn rsc(flags: i64) -> Row {
        Row::new().with("rsc_name", "r1").with("flags", flags)
    }

    #[test]
    fn test_create_then_update_stays_create() {
        let mut changes = ChangeSet::new();
        changes
            .record(&RESOURCE_DEFINITIONS, RowChange::Create(rsc(0)))
            .unwrap();
        changes
            .record(&RESOURCE_DEFINITIONS, RowChange::Update(rsc(4)))
            .unwrap();
        assert_eq!(
            changes.get(&RESOURCE_DEFINITIONS, "r1"),
            Some(&RowChange::Create(rsc(4)))
        );
    }

    #[test]
    fn test_create_then_delete_cancels_out() {
        let mut changes = ChangeSet::new();
        changes
            .record(&RESOURCE_DEFINITIONS, RowChange::Create(rsc(0)))
            .unwrap();
        changes
            .record(&RESOURCE_DEFINITIONS, RowChange::Delete(rsc(0)))
            .unwrap();
        assert!(changes.is_empty());
    }

    #[test]
    fn test_delete_then_create_is_update() {
        let mut changes = ChangeSet::new();
        changes
            .record(&RESOURCE_DEFINITIONS, RowChange::Delete(rsc(0)))
            .unwrap();
        changes
            .record(&RESOURCE_DEFINITIONS, RowChange::Create(rsc(1)))
            .unwrap();
        assert_eq!(
            changes.get(&RESOURCE_DEFINITIONS, "r1"),
            Some(&RowChange::Update(rsc(1)))
        );
        assert_eq!(changes.len(), 1);
    }

    #[test]
    fn test_invalid_sequences_rejected() {
        let mut changes = ChangeSet::new();
        changes
            .record(&RESOURCE_DEFINITIONS, RowChange::Create(rsc(0)))
            .unwrap();
        let err = changes
            .record(&RESOURCE_DEFINITIONS, RowChange::Create(rsc(0)))
            .unwrap_err();
        assert!(err.is_implementation_error());
        // The original change is kept.
        assert_eq!(
            changes.get(&RESOURCE_DEFINITIONS, "r1"),
            Some(&RowChange::Create(rsc(0)))
        );

        let mut changes = ChangeSet::new();
        changes
            .record(&RESOURCE_DEFINITIONS, RowChange::Delete(rsc(0)))
            .unwrap();
        assert!(
            changes
                .record(&RESOURCE_DEFINITIONS, RowChange::Update(rsc(0)))
                .is_err()
        );
    }
}
