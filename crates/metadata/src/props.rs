//! Persisted, transactional property containers.

use crate::error::MetadataResult;
use crate::models::PropRow;
use crate::tx::{TransactionMgr, TxMap};
use ferrostor_core::props::{ReadOnlyProps, collect_namespace, normalize_key, normalize_path};
use std::collections::BTreeMap;

/// Property container of one object (a node, a resource definition, the
/// controller itself, ...). Every entry is one `props_containers` row.
#[derive(Clone)]
pub struct PropsContainer {
    instance: String,
    map: TxMap<String, String>,
}

impl PropsContainer {
    pub fn new(instance: impl Into<String>) -> Self {
        Self {
            instance: instance.into(),
            map: TxMap::new(),
        }
    }

    /// Rebuild a container from its persisted rows. Rows of other instances are ignored.
    pub fn from_rows<'r>(
        instance: impl Into<String>,
        rows: impl IntoIterator<Item = &'r PropRow>,
    ) -> Self {
        let instance = instance.into();
        let entries = rows
            .into_iter()
            .filter(|row| row.props_instance == instance)
            .map(|row| (row.prop_key.clone(), row.prop_value.clone()))
            .collect();
        Self {
            instance,
            map: TxMap::from_committed(entries),
        }
    }

    pub fn instance(&self) -> &str {
        &self.instance
    }

    pub fn len(&self) -> usize {
        self.map.len()
    }

    pub fn is_empty(&self) -> bool {
        self.map.is_empty()
    }

    /// Copy of every entry, keyed by full key.
    pub fn entries(&self) -> BTreeMap<String, String> {
        self.map.snapshot()
    }

    fn row(&self, key: String, value: String) -> PropRow {
        PropRow {
            props_instance: self.instance.clone(),
            prop_key: key,
            prop_value: value,
        }
    }

    /// Set a property, returning the previous value.
    pub fn set_prop(
        &self,
        tx: &mut TransactionMgr,
        key: &str,
        value: impl Into<String>,
        namespace: Option<&str>,
    ) -> MetadataResult<Option<String>> {
        let full_key = normalize_key(namespace, key)?;
        let value = value.into();
        let previous = self.map.get(&full_key);
        if previous.as_deref() == Some(value.as_str()) {
            return Ok(previous);
        }

        let row = self.row(full_key.clone(), value.clone());
        match previous {
            Some(_) => tx.update_row(&row)?,
            None => tx.create_row(&row)?,
        }
        self.map.insert(tx, full_key, value)
    }

    /// Remove a property, returning its value.
    pub fn remove_prop(
        &self,
        tx: &mut TransactionMgr,
        key: &str,
        namespace: Option<&str>,
    ) -> MetadataResult<Option<String>> {
        let full_key = normalize_key(namespace, key)?;
        let Some(previous) = self.map.get(&full_key) else {
            return Ok(None);
        };
        tx.delete_row(&self.row(full_key.clone(), previous))?;
        self.map.remove(tx, &full_key)
    }

    /// Remove every property below `namespace`. Returns the removed entries,
    /// keyed relative to the namespace.
    pub fn remove_namespace(
        &self,
        tx: &mut TransactionMgr,
        namespace: &str,
    ) -> MetadataResult<BTreeMap<String, String>> {
        let removed = self.namespace_entries(namespace);
        if removed.is_empty() {
            return Ok(removed);
        }
        let namespace = normalize_path(namespace);
        for rel in removed.keys() {
            let full_key = normalize_key(Some(&namespace), rel)?;
            if let Some(value) = self.map.get(&full_key) {
                tx.delete_row(&self.row(full_key.clone(), value))?;
                self.map.remove(tx, &full_key)?;
            }
        }
        Ok(removed)
    }

    /// Remove every property.
    pub fn clear(&self, tx: &mut TransactionMgr) -> MetadataResult<()> {
        for (key, value) in self.map.snapshot() {
            tx.delete_row(&self.row(key, value))?;
        }
        self.map.remove_where(tx, |_, _| true)?;
        Ok(())
    }

    pub fn is_dirty(&self) -> bool {
        self.map.is_dirty()
    }
}

impl ReadOnlyProps for PropsContainer {
    fn get_prop(&self, key: &str, namespace: Option<&str>) -> Option<String> {
        let full_key = normalize_key(namespace, key).ok()?;
        self.map.get(&full_key)
    }

    fn namespace_entries(&self, namespace: &str) -> BTreeMap<String, String> {
        self.map.with(|entries| collect_namespace(entries, namespace))
    }
}

impl std::fmt::Debug for PropsContainer {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("PropsContainer")
            .field("instance", &self.instance)
            .field("entries", &self.map)
            .finish()
    }
}
