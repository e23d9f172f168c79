//! Backend-neutral row representation.

use crate::error::{MetadataError, MetadataResult};
use crate::schema::Table;
use serde::{Deserialize, Serialize};
use std::collections::BTreeMap;

/// A single column value.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum DbValue {
    Null,
    Bool(bool),
    Int(i64),
    Text(String),
}

impl DbValue {
    /// Rendering used when building row keys.
    fn key_part(&self) -> Option<String> {
        match self {
            DbValue::Null => None,
            DbValue::Bool(b) => Some(b.to_string()),
            DbValue::Int(i) => Some(i.to_string()),
            DbValue::Text(s) => Some(s.clone()),
        }
    }
}

impl From<&str> for DbValue {
    fn from(v: &str) -> Self {
        DbValue::Text(v.to_string())
    }
}

impl From<String> for DbValue {
    fn from(v: String) -> Self {
        DbValue::Text(v)
    }
}

impl From<i64> for DbValue {
    fn from(v: i64) -> Self {
        DbValue::Int(v)
    }
}

impl From<bool> for DbValue {
    fn from(v: bool) -> Self {
        DbValue::Bool(v)
    }
}

impl<T: Into<DbValue>> From<Option<T>> for DbValue {
    fn from(v: Option<T>) -> Self {
        v.map(Into::into).unwrap_or(DbValue::Null)
    }
}

/// Column name to value map. Serializes as a flat JSON object.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(transparent)]
pub struct Row(BTreeMap<String, DbValue>);

impl Row {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with(mut self, column: &str, value: impl Into<DbValue>) -> Self {
        self.0.insert(column.to_string(), value.into());
        self
    }

    pub fn set(&mut self, column: &str, value: impl Into<DbValue>) {
        self.0.insert(column.to_string(), value.into());
    }

    pub fn get(&self, column: &str) -> Option<&DbValue> {
        self.0.get(column)
    }

    pub fn column_names(&self) -> impl Iterator<Item = &str> {
        self.0.keys().map(String::as_str)
    }

    /// Row key: the primary-key values in column order, joined by `:`.
    pub fn key(&self, table: &Table) -> MetadataResult<String> {
        let mut parts = Vec::new();
        for column in table.primary_key() {
            let part = self
                .get(column.name)
                .and_then(DbValue::key_part)
                .ok_or_else(|| {
                    MetadataError::implementation(format!(
                        "row for {} lacks key column {}",
                        table.name, column.name
                    ))
                })?;
            parts.push(part);
        }
        Ok(parts.join(":"))
    }

    fn missing(column: &str, expected: &str) -> MetadataError {
        MetadataError::implementation(format!("column '{column}' is not {expected}"))
    }

    pub fn text(&self, column: &str) -> MetadataResult<&str> {
        match self.get(column) {
            Some(DbValue::Text(s)) => Ok(s),
            _ => Err(Self::missing(column, "text")),
        }
    }

    pub fn opt_text(&self, column: &str) -> MetadataResult<Option<&str>> {
        match self.get(column) {
            None | Some(DbValue::Null) => Ok(None),
            Some(DbValue::Text(s)) => Ok(Some(s)),
            _ => Err(Self::missing(column, "text")),
        }
    }

    pub fn int(&self, column: &str) -> MetadataResult<i64> {
        match self.get(column) {
            Some(DbValue::Int(i)) => Ok(*i),
            _ => Err(Self::missing(column, "an integer")),
        }
    }

    pub fn opt_int(&self, column: &str) -> MetadataResult<Option<i64>> {
        match self.get(column) {
            None | Some(DbValue::Null) => Ok(None),
            Some(DbValue::Int(i)) => Ok(Some(*i)),
            _ => Err(Self::missing(column, "an integer")),
        }
    }

    pub fn bool(&self, column: &str) -> MetadataResult<bool> {
        match self.get(column) {
            Some(DbValue::Bool(b)) => Ok(*b),
            // SQLite has no boolean storage class.
            Some(DbValue::Int(i)) => Ok(*i != 0),
            _ => Err(Self::missing(column, "a boolean")),
        }
    }
}
