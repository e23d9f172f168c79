//! Row documents in the object store.

use crate::error::{MetadataError, MetadataResult};
use crate::row::Row;
use crate::schema::Table;
use base64::Engine as _;
use base64::engine::general_purpose::URL_SAFE_NO_PAD;
use bytes::Bytes;
use ferrostor_storage::{ObjectStore, StorageError};
use std::sync::Arc;

/// Prefix shared by every document this backend writes.
pub const CRD_PREFIX: &str = "crd";

/// Reads and writes one JSON document per row under `crd/<table>/`.
#[derive(Clone)]
pub struct CrdClient {
    store: Arc<dyn ObjectStore>,
}

impl CrdClient {
    pub fn new(store: Arc<dyn ObjectStore>) -> Self {
        Self { store }
    }

    pub fn store(&self) -> &Arc<dyn ObjectStore> {
        &self.store
    }

    /// Object key of a row document. Row keys may contain `:` and other
    /// characters that are unsafe in paths, so they are base64url-encoded.
    pub fn doc_key(table: &Table, key: &str) -> String {
        format!(
            "{CRD_PREFIX}/{}/{}.json",
            table.name,
            URL_SAFE_NO_PAD.encode(key.as_bytes())
        )
    }

    fn table_prefix(table: &Table) -> String {
        format!("{CRD_PREFIX}/{}", table.name)
    }

    fn encode(row: &Row) -> MetadataResult<Bytes> {
        Ok(Bytes::from(serde_json::to_vec(row)?))
    }

    pub async fn get_row(&self, table: &Table, key: &str) -> MetadataResult<Option<Row>> {
        match self.store.get(&Self::doc_key(table, key)).await {
            Ok(data) => Ok(Some(serde_json::from_slice(&data)?)),
            Err(StorageError::NotFound(_)) => Ok(None),
            Err(e) => Err(e.into()),
        }
    }

    /// Create a row document; fails if it already exists.
    pub async fn create_row(&self, table: &Table, key: &str, row: &Row) -> MetadataResult<()> {
        let written = self
            .store
            .put_if_not_exists(&Self::doc_key(table, key), Self::encode(row)?)
            .await?;
        if !written {
            return Err(MetadataError::AlreadyExists(format!("{}:{key}", table.name)));
        }
        Ok(())
    }

    /// Replace an existing row document; fails if it does not exist.
    pub async fn update_row(&self, table: &Table, key: &str, row: &Row) -> MetadataResult<()> {
        let doc_key = Self::doc_key(table, key);
        if !self.store.exists(&doc_key).await? {
            return Err(MetadataError::NotFound(format!("{}:{key}", table.name)));
        }
        self.store.put(&doc_key, Self::encode(row)?).await?;
        Ok(())
    }

    /// Write a row document whether or not it exists.
    pub async fn put_row(&self, table: &Table, key: &str, row: &Row) -> MetadataResult<()> {
        self.store
            .put(&Self::doc_key(table, key), Self::encode(row)?)
            .await?;
        Ok(())
    }

    pub async fn delete_row(&self, table: &Table, key: &str) -> MetadataResult<()> {
        match self.store.delete(&Self::doc_key(table, key)).await {
            Ok(()) => Ok(()),
            Err(StorageError::NotFound(_)) => {
                Err(MetadataError::NotFound(format!("{}:{key}", table.name)))
            }
            Err(e) => Err(e.into()),
        }
    }

    pub async fn list_rows(&self, table: &Table) -> MetadataResult<Vec<Row>> {
        let mut keys = self.store.list(&Self::table_prefix(table)).await?;
        keys.sort();
        let mut rows = Vec::with_capacity(keys.len());
        for key in keys {
            match self.store.get(&key).await {
                Ok(data) => rows.push(serde_json::from_slice(&data)?),
                // Deleted between list and get.
                Err(e) if e.is_not_found() => {}
                Err(e) => return Err(e.into()),
            }
        }
        Ok(rows)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::NODE_NET_INTERFACES;

    #[test]
    fn test_doc_key_is_path_safe() {
        let key = CrdClient::doc_key(&NODE_NET_INTERFACES, "n1:eth0");
        assert!(key.starts_with("crd/node_net_interfaces/"));
        assert!(key.ends_with(".json"));
        let encoded = key
            .trim_start_matches("crd/node_net_interfaces/")
            .trim_end_matches(".json");
        assert!(!encoded.contains(':') && !encoded.contains('/'));
        assert_eq!(URL_SAFE_NO_PAD.decode(encoded).unwrap(), b"n1:eth0");
    }
}
