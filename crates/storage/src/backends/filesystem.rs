//! Object store on a local directory, one file per object.

use crate::error::{StorageError, StorageResult};
use crate::traits::ObjectStore;
use async_trait::async_trait;
use bytes::Bytes;
use std::io::ErrorKind;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tracing::instrument;
use uuid::Uuid;

/// Infix of files that are still being written. Never listed as objects.
const PARTIAL_INFIX: &str = ".partial-";

pub struct FilesystemBackend {
    root: PathBuf,
}

impl FilesystemBackend {
    /// Open a store rooted at `root`, creating the directory if needed.
    pub async fn new(root: impl AsRef<Path>) -> StorageResult<Self> {
        let root = root.as_ref().to_path_buf();
        fs::create_dir_all(&root).await?;
        Ok(Self { root })
    }

    pub fn root(&self) -> &Path {
        &self.root
    }

    /// Map a key onto a path below the root. Only plain relative segments are accepted.
    fn path_of(&self, key: &str) -> StorageResult<PathBuf> {
        let relative = Path::new(key);
        let plain = !key.is_empty()
            && !key.contains('\\')
            && relative
                .components()
                .all(|c| matches!(c, Component::Normal(_)));
        if !plain {
            return Err(StorageError::InvalidKey(key.to_string()));
        }
        Ok(self.root.join(relative))
    }

    fn missing(key: &str, err: std::io::Error) -> StorageError {
        match err.kind() {
            ErrorKind::NotFound => StorageError::NotFound(key.to_string()),
            _ => StorageError::Io(err),
        }
    }

    /// Write next to the target, flush to disk, then rename into place.
    async fn replace_file(&self, path: &Path, data: &[u8]) -> StorageResult<()> {
        if let Some(dir) = path.parent() {
            fs::create_dir_all(dir).await?;
        }
        let file_name = path
            .file_name()
            .map(|n| n.to_string_lossy().into_owned())
            .unwrap_or_default();
        let partial = path.with_file_name(format!("{file_name}{PARTIAL_INFIX}{}", Uuid::new_v4()));

        let written = async {
            let mut file = fs::File::create(&partial).await?;
            file.write_all(data).await?;
            file.sync_all().await?;
            fs::rename(&partial, path).await
        }
        .await;
        if let Err(e) = written {
            if let Err(cleanup) = fs::remove_file(&partial).await
                && cleanup.kind() != ErrorKind::NotFound
            {
                tracing::warn!(path = ?partial, error = %cleanup, "failed to remove partial object file");
            }
            return Err(StorageError::Io(e));
        }
        Ok(())
    }

    fn object_key(&self, path: &Path) -> Option<String> {
        let relative = path.strip_prefix(&self.root).ok()?;
        let parts: Vec<_> = relative
            .components()
            .map(|c| c.as_os_str().to_string_lossy().into_owned())
            .collect();
        Some(parts.join("/"))
    }
}

#[async_trait]
impl ObjectStore for FilesystemBackend {
    async fn exists(&self, key: &str) -> StorageResult<bool> {
        let path = self.path_of(key)?;
        Ok(fs::try_exists(&path).await?)
    }

    async fn get(&self, key: &str) -> StorageResult<Bytes> {
        let path = self.path_of(key)?;
        let data = fs::read(&path).await.map_err(|e| Self::missing(key, e))?;
        Ok(Bytes::from(data))
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put(&self, key: &str, data: Bytes) -> StorageResult<()> {
        let path = self.path_of(key)?;
        self.replace_file(&path, &data).await
    }

    #[instrument(skip(self, data), fields(backend = "filesystem", size = data.len()))]
    async fn put_if_not_exists(&self, key: &str, data: Bytes) -> StorageResult<bool> {
        let path = self.path_of(key)?;
        // Not atomic across processes. A single controller owns the directory.
        if fs::try_exists(&path).await? {
            return Ok(false);
        }
        self.replace_file(&path, &data).await?;
        Ok(true)
    }

    #[instrument(skip(self), fields(backend = "filesystem"))]
    async fn delete(&self, key: &str) -> StorageResult<()> {
        let path = self.path_of(key)?;
        fs::remove_file(&path)
            .await
            .map_err(|e| Self::missing(key, e))
    }

    async fn list(&self, prefix: &str) -> StorageResult<Vec<String>> {
        let mut keys = Vec::new();
        let mut pending = vec![self.path_of(prefix)?];
        while let Some(dir) = pending.pop() {
            let mut entries = match fs::read_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if e.kind() == ErrorKind::NotFound => continue,
                Err(e) => return Err(e.into()),
            };
            while let Some(entry) = entries.next_entry().await? {
                let file_type = entry.file_type().await?;
                if file_type.is_dir() {
                    pending.push(entry.path());
                    continue;
                }
                if !file_type.is_file() || entry.file_name().to_string_lossy().contains(PARTIAL_INFIX) {
                    continue;
                }
                if let Some(key) = self.object_key(&entry.path()) {
                    keys.push(key);
                }
            }
        }
        Ok(keys)
    }

    fn backend_name(&self) -> &'static str {
        "filesystem"
    }

    async fn health_check(&self) -> StorageResult<()> {
        let meta = fs::metadata(&self.root).await?;
        if !meta.is_dir() {
            return Err(StorageError::Config(format!(
                "{} is not a directory",
                self.root.display()
            )));
        }
        Ok(())
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    async fn store() -> (tempfile::TempDir, FilesystemBackend) {
        let dir = tempfile::tempdir().unwrap();
        let backend = FilesystemBackend::new(dir.path().join("objects")).await.unwrap();
        (dir, backend)
    }

    #[tokio::test]
    async fn test_put_replaces_contents() {
        let (_dir, backend) = store().await;
        let key = "crd/nodes/bm9kZS1h.json";

        backend.put(key, Bytes::from("{\"name\":\"node-a\"}")).await.unwrap();
        backend.put(key, Bytes::from("{}")).await.unwrap();

        assert!(backend.exists(key).await.unwrap());
        assert_eq!(backend.get(key).await.unwrap(), Bytes::from("{}"));
    }

    #[tokio::test]
    async fn test_put_if_not_exists_keeps_first_write() {
        let (_dir, backend) = store().await;

        assert!(backend.put_if_not_exists("crd/a", Bytes::from("first")).await.unwrap());
        assert!(!backend.put_if_not_exists("crd/a", Bytes::from("second")).await.unwrap());
        assert_eq!(backend.get("crd/a").await.unwrap(), Bytes::from("first"));
    }

    #[tokio::test]
    async fn test_partial_files_are_not_listed() {
        let (_dir, backend) = store().await;
        backend.put("crd/nodes/a", Bytes::from("1")).await.unwrap();
        std::fs::write(
            backend.root().join("crd/nodes").join(format!("b{PARTIAL_INFIX}0")),
            "half",
        )
        .unwrap();

        assert_eq!(backend.list("crd/nodes").await.unwrap(), vec!["crd/nodes/a"]);
    }

    #[tokio::test]
    async fn test_keys_cannot_leave_root() {
        let (_dir, backend) = store().await;

        for key in ["../escape", "/abs/path", "crd/../x", "", "crd\\x"] {
            assert!(
                matches!(backend.exists(key).await, Err(StorageError::InvalidKey(_))),
                "{key:?} accepted"
            );
        }
        assert!(!backend.exists("crd/nested/key").await.unwrap());
    }

    #[tokio::test]
    async fn test_health_check_requires_directory() {
        let (dir, backend) = store().await;
        backend.health_check().await.unwrap();

        let file = dir.path().join("file");
        std::fs::write(&file, "x").unwrap();
        let not_dir = FilesystemBackend { root: file };
        assert!(matches!(not_dir.health_check().await, Err(StorageError::Config(_))));
    }
}
