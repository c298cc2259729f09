//! Local filesystem storage behind the `object_store` API.
//!
//! Every component roots its own provider at a directory (source files,
//! checkpoint store, target table) and works with paths relative to that
//! root. Checkpoint and manifest updates use the atomic write pattern:
//!
//! 1. Write to a temp file: `{name}.tmp`
//! 2. Rename to the final path: `{name}`
//!
//! so readers never observe a partially written file.

use std::path::PathBuf;
use std::sync::Arc;

use bytes::Bytes;
use futures::TryStreamExt;
use object_store::local::LocalFileSystem;
use object_store::path::Path;
use object_store::{ObjectStore, PutPayload};
use snafu::prelude::*;

use crate::error::{InvalidRootSnafu, IoSnafu, ObjectStoreSnafu, StorageError};

/// A reference-counted storage provider.
pub type StorageProviderRef = Arc<StorageProvider>;

/// Storage provider rooted at a local directory.
pub struct StorageProvider {
    root: PathBuf,
    store: Arc<dyn ObjectStore>,
}

impl std::fmt::Debug for StorageProvider {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        write!(f, "StorageProvider<{}>", self.root.display())
    }
}

impl StorageProvider {
    /// Create a storage provider rooted at the given directory.
    ///
    /// The directory is created if it does not exist.
    pub async fn for_path(path: impl Into<PathBuf>) -> Result<Self, StorageError> {
        let root = path.into();
        tokio::fs::create_dir_all(&root).await.context(IoSnafu)?;

        let store = LocalFileSystem::new_with_prefix(&root).context(InvalidRootSnafu {
            path: root.display().to_string(),
        })?;

        Ok(Self {
            root,
            store: Arc::new(store),
        })
    }

    /// The directory this provider is rooted at.
    pub fn root(&self) -> &std::path::Path {
        &self.root
    }

    /// Get the contents of a file.
    pub async fn get(&self, path: impl Into<Path>) -> Result<Bytes, StorageError> {
        let path = path.into();
        self.store
            .get(&path)
            .await
            .context(ObjectStoreSnafu)?
            .bytes()
            .await
            .context(ObjectStoreSnafu)
    }

    /// Put bytes to a path, creating parent directories as needed.
    pub async fn put(&self, path: impl Into<Path>, bytes: Vec<u8>) -> Result<(), StorageError> {
        let path = path.into();
        self.store
            .put(&path, PutPayload::from(Bytes::from(bytes)))
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// Atomically replace the file at `path` with `bytes`.
    ///
    /// Writes to `{path}.tmp` and renames over the final path.
    pub async fn atomic_write(
        &self,
        path: impl Into<Path>,
        bytes: Vec<u8>,
    ) -> Result<(), StorageError> {
        let path = path.into();
        let tmp = Path::from(format!("{path}.tmp"));

        self.store
            .put(&tmp, PutPayload::from(Bytes::from(bytes)))
            .await
            .context(ObjectStoreSnafu)?;
        self.store
            .rename(&tmp, &path)
            .await
            .context(ObjectStoreSnafu)?;
        Ok(())
    }

    /// List all files under the optional prefix, relative to the root.
    pub async fn list(&self, prefix: Option<&str>) -> Result<Vec<Path>, StorageError> {
        let prefix = prefix.map(Path::from);
        let mut paths: Vec<Path> = self
            .store
            .list(prefix.as_ref())
            .map_ok(|meta| meta.location)
            .try_collect()
            .await
            .context(ObjectStoreSnafu)?;
        paths.sort_unstable();
        Ok(paths)
    }

    /// Delete a file; missing files are not an error.
    pub async fn delete(&self, path: impl Into<Path>) -> Result<(), StorageError> {
        let path = path.into();
        match self.store.delete(&path).await {
            Ok(()) => Ok(()),
            Err(object_store::Error::NotFound { .. }) => Ok(()),
            Err(source) => Err(StorageError::ObjectStore { source }),
        }
    }
}

/// Remove an entire directory tree; a missing tree is not an error.
///
/// Used by the cleanup operation, which works on configured paths rather
/// than on an open provider.
pub async fn remove_tree(path: &str) -> Result<(), StorageError> {
    match tokio::fs::remove_dir_all(path).await {
        Ok(()) => Ok(()),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(()),
        Err(source) => Err(StorageError::Io { source }),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_roundtrip() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_path(temp_dir.path()).await.unwrap();

        storage.put("a/b.txt", b"hello".to_vec()).await.unwrap();
        let bytes = storage.get("a/b.txt").await.unwrap();

        assert_eq!(&bytes[..], b"hello");
    }

    #[tokio::test]
    async fn test_get_missing_is_not_found() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_path(temp_dir.path()).await.unwrap();

        let err = storage.get("missing.json").await.unwrap_err();
        assert!(err.is_not_found());
    }

    #[tokio::test]
    async fn test_atomic_write_replaces_content() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_path(temp_dir.path()).await.unwrap();

        storage
            .atomic_write("state.json", b"v1".to_vec())
            .await
            .unwrap();
        storage
            .atomic_write("state.json", b"v2".to_vec())
            .await
            .unwrap();

        let bytes = storage.get("state.json").await.unwrap();
        assert_eq!(&bytes[..], b"v2");

        // No temp file left behind
        let files = storage.list(None).await.unwrap();
        assert_eq!(files.len(), 1);
    }

    #[tokio::test]
    async fn test_list_is_sorted_and_recursive() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_path(temp_dir.path()).await.unwrap();

        storage.put("b.csv", b"2".to_vec()).await.unwrap();
        storage.put("sub/c.csv", b"3".to_vec()).await.unwrap();
        storage.put("a.csv", b"1".to_vec()).await.unwrap();

        let files = storage.list(None).await.unwrap();
        let names: Vec<String> = files.iter().map(|p| p.to_string()).collect();
        assert_eq!(names, vec!["a.csv", "b.csv", "sub/c.csv"]);
    }

    #[tokio::test]
    async fn test_delete_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let storage = StorageProvider::for_path(temp_dir.path()).await.unwrap();

        storage.delete("never-existed.csv").await.unwrap();
    }

    #[tokio::test]
    async fn test_remove_tree_missing_is_ok() {
        let temp_dir = TempDir::new().unwrap();
        let path = temp_dir.path().join("gone");
        remove_tree(path.to_str().unwrap()).await.unwrap();
    }
}
