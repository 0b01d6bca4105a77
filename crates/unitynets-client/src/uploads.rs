//! Attachment object store.
//!
//! Filesystem-backed stand-in for the managed object storage: size-capped
//! uploads under a base directory, addressed by a generated id and returned
//! as a `file:` URL that goes into the message content. Reads validate that
//! the resolved path stays inside the base directory.

use std::path::{Path, PathBuf};

use thiserror::Error;
use tokio::fs;
use tracing::{debug, info};
use uuid::Uuid;

#[derive(Error, Debug)]
pub enum UploadError {
    #[error("Empty upload")]
    Empty,

    #[error("Upload too large: {size} bytes (max {max})")]
    TooLarge { size: usize, max: usize },

    #[error("Object storage error: {0}")]
    Storage(String),
}

/// Result of a successful upload.
#[derive(Debug, Clone)]
pub struct StoredObject {
    pub id: Uuid,
    pub url: String,
    pub size: usize,
}

#[derive(Debug, Clone)]
pub struct FsObjectStore {
    base_path: PathBuf,
    max_size: usize,
}

impl FsObjectStore {
    pub fn new(base_path: impl Into<PathBuf>, max_size: usize) -> Result<Self, UploadError> {
        let base_path = base_path.into();
        std::fs::create_dir_all(&base_path).map_err(|e| {
            UploadError::Storage(format!(
                "Failed to create object directory '{}': {}",
                base_path.display(),
                e
            ))
        })?;

        info!(path = %base_path.display(), "Object store initialized");

        Ok(Self {
            base_path,
            max_size,
        })
    }

    pub fn base_path(&self) -> &Path {
        &self.base_path
    }

    /// Upload a binary object; returns its id and resolvable URL.
    ///
    /// The stored name is a fresh UUID plus the original file's extension
    /// (when it is plain alphanumeric), so user-supplied names never reach
    /// the filesystem.
    pub async fn store(&self, file_name: &str, data: &[u8]) -> Result<StoredObject, UploadError> {
        if data.is_empty() {
            return Err(UploadError::Empty);
        }
        if data.len() > self.max_size {
            return Err(UploadError::TooLarge {
                size: data.len(),
                max: self.max_size,
            });
        }

        let id = Uuid::new_v4();
        let path = self.base_path.join(object_name(id, file_name));

        fs::write(&path, data)
            .await
            .map_err(|e| UploadError::Storage(format!("Failed to write object {id}: {e}")))?;

        debug!(id = %id, size = data.len(), "Stored object");

        Ok(StoredObject {
            id,
            url: format!("file://{}", path.display()),
            size: data.len(),
        })
    }

    /// Fetch an object back by the URL recorded in a message.
    pub async fn get(&self, url: &str) -> Result<Vec<u8>, UploadError> {
        let path = self.path_from_url(url)?;

        let data = fs::read(&path)
            .await
            .map_err(|e| UploadError::Storage(format!("Failed to read object: {e}")))?;

        debug!(size = data.len(), "Retrieved object");
        Ok(data)
    }

    pub async fn delete(&self, url: &str) -> Result<(), UploadError> {
        let path = self.path_from_url(url)?;

        fs::remove_file(&path)
            .await
            .map_err(|e| UploadError::Storage(format!("Failed to delete object: {e}")))?;
        Ok(())
    }

    /// Resolve a `file:` URL back to a path, rejecting anything that escapes
    /// the base directory.
    fn path_from_url(&self, url: &str) -> Result<PathBuf, UploadError> {
        let raw = url
            .strip_prefix("file://")
            .ok_or_else(|| UploadError::Storage("Unsupported URL scheme".to_string()))?;

        let canonical_base = self
            .base_path
            .canonicalize()
            .unwrap_or_else(|_| self.base_path.clone());
        let canonical = Path::new(raw)
            .canonicalize()
            .map_err(|e| UploadError::Storage(format!("Object not found: {e}")))?;

        if !canonical.starts_with(&canonical_base) {
            return Err(UploadError::Storage(
                "Path traversal detected".to_string(),
            ));
        }
        Ok(canonical)
    }
}

/// `<uuid>.<ext>` when the extension is plain alphanumeric, bare `<uuid>`
/// otherwise.
fn object_name(id: Uuid, file_name: &str) -> String {
    let ext = Path::new(file_name)
        .extension()
        .and_then(|e| e.to_str())
        .filter(|e| !e.is_empty() && e.len() <= 8 && e.chars().all(|c| c.is_ascii_alphanumeric()));

    match ext {
        Some(ext) => format!("{id}.{}", ext.to_lowercase()),
        None => id.to_string(),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    fn test_store() -> (FsObjectStore, TempDir) {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path().join("objects"), 1024 * 1024).unwrap();
        (store, dir)
    }

    #[tokio::test]
    async fn test_store_and_get() {
        let (store, _dir) = test_store();
        let data = b"attachment-bytes";

        let object = store.store("notes.pdf", data).await.unwrap();
        assert!(object.url.ends_with(".pdf"));

        let retrieved = store.get(&object.url).await.unwrap();
        assert_eq!(retrieved, data);
    }

    #[tokio::test]
    async fn test_delete() {
        let (store, _dir) = test_store();
        let object = store.store("x.png", b"delete-me").await.unwrap();

        store.delete(&object.url).await.unwrap();
        assert!(store.get(&object.url).await.is_err());
    }

    #[tokio::test]
    async fn test_empty_upload_rejected() {
        let (store, _dir) = test_store();
        assert!(matches!(
            store.store("empty.bin", b"").await,
            Err(UploadError::Empty)
        ));
    }

    #[tokio::test]
    async fn test_oversized_upload_rejected() {
        let dir = TempDir::new().unwrap();
        let store = FsObjectStore::new(dir.path().join("objects"), 8).unwrap();

        assert!(matches!(
            store.store("big.bin", b"way too large").await,
            Err(UploadError::TooLarge { .. })
        ));
    }

    #[tokio::test]
    async fn test_get_outside_base_rejected() {
        let (store, dir) = test_store();

        let outside = dir.path().join("secret.txt");
        std::fs::write(&outside, b"secret").unwrap();

        let url = format!("file://{}", outside.display());
        assert!(store.get(&url).await.is_err());
    }

    #[test]
    fn test_object_names_drop_unsafe_extensions() {
        let id = Uuid::new_v4();
        assert!(object_name(id, "report.PDF").ends_with(".pdf"));
        assert_eq!(object_name(id, "../../etc/passwd"), id.to_string());
        assert_eq!(object_name(id, "noext"), id.to_string());
    }
}
