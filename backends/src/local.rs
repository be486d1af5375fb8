use crate::backend::{Backend, BackendType};
use async_trait::async_trait;
use bytes::Bytes;
use splitsnap_core::{BlobId, Error, Result};
use std::path::{Path, PathBuf};
use tokio::fs;

/// Stores blobs as files in a directory, one file per blob id.
pub struct LocalBackend {
    base_path: PathBuf,
    max_blob_size: Option<u64>,
}

impl LocalBackend {
    pub fn new<P: AsRef<Path>>(base_path: P) -> Self {
        Self {
            base_path: base_path.as_ref().to_path_buf(),
            max_blob_size: None,
        }
    }

    /// Rejects uploads larger than `limit` bytes, like a remote store would.
    pub fn with_max_blob_size(mut self, limit: u64) -> Self {
        self.max_blob_size = Some(limit);
        self
    }

    fn blob_path(&self, blob_id: &str) -> Result<PathBuf> {
        if blob_id.is_empty() || blob_id.contains(['/', '\\']) || blob_id.starts_with('.') {
            return Err(Error::Backend(format!("Invalid blob id '{}'", blob_id)));
        }
        Ok(self.base_path.join(blob_id))
    }
}

#[async_trait]
impl Backend for LocalBackend {
    async fn init(&self) -> Result<()> {
        fs::create_dir_all(&self.base_path).await?;
        Ok(())
    }

    async fn put(&self, path: &Path) -> Result<BlobId> {
        let size = fs::metadata(path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to stat {}: {}", path.display(), e)))?
            .len();
        if let Some(limit) = self.max_blob_size {
            if size > limit {
                return Err(Error::Backend(format!(
                    "Blob of {} bytes rejected (limit {})",
                    size, limit
                )));
            }
        }

        fs::create_dir_all(&self.base_path).await?;
        let blob_id = uuid::Uuid::new_v4().to_string();
        let target = self.blob_path(&blob_id)?;
        fs::copy(path, &target).await.map_err(|e| {
            Error::Backend(format!("Failed to write {}: {}", target.display(), e))
        })?;
        Ok(blob_id)
    }

    async fn get(&self, blob_id: &str) -> Result<Bytes> {
        let full_path = self.blob_path(blob_id)?;
        let data = fs::read(&full_path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to read {}: {}", blob_id, e)))?;
        Ok(Bytes::from(data))
    }

    async fn delete(&self, blob_id: &str) -> Result<()> {
        let full_path = self.blob_path(blob_id)?;
        if full_path.is_file() {
            fs::remove_file(&full_path)
                .await
                .map_err(|e| Error::Backend(format!("Failed to delete {}: {}", blob_id, e)))?;
        }
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Local
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::TempDir;

    #[tokio::test]
    async fn test_put_get_delete() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path().join("blobs"));
        backend.init().await.unwrap();

        let source = dir.path().join("in.bin");
        std::fs::write(&source, b"payload").unwrap();

        let id = backend.put(&source).await.unwrap();
        assert_eq!(&backend.get(&id).await.unwrap()[..], b"payload");

        backend.delete(&id).await.unwrap();
        assert!(backend.get(&id).await.is_err());
    }

    #[tokio::test]
    async fn test_oversized_blob_rejected() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path().join("blobs")).with_max_blob_size(4);

        let source = dir.path().join("in.bin");
        std::fs::write(&source, b"too large").unwrap();
        assert!(matches!(backend.put(&source).await, Err(Error::Backend(_))));
    }

    #[tokio::test]
    async fn test_path_like_ids_refused() {
        let dir = TempDir::new().unwrap();
        let backend = LocalBackend::new(dir.path());
        assert!(backend.get("../etc/passwd").await.is_err());
    }
}
