use crate::backend::{Backend, BackendType};
use async_trait::async_trait;
use bytes::Bytes;
use splitsnap_core::{BlobId, Error, Result};
use std::collections::HashMap;
use std::path::Path;
use tokio::fs;
use tokio::sync::Mutex;

#[derive(Default)]
struct Blobs {
    next_id: u64,
    data: HashMap<BlobId, Bytes>,
    puts: usize,
}

/// Keeps blobs in process memory. Ids are sequential (`mem-000001`, ...).
#[derive(Default)]
pub struct MemoryBackend {
    blobs: Mutex<Blobs>,
    max_blob_size: Option<u64>,
}

impl MemoryBackend {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn with_max_blob_size(mut self, limit: u64) -> Self {
        self.max_blob_size = Some(limit);
        self
    }

    /// Total successful uploads, including blobs deleted since.
    pub async fn put_count(&self) -> usize {
        self.blobs.lock().await.puts
    }

    pub async fn len(&self) -> usize {
        self.blobs.lock().await.data.len()
    }

    pub async fn is_empty(&self) -> bool {
        self.len().await == 0
    }
}

#[async_trait]
impl Backend for MemoryBackend {
    async fn init(&self) -> Result<()> {
        Ok(())
    }

    async fn put(&self, path: &Path) -> Result<BlobId> {
        let data = fs::read(path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to read {}: {}", path.display(), e)))?;
        if let Some(limit) = self.max_blob_size {
            if data.len() as u64 > limit {
                return Err(Error::Backend(format!(
                    "Blob of {} bytes rejected (limit {})",
                    data.len(),
                    limit
                )));
            }
        }

        let mut blobs = self.blobs.lock().await;
        blobs.next_id += 1;
        blobs.puts += 1;
        let id = format!("mem-{:06}", blobs.next_id);
        blobs.data.insert(id.clone(), Bytes::from(data));
        Ok(id)
    }

    async fn get(&self, blob_id: &str) -> Result<Bytes> {
        self.blobs
            .lock()
            .await
            .data
            .get(blob_id)
            .cloned()
            .ok_or_else(|| Error::Backend(format!("Blob {} not found", blob_id)))
    }

    async fn delete(&self, blob_id: &str) -> Result<()> {
        self.blobs.lock().await.data.remove(blob_id);
        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Memory
    }
}
