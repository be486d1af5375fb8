use splitsnap_backends::{retry_with_backoff, Backend, RetryConfig};
use splitsnap_core::{Archiver, BackupStore, BlobId, Error, Result};
use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::time::Duration;
use tokio::fs;
use tokio::time::timeout;
use tracing::{debug, warn};

pub const DEFAULT_REQUEST_TIMEOUT: Duration = Duration::from_secs(300);

#[derive(Debug, Clone)]
pub struct TransferOptions {
    /// Upper bound for a single backend call, retries excluded.
    pub request_timeout: Duration,
    pub retry: RetryConfig,
    /// Root the builder staged into; emptied per-backup folders under it are
    /// removed once a backup is fully uploaded.
    pub staging_dir: Option<PathBuf>,
}

impl Default for TransferOptions {
    fn default() -> Self {
        Self {
            request_timeout: DEFAULT_REQUEST_TIMEOUT,
            retry: RetryConfig::default(),
            staging_dir: None,
        }
    }
}

/// Moves staged backups to a backend and back, keeping the store in step.
pub struct TransferEngine {
    pub(crate) store: Arc<BackupStore>,
    pub(crate) backend: Arc<dyn Backend>,
    pub(crate) archiver: Arc<dyn Archiver>,
    pub(crate) options: TransferOptions,
}

impl TransferEngine {
    pub fn new(store: Arc<BackupStore>, backend: Arc<dyn Backend>, archiver: Arc<dyn Archiver>) -> Self {
        Self {
            store,
            backend,
            archiver,
            options: TransferOptions::default(),
        }
    }

    pub fn with_options(mut self, options: TransferOptions) -> Self {
        self.options = options;
        self
    }

    pub fn store(&self) -> &BackupStore {
        &self.store
    }

    pub(crate) async fn put_blob(&self, path: &Path, item: &str) -> Result<BlobId> {
        let backend = self.backend.as_ref();
        let limit = self.options.request_timeout;

        retry_with_backoff(&self.options.retry, "upload blob", move || async move {
            match timeout(limit, backend.put(path)).await {
                Ok(Ok(id)) => Ok(id),
                Ok(Err(e)) => Err(Error::transfer(item, e.to_string())),
                Err(_) => Err(Error::transfer(
                    item,
                    format!("upload timed out after {:?}", limit),
                )),
            }
        })
        .await
    }

    pub(crate) async fn get_blob(&self, blob_id: &str, item: &str) -> Result<Vec<u8>> {
        let backend = self.backend.as_ref();
        let limit = self.options.request_timeout;

        retry_with_backoff(&self.options.retry, "download blob", move || async move {
            match timeout(limit, backend.get(blob_id)).await {
                Ok(Ok(data)) => Ok(data.to_vec()),
                Ok(Err(e)) => Err(Error::transfer(item, e.to_string())),
                Err(_) => Err(Error::transfer(
                    item,
                    format!("download of {} timed out after {:?}", blob_id, limit),
                )),
            }
        })
        .await
    }

    pub(crate) async fn delete_blob(&self, blob_id: &str, item: &str) -> Result<()> {
        let backend = self.backend.as_ref();
        let limit = self.options.request_timeout;

        retry_with_backoff(&self.options.retry, "delete blob", move || async move {
            match timeout(limit, backend.delete(blob_id)).await {
                Ok(result) => result.map_err(|e| Error::transfer(item, e.to_string())),
                Err(_) => Err(Error::transfer(
                    item,
                    format!("delete of {} timed out after {:?}", blob_id, limit),
                )),
            }
        })
        .await
    }
}

/// Deletes a local copy whose blob is already recorded. Failure only costs
/// disk space, so it is logged and ignored.
pub(crate) async fn discard_local(path: &Path) {
    match fs::remove_file(path).await {
        Ok(()) => debug!(path = %path.display(), "Removed uploaded local copy"),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => {}
        Err(e) => warn!(path = %path.display(), error = %e, "Failed to remove uploaded local copy"),
    }
}

/// Removes every empty directory under and including `dir`, deepest first.
/// Directories that still hold files are left alone.
pub(crate) async fn prune_empty_dirs(dir: &Path) -> usize {
    let dirs: Vec<PathBuf> = walkdir::WalkDir::new(dir)
        .follow_links(false)
        .contents_first(true)
        .into_iter()
        .filter_map(|entry| entry.ok())
        .filter(|entry| entry.file_type().is_dir())
        .map(|entry| entry.into_path())
        .collect();

    let mut removed = 0;
    for path in dirs {
        if fs::remove_dir(&path).await.is_ok() {
            removed += 1;
        }
    }
    removed
}

#[cfg(test)]
pub(crate) mod testing {
    use async_trait::async_trait;
    use bytes::Bytes;
    use splitsnap_backends::{Backend, BackendType, MemoryBackend};
    use splitsnap_core::{BlobId, Error, Result};
    use std::path::Path;
    use std::sync::atomic::{AtomicUsize, Ordering};
    use std::time::Duration;

    /// Memory backend whose puts start failing after a number of successes.
    pub struct FlakyBackend {
        pub inner: MemoryBackend,
        fail_after: AtomicUsize,
        pub attempts: AtomicUsize,
    }

    impl FlakyBackend {
        pub fn failing_after(successes: usize) -> Self {
            Self {
                inner: MemoryBackend::new(),
                fail_after: AtomicUsize::new(successes),
                attempts: AtomicUsize::new(0),
            }
        }

        pub fn heal(&self) {
            self.fail_after.store(usize::MAX, Ordering::SeqCst);
        }
    }

    #[async_trait]
    impl Backend for FlakyBackend {
        async fn init(&self) -> Result<()> {
            Ok(())
        }

        async fn put(&self, path: &Path) -> Result<BlobId> {
            self.attempts.fetch_add(1, Ordering::SeqCst);
            let remaining = self.fail_after.load(Ordering::SeqCst);
            if remaining == 0 {
                return Err(Error::Backend("upstream rejected the blob".to_string()));
            }
            if remaining != usize::MAX {
                self.fail_after.store(remaining - 1, Ordering::SeqCst);
            }
            self.inner.put(path).await
        }

        async fn get(&self, blob_id: &str) -> Result<Bytes> {
            self.inner.get(blob_id).await
        }

        async fn delete(&self, blob_id: &str) -> Result<()> {
            self.inner.delete(blob_id).await
        }

        fn backend_type(&self) -> BackendType {
            BackendType::Memory
        }
    }

    /// Memory backend that stalls on uploads of one file name.
    pub struct SlowBackend {
        pub inner: MemoryBackend,
        slow_name: &'static str,
        delay: Duration,
    }

    impl SlowBackend {
        pub fn stalling_on(slow_name: &'static str, delay: Duration) -> Self {
            Self {
                inner: MemoryBackend::new(),
                slow_name,
                delay,
            }
        }
    }

    #[async_trait]
    impl Backend for SlowBackend {
        async fn init(&self) -> Result<()> {
            Ok(())
        }

        async fn put(&self, path: &Path) -> Result<BlobId> {
            if path.file_name().and_then(|n| n.to_str()) == Some(self.slow_name) {
                tokio::time::sleep(self.delay).await;
            }
            self.inner.put(path).await
        }

        async fn get(&self, blob_id: &str) -> Result<Bytes> {
            self.inner.get(blob_id).await
        }

        async fn delete(&self, blob_id: &str) -> Result<()> {
            self.inner.delete(blob_id).await
        }

        fn backend_type(&self) -> BackendType {
            BackendType::Memory
        }
    }

    /// `len` bytes that gzip cannot shrink much.
    pub fn noise(len: usize) -> Vec<u8> {
        use rand::RngCore;
        let mut data = vec![0u8; len];
        rand::thread_rng().fill_bytes(&mut data);
        data
    }
}
