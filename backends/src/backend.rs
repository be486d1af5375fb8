use async_trait::async_trait;
use bytes::Bytes;
use splitsnap_core::{BlobId, Result};
use std::fmt;
use std::path::Path;

#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum BackendType {
    Local,
    Memory,
    Http,
    S3,
}

impl fmt::Display for BackendType {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackendType::Local => write!(f, "local"),
            BackendType::Memory => write!(f, "memory"),
            BackendType::Http => write!(f, "http"),
            BackendType::S3 => write!(f, "s3"),
        }
    }
}

/// Remote blob store. Blobs are opaque: the store names them on upload and
/// hands them back by that id.
#[async_trait]
pub trait Backend: Send + Sync {
    async fn init(&self) -> Result<()>;

    /// Uploads the file at `path`, returning the id the store assigned.
    async fn put(&self, path: &Path) -> Result<BlobId>;

    async fn get(&self, blob_id: &str) -> Result<Bytes>;

    async fn delete(&self, blob_id: &str) -> Result<()>;

    fn backend_type(&self) -> BackendType;
}
