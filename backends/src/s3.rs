use crate::backend::{Backend, BackendType};
use async_trait::async_trait;
use aws_config::BehaviorVersion;
use aws_sdk_s3::primitives::ByteStream;
use aws_sdk_s3::Client;
use bytes::Bytes;
use splitsnap_core::{BlobId, Error, Result};
use std::path::Path;

/// Blobs as S3 objects under `{prefix}/{uuid}`; the uuid is the blob id.
pub struct S3Backend {
    client: Client,
    bucket: String,
    prefix: String,
}

impl S3Backend {
    pub async fn new(bucket: String, prefix: String) -> Result<Self> {
        let config = aws_config::load_defaults(BehaviorVersion::latest()).await;
        let client = Client::new(&config);

        Ok(Self {
            client,
            bucket,
            prefix,
        })
    }

    pub async fn with_endpoint(bucket: String, prefix: String, endpoint: String) -> Result<Self> {
        let config = aws_config::defaults(BehaviorVersion::latest())
            .endpoint_url(endpoint)
            .load()
            .await;
        let client = Client::new(&config);

        Ok(Self {
            client,
            bucket,
            prefix,
        })
    }

    fn full_key(&self, blob_id: &str) -> String {
        if self.prefix.is_empty() {
            blob_id.to_string()
        } else {
            format!("{}/{}", self.prefix.trim_end_matches('/'), blob_id)
        }
    }
}

#[async_trait]
impl Backend for S3Backend {
    async fn init(&self) -> Result<()> {
        self.client
            .head_bucket()
            .bucket(&self.bucket)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Bucket {} not accessible: {}", self.bucket, e)))?;
        Ok(())
    }

    async fn put(&self, path: &Path) -> Result<BlobId> {
        let body = ByteStream::from_path(path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to read {}: {}", path.display(), e)))?;
        let blob_id = uuid::Uuid::new_v4().to_string();

        self.client
            .put_object()
            .bucket(&self.bucket)
            .key(self.full_key(&blob_id))
            .body(body)
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to write {}: {}", path.display(), e)))?;

        Ok(blob_id)
    }

    async fn get(&self, blob_id: &str) -> Result<Bytes> {
        let response = self
            .client
            .get_object()
            .bucket(&self.bucket)
            .key(self.full_key(blob_id))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to read {}: {}", blob_id, e)))?;

        let data = response
            .body
            .collect()
            .await
            .map_err(|e| Error::Backend(format!("Failed to read body: {}", e)))?;

        Ok(data.into_bytes())
    }

    async fn delete(&self, blob_id: &str) -> Result<()> {
        self.client
            .delete_object()
            .bucket(&self.bucket)
            .key(self.full_key(blob_id))
            .send()
            .await
            .map_err(|e| Error::Backend(format!("Failed to delete {}: {}", blob_id, e)))?;

        Ok(())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::S3
    }
}
