use crate::backend::{Backend, BackendType};
use async_trait::async_trait;
use bytes::Bytes;
use serde::Deserialize;
use splitsnap_core::{BlobId, Error, Result};
use std::path::Path;
use std::time::Duration;
use tokio::fs;
use tracing::debug;

/// Generic blob service over HTTP.
///
/// `POST {endpoint}/blobs` with the raw bytes answers `{"id": "..."}`;
/// `GET` and `DELETE` on `{endpoint}/blobs/{id}` fetch and drop a blob.
pub struct HttpBackend {
    client: reqwest::Client,
    endpoint: String,
    token: Option<String>,
}

#[derive(Debug, Deserialize)]
struct PutResponse {
    id: String,
}

impl HttpBackend {
    pub fn new(endpoint: impl Into<String>, token: Option<String>, timeout: Duration) -> Result<Self> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .build()
            .map_err(|e| Error::Backend(format!("Failed to build HTTP client: {}", e)))?;

        Ok(Self {
            client,
            endpoint: endpoint.into().trim_end_matches('/').to_string(),
            token,
        })
    }

    fn blob_url(&self, blob_id: &str) -> String {
        format!("{}/blobs/{}", self.endpoint, blob_id)
    }

    fn authorize(&self, request: reqwest::RequestBuilder) -> reqwest::RequestBuilder {
        match &self.token {
            Some(token) => request.bearer_auth(token),
            None => request,
        }
    }
}

fn describe(action: &str, subject: &str, e: reqwest::Error) -> Error {
    let kind = if e.is_timeout() {
        "timeout"
    } else if e.is_connect() {
        "connection failed"
    } else {
        "request failed"
    };
    Error::Backend(format!("{} {}: {}: {}", action, subject, kind, e))
}

fn check_status(action: &str, subject: &str, status: reqwest::StatusCode) -> Result<()> {
    if status.is_success() {
        return Ok(());
    }
    Err(Error::Backend(format!(
        "{} {} rejected with status {}",
        action,
        subject,
        status.as_u16()
    )))
}

/// A blob that is already gone counts as deleted, so an interrupted delete
/// can be rerun.
fn check_delete_status(blob_id: &str, status: reqwest::StatusCode) -> Result<()> {
    if status == reqwest::StatusCode::NOT_FOUND {
        debug!(blob = %blob_id, "Blob already absent");
        return Ok(());
    }
    check_status("Delete of", blob_id, status)
}

#[async_trait]
impl Backend for HttpBackend {
    async fn init(&self) -> Result<()> {
        debug!(endpoint = %self.endpoint, "HTTP backend ready");
        Ok(())
    }

    async fn put(&self, path: &Path) -> Result<BlobId> {
        let subject = path.display().to_string();
        let data = fs::read(path)
            .await
            .map_err(|e| Error::Backend(format!("Failed to read {}: {}", subject, e)))?;

        let request = self
            .client
            .post(format!("{}/blobs", self.endpoint))
            .header(reqwest::header::CONTENT_TYPE, "application/octet-stream")
            .body(data);
        let response = self
            .authorize(request)
            .send()
            .await
            .map_err(|e| describe("Upload of", &subject, e))?;
        check_status("Upload of", &subject, response.status())?;

        let body: PutResponse = response
            .json()
            .await
            .map_err(|e| describe("Reading upload response for", &subject, e))?;
        Ok(body.id)
    }

    async fn get(&self, blob_id: &str) -> Result<Bytes> {
        let response = self
            .authorize(self.client.get(self.blob_url(blob_id)))
            .send()
            .await
            .map_err(|e| describe("Download of", blob_id, e))?;
        check_status("Download of", blob_id, response.status())?;

        response
            .bytes()
            .await
            .map_err(|e| describe("Reading body of", blob_id, e))
    }

    async fn delete(&self, blob_id: &str) -> Result<()> {
        let response = self
            .authorize(self.client.delete(self.blob_url(blob_id)))
            .send()
            .await
            .map_err(|e| describe("Delete of", blob_id, e))?;
        check_delete_status(blob_id, response.status())
    }

    fn backend_type(&self) -> BackendType {
        BackendType::Http
    }
}
