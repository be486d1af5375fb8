use serde::Serialize;
use std::path::PathBuf;

/// One manifest item that could not be transferred or extracted.
#[derive(Debug, Clone, Serialize)]
pub struct Failure {
    pub item: String,
    pub reason: String,
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct UploadReport {
    pub token: String,
    /// Blobs sent during this run.
    pub uploaded_blobs: usize,
    /// Leaves that were already complete before this run.
    pub already_uploaded: usize,
    pub failures: Vec<Failure>,
    pub fully_uploaded: bool,
}

impl UploadReport {
    pub fn new(token: &str) -> Self {
        Self {
            token: token.to_string(),
            ..Default::default()
        }
    }

    pub fn is_complete(&self) -> bool {
        self.fully_uploaded && self.failures.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DownloadReport {
    pub destination: PathBuf,
    pub downloaded_blobs: usize,
    pub extracted_archives: usize,
    pub failures: Vec<Failure>,
    pub extraction_failures: Vec<Failure>,
}

impl DownloadReport {
    pub fn is_complete(&self) -> bool {
        self.failures.is_empty() && self.extraction_failures.is_empty()
    }
}

#[derive(Debug, Clone, Default, Serialize)]
pub struct DeleteReport {
    pub token: String,
    pub deleted_blobs: usize,
    pub failures: Vec<Failure>,
    /// False when some remote blobs survived; the record is kept so the
    /// deletion can be retried.
    pub record_removed: bool,
}
