//! Moving staged backups to a blob backend and restoring them.

pub mod delete;
pub mod download;
pub mod engine;
pub mod report;
pub mod upload;

pub use engine::{TransferEngine, TransferOptions, DEFAULT_REQUEST_TIMEOUT};
pub use report::{DeleteReport, DownloadReport, Failure, UploadReport};
