use thiserror::Error;

#[derive(Error, Debug)]
pub enum Error {
    #[error("IO error: {0}")]
    Io(#[from] std::io::Error),

    #[error("Serialization error: {0}")]
    Serialization(#[from] serde_json::Error),

    #[error("Invalid path {path}: {reason}")]
    InvalidPath { path: String, reason: String },

    #[error("Archiver failed on {path}: {reason}")]
    Archiver { path: String, reason: String },

    #[error("Transfer failed for {item}: {reason}")]
    Transfer { item: String, reason: String },

    #[error("Backup not found: {token}")]
    NotFound { token: String },

    #[error("Backup {token} is not fully uploaded yet")]
    NotUploaded { token: String },

    #[error("Backup store at {path} is corrupted: {reason}")]
    StoreCorrupted { path: String, reason: String },

    #[error("Duplicate {kind} entry '{name}'")]
    DuplicateEntry { kind: String, name: String },

    #[error("Backend error: {0}")]
    Backend(String),

    #[error("{0}")]
    Other(String),
}

impl Error {
    pub fn invalid_path(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Error::InvalidPath {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn archiver(path: &std::path::Path, reason: impl Into<String>) -> Self {
        Error::Archiver {
            path: path.display().to_string(),
            reason: reason.into(),
        }
    }

    pub fn transfer(item: impl Into<String>, reason: impl Into<String>) -> Self {
        Error::Transfer {
            item: item.into(),
            reason: reason.into(),
        }
    }
}

pub type Result<T> = std::result::Result<T, Error>;
