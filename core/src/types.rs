use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;

pub type Token = String;
pub type BlobId = String;

/// Largest blob the remote store accepts. Files at or above this size are
/// archived, and archive volumes never exceed it.
pub const MAX_BLOB_SIZE: u64 = 48 * 1024 * 1024;

/// Assumed upload bitrate in SI megabits per second.
pub const DEFAULT_UPLOAD_SPEED_MBPS: f64 = 1.5;

pub const CREATION_DATE_FORMAT: &str = "%d.%m.%Y-%H-%M-%S";

#[derive(Debug, Clone, Copy, PartialEq, Eq, Default, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum BackupMode {
    /// Whole source compressed into one multi-volume archive.
    Archive,
    /// Tree mirrored file by file; only large files are archived.
    #[default]
    Individual,
}

impl FromStr for BackupMode {
    type Err = crate::Error;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.to_ascii_lowercase().as_str() {
            "archive" => Ok(BackupMode::Archive),
            "individual" => Ok(BackupMode::Individual),
            other => Err(crate::Error::Other(format!(
                "Unknown backup mode '{}' (expected archive or individual)",
                other
            ))),
        }
    }
}

impl fmt::Display for BackupMode {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            BackupMode::Archive => write!(f, "archive"),
            BackupMode::Individual => write!(f, "individual"),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_mode_parsing() {
        assert_eq!("archive".parse::<BackupMode>().unwrap(), BackupMode::Archive);
        assert_eq!("Individual".parse::<BackupMode>().unwrap(), BackupMode::Individual);
        assert!("zip".parse::<BackupMode>().is_err());
        assert_eq!(BackupMode::Archive.to_string(), "archive");
    }
}
