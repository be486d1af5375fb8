//! Settings read from `splitsnap.toml`.
//!
//! Every key is optional; a missing file yields defaults rooted in the
//! platform data directory.

use anyhow::{Context, Result};
use directories::ProjectDirs;
use serde::{Deserialize, Serialize};
use splitsnap_core::{BackupMode, DEFAULT_UPLOAD_SPEED_MBPS, MAX_BLOB_SIZE};
use std::path::{Path, PathBuf};
use tracing::debug;

pub const CONFIG_FILE: &str = "splitsnap.toml";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ArchiverKind {
    #[default]
    Sevenzip,
    Tarball,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "lowercase")]
pub enum BackendConfig {
    Local {
        path: PathBuf,
    },
    Http {
        endpoint: String,
        #[serde(default)]
        token: Option<String>,
    },
    S3 {
        bucket: String,
        #[serde(default)]
        prefix: String,
        /// Custom endpoint for S3-compatible services.
        #[serde(default)]
        endpoint: Option<String>,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(default)]
pub struct Config {
    /// JSON file holding every backup record.
    pub store_path: PathBuf,

    /// Where copies and archive parts wait for upload.
    pub staging_dir: PathBuf,

    /// Default target of `download`.
    pub download_dir: PathBuf,

    pub mode: BackupMode,
    pub archiver: ArchiverKind,

    /// 7-Zip executable, looked up on `PATH` when not absolute.
    pub sevenzip_path: PathBuf,

    /// Files at or above this size are archived into parts of this size.
    pub max_blob_size: u64,

    pub upload_speed_mbps: f64,
    pub request_timeout_secs: u64,
    pub retry_attempts: u32,
    pub backend: BackendConfig,
}

impl Default for Config {
    fn default() -> Self {
        Self::rooted_at(&default_data_dir())
    }
}

impl Config {
    fn rooted_at(data_dir: &Path) -> Self {
        Self {
            store_path: data_dir.join("backups.json"),
            staging_dir: data_dir.join("staging"),
            download_dir: data_dir.join("downloads"),
            mode: BackupMode::default(),
            archiver: ArchiverKind::default(),
            sevenzip_path: PathBuf::from("7z"),
            max_blob_size: MAX_BLOB_SIZE,
            upload_speed_mbps: DEFAULT_UPLOAD_SPEED_MBPS,
            request_timeout_secs: 300,
            retry_attempts: 5,
            backend: BackendConfig::Local {
                path: data_dir.join("blobs"),
            },
        }
    }

    /// Reads `path`, or the default location when `None`. Only an explicit
    /// path must exist.
    pub fn load(path: Option<&Path>) -> Result<Self> {
        let (path, required) = match path {
            Some(path) => (path.to_path_buf(), true),
            None => match default_config_path() {
                Some(path) => (path, false),
                None => return Ok(Self::default()),
            },
        };

        if !path.exists() {
            if required {
                anyhow::bail!("Config file not found: {}", path.display());
            }
            debug!(path = %path.display(), "No config file, using defaults");
            return Ok(Self::default());
        }

        let raw = std::fs::read_to_string(&path)
            .with_context(|| format!("Failed to read config {}", path.display()))?;
        let config = Self::parse(&raw)
            .with_context(|| format!("Invalid config {}", path.display()))?;
        debug!(path = %path.display(), "Loaded config");
        Ok(config)
    }

    pub fn parse(raw: &str) -> Result<Self> {
        let config: Self = toml::from_str(raw)?;
        config.validate()?;
        Ok(config)
    }

    fn validate(&self) -> Result<()> {
        if self.max_blob_size == 0 {
            anyhow::bail!("max_blob_size must be greater than zero");
        }
        if self.upload_speed_mbps.is_nan() || self.upload_speed_mbps <= 0.0 {
            anyhow::bail!("upload_speed_mbps must be positive");
        }
        if self.request_timeout_secs == 0 {
            anyhow::bail!("request_timeout_secs must be greater than zero");
        }
        Ok(())
    }
}

fn project_dirs() -> Option<ProjectDirs> {
    ProjectDirs::from("", "", "splitsnap")
}

fn default_config_path() -> Option<PathBuf> {
    project_dirs().map(|dirs| dirs.config_dir().join(CONFIG_FILE))
}

fn default_data_dir() -> PathBuf {
    project_dirs()
        .map(|dirs| dirs.data_dir().to_path_buf())
        .unwrap_or_else(|| PathBuf::from(".splitsnap"))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_empty_file_gives_defaults() {
        let config = Config::parse("").unwrap();
        assert_eq!(config, Config::default());
        assert_eq!(config.max_blob_size, 48 * 1024 * 1024);
        assert_eq!(config.mode, BackupMode::Individual);
    }

    #[test]
    fn test_full_file() {
        let config = Config::parse(
            r#"
            store_path = "/var/lib/splitsnap/backups.json"
            mode = "archive"
            archiver = "tarball"
            max_blob_size = 1048576
            request_timeout_secs = 30

            [backend]
            type = "s3"
            bucket = "backups"
            endpoint = "http://localhost:9000"
            "#,
        )
        .unwrap();

        assert_eq!(config.store_path, PathBuf::from("/var/lib/splitsnap/backups.json"));
        assert_eq!(config.mode, BackupMode::Archive);
        assert_eq!(config.archiver, ArchiverKind::Tarball);
        assert_eq!(config.max_blob_size, 1024 * 1024);
        assert_eq!(
            config.backend,
            BackendConfig::S3 {
                bucket: "backups".to_string(),
                prefix: String::new(),
                endpoint: Some("http://localhost:9000".to_string()),
            }
        );
    }

    #[test]
    fn test_http_backend_and_invalid_values() {
        let config = Config::parse(
            "[backend]\ntype = \"http\"\nendpoint = \"https://blobs.example.com\"\ntoken = \"t0k\"\n",
        )
        .unwrap();
        assert!(matches!(config.backend, BackendConfig::Http { ref token, .. } if token.as_deref() == Some("t0k")));

        assert!(Config::parse("max_blob_size = 0").is_err());
        assert!(Config::parse("mode = \"sideways\"").is_err());
    }

    #[test]
    fn test_explicit_missing_file_is_an_error() {
        let dir = tempfile::TempDir::new().unwrap();
        assert!(Config::load(Some(&dir.path().join("nope.toml"))).is_err());
    }
}
