//! Multi-volume archives.
//!
//! An archive with base path `dir/name.7z` lives on disk as
//! `dir/name.7z.001`, `dir/name.7z.002`, ... The `.001` part doubles as the
//! marker that an archive with that base exists.

use crate::{Error, Result};
use async_trait::async_trait;
use std::path::{Path, PathBuf};
use tokio::fs;
use tracing::debug;

pub const FIRST_PART_SUFFIX: &str = ".001";

#[async_trait]
pub trait Archiver: Send + Sync {
    /// Compresses `source` into volumes of at most `volume_size` bytes named
    /// after `base`, returning the parts in ascending order.
    async fn compress(
        &self,
        source: &Path,
        base: &Path,
        volume_size: u64,
        threads: usize,
    ) -> Result<Vec<PathBuf>>;

    /// Unpacks the archive whose first part is `first_part` into `destination`.
    async fn extract(&self, first_part: &Path, destination: &Path) -> Result<()>;

    /// Extension appended to an item's name to form its archive base name.
    fn extension(&self) -> &'static str;

    fn name(&self) -> &'static str;
}

/// Path of the 1-based part `index` of the archive at `base`.
pub fn part_path(base: &Path, index: usize) -> PathBuf {
    let mut name = base.as_os_str().to_owned();
    name.push(format!(".{:03}", index));
    PathBuf::from(name)
}

/// Numeric suffix of `file_name` when it is a part of the archive `base_name`.
pub(crate) fn part_index(file_name: &str, base_name: &str) -> Option<usize> {
    let suffix = file_name.strip_prefix(base_name)?.strip_prefix('.')?;
    if suffix.len() < 3 || !suffix.bytes().all(|b| b.is_ascii_digit()) {
        return None;
    }
    suffix.parse().ok()
}

/// Every part of the archive at `base` present on disk, sorted by index.
pub async fn discover_parts(base: &Path) -> Result<Vec<(usize, PathBuf)>> {
    let base_name = base
        .file_name()
        .and_then(|n| n.to_str())
        .ok_or_else(|| Error::invalid_path(base, "archive base has no file name"))?;
    let dir = match base.parent() {
        Some(parent) if !parent.as_os_str().is_empty() => parent.to_path_buf(),
        _ => PathBuf::from("."),
    };

    let mut parts = Vec::new();
    let mut entries = match fs::read_dir(&dir).await {
        Ok(entries) => entries,
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => return Ok(parts),
        Err(e) => return Err(e.into()),
    };

    while let Some(entry) = entries.next_entry().await? {
        if let Some(file_name) = entry.file_name().to_str() {
            if let Some(index) = part_index(file_name, base_name) {
                parts.push((index, entry.path()));
            }
        }
    }

    parts.sort_by_key(|(index, _)| *index);
    Ok(parts)
}

/// Base path of an archive given its first part, if it ends in `.001`.
pub fn archive_base(first_part: &Path) -> Option<PathBuf> {
    let name = first_part.to_str()?;
    name.strip_suffix(FIRST_PART_SUFFIX).map(PathBuf::from)
}

pub fn archive_exists(base: &Path) -> bool {
    part_path(base, 1).exists()
}

/// Deletes every part of the archive at `base`; returns how many were removed.
pub async fn remove_parts(base: &Path) -> Result<usize> {
    let parts = discover_parts(base).await?;
    for (_, part) in &parts {
        fs::remove_file(part).await?;
    }
    debug!(base = %base.display(), parts = parts.len(), "Removed archive parts");
    Ok(parts.len())
}

/// Suggested compression worker count: 70% of available cores, at least one.
pub fn default_thread_hint() -> usize {
    let cores = std::thread::available_parallelism()
        .map(|n| n.get())
        .unwrap_or(1);
    ((cores * 7) / 10).max(1)
}

/// Drives the external `7z` tool.
#[derive(Debug, Clone)]
pub struct SevenZipArchiver {
    binary: PathBuf,
}

impl SevenZipArchiver {
    pub fn new<P: AsRef<Path>>(binary: P) -> Self {
        Self {
            binary: binary.as_ref().to_path_buf(),
        }
    }

    async fn run(&self, args: Vec<std::ffi::OsString>, subject: &Path) -> Result<()> {
        debug!(binary = %self.binary.display(), ?args, "Running 7z");

        let output = tokio::process::Command::new(&self.binary)
            .args(&args)
            .stdin(std::process::Stdio::null())
            .output()
            .await
            .map_err(|e| {
                Error::archiver(
                    subject,
                    format!("failed to run {}: {}", self.binary.display(), e),
                )
            })?;

        if !output.status.success() {
            let stderr = String::from_utf8_lossy(&output.stderr);
            return Err(Error::archiver(
                subject,
                format!(
                    "7z exited with {}: {}",
                    output.status.code().unwrap_or(-1),
                    stderr.trim()
                ),
            ));
        }
        Ok(())
    }
}

impl Default for SevenZipArchiver {
    fn default() -> Self {
        Self::new("7z")
    }
}

#[async_trait]
impl Archiver for SevenZipArchiver {
    async fn compress(
        &self,
        source: &Path,
        base: &Path,
        volume_size: u64,
        threads: usize,
    ) -> Result<Vec<PathBuf>> {
        if let Some(parent) = base.parent() {
            fs::create_dir_all(parent).await?;
        }

        let args = vec![
            "a".into(),
            "-t7z".into(),
            format!("-v{}b", volume_size).into(),
            format!("-mmt={}", threads.max(1)).into(),
            "-y".into(),
            "--".into(),
            base.as_os_str().to_owned(),
            source.as_os_str().to_owned(),
        ];
        self.run(args, source).await?;

        let parts: Vec<PathBuf> = discover_parts(base)
            .await?
            .into_iter()
            .map(|(_, path)| path)
            .collect();
        if parts.is_empty() {
            return Err(Error::archiver(source, "7z produced no volumes"));
        }
        Ok(parts)
    }

    async fn extract(&self, first_part: &Path, destination: &Path) -> Result<()> {
        let mut output_dir = std::ffi::OsString::from("-o");
        output_dir.push(destination.as_os_str());

        let args = vec![
            "x".into(),
            "-y".into(),
            output_dir,
            "--".into(),
            first_part.as_os_str().to_owned(),
        ];
        self.run(args, first_part).await
    }

    fn extension(&self) -> &'static str {
        "7z"
    }

    fn name(&self) -> &'static str {
        "7z"
    }
}
