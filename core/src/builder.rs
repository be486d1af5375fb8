use crate::archive::{self, archive_exists, default_thread_hint, Archiver};
use crate::manifest::{BackupRootFolder, FileUpload, FolderUpload, NodePath};
use crate::{BackupMode, Error, Result, MAX_BLOB_SIZE};
use std::collections::HashSet;
use std::path::{Path, PathBuf};
use std::sync::Arc;
use tokio::fs;
use tracing::{debug, info, warn};

/// An item left out of a backup, with the reason.
#[derive(Debug, Clone)]
pub struct SkippedItem {
    pub path: PathBuf,
    pub reason: String,
}

#[derive(Debug, Clone)]
pub struct BuildReport {
    pub root: BackupRootFolder,
    pub skipped: Vec<SkippedItem>,
}

/// Turns a source path into a manifest plus staged local files ready for
/// upload.
///
/// Staged data lives under the staging directory: archive-mode backups put
/// their volumes directly there, individual-mode backups get a subdirectory
/// named after the backup token that mirrors the source tree.
pub struct BackupBuilder {
    archiver: Arc<dyn Archiver>,
    staging_dir: PathBuf,
    threshold: u64,
    threads: usize,
}

impl BackupBuilder {
    pub fn new<P: AsRef<Path>>(archiver: Arc<dyn Archiver>, staging_dir: P) -> Self {
        Self {
            archiver,
            staging_dir: staging_dir.as_ref().to_path_buf(),
            threshold: MAX_BLOB_SIZE,
            threads: default_thread_hint(),
        }
    }

    /// Size at which files get archived; also the archive volume size.
    pub fn with_threshold(mut self, threshold: u64) -> Self {
        self.threshold = threshold.max(1);
        self
    }

    pub fn with_threads(mut self, threads: usize) -> Self {
        self.threads = threads.max(1);
        self
    }

    pub fn threshold(&self) -> u64 {
        self.threshold
    }

    pub async fn build(&self, source: &Path, mode: BackupMode) -> Result<BuildReport> {
        let metadata = fs::metadata(source)
            .await
            .map_err(|e| Error::invalid_path(source, e.to_string()))?;
        if !metadata.is_file() && !metadata.is_dir() {
            return Err(Error::invalid_path(source, "neither a file nor a directory"));
        }

        let source = fs::canonicalize(source)
            .await
            .map_err(|e| Error::invalid_path(source, e.to_string()))?;
        let name = file_name_of(&source)?;

        fs::create_dir_all(&self.staging_dir).await?;
        let staging_dir = fs::canonicalize(&self.staging_dir).await?;

        info!(
            source = %source.display(),
            %mode,
            archiver = self.archiver.name(),
            "Building backup"
        );

        let mut root = BackupRootFolder::new(name);
        let skipped = match mode {
            BackupMode::Archive => {
                self.build_archive(&source, &staging_dir, &mut root).await?;
                Vec::new()
            }
            BackupMode::Individual => {
                self.build_individual(&source, metadata.is_dir(), &staging_dir, &mut root)
                    .await?
            }
        };

        info!(
            token = %root.token,
            files = root.folder.leaf_count(),
            skipped = skipped.len(),
            "Backup built"
        );
        Ok(BuildReport { root, skipped })
    }

    async fn build_archive(
        &self,
        source: &Path,
        staging_dir: &Path,
        root: &mut BackupRootFolder,
    ) -> Result<()> {
        let base = unique_archive_base(
            staging_dir,
            root.name(),
            self.archiver.extension(),
            &HashSet::new(),
        );
        let file = self.archive_item(source, base).await?;
        root.folder.add_child(file)?;
        Ok(())
    }

    async fn build_individual(
        &self,
        source: &Path,
        is_dir: bool,
        staging_dir: &Path,
        root: &mut BackupRootFolder,
    ) -> Result<Vec<SkippedItem>> {
        let stage_root = staging_dir.join(&root.token);
        fs::create_dir_all(&stage_root).await?;
        let mut skipped = Vec::new();

        if !is_dir {
            let name = root.name().to_string();
            let taken = HashSet::from([name.clone()]);
            let file = self.stage_file(source, &stage_root, &name, &taken).await?;
            root.folder.add_child(file)?;
            return Ok(skipped);
        }

        let mut stack: Vec<(PathBuf, PathBuf, NodePath)> =
            vec![(source.to_path_buf(), stage_root, NodePath::new())];

        while let Some((dir, stage, node_path)) = stack.pop() {
            let entries = match list_dir(&dir).await {
                Ok(entries) => entries,
                Err(e) if node_path.is_empty() => return Err(e),
                Err(e) => {
                    warn!(path = %dir.display(), error = %e, "Skipping unreadable directory");
                    skipped.push(SkippedItem {
                        path: dir,
                        reason: e.to_string(),
                    });
                    continue;
                }
            };

            let taken: HashSet<String> = entries.iter().map(|e| e.name.clone()).collect();
            let mut subdirs = Vec::new();

            for entry in entries {
                if entry.file_type.is_symlink() {
                    debug!(path = %entry.path.display(), "Skipping symbolic link");
                    continue;
                }

                if entry.file_type.is_dir() {
                    let stage_sub = stage.join(&entry.name);
                    fs::create_dir_all(&stage_sub).await?;
                    let folder = folder_mut(root, &node_path)?;
                    let index = folder.add_child(FolderUpload::new(&entry.name))?;
                    let mut child_path = node_path.clone();
                    child_path.push(index);
                    subdirs.push((entry.path, stage_sub, child_path));
                } else if entry.file_type.is_file() {
                    match self.stage_file(&entry.path, &stage, &entry.name, &taken).await {
                        Ok(file) => {
                            folder_mut(root, &node_path)?.add_child(file)?;
                        }
                        Err(e) => {
                            warn!(path = %entry.path.display(), error = %e, "Skipping file");
                            skipped.push(SkippedItem {
                                path: entry.path,
                                reason: e.to_string(),
                            });
                        }
                    }
                } else {
                    debug!(path = %entry.path.display(), "Skipping special file");
                }
            }

            stack.extend(subdirs.into_iter().rev());
        }

        Ok(skipped)
    }

    /// Copies a small file into `stage`, or archives a large one there.
    async fn stage_file(
        &self,
        source: &Path,
        stage: &Path,
        name: &str,
        taken: &HashSet<String>,
    ) -> Result<FileUpload> {
        let size = fs::metadata(source).await?.len();

        if size < self.threshold {
            let dest = stage.join(name);
            fs::copy(source, &dest).await?;
            debug!(path = %source.display(), size, "Staged file");
            return Ok(FileUpload::single(name, dest));
        }

        let base = unique_archive_base(stage, name, self.archiver.extension(), taken);
        self.archive_item(source, base).await
    }

    async fn archive_item(&self, source: &Path, base: PathBuf) -> Result<FileUpload> {
        let parts = match self
            .archiver
            .compress(source, &base, self.threshold, self.threads)
            .await
        {
            Ok(parts) => parts,
            Err(e) => {
                if let Err(cleanup) = archive::remove_parts(&base).await {
                    warn!(base = %base.display(), error = %cleanup, "Failed to remove partial archive");
                }
                return Err(e);
            }
        };

        let name = file_name_of(&base)?;
        debug!(
            path = %source.display(),
            archive = %base.display(),
            parts = parts.len(),
            "Archived item"
        );
        Ok(FileUpload::split(name, base, parts.len()))
    }
}

struct DirEntry {
    name: String,
    path: PathBuf,
    file_type: std::fs::FileType,
}

/// Directory entries sorted by name; names that are not valid UTF-8 are
/// skipped since the manifest stores names as strings.
async fn list_dir(dir: &Path) -> Result<Vec<DirEntry>> {
    let mut out = Vec::new();
    let mut entries = fs::read_dir(dir).await?;

    while let Some(entry) = entries.next_entry().await? {
        let name = match entry.file_name().into_string() {
            Ok(name) => name,
            Err(raw) => {
                warn!(dir = %dir.display(), name = ?raw, "Skipping entry with non UTF-8 name");
                continue;
            }
        };
        out.push(DirEntry {
            name,
            path: entry.path(),
            file_type: entry.file_type().await?,
        });
    }

    out.sort_by(|a, b| a.name.cmp(&b.name));
    Ok(out)
}

fn folder_mut<'a>(root: &'a mut BackupRootFolder, path: &[usize]) -> Result<&'a mut FolderUpload> {
    root.folder
        .folder_at_mut(path)
        .ok_or_else(|| Error::Other(format!("Folder path {:?} missing from manifest", path)))
}

fn file_name_of(path: &Path) -> Result<String> {
    path.file_name()
        .and_then(|n| n.to_str())
        .map(str::to_string)
        .ok_or_else(|| Error::invalid_path(path, "path has no usable file name"))
}

/// Picks `{dir}/{stem}.{ext}`, or `{stem}_1.{ext}`, `{stem}_2.{ext}`, ... when
/// the name or one of its part names belongs to a sibling, or an archive with
/// that base already exists.
pub fn unique_archive_base(dir: &Path, stem: &str, ext: &str, taken: &HashSet<String>) -> PathBuf {
    let mut counter = 0usize;
    loop {
        let name = if counter == 0 {
            format!("{}.{}", stem, ext)
        } else {
            format!("{}_{}.{}", stem, counter, ext)
        };
        let base = dir.join(&name);
        let clashes = taken.contains(&name)
            || taken.iter().any(|sibling| archive::part_index(sibling, &name).is_some());
        if !clashes && !archive_exists(&base) && !base.exists() {
            return base;
        }
        counter += 1;
    }
}
