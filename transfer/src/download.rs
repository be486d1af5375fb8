use crate::engine::TransferEngine;
use crate::report::{DownloadReport, Failure};
use splitsnap_core::archive::{archive_base, part_path, remove_parts, FIRST_PART_SUFFIX};
use splitsnap_core::{Error, FileUpload, Node, Result};
use std::collections::HashSet;
use std::path::{Component, Path, PathBuf};
use tokio::fs;
use tracing::{debug, info, warn};

impl TransferEngine {
    /// Restores the backup `token` under `target_root/{name}_{date}`.
    ///
    /// The folder tree is recreated first, then every blob is fetched next
    /// to where its file belongs. Multi-part files land as `name.001`,
    /// `name.002`, ... and every archive found afterwards is extracted in
    /// place; its parts are deleted only when extraction succeeds.
    pub async fn download(&self, token: &str, target_root: &Path) -> Result<DownloadReport> {
        let root = self.store.get(token).await?;
        if !root.uploaded {
            return Err(Error::NotUploaded {
                token: token.to_string(),
            });
        }

        let destination = target_root.join(root.display_name());
        fs::create_dir_all(&destination).await?;
        info!(
            token = %root.token,
            destination = %destination.display(),
            "Downloading backup"
        );

        let mut report = DownloadReport {
            destination: destination.clone(),
            ..Default::default()
        };
        // Plain files restored as-is; these are never treated as archives.
        let mut plain_files = HashSet::new();
        let mut incomplete = HashSet::new();

        for entry in root.folder.entries() {
            let item = entry.relative.display().to_string();
            if !is_confined(&entry.relative) {
                report.failures.push(Failure {
                    item,
                    reason: "name escapes the backup folder".to_string(),
                });
                continue;
            }
            let target = destination.join(&entry.relative);

            match entry.node {
                Node::Folder(_) => fs::create_dir_all(&target).await?,
                Node::File(file) => {
                    let multi_part = file.is_split || file.upload_id.len() > 1;
                    match self.fetch_file(file, &target, &item, multi_part).await {
                        Ok(blobs) => report.downloaded_blobs += blobs,
                        Err(e) => {
                            warn!(item = %item, error = %e, "Download failed");
                            report.failures.push(Failure {
                                item,
                                reason: e.to_string(),
                            });
                            if multi_part {
                                incomplete.insert(target.clone());
                            }
                        }
                    }
                    if !multi_part {
                        plain_files.insert(target);
                    }
                }
            }
        }

        self.extract_all(&destination, &plain_files, &incomplete, &mut report)
            .await;

        info!(
            destination = %destination.display(),
            blobs = report.downloaded_blobs,
            extracted = report.extracted_archives,
            failures = report.failures.len() + report.extraction_failures.len(),
            "Download finished"
        );
        Ok(report)
    }

    async fn fetch_file(
        &self,
        file: &FileUpload,
        target: &Path,
        item: &str,
        multi_part: bool,
    ) -> Result<usize> {
        for (offset, blob_id) in file.upload_id.iter().enumerate() {
            let out = if multi_part {
                part_path(target, offset + 1)
            } else {
                target.to_path_buf()
            };
            let data = self.get_blob(blob_id, item).await?;
            fs::write(&out, &data).await?;
            debug!(blob = %blob_id, path = %out.display(), bytes = data.len(), "Blob written");
        }
        Ok(file.upload_id.len())
    }

    async fn extract_all(
        &self,
        destination: &Path,
        plain_files: &HashSet<PathBuf>,
        incomplete: &HashSet<PathBuf>,
        report: &mut DownloadReport,
    ) {
        // Collected up front so archives unpacked below are not revisited.
        let first_parts: Vec<PathBuf> = walkdir::WalkDir::new(destination)
            .follow_links(false)
            .sort_by_file_name()
            .into_iter()
            .filter_map(|entry| entry.ok())
            .filter(|entry| entry.file_type().is_file())
            .map(|entry| entry.into_path())
            .filter(|path| {
                path.file_name()
                    .and_then(|name| name.to_str())
                    .is_some_and(|name| name.ends_with(FIRST_PART_SUFFIX))
            })
            .filter(|path| !plain_files.contains(path))
            .collect();

        for first_part in first_parts {
            let Some(base) = archive_base(&first_part) else {
                continue;
            };
            if incomplete.contains(&base) {
                debug!(archive = %base.display(), "Skipping extraction of incomplete download");
                continue;
            }
            let item = first_part
                .strip_prefix(destination)
                .unwrap_or(&first_part)
                .display()
                .to_string();
            let dir = first_part.parent().unwrap_or(destination);

            match self.archiver.extract(&first_part, dir).await {
                Ok(()) => {
                    report.extracted_archives += 1;
                    if let Err(e) = remove_parts(&base).await {
                        warn!(archive = %base.display(), error = %e, "Failed to remove extracted parts");
                    }
                }
                Err(e) => {
                    warn!(archive = %first_part.display(), error = %e, "Extraction failed, keeping parts");
                    report.extraction_failures.push(Failure {
                        item,
                        reason: e.to_string(),
                    });
                }
            }
        }
    }
}

fn is_confined(relative: &Path) -> bool {
    relative
        .components()
        .all(|component| matches!(component, Component::Normal(_)))
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::engine::testing::noise;
    use crate::engine::TransferOptions;
    use async_trait::async_trait;
    use splitsnap_backends::{MemoryBackend, RetryConfig};
    use splitsnap_core::{
        Archiver, BackupBuilder, BackupMode, BackupRootFolder, BackupStore, FolderUpload,
        TarballArchiver,
    };
    use std::sync::Arc;
    use tempfile::TempDir;

    const THRESHOLD: u64 = 48 * 1024;

    struct Fixture {
        dir: TempDir,
        store: Arc<BackupStore>,
        backend: Arc<MemoryBackend>,
        engine: TransferEngine,
        builder: BackupBuilder,
    }

    impl Fixture {
        /// Engine over the same store and backend with another archiver.
        fn engine_with(&self, archiver: Arc<dyn Archiver>) -> TransferEngine {
            TransferEngine::new(self.store.clone(), self.backend.clone(), archiver)
                .with_options(TransferOptions {
                    retry: RetryConfig::disabled(),
                    ..Default::default()
                })
        }
    }

    /// Archiver whose volumes never unpack.
    struct CorruptVolumes;

    #[async_trait]
    impl Archiver for CorruptVolumes {
        async fn compress(&self, source: &Path, _: &Path, _: u64, _: usize) -> Result<Vec<PathBuf>> {
            Err(Error::archiver(source, "read-only archiver"))
        }

        async fn extract(&self, first_part: &Path, _: &Path) -> Result<()> {
            Err(Error::archiver(first_part, "corrupt volume"))
        }

        fn extension(&self) -> &'static str {
            "tar.gz"
        }

        fn name(&self) -> &'static str {
            "corrupt"
        }
    }

    fn fixture() -> Fixture {
        let dir = TempDir::new().unwrap();
        let store = Arc::new(BackupStore::open(dir.path().join("backups.json")));
        let backend = Arc::new(MemoryBackend::new());
        let archiver = Arc::new(TarballArchiver::new());
        let staging = dir.path().join("staging");
        let engine = TransferEngine::new(store.clone(), backend.clone(), archiver.clone())
            .with_options(TransferOptions {
                retry: RetryConfig::disabled(),
                staging_dir: Some(staging.clone()),
                ..Default::default()
            });
        let builder = BackupBuilder::new(archiver, staging).with_threshold(THRESHOLD);
        Fixture {
            dir,
            store,
            backend,
            engine,
            builder,
        }
    }

    fn write_tree(root: &Path) -> (Vec<u8>, Vec<u8>) {
        let small = noise(10 * 1024);
        let large = noise(100 * 1024);
        std::fs::create_dir_all(root.join("b")).unwrap();
        std::fs::write(root.join("a.txt"), &small).unwrap();
        std::fs::write(root.join("b/c.bin"), &large).unwrap();
        (small, large)
    }

    #[tokio::test]
    async fn test_individual_round_trip() {
        let fx = fixture();
        let source = fx.dir.path().join("docs");
        let (small, large) = write_tree(&source);

        let built = fx.builder.build(&source, BackupMode::Individual).await.unwrap();
        fx.store.put(&built.root).await.unwrap();
        let token = built.root.token.clone();

        let upload = fx.engine.upload(&token).await.unwrap();
        assert!(upload.is_complete());

        let target = fx.dir.path().join("restore");
        let report = fx.engine.download(&token, &target).await.unwrap();
        assert!(report.is_complete(), "{:?}", report);
        assert_eq!(report.extracted_archives, 1);

        let restored = target.join(built.root.display_name());
        assert_eq!(report.destination, restored);
        assert_eq!(std::fs::read(restored.join("a.txt")).unwrap(), small);
        assert_eq!(std::fs::read(restored.join("b/c.bin")).unwrap(), large);

        // Parts are cleaned up after extraction.
        let leftovers: Vec<_> = std::fs::read_dir(restored.join("b"))
            .unwrap()
            .map(|e| e.unwrap().file_name().into_string().unwrap())
            .collect();
        assert_eq!(leftovers, vec!["c.bin".to_string()]);
    }

    #[tokio::test]
    async fn test_archive_mode_round_trip() {
        let fx = fixture();
        let source = fx.dir.path().join("docs");
        let (small, large) = write_tree(&source);

        let built = fx.builder.build(&source, BackupMode::Archive).await.unwrap();
        fx.store.put(&built.root).await.unwrap();
        fx.engine.upload(&built.root.token).await.unwrap();

        let target = fx.dir.path().join("restore");
        let report = fx.engine.download(&built.root.token, &target).await.unwrap();
        assert!(report.is_complete(), "{:?}", report);

        let restored = target.join(built.root.display_name());
        assert_eq!(std::fs::read(restored.join("docs/a.txt")).unwrap(), small);
        assert_eq!(std::fs::read(restored.join("docs/b/c.bin")).unwrap(), large);
    }

    #[tokio::test]
    async fn test_plain_file_named_like_a_part_is_kept() {
        let fx = fixture();
        let source = fx.dir.path().join("logs");
        std::fs::create_dir_all(&source).unwrap();
        std::fs::write(source.join("rotated.001"), b"not an archive").unwrap();

        let built = fx.builder.build(&source, BackupMode::Individual).await.unwrap();
        fx.store.put(&built.root).await.unwrap();
        fx.engine.upload(&built.root.token).await.unwrap();

        let target = fx.dir.path().join("restore");
        let report = fx.engine.download(&built.root.token, &target).await.unwrap();
        assert!(report.is_complete());
        let restored = target.join(built.root.display_name()).join("rotated.001");
        assert_eq!(std::fs::read(restored).unwrap(), b"not an archive");
    }

    #[tokio::test]
    async fn test_not_uploaded_creates_nothing() {
        let fx = fixture();
        let mut root = BackupRootFolder::new("pending");
        root.folder.add_child(FolderUpload::new("inner")).unwrap();
        fx.store.put(&root).await.unwrap();

        let target = fx.dir.path().join("restore");
        let result = fx.engine.download(&root.token, &target).await;
        assert!(matches!(result, Err(Error::NotUploaded { .. })));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_unknown_token() {
        let fx = fixture();
        let target = fx.dir.path().join("restore");
        let result = fx.engine.download("nope", &target).await;
        assert!(matches!(result, Err(Error::NotFound { .. })));
        assert!(!target.exists());
    }

    #[tokio::test]
    async fn test_missing_blob_is_reported_and_others_restored() {
        let fx = fixture();
        let mut root = BackupRootFolder::new("broken");
        let mut good = FileUpload::single("good.txt", fx.dir.path().join("good.txt"));
        std::fs::write(fx.dir.path().join("good.txt"), b"fine").unwrap();
        let id = fx.engine.put_blob(&fx.dir.path().join("good.txt"), "good.txt").await.unwrap();
        good.upload_id.push(id);
        let mut lost = FileUpload::single("lost.txt", fx.dir.path().join("lost.txt"));
        lost.upload_id.push("mem-999999".to_string());
        root.folder.add_child(good).unwrap();
        root.folder.add_child(lost).unwrap();
        root.uploaded = true;
        fx.store.put(&root).await.unwrap();

        let target = fx.dir.path().join("restore");
        let report = fx.engine.download(&root.token, &target).await.unwrap();
        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item, "lost.txt");
        let restored = target.join(root.display_name());
        assert_eq!(std::fs::read(restored.join("good.txt")).unwrap(), b"fine");
    }

    #[tokio::test]
    async fn test_failed_extraction_keeps_parts() {
        let fx = fixture();
        let source = fx.dir.path().join("docs");
        let (small, _) = write_tree(&source);

        let built = fx.builder.build(&source, BackupMode::Individual).await.unwrap();
        fx.store.put(&built.root).await.unwrap();
        assert!(fx.engine.upload(&built.root.token).await.unwrap().is_complete());

        let target = fx.dir.path().join("restore");
        let report = fx
            .engine_with(Arc::new(CorruptVolumes))
            .download(&built.root.token, &target)
            .await
            .unwrap();

        assert!(report.failures.is_empty());
        assert_eq!(report.extraction_failures.len(), 1);
        assert_eq!(report.extraction_failures[0].item, "b/c.bin.tar.gz.001");
        assert_eq!(report.extracted_archives, 0);
        assert!(!report.is_complete());

        let restored = target.join(built.root.display_name());
        let base = restored.join("b/c.bin.tar.gz");
        let split = built.root.folder.leaves().find(|f| f.is_split).unwrap();
        for index in 1..=split.expected_parts().unwrap() {
            assert!(part_path(&base, index).exists());
        }
        assert!(!restored.join("b/c.bin").exists());
        assert_eq!(std::fs::read(restored.join("a.txt")).unwrap(), small);
    }

    #[tokio::test]
    async fn test_incomplete_split_file_is_not_extracted() {
        let fx = fixture();
        let staged = fx.dir.path().join("big.tar.gz.001");
        std::fs::write(&staged, b"first volume").unwrap();
        let first = fx.engine.put_blob(&staged, "big.tar.gz").await.unwrap();

        let mut root = BackupRootFolder::new("partial");
        let mut file = FileUpload::split("big.tar.gz", fx.dir.path().join("big.tar.gz"), 2);
        file.upload_id = vec![first, "mem-999999".to_string()];
        root.folder.add_child(file).unwrap();
        root.uploaded = true;
        fx.store.put(&root).await.unwrap();

        let target = fx.dir.path().join("restore");
        let report = fx.engine.download(&root.token, &target).await.unwrap();

        assert_eq!(report.failures.len(), 1);
        assert_eq!(report.failures[0].item, "big.tar.gz");
        assert!(report.extraction_failures.is_empty());
        assert_eq!(report.extracted_archives, 0);

        let base = target.join(root.display_name()).join("big.tar.gz");
        assert_eq!(std::fs::read(part_path(&base, 1)).unwrap(), b"first volume");
        assert!(!part_path(&base, 2).exists());
    }
}
