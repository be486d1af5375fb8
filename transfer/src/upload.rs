use crate::engine::{discard_local, prune_empty_dirs, TransferEngine};
use crate::report::{Failure, UploadReport};
use splitsnap_core::archive::{discover_parts, part_path};
use splitsnap_core::{Error, FileUpload, NodePath, Result};
use std::path::PathBuf;
use tracing::{debug, info, warn};

/// Next blob of a leaf still missing from the backend.
struct PendingBlob {
    index: usize,
    local: PathBuf,
    label: String,
}

impl TransferEngine {
    /// Uploads every blob of the backup `token` that the backend does not have
    /// yet, in depth-first leaf order.
    ///
    /// Each recorded blob id is persisted before its local copy is removed,
    /// so an interrupted run resumes where it stopped. Per-file failures are
    /// collected in the report; the backup is only marked uploaded once every
    /// leaf carries all of its blob ids.
    pub async fn upload(&self, token: &str) -> Result<UploadReport> {
        let mut root = self.store.get(token).await?;
        let mut report = UploadReport::new(&root.token);

        let leaves: Vec<(NodePath, String)> = root
            .folder
            .entries()
            .into_iter()
            .filter(|entry| entry.node.as_file().is_some())
            .map(|entry| (entry.path, entry.relative.display().to_string()))
            .collect();

        info!(
            token = %root.token,
            backup = %root.name(),
            leaves = leaves.len(),
            backend = %self.backend.backend_type(),
            "Uploading backup"
        );

        for (path, item) in leaves {
            let Some(file) = root.folder.file_at_mut(&path) else {
                continue;
            };
            if file.is_uploaded() {
                report.already_uploaded += 1;
                continue;
            }
            if file.part_count.is_none() {
                let resolved = resolve_part_count(file).await;
                file.part_count = Some(resolved);
                debug!(item = %item, parts = resolved, "Recorded part count");
            }

            loop {
                let pending = match root.folder.file_at(&path).map(|file| next_pending(file, &item)) {
                    Some(Ok(Some(pending))) => pending,
                    Some(Ok(None)) | None => break,
                    Some(Err(e)) => {
                        report.failures.push(failure(&item, e));
                        break;
                    }
                };

                if !pending.local.is_file() {
                    report.failures.push(Failure {
                        item: item.clone(),
                        reason: format!("local data missing at {}", pending.local.display()),
                    });
                    break;
                }

                match self.put_blob(&pending.local, &pending.label).await {
                    Ok(id) => {
                        debug!(item = %pending.label, blob = %id, part = pending.index, "Blob uploaded");
                        if let Some(file) = root.folder.file_at_mut(&path) {
                            file.upload_id.push(id);
                        }
                        self.store.put(&root).await?;
                        discard_local(&pending.local).await;
                        report.uploaded_blobs += 1;
                    }
                    Err(e) => {
                        warn!(item = %pending.label, error = %e, "Upload failed");
                        report.failures.push(failure(&item, e));
                        break;
                    }
                }
            }
        }

        root.uploaded = root.is_fully_uploaded();
        self.store.put(&root).await?;
        report.fully_uploaded = root.uploaded;

        if root.uploaded {
            if let Some(staging) = &self.options.staging_dir {
                let removed = prune_empty_dirs(&staging.join(&root.token)).await;
                if removed > 0 {
                    debug!(token = %root.token, removed, "Removed emptied staging folders");
                }
            }
            info!(token = %root.token, blobs = report.uploaded_blobs, "Backup fully uploaded");
        } else {
            warn!(
                token = %root.token,
                failures = report.failures.len(),
                "Backup partially uploaded; run upload again to resume"
            );
        }

        Ok(report)
    }
}

/// Part count of a split record written without one: the blobs already
/// recorded plus the parts still waiting on disk.
async fn resolve_part_count(file: &FileUpload) -> usize {
    if !file.is_split {
        return 1;
    }
    let on_disk = match &file.absolute_path {
        Some(base) => discover_parts(base)
            .await
            .map(|parts| parts.last().map(|(index, _)| *index).unwrap_or(0))
            .unwrap_or(0),
        None => 0,
    };
    on_disk.max(file.upload_id.len())
}

fn next_pending(file: &FileUpload, item: &str) -> Result<Option<PendingBlob>> {
    let expected = file.expected_parts().unwrap_or(0);
    let done = file.upload_id.len();
    if done > expected {
        return Err(Error::transfer(
            item,
            format!("{} blob ids recorded for {} parts", done, expected),
        ));
    }
    if done == expected {
        return Ok(None);
    }

    let base = file
        .absolute_path
        .as_ref()
        .ok_or_else(|| Error::transfer(item, "no local path recorded"))?;
    let index = done + 1;

    Ok(Some(if file.is_split {
        PendingBlob {
            index,
            local: part_path(base, index),
            label: format!("{} (part {:03} of {})", item, index, expected),
        }
    } else {
        PendingBlob {
            index,
            local: base.clone(),
            label: item.to_string(),
        }
    }))
}

fn failure(item: &str, error: Error) -> Failure {
    let reason = match error {
        Error::Transfer { reason, .. } => reason,
        other => other.to_string(),
    };
    Failure {
        item: item.to_string(),
        reason,
    }
}
