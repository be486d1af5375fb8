use crate::engine::{discard_local, prune_empty_dirs, TransferEngine};
use crate::report::{DeleteReport, Failure};
use splitsnap_core::archive::remove_parts;
use splitsnap_core::Result;
use tracing::{info, warn};

impl TransferEngine {
    /// Drops the backup `token`: its remote blobs, whatever is still staged
    /// locally, and finally its record. The record survives when a remote
    /// blob could not be removed.
    pub async fn delete(&self, token: &str) -> Result<DeleteReport> {
        let root = self.store.get(token).await?;
        let mut report = DeleteReport {
            token: root.token.clone(),
            ..Default::default()
        };

        for entry in root.folder.entries() {
            let Some(file) = entry.node.as_file() else {
                continue;
            };
            let item = entry.relative.display().to_string();

            for blob_id in &file.upload_id {
                match self.delete_blob(blob_id, &item).await {
                    Ok(()) => report.deleted_blobs += 1,
                    Err(e) => {
                        warn!(item = %item, blob = %blob_id, error = %e, "Failed to delete blob");
                        report.failures.push(Failure {
                            item: item.clone(),
                            reason: e.to_string(),
                        });
                    }
                }
            }

            if let Some(local) = &file.absolute_path {
                if file.is_split {
                    if let Err(e) = remove_parts(local).await {
                        warn!(path = %local.display(), error = %e, "Failed to remove staged parts");
                    }
                } else {
                    discard_local(local).await;
                }
            }
        }

        if let Some(staging) = &self.options.staging_dir {
            prune_empty_dirs(&staging.join(&root.token)).await;
        }

        if report.failures.is_empty() {
            self.store.delete(&root.token).await?;
            report.record_removed = true;
            info!(token = %root.token, blobs = report.deleted_blobs, "Backup deleted");
        } else {
            warn!(
                token = %root.token,
                failures = report.failures.len(),
                "Backup record kept; some blobs could not be deleted"
            );
        }

        Ok(report)
    }
}
