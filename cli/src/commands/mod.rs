pub mod backup;
pub mod delete;
pub mod download;
pub mod estimate;
pub mod list;
pub mod upload;

use crate::config::{ArchiverKind, BackendConfig, Config};
use crate::Cli;
use anyhow::{Context as _, Result};
use indicatif::{ProgressBar, ProgressStyle};
use splitsnap_backends::{Backend, HttpBackend, LocalBackend, RetryConfig, S3Backend};
use splitsnap_core::{Archiver, BackupBuilder, BackupStore, SevenZipArchiver, TarballArchiver};
use splitsnap_transfer::{Failure, TransferEngine, TransferOptions};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

/// Config plus the pieces every command builds from it.
pub struct Context {
    pub config: Config,
    pub store: Arc<BackupStore>,
    archiver: Arc<dyn Archiver>,
}

impl Context {
    pub fn load(cli: &Cli) -> Result<Self> {
        let mut config = Config::load(cli.config.as_deref())?;
        if let Some(store) = &cli.store {
            config.store_path = store.clone();
        }
        debug!(store = %config.store_path.display(), "Using backup store");

        let archiver: Arc<dyn Archiver> = match config.archiver {
            ArchiverKind::Sevenzip => Arc::new(SevenZipArchiver::new(&config.sevenzip_path)),
            ArchiverKind::Tarball => Arc::new(TarballArchiver::new()),
        };

        Ok(Self {
            store: Arc::new(BackupStore::open(&config.store_path)),
            archiver,
            config,
        })
    }

    pub fn builder(&self) -> BackupBuilder {
        BackupBuilder::new(self.archiver.clone(), &self.config.staging_dir)
            .with_threshold(self.config.max_blob_size)
    }

    pub async fn engine(&self) -> Result<TransferEngine> {
        let backend = self.backend().await?;
        backend
            .init()
            .await
            .with_context(|| format!("{} backend is not usable", backend.backend_type()))?;

        let options = TransferOptions {
            request_timeout: self.request_timeout(),
            retry: RetryConfig::default().with_max_attempts(self.config.retry_attempts),
            staging_dir: Some(self.config.staging_dir.clone()),
        };
        Ok(TransferEngine::new(self.store.clone(), backend, self.archiver.clone()).with_options(options))
    }

    fn request_timeout(&self) -> Duration {
        Duration::from_secs(self.config.request_timeout_secs)
    }

    async fn backend(&self) -> Result<Arc<dyn Backend>> {
        let backend: Arc<dyn Backend> = match &self.config.backend {
            BackendConfig::Local { path } => {
                Arc::new(LocalBackend::new(path).with_max_blob_size(self.config.max_blob_size))
            }
            BackendConfig::Http { endpoint, token } => Arc::new(HttpBackend::new(
                endpoint.clone(),
                token.clone(),
                self.request_timeout(),
            )?),
            BackendConfig::S3 {
                bucket,
                prefix,
                endpoint: Some(endpoint),
            } => Arc::new(S3Backend::with_endpoint(bucket.clone(), prefix.clone(), endpoint.clone()).await?),
            BackendConfig::S3 { bucket, prefix, .. } => {
                Arc::new(S3Backend::new(bucket.clone(), prefix.clone()).await?)
            }
        };
        Ok(backend)
    }
}

pub fn spinner(message: impl Into<String>, quiet: bool) -> Result<ProgressBar> {
    if quiet {
        return Ok(ProgressBar::hidden());
    }
    let pb = ProgressBar::new_spinner();
    pb.set_style(ProgressStyle::default_spinner().template("{spinner:.green} [{elapsed_precise}] {msg}")?);
    pb.enable_steady_tick(Duration::from_millis(120));
    pb.set_message(message.into());
    Ok(pb)
}

pub fn print_failures(heading: &str, failures: &[Failure]) {
    if failures.is_empty() {
        return;
    }
    eprintln!("{} ({}):", heading, failures.len());
    for failure in failures {
        eprintln!("  {}: {}", failure.item, failure.reason);
    }
}
