use super::{print_failures, spinner, Context};
use anyhow::{bail, Result};
use clap::Args;
use std::path::PathBuf;

#[derive(Args)]
pub struct DownloadCommand {
    #[arg(help = "Token of the backup to restore")]
    token: String,

    #[arg(long, help = "Parent folder of the restored backup, overrides download_dir")]
    target: Option<PathBuf>,
}

impl DownloadCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = Context::load(cli)?;
        let target = self.target.clone().unwrap_or_else(|| ctx.config.download_dir.clone());
        let engine = ctx.engine().await?;

        let pb = spinner(format!("Downloading {}", self.token), cli.quiet)?;
        let report = engine.download(&self.token, &target).await;
        pb.finish_and_clear();
        let report = report?;

        println!(
            "Restored {} blob(s) into {}, extracted {} archive(s)",
            report.downloaded_blobs,
            report.destination.display(),
            report.extracted_archives
        );
        print_failures("Files that failed to download", &report.failures);
        print_failures("Archives that failed to extract (parts kept)", &report.extraction_failures);

        if !report.is_complete() {
            bail!("Backup {} was only partially restored", self.token);
        }
        Ok(())
    }
}
