use super::upload::{finish, run_upload};
use super::{spinner, Context};
use anyhow::Result;
use clap::Args;
use splitsnap_core::sizing::measure_with_speed;
use splitsnap_core::BackupMode;
use std::path::PathBuf;
use tracing::{info, warn};

#[derive(Args)]
pub struct BackupCommand {
    #[arg(help = "File or folder to back up")]
    path: PathBuf,

    #[arg(long, help = "archive or individual, overrides the configured mode")]
    mode: Option<BackupMode>,

    #[arg(long, help = "Only stage the backup; upload later with `upload`")]
    no_upload: bool,
}

impl BackupCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = Context::load(cli)?;
        let mode = self.mode.unwrap_or(ctx.config.mode);

        let path = self.path.clone();
        let speed = ctx.config.upload_speed_mbps;
        let estimate = tokio::task::spawn_blocking(move || measure_with_speed(&path, speed)).await??;
        println!(
            "Backing up {} ({}, about {} to upload)",
            self.path.display(),
            estimate.human_size,
            estimate.estimated_time
        );

        let pb = spinner(format!("Staging {} ({} mode)", self.path.display(), mode), cli.quiet)?;
        let built = ctx.builder().build(&self.path, mode).await;
        pb.finish_and_clear();
        let built = built?;

        for item in &built.skipped {
            warn!(path = %item.path.display(), reason = %item.reason, "Skipped");
        }
        if !built.skipped.is_empty() {
            println!("Skipped {} item(s); run with --verbose for details", built.skipped.len());
        }

        ctx.store.put(&built.root).await?;
        info!(token = %built.root.token, "Backup recorded");
        println!("Token: {}", built.root.token);
        println!("{}", built.root.summary());

        if self.no_upload {
            println!("Staged only; run `splitsnap upload {}` to upload", built.root.token);
            return Ok(());
        }

        let engine = ctx.engine().await?;
        let report = run_upload(&engine, &built.root.token, cli.quiet).await?;
        finish(&report)
    }
}
