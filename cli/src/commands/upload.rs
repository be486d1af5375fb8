use super::{print_failures, spinner, Context};
use anyhow::{bail, Result};
use clap::Args;
use splitsnap_transfer::{TransferEngine, UploadReport};

#[derive(Args)]
pub struct UploadCommand {
    #[arg(help = "Token of the backup to upload")]
    token: String,
}

impl UploadCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = Context::load(cli)?;
        let engine = ctx.engine().await?;
        let report = run_upload(&engine, &self.token, cli.quiet).await?;
        finish(&report)
    }
}

pub async fn run_upload(engine: &TransferEngine, token: &str, quiet: bool) -> Result<UploadReport> {
    let pb = spinner(format!("Uploading {}", token), quiet)?;
    let report = engine.upload(token).await;
    pb.finish_and_clear();
    Ok(report?)
}

/// Prints the outcome; an incomplete upload is an error so the exit status
/// reflects it.
pub fn finish(report: &UploadReport) -> Result<()> {
    println!(
        "Uploaded {} blob(s), {} file(s) were already uploaded",
        report.uploaded_blobs, report.already_uploaded
    );
    print_failures("Files that failed to upload", &report.failures);

    if !report.is_complete() {
        bail!(
            "Backup {} is only partially uploaded; run `splitsnap upload {}` to resume",
            report.token,
            report.token
        );
    }
    println!("Backup {} is fully uploaded", report.token);
    Ok(())
}
