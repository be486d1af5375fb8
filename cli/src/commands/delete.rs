use super::{print_failures, Context};
use anyhow::{bail, Result};
use clap::Args;

#[derive(Args)]
pub struct DeleteCommand {
    #[arg(help = "Token of the backup to delete")]
    token: String,
}

impl DeleteCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = Context::load(cli)?;
        let engine = ctx.engine().await?;
        let report = engine.delete(&self.token).await?;

        print_failures("Blobs that could not be deleted", &report.failures);
        if !report.record_removed {
            bail!("Backup {} kept; rerun delete once the backend is reachable", self.token);
        }
        println!("Deleted backup {} ({} blob(s))", report.token, report.deleted_blobs);
        Ok(())
    }
}
