use super::Context;
use anyhow::Result;
use clap::Args;
use splitsnap_core::sizing::measure_with_speed;
use std::path::PathBuf;

#[derive(Args)]
pub struct EstimateCommand {
    #[arg(help = "File or folder to measure")]
    path: PathBuf,

    #[arg(long, help = "Upload speed in Mb/s (megabits), overrides upload_speed_mbps")]
    speed: Option<f64>,
}

impl EstimateCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = Context::load(cli)?;
        let speed = self.speed.unwrap_or(ctx.config.upload_speed_mbps);

        let path = self.path.clone();
        let estimate = tokio::task::spawn_blocking(move || measure_with_speed(&path, speed)).await??;

        println!("Path:           {}", self.path.display());
        println!("Size:           {} ({} bytes)", estimate.human_size, estimate.total_bytes);
        println!("Upload time:    {} at {} Mb/s", estimate.estimated_time, speed);
        Ok(())
    }
}
