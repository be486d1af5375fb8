mod commands;
mod config;

use anyhow::Result;
use clap::{Parser, Subcommand};
use commands::{
    backup::BackupCommand, delete::DeleteCommand, download::DownloadCommand,
    estimate::EstimateCommand, list::ListCommand, upload::UploadCommand,
};
use std::path::PathBuf;
use tracing::debug;
use tracing_subscriber::{EnvFilter, FmtSubscriber};

#[derive(Parser)]
#[command(
    name = "splitsnap",
    version,
    about = "Backs up folders to a blob store in size-limited pieces",
    long_about = "Splitsnap mirrors a folder into a staging area, splits anything too large \
                  into numbered archive volumes, uploads every piece to a blob store and \
                  can later rebuild the folder from those pieces"
)]
struct Cli {
    #[command(subcommand)]
    command: Commands,

    #[arg(long, env = "SPLITSNAP_CONFIG", global = true, help = "Config file")]
    config: Option<PathBuf>,

    #[arg(long, env = "SPLITSNAP_STORE", global = true, help = "Backup record file, overrides store_path")]
    store: Option<PathBuf>,

    #[arg(short, long, global = true, help = "Enable verbose output")]
    verbose: bool,

    #[arg(short, long, global = true, help = "Enable quiet mode")]
    quiet: bool,
}

#[derive(Subcommand)]
enum Commands {
    #[command(about = "Show size and estimated upload time of a path")]
    Estimate(EstimateCommand),

    #[command(about = "Stage a path and upload it")]
    Backup(BackupCommand),

    #[command(about = "Upload or resume uploading a staged backup")]
    Upload(UploadCommand),

    #[command(about = "Restore a backup from the blob store")]
    Download(DownloadCommand),

    #[command(about = "List known backups")]
    List(ListCommand),

    #[command(about = "Delete a backup and its blobs")]
    Delete(DeleteCommand),
}

#[tokio::main]
async fn main() -> Result<()> {
    let cli = Cli::parse();

    init_tracing(cli.verbose, cli.quiet);

    debug!("Starting Splitsnap");

    match cli.command {
        Commands::Estimate(ref cmd) => cmd.run(&cli).await,
        Commands::Backup(ref cmd) => cmd.run(&cli).await,
        Commands::Upload(ref cmd) => cmd.run(&cli).await,
        Commands::Download(ref cmd) => cmd.run(&cli).await,
        Commands::List(ref cmd) => cmd.run(&cli).await,
        Commands::Delete(ref cmd) => cmd.run(&cli).await,
    }
}

fn init_tracing(verbose: bool, quiet: bool) {
    let level = if quiet {
        "warn"
    } else if verbose {
        "debug"
    } else {
        "info"
    };

    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| {
        EnvFilter::new(format!(
            "splitsnap={level},splitsnap_core={level},splitsnap_backends={level},splitsnap_transfer={level}"
        ))
    });

    let subscriber = FmtSubscriber::builder().with_env_filter(filter).finish();

    if let Err(e) = tracing::subscriber::set_global_default(subscriber) {
        eprintln!("Failed to install log subscriber: {}", e);
    }
}
