use super::Context;
use anyhow::{anyhow, Result};
use clap::Args;
use serde::Serialize;
use splitsnap_core::BackupRootFolder;

#[derive(Args)]
pub struct ListCommand {
    #[arg(long, help = "Output format (table, json)")]
    format: Option<String>,
}

#[derive(Serialize)]
struct Row<'a> {
    token: &'a str,
    name: &'a str,
    created: String,
    uploaded: bool,
    files: usize,
    uploaded_files: usize,
}

impl<'a> From<&'a BackupRootFolder> for Row<'a> {
    fn from(root: &'a BackupRootFolder) -> Self {
        Row {
            token: &root.token,
            name: root.name(),
            created: root.created_label(),
            uploaded: root.uploaded,
            files: root.folder.leaf_count(),
            uploaded_files: root.folder.uploaded_leaf_count(),
        }
    }
}

impl ListCommand {
    pub async fn run(&self, cli: &crate::Cli) -> Result<()> {
        let ctx = Context::load(cli)?;
        let backups = ctx.store.list().await?;
        let rows: Vec<Row> = backups.iter().map(Row::from).collect();

        match self.format.as_deref().unwrap_or("table") {
            "table" => {
                if rows.is_empty() {
                    println!("No backups found");
                    return Ok(());
                }
                println!("{:<38} {:<24} {:<20} {:<9} {}", "Token", "Name", "Created", "Uploaded", "Files");
                println!("{:-<100}", "");
                for row in rows {
                    println!(
                        "{:<38} {:<24} {:<20} {:<9} {}/{}",
                        row.token,
                        row.name,
                        row.created,
                        if row.uploaded { "yes" } else { "no" },
                        row.uploaded_files,
                        row.files
                    );
                }
            }
            "json" => println!("{}", serde_json::to_string_pretty(&rows)?),
            other => return Err(anyhow!("Unsupported format: {}", other)),
        }

        Ok(())
    }
}
