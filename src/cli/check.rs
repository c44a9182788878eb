use anyhow::{Context, Result, bail};
use clap::Args;
use colored::Colorize;

use super::common::CommandContext;

/// Run one update check against the registry.
#[derive(Args, Debug)]
pub struct CheckCommand {
    /// Print the raw check result as JSON.
    #[arg(long)]
    json: bool,
}

impl CheckCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let updater = &ctx.updater;
        if !self.json {
            println!("{}", "Checking for updates...".cyan());
        }

        let result = updater.check_for_updates().await;

        if self.json {
            let json =
                serde_json::to_string_pretty(&result).context("Failed to serialize result")?;
            println!("{json}");
            return Ok(());
        }

        if let Some(error) = result.error {
            bail!("Failed to check for updates: {error}");
        }

        match result.latest_version.filter(|_| result.has_update) {
            Some(record) => {
                println!(
                    "{}",
                    format!("Update available: {} -> {}", updater.app_version(), record.version)
                        .green()
                );
                if record.file_size_bytes > 0 {
                    println!("  Size:     {}", indicatif::HumanBytes(record.file_size_bytes));
                }
                println!("  Released: {}", record.created_at.format("%Y-%m-%d"));
                println!("  Download: {}", record.download_url);
                if let Some(notes) = record.release_notes {
                    println!();
                    println!("{notes}");
                }
                println!();
                println!("Run `branchbook-updater download` to fetch the installer");
            }
            None => {
                println!(
                    "{}",
                    format!("You are on the latest version ({})", updater.app_version()).green()
                );
            }
        }
        Ok(())
    }
}
