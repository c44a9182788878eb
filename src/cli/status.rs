use anyhow::{Context, Result};
use clap::Args;
use colored::Colorize;
use serde::Serialize;

use super::common::CommandContext;
use crate::upgrade::{PendingInstallChoice, PendingInstallMode, UpdateSession};

/// Show the app version, install session and pending install choice.
#[derive(Args, Debug)]
pub struct StatusCommand {
    /// Print machine-readable JSON instead of text.
    #[arg(long)]
    json: bool,
}

#[derive(Serialize)]
#[serde(rename_all = "camelCase")]
struct StatusReport {
    app_version: String,
    platform: String,
    registry_configured: bool,
    session: UpdateSession,
    pending_install: PendingInstallChoice,
}

impl StatusCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let updater = &ctx.updater;
        let report = StatusReport {
            app_version: updater.app_version().to_string(),
            platform: updater.platform().to_string(),
            registry_configured: ctx.config.registry.is_configured(),
            session: updater.session().await,
            pending_install: updater.pending_choice().await,
        };

        if self.json {
            let json =
                serde_json::to_string_pretty(&report).context("Failed to serialize status")?;
            println!("{json}");
            return Ok(());
        }

        println!("{} {}", "Branchbook".bold(), report.app_version);
        println!("  Platform:  {}", report.platform);
        if report.registry_configured {
            println!("  Registry:  {}", ctx.config.registry.url);
        } else {
            println!("  Registry:  {}", "not configured".yellow());
        }
        println!("  Session:   {}", report.session.state);
        if let Some(version) = &report.session.target_version {
            println!("  Target:    {version}");
        }
        if let Some(path) = &report.session.download_path {
            println!("  Installer: {}", path.display());
        }

        let pending = match (&report.pending_install.mode, &report.pending_install.download_path)
        {
            (PendingInstallMode::InstallOnClose, Some(path)) => {
                format!("on close ({})", path.display())
            }
            (PendingInstallMode::InstallOnNextLaunch, Some(path)) => {
                format!("on next launch ({})", path.display())
            }
            _ => "none".to_string(),
        };
        println!("  Pending:   {pending}");
        Ok(())
    }
}
