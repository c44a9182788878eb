use anyhow::Result;
use clap::Args;
use std::path::PathBuf;

use super::common::{CommandContext, report_action};

/// Launch a downloaded installer now.
#[derive(Args, Debug)]
pub struct InstallCommand {
    /// Path to the installer.
    path: PathBuf,
}

impl InstallCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let result = ctx.updater.install_and_restart(Some(self.path)).await;
        report_action(result, "Installer launched; restart the app to finish")
    }
}
