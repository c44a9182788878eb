//! `schedule` - defer an install to app close or next launch.
//!
//! The choice is persisted, so a later `hook before-close` or `hook startup`
//! in another process picks it up.

use anyhow::Result;
use clap::{Args, Subcommand};
use std::path::PathBuf;

use super::common::{CommandContext, report_action};

#[derive(Args, Debug)]
pub struct ScheduleCommand {
    #[command(subcommand)]
    target: ScheduleTarget,
}

#[derive(Subcommand, Debug)]
enum ScheduleTarget {
    /// Install when the app closes.
    OnClose {
        /// Path to the downloaded installer.
        path: PathBuf,
    },
    /// Install on the next app launch.
    NextLaunch {
        /// Path to the downloaded installer.
        path: PathBuf,
    },
    /// Drop any deferred install.
    Cancel,
}

impl ScheduleCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let updater = &ctx.updater;
        match self.target {
            ScheduleTarget::OnClose {
                path,
            } => report_action(
                updater.set_install_on_close(true, Some(path)).await,
                "The update will install when the app closes",
            ),
            ScheduleTarget::NextLaunch {
                path,
            } => report_action(
                updater.set_install_on_next_launch(true, Some(path)).await,
                "The update will install on the next launch",
            ),
            ScheduleTarget::Cancel => {
                let on_close = updater.set_install_on_close(false, None).await;
                if !on_close.success {
                    return report_action(on_close, "");
                }
                report_action(
                    updater.set_install_on_next_launch(false, None).await,
                    "Deferred install cancelled",
                )
            }
        }
    }
}
