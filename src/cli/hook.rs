use anyhow::{Context, Result};
use clap::{Args, ValueEnum};

use super::common::{CommandContext, report_lifecycle};

#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
enum Hook {
    /// The app just started.
    Startup,
    /// The app is about to close.
    BeforeClose,
}

/// Run a lifecycle hook on behalf of the host application.
///
/// Hooks never fail: problems are printed and the exit status stays 0, so a
/// host can always continue starting up or shutting down.
#[derive(Args, Debug)]
pub struct HookCommand {
    #[arg(value_enum)]
    hook: Hook,

    /// Print the outcome as JSON for the host to parse.
    #[arg(long)]
    json: bool,
}

impl HookCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let (name, outcome) = match self.hook {
            Hook::Startup => ("startup", ctx.updater.on_startup().await),
            Hook::BeforeClose => ("before-close", ctx.updater.on_before_close().await),
        };

        if self.json {
            let json =
                serde_json::to_string_pretty(&outcome).context("Failed to serialize outcome")?;
            println!("{json}");
        } else {
            report_lifecycle(name, &outcome);
        }
        Ok(())
    }
}
