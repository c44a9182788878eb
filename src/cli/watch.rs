use anyhow::{Result, bail};
use chrono::Local;
use clap::Args;
use colored::Colorize;
use std::time::Duration;
use tracing::info;

use super::common::CommandContext;
use crate::upgrade::{AutoCheck, UpdateCheckResult};

/// Check for updates periodically until interrupted with Ctrl-C.
#[derive(Args, Debug)]
pub struct WatchCommand {
    /// Seconds between checks; defaults to `upgrade.check_interval`.
    #[arg(long, value_name = "SECS")]
    interval: Option<u64>,
}

impl WatchCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let interval = match self.interval {
            Some(0) => None,
            Some(secs) => Some(Duration::from_secs(secs)),
            None => ctx.config.upgrade.interval(),
        };
        let Some(interval) = interval else {
            bail!("Periodic update checks are disabled (check_interval = 0)");
        };

        if ctx.config.upgrade.check_on_startup {
            print_result(ctx.updater.app_version(), &ctx.updater.check_for_updates().await);
        }

        info!("Checking for updates every {}s", interval.as_secs());
        println!(
            "{}",
            format!("Watching for updates every {}s; press Ctrl-C to stop", interval.as_secs())
                .dimmed()
        );

        let mut auto = AutoCheck::spawn(ctx.updater.clone(), interval);
        loop {
            tokio::select! {
                result = auto.next_result() => match result {
                    Some(result) => print_result(ctx.updater.app_version(), &result),
                    None => break,
                },
                _ = tokio::signal::ctrl_c() => break,
            }
        }
        auto.shutdown().await;
        println!("{}", "Stopped watching".dimmed());
        Ok(())
    }
}

fn print_result(app_version: &str, result: &UpdateCheckResult) {
    let stamp = Local::now().format("%H:%M:%S");
    match (&result.error, result.latest_version.as_ref().filter(|_| result.has_update)) {
        (Some(error), _) => {
            eprintln!("[{stamp}] {} {error}", "Update check failed:".yellow());
        }
        (None, Some(record)) => {
            println!(
                "[{stamp}] {}",
                format!("Update available: {app_version} -> {}", record.version).green()
            );
        }
        (None, None) => println!("[{stamp}] Up to date ({app_version})"),
    }
}
