//! branchbook-updater CLI entry point
//!
//! Parses arguments, installs logging and runs one command. Errors are shown
//! with context and a suggestion, and the process exits with status 1.
//!
//! The CLI mirrors the updater API:
//! - `status` - app version, session and pending install choice
//! - `check` - ask the registry for a newer build
//! - `download` - fetch the installer with a progress bar
//! - `install` / `schedule` - install now, on close or on next launch
//! - `hook` - lifecycle entry points for the host application
//! - `watch` - periodic background checks

use anyhow::Result;
use branchbook_updater::cli;
use branchbook_updater::core::error::user_friendly_error;
use clap::Parser;

#[tokio::main]
async fn main() -> Result<()> {
    let cli = cli::Cli::parse();

    #[cfg(windows)]
    colored::control::set_virtual_terminal(true).ok();

    match cli.execute().await {
        Ok(()) => Ok(()),
        Err(e) => {
            let error_ctx = user_friendly_error(e);
            error_ctx.display();
            std::process::exit(1);
        }
    }
}
