//! Command-line interface for branchbook-updater.
//!
//! The CLI is a thin host around [`crate::upgrade::Updater`]: every
//! subcommand maps onto one library operation, so the same flows the desktop
//! shell drives can be run and scripted from a terminal.
//!
//! # Commands
//!
//! - `status` - app version, install session and pending install choice
//! - `check` - run one update check against the registry
//! - `download` - download an installer with a progress bar (Ctrl-C cancels)
//! - `install` - launch an installer now
//! - `schedule` - defer an installer to app close or next launch, or cancel
//! - `hook` - lifecycle entry points (`startup`, `before-close`)
//! - `watch` - periodic checks until interrupted
//!
//! # Global Options
//!
//! - `--verbose` - debug logging
//! - `--quiet` - no logging
//! - `--config` - path to a custom config file
//! - `--no-progress` - hide progress bars
//!
//! `RUST_LOG`, when set, takes precedence over `--verbose` and `--quiet`.
//!
//! # Examples
//!
//! ```bash
//! branchbook-updater check
//! branchbook-updater download --then next-launch
//! branchbook-updater schedule on-close ./Branchbook-Setup-2.0.0.exe
//! branchbook-updater --verbose hook startup
//! ```

mod check;
pub mod common;
mod download;
mod hook;
mod install;
mod schedule;
mod status;
mod watch;


use anyhow::Result;
use clap::{Parser, Subcommand};
use std::path::PathBuf;
use tracing_subscriber::EnvFilter;

use crate::config::CONFIG_PATH_ENV;
use crate::utils::progress::NO_PROGRESS_ENV;

pub use common::CommandContext;

/// Runtime configuration for CLI execution.
///
/// Holds what the global flags translate into, so tests can build it
/// directly instead of parsing arguments.
#[derive(Debug, Clone, Default)]
pub struct CliConfig {
    /// Filter directive used when `RUST_LOG` is unset. `None` disables logging.
    pub log_level: Option<String>,

    /// Hide progress bars (`BRANCHBOOK_NO_PROGRESS`).
    pub no_progress: bool,

    /// Custom config file location (`BRANCHBOOK_CONFIG_PATH`).
    pub config_path: Option<PathBuf>,
}

impl CliConfig {
    #[must_use]
    pub fn new() -> Self {
        Self::default()
    }

    /// Export the settings other modules read from the environment.
    ///
    /// Call once, before any task is spawned.
    pub fn apply_to_env(&self) {
        if self.no_progress {
            // SAFETY: called from main before the runtime spawns other tasks
            unsafe { std::env::set_var(NO_PROGRESS_ENV, "1") };
        }

        if let Some(ref path) = self.config_path {
            // SAFETY: called from main before the runtime spawns other tasks
            unsafe { std::env::set_var(CONFIG_PATH_ENV, path) };
        }
    }

    /// Install the global `tracing` subscriber, writing to stderr.
    ///
    /// `RUST_LOG` wins over the configured level. Installing twice is a no-op.
    pub fn init_logging(&self) {
        let filter = match std::env::var("RUST_LOG") {
            Ok(directives) if !directives.is_empty() => EnvFilter::new(directives),
            _ => EnvFilter::new(self.log_level.as_deref().unwrap_or("off")),
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_writer(std::io::stderr)
            .with_target(false)
            .try_init();
    }
}

/// Top-level command line of `branchbook-updater`.
#[derive(Parser)]
#[command(
    name = "branchbook-updater",
    about = "Branchbook update coordinator - check, download and install app updates",
    version,
    author,
    long_about = "Checks the Branchbook version registry for newer builds, downloads installers \
                  in the background and installs them now, on close or on next launch."
)]
pub struct Cli {
    #[command(subcommand)]
    command: Commands,

    /// Enable debug logging.
    #[arg(short, long, global = true, conflicts_with = "quiet")]
    verbose: bool,

    /// Disable logging entirely.
    #[arg(short, long, global = true)]
    quiet: bool,

    /// Path to the config file (default `~/.branchbook/config.toml`).
    #[arg(short, long, global = true)]
    config: Option<PathBuf>,

    /// Hide progress bars; useful in scripts and CI.
    #[arg(long, global = true)]
    no_progress: bool,
}

#[derive(Subcommand)]
enum Commands {
    /// Show the app version, install session and pending install choice.
    Status(status::StatusCommand),

    /// Ask the registry whether a newer build is published.
    Check(check::CheckCommand),

    /// Download an installer into the update directory.
    Download(download::DownloadCommand),

    /// Launch an installer now and restart the app.
    Install(install::InstallCommand),

    /// Defer an installer to app close or next launch, or cancel a deferral.
    Schedule(schedule::ScheduleCommand),

    /// Run a lifecycle hook on behalf of the host application.
    Hook(hook::HookCommand),

    /// Check periodically until interrupted.
    Watch(watch::WatchCommand),
}

impl Cli {
    /// Execute the parsed command line.
    pub async fn execute(self) -> Result<()> {
        let config = self.build_config();
        self.execute_with_config(config).await
    }

    /// Translate the global flags into a [`CliConfig`].
    #[must_use]
    pub fn build_config(&self) -> CliConfig {
        let log_level = if self.verbose {
            Some("debug".to_string())
        } else if self.quiet {
            None
        } else {
            Some("warn".to_string())
        };

        CliConfig {
            log_level,
            no_progress: self.no_progress,
            config_path: self.config.clone(),
        }
    }

    /// Execute with an explicit configuration instead of the parsed flags.
    pub async fn execute_with_config(self, config: CliConfig) -> Result<()> {
        config.apply_to_env();
        config.init_logging();

        let ctx = CommandContext::load(config.config_path.clone()).await?;
        self.command.execute(&ctx).await
    }
}

impl Commands {
    async fn execute(self, ctx: &CommandContext) -> Result<()> {
        match self {
            Self::Status(cmd) => cmd.execute(ctx).await,
            Self::Check(cmd) => cmd.execute(ctx).await,
            Self::Download(cmd) => cmd.execute(ctx).await,
            Self::Install(cmd) => cmd.execute(ctx).await,
            Self::Schedule(cmd) => cmd.execute(ctx).await,
            Self::Hook(cmd) => cmd.execute(ctx).await,
            Self::Watch(cmd) => cmd.execute(ctx).await,
        }
    }
}
