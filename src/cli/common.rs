//! Shared context and output helpers for CLI commands

use anyhow::{Context, Result, anyhow};
use colored::Colorize;
use std::path::PathBuf;
use std::sync::Arc;

use crate::config::GlobalConfig;
use crate::upgrade::{ActionResult, LifecycleOutcome, Updater};
use crate::utils::platform::get_data_dir;

/// Everything a command needs: the loaded config and a ready updater.
pub struct CommandContext {
    pub config: GlobalConfig,
    pub data_dir: PathBuf,
    pub updater: Arc<Updater>,
}

impl CommandContext {
    /// Load the config (or defaults) and build an [`Updater`] from it.
    ///
    /// # Errors
    /// Returns an error if the config file exists but is invalid, or if the
    /// data directory cannot be resolved.
    pub async fn load(config_path: Option<PathBuf>) -> Result<Self> {
        let config = GlobalConfig::load_with_optional(config_path).await?;
        let data_dir = get_data_dir()?;
        let updater = Updater::from_config(&config, &data_dir)
            .context("Failed to initialize the updater")?;

        Ok(Self {
            config,
            data_dir,
            updater: Arc::new(updater),
        })
    }

    /// Context around an already-built updater.
    pub fn with_updater(config: GlobalConfig, data_dir: PathBuf, updater: Updater) -> Self {
        Self {
            config,
            data_dir,
            updater: Arc::new(updater),
        }
    }
}

/// Print `message` on success, or turn the failure into an error.
pub fn report_action(result: ActionResult, message: &str) -> Result<()> {
    if result.success {
        println!("{}", message.green());
        return Ok(());
    }
    Err(anyhow!(result.error.unwrap_or_else(|| "Operation did not complete".to_string())))
}

/// Print what a lifecycle hook did. Hooks never fail the command.
pub fn report_lifecycle(hook: &str, outcome: &LifecycleOutcome) {
    if let Some(path) = &outcome.launched {
        println!("{} {}", "Installer launched:".green(), path.display());
    }
    if let Some(error) = &outcome.error {
        eprintln!("{} {}", format!("{hook}:").yellow(), error);
    }
    if outcome.launched.is_none() && outcome.error.is_none() {
        println!("{}", format!("{hook}: nothing to install").dimmed());
    }
    if outcome.should_quit {
        println!("{}", "The application may quit now".cyan());
    }
}
