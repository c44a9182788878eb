use anyhow::{Result, anyhow, bail};
use clap::{Args, ValueEnum};
use colored::Colorize;
use std::path::Path;
use tracing::debug;

use super::common::{CommandContext, report_action};
use crate::upgrade::verification::compute_sha256;
use crate::upgrade::{Subscription, UpdateEvent, Updater};
use crate::utils::path_validation::{file_name_from_url, validate_download_url};
use crate::utils::progress::{ProgressBar, format_speed};

const FALLBACK_FILE_NAME: &str = "Branchbook-Setup";

/// What to do with the installer once it is downloaded.
#[derive(Debug, Clone, Copy, PartialEq, Eq, ValueEnum)]
pub enum ThenAction {
    /// Launch the installer immediately.
    Now,
    /// Install when the app closes.
    OnClose,
    /// Install on the next app launch.
    NextLaunch,
}

/// Download an installer into the update directory.
///
/// Without a URL, the registry is checked first and the newest published
/// build is downloaded. Ctrl-C cancels the transfer and removes the partial
/// file.
#[derive(Args, Debug)]
pub struct DownloadCommand {
    /// Installer URL; defaults to the newest published build.
    url: Option<String>,

    /// File name to save as; defaults to the last URL path segment.
    #[arg(long)]
    file_name: Option<String>,

    /// Open the URL in the default browser instead of downloading in-process.
    #[arg(long, conflicts_with_all = ["file_name", "then"])]
    external: bool,

    /// Install now, on close or on next launch once the download succeeds.
    #[arg(long, value_enum)]
    then: Option<ThenAction>,

    /// Print the SHA-256 of the downloaded installer.
    #[arg(long)]
    sha256: bool,
}

impl DownloadCommand {
    pub async fn execute(self, ctx: &CommandContext) -> Result<()> {
        let updater = &ctx.updater;

        let Some(url) = self.resolve_url(updater).await? else {
            println!(
                "{}",
                format!("You are on the latest version ({})", updater.app_version()).green()
            );
            return Ok(());
        };

        if self.external {
            let result = updater.download_update(Some(&url)).await;
            return report_action(result, "Opened the download page in your browser");
        }

        let file_name = match self.file_name {
            Some(name) => name,
            None => file_name_from_url(&validate_download_url(&url)?)
                .unwrap_or_else(|| FALLBACK_FILE_NAME.to_string()),
        };

        let expected_size = updater
            .latest_version()
            .filter(|record| record.download_url == url)
            .map(|record| record.file_size_bytes)
            .filter(|size| *size > 0);
        let bar = ProgressBar::new_download(expected_size);
        bar.set_prefix("Downloading");

        let subscription = updater.subscribe();
        let subscription_id = subscription.id();
        let renderer = tokio::spawn(render_progress(subscription, bar.clone()));

        let download = updater.download_update_to_temp(&url, &file_name);
        tokio::pin!(download);
        let result = tokio::select! {
            result = &mut download => result,
            _ = tokio::signal::ctrl_c() => {
                let cancel = updater.cancel_download().await;
                debug!(cancelled = cancel.success, "Interrupted; cancelling download");
                download.await
            }
        };

        updater.unsubscribe(subscription_id);
        if let Err(e) = renderer.await {
            debug!("Progress renderer stopped abnormally: {}", e);
        }

        if result.cancelled {
            bar.abandon_with_message("cancelled");
            bail!("Download cancelled");
        }
        let Some(path) = result.download_path.filter(|_| result.success) else {
            bar.abandon_with_message("failed");
            return Err(anyhow!(
                result.error.unwrap_or_else(|| "Download failed".to_string())
            ));
        };
        bar.finish_and_clear();
        println!("{} {}", "Downloaded".green(), path.display());

        if self.sha256 {
            println!("  SHA-256: {}", compute_sha256(&path).await?);
        }

        match self.then {
            Some(action) => run_then(updater, action, &path).await,
            None => Ok(()),
        }
    }

    async fn resolve_url(&self, updater: &Updater) -> Result<Option<String>> {
        if let Some(url) = &self.url {
            return Ok(Some(url.clone()));
        }

        let check = updater.check_for_updates().await;
        if let Some(error) = check.error {
            bail!("Failed to check for updates: {error}");
        }
        Ok(check
            .latest_version
            .filter(|_| check.has_update)
            .map(|record| record.download_url))
    }
}

async fn run_then(updater: &Updater, action: ThenAction, path: &Path) -> Result<()> {
    let path = Some(path.to_path_buf());
    match action {
        ThenAction::Now => report_action(
            updater.install_and_restart(path).await,
            "Installer launched; restart the app to finish",
        ),
        ThenAction::OnClose => report_action(
            updater.set_install_on_close(true, path).await,
            "The update will install when the app closes",
        ),
        ThenAction::NextLaunch => report_action(
            updater.set_install_on_next_launch(true, path).await,
            "The update will install on the next launch",
        ),
    }
}

async fn render_progress(mut subscription: Subscription, bar: ProgressBar) {
    while let Some(event) = subscription.recv().await {
        if let UpdateEvent::DownloadProgress(progress) = &event {
            bar.set_length(progress.total_bytes);
            bar.set_position(progress.bytes_received);
            bar.set_message(format_speed(progress.speed));
        }
        if event.is_terminal() {
            break;
        }
    }
}
