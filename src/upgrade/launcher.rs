//! OS primitives used by the updater: launching an installer, opening a URL
//! in the default browser and asking the host to restart.

use async_trait::async_trait;
use std::ffi::{OsStr, OsString};
use std::path::Path;
use tracing::{debug, info};

use crate::core::UpdateError;

#[async_trait]
pub trait InstallerLauncher: Send + Sync {
    /// Hand the installer to the OS. Returns once it has been started.
    async fn launch(&self, installer: &Path) -> Result<(), UpdateError>;

    /// Open `url` in the default browser.
    async fn open_url(&self, url: &str) -> Result<(), UpdateError>;

    /// Ask the host application to quit so the installer can replace it.
    async fn request_restart(&self) -> Result<(), UpdateError>;
}

type OpenFn = fn(&OsStr) -> Result<(), String>;

fn open_with_default_app(target: &OsStr) -> Result<(), String> {
    opener::open(target).map_err(|e| e.to_string())
}

fn open_in_browser(target: &OsStr) -> Result<(), String> {
    opener::open_browser(target).map_err(|e| e.to_string())
}

/// Launcher backed by the `opener` crate.
///
/// Targets are handed to the platform opener as a single argument, never
/// through a shell. `request_restart` only records the request; the CLI host
/// exits on its own once the command returns.
#[derive(Debug, Clone)]
pub struct SystemLauncher {
    open: OpenFn,
    browse: OpenFn,
}

impl Default for SystemLauncher {
    fn default() -> Self {
        Self {
            open: open_with_default_app,
            browse: open_in_browser,
        }
    }
}

impl SystemLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    /// Launcher that routes both operations through `open`.
    #[cfg(test)]
    const fn with_opener(open: OpenFn) -> Self {
        Self {
            open,
            browse: open,
        }
    }

    async fn run(open: OpenFn, target: OsString) -> Result<(), String> {
        tokio::task::spawn_blocking(move || open(&target))
            .await
            .map_err(|e| format!("opener task failed: {e}"))?
    }
}

#[async_trait]
impl InstallerLauncher for SystemLauncher {
    async fn launch(&self, installer: &Path) -> Result<(), UpdateError> {
        if !installer.is_file() {
            return Err(UpdateError::LaunchFailed {
                path: installer.display().to_string(),
                reason: "installer not found".to_string(),
            });
        }

        info!("Launching installer {}", installer.display());
        Self::run(self.open, installer.as_os_str().to_os_string()).await.map_err(|reason| {
            UpdateError::LaunchFailed {
                path: installer.display().to_string(),
                reason,
            }
        })
    }

    async fn open_url(&self, url: &str) -> Result<(), UpdateError> {
        debug!("Opening {} in the default browser", url);
        Self::run(self.browse, OsString::from(url)).await.map_err(|reason| UpdateError::Other {
            message: format!("Failed to open {url}: {reason}"),
        })
    }

    async fn request_restart(&self) -> Result<(), UpdateError> {
        info!("Restart requested; the application should exit now");
        Ok(())
    }
}
