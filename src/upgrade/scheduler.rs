//! Install scheduling state machine.
//!
//! [`InstallScheduler`] owns the [`UpdateSession`] and the persisted
//! [`PendingInstallChoice`]; both change only through the transition methods
//! below.
//!
//! ```text
//!            begin_download            download_succeeded
//!   Idle ─────────────────► Downloading ─────────────────► ReadyToInstall
//!    ▲                          │                           │   ▲    │
//!    └──── failed / cancelled ──┘              schedule(..) │   │    │ begin_install
//!                                                           ▼   │    ▼
//!                     InstallScheduledOnClose ◄──► InstallScheduledOnNextLaunch
//!                               │   cancel_schedule ──► ReadyToInstall
//!                               │
//!            on_before_close /  │ on_startup
//!                               ▼
//!                           Installing ── install_failed ──► ReadyToInstall | Idle
//! ```
//!
//! Every transition that consumes an installer path re-checks that the file
//! still exists. A missing file never fails a lifecycle hook: the session
//! degrades to `Idle` and the error is kept for [`InstallScheduler::take_last_error`].

use serde::Serialize;
use std::fmt;
use std::path::{Path, PathBuf};
use tracing::{debug, info, warn};

use crate::core::UpdateError;
use crate::upgrade::events::DownloadProgress;
use crate::upgrade::pending::{PendingInstallChoice, PendingInstallMode, PendingInstallStore};
use crate::utils::fs::is_existing_file;

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub enum InstallState {
    #[default]
    Idle,
    Downloading,
    ReadyToInstall,
    InstallScheduledOnClose,
    InstallScheduledOnNextLaunch,
    Installing,
}

impl fmt::Display for InstallState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Idle => "idle",
            Self::Downloading => "downloading",
            Self::ReadyToInstall => "ready to install",
            Self::InstallScheduledOnClose => "scheduled to install on close",
            Self::InstallScheduledOnNextLaunch => "scheduled to install on next launch",
            Self::Installing => "installing",
        };
        f.write_str(label)
    }
}

/// When a deferred install should run.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ScheduleMode {
    OnClose,
    OnNextLaunch,
}

impl ScheduleMode {
    const fn state(self) -> InstallState {
        match self {
            Self::OnClose => InstallState::InstallScheduledOnClose,
            Self::OnNextLaunch => InstallState::InstallScheduledOnNextLaunch,
        }
    }

    const fn persisted(self) -> PendingInstallMode {
        match self {
            Self::OnClose => PendingInstallMode::InstallOnClose,
            Self::OnNextLaunch => PendingInstallMode::InstallOnNextLaunch,
        }
    }
}

/// Snapshot of the in-memory update session.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateSession {
    pub state: InstallState,
    pub target_version: Option<String>,
    pub download_path: Option<PathBuf>,
    pub progress: Option<DownloadProgress>,
    pub error: Option<String>,
}

/// What a lifecycle hook asks the host to do.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum LifecycleAction {
    Nothing,
    LaunchInstaller(PathBuf),
    /// A pending choice was dropped because its installer is gone.
    Discarded(UpdateError),
}

pub struct InstallScheduler {
    state: InstallState,
    target_version: Option<String>,
    download_path: Option<PathBuf>,
    last_error: Option<UpdateError>,
    store: PendingInstallStore,
}

impl InstallScheduler {
    pub fn new(store: PendingInstallStore) -> Self {
        Self {
            state: InstallState::Idle,
            target_version: None,
            download_path: None,
            last_error: None,
            store,
        }
    }

    #[must_use]
    pub const fn state(&self) -> InstallState {
        self.state
    }

    #[must_use]
    pub fn download_path(&self) -> Option<&Path> {
        self.download_path.as_deref()
    }

    #[must_use]
    pub fn session(&self) -> UpdateSession {
        UpdateSession {
            state: self.state,
            target_version: self.target_version.clone(),
            download_path: self.download_path.clone(),
            progress: None,
            error: self.last_error.as_ref().map(ToString::to_string),
        }
    }

    #[must_use]
    pub const fn last_error(&self) -> Option<&UpdateError> {
        self.last_error.as_ref()
    }

    /// Return and clear the last non-fatal error.
    pub fn take_last_error(&mut self) -> Option<UpdateError> {
        self.last_error.take()
    }

    pub fn store(&self) -> &PendingInstallStore {
        &self.store
    }

    /// Whether a download may start right now.
    pub fn ensure_can_download(&self) -> Result<(), UpdateError> {
        match self.state {
            InstallState::Idle => Ok(()),
            InstallState::Downloading => Err(UpdateError::AlreadyDownloading),
            other => Err(self.invalid("start a download", other)),
        }
    }

    /// `Idle → Downloading`.
    pub fn begin_download(&mut self, target_version: Option<String>) -> Result<(), UpdateError> {
        self.ensure_can_download()?;
        self.state = InstallState::Downloading;
        self.target_version = target_version;
        self.download_path = None;
        self.last_error = None;
        Ok(())
    }

    /// `Downloading → ReadyToInstall`. Ignored in any other state.
    pub fn download_succeeded(&mut self, path: PathBuf) {
        if self.state != InstallState::Downloading {
            debug!("Ignoring download completion while {}", self.state);
            return;
        }
        info!("Installer ready at {}", path.display());
        self.state = InstallState::ReadyToInstall;
        self.download_path = Some(path);
    }

    /// `Downloading → Idle` with the failure kept.
    pub fn download_failed(&mut self, error: UpdateError) {
        if self.state != InstallState::Downloading {
            debug!("Ignoring download failure while {}", self.state);
            return;
        }
        self.reset_to_idle();
        self.last_error = Some(error);
    }

    /// `Downloading → Idle`. Cancelling twice is harmless.
    pub fn download_cancelled(&mut self) {
        if self.state == InstallState::Downloading {
            self.reset_to_idle();
        }
    }

    /// Defer installation until close or next launch.
    ///
    /// Allowed from `ReadyToInstall` and from the other scheduled mode. When
    /// the session has no installer (a fresh process), an explicit existing
    /// `path` is adopted. Returns the scheduled installer path.
    pub async fn schedule(
        &mut self,
        mode: ScheduleMode,
        path: Option<PathBuf>,
    ) -> Result<PathBuf, UpdateError> {
        match self.state {
            InstallState::Idle
            | InstallState::ReadyToInstall
            | InstallState::InstallScheduledOnClose
            | InstallState::InstallScheduledOnNextLaunch => {}
            other => return Err(self.invalid("schedule an install", other)),
        }

        let installer = self.resolve_installer(path)?;
        let choice = PendingInstallChoice::new(mode.persisted(), installer.clone());
        self.store.save(&choice).await.map_err(|e| UpdateError::FileSystem {
            operation: "saving the install choice".to_string(),
            path: self.store.path().display().to_string(),
            reason: format!("{e:#}"),
        })?;

        info!("{} is {}", installer.display(), mode.state());
        self.state = mode.state();
        self.download_path = Some(installer.clone());
        Ok(installer)
    }

    /// Undo a scheduled install of `mode`, back to `ReadyToInstall`.
    ///
    /// A no-op when a different mode (or nothing) is scheduled, except that a
    /// matching choice persisted by an earlier process is cleared.
    pub async fn cancel_schedule(&mut self, mode: ScheduleMode) -> Result<(), UpdateError> {
        if self.state == mode.state() {
            self.clear_store().await?;
            self.state = InstallState::ReadyToInstall;
            debug!("Cancelled scheduled install; ready to install");
            return Ok(());
        }

        if self.state == InstallState::Idle && self.store.load().await.mode == mode.persisted() {
            self.clear_store().await?;
            debug!("Cleared install choice left by an earlier run");
        }
        Ok(())
    }

    /// Move to `Installing` for an immediate install.
    ///
    /// Uses the session's installer unless `path` is given. A scheduled
    /// choice is consumed. Returns the installer to launch.
    pub async fn begin_install(&mut self, path: Option<PathBuf>) -> Result<PathBuf, UpdateError> {
        match self.state {
            InstallState::Idle
            | InstallState::ReadyToInstall
            | InstallState::InstallScheduledOnClose
            | InstallState::InstallScheduledOnNextLaunch => {}
            other => return Err(self.invalid("install", other)),
        }

        let installer = self.resolve_installer(path)?;
        if matches!(
            self.state,
            InstallState::InstallScheduledOnClose | InstallState::InstallScheduledOnNextLaunch
        ) {
            self.clear_store().await?;
        }

        self.state = InstallState::Installing;
        self.download_path = Some(installer.clone());
        Ok(installer)
    }

    /// Launch failed: back to `ReadyToInstall`, or `Idle` if the file is gone.
    pub fn install_failed(&mut self, error: UpdateError) {
        if self.state != InstallState::Installing {
            return;
        }
        let still_there = self.download_path.as_deref().is_some_and(is_existing_file);
        if still_there {
            self.state = InstallState::ReadyToInstall;
        } else {
            self.reset_to_idle();
        }
        self.last_error = Some(error);
    }

    /// Startup hook.
    ///
    /// Consumes a persisted `installOnNextLaunch` choice and, when its
    /// installer still exists, moves to `Installing`. A persisted
    /// `installOnClose` choice is restored as `InstallScheduledOnClose`.
    pub async fn on_startup(&mut self) -> LifecycleAction {
        if self.state != InstallState::Idle {
            debug!("Startup hook ignored while {}", self.state);
            return LifecycleAction::Nothing;
        }

        let choice = self.store.load().await;
        let Some(path) = choice.download_path.clone() else {
            return LifecycleAction::Nothing;
        };

        match choice.mode {
            PendingInstallMode::None => LifecycleAction::Nothing,
            PendingInstallMode::InstallOnNextLaunch => {
                self.clear_store_quietly().await;
                self.consume(path)
            }
            PendingInstallMode::InstallOnClose => {
                if is_existing_file(&path) {
                    debug!("Restored install-on-close for {}", path.display());
                    self.state = InstallState::InstallScheduledOnClose;
                    self.download_path = Some(path);
                    LifecycleAction::Nothing
                } else {
                    self.clear_store_quietly().await;
                    LifecycleAction::Discarded(self.discard_missing(&path))
                }
            }
        }
    }

    /// Close hook. Consumes an install-on-close choice.
    pub async fn on_before_close(&mut self) -> LifecycleAction {
        let path = match self.state {
            InstallState::InstallScheduledOnClose => self.download_path.clone(),
            InstallState::Idle => {
                let choice = self.store.load().await;
                if choice.mode == PendingInstallMode::InstallOnClose {
                    choice.download_path
                } else {
                    None
                }
            }
            _ => None,
        };

        let Some(path) = path else {
            return LifecycleAction::Nothing;
        };

        self.clear_store_quietly().await;
        self.consume(path)
    }

    fn consume(&mut self, path: PathBuf) -> LifecycleAction {
        if !is_existing_file(&path) {
            return LifecycleAction::Discarded(self.discard_missing(&path));
        }
        info!("Installing pending update from {}", path.display());
        self.state = InstallState::Installing;
        self.download_path = Some(path.clone());
        LifecycleAction::LaunchInstaller(path)
    }

    fn discard_missing(&mut self, path: &Path) -> UpdateError {
        warn!("Pending installer {} no longer exists; discarding the choice", path.display());
        let err = UpdateError::installer_missing(path);
        self.reset_to_idle();
        self.last_error = Some(err.clone());
        err
    }

    /// Pick the installer for a transition and check it exists.
    fn resolve_installer(&mut self, path: Option<PathBuf>) -> Result<PathBuf, UpdateError> {
        let explicit = path.is_some();
        let installer = path.or_else(|| self.download_path.clone());
        let Some(installer) = installer else {
            return Err(UpdateError::NoDownloadedInstaller);
        };

        if is_existing_file(&installer) {
            return Ok(installer);
        }

        let err = UpdateError::installer_missing(&installer);
        if !explicit {
            // The session's own installer vanished
            self.reset_to_idle();
            self.last_error = Some(err.clone());
        }
        Err(err)
    }

    async fn clear_store(&self) -> Result<(), UpdateError> {
        self.store.clear().await.map_err(|e| UpdateError::FileSystem {
            operation: "clearing the install choice".to_string(),
            path: self.store.path().display().to_string(),
            reason: format!("{e:#}"),
        })
    }

    async fn clear_store_quietly(&self) {
        if let Err(e) = self.clear_store().await {
            warn!("{}", e);
        }
    }

    fn reset_to_idle(&mut self) {
        self.state = InstallState::Idle;
        self.target_version = None;
        self.download_path = None;
    }

    fn invalid(&self, action: &str, state: InstallState) -> UpdateError {
        UpdateError::InvalidTransition {
            action: action.to_string(),
            state: state.to_string(),
        }
    }
}
