use serde::Serialize;
use std::path::{Path, PathBuf};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::{Mutex as AsyncMutex, watch};
use tracing::{debug, info, warn};

use crate::config::GlobalConfig;
use crate::core::UpdateError;
use crate::upgrade::download::{DownloadHandle, DownloadManager, DownloadOutcome};
use crate::upgrade::events::{EventBus, Subscription, SubscriptionId};
use crate::upgrade::launcher::{InstallerLauncher, SystemLauncher};
use crate::upgrade::pending::{PendingInstallChoice, PendingInstallStore};
use crate::upgrade::registry::{HttpVersionRegistry, Platform, VersionRecord, VersionRegistry};
use crate::upgrade::scheduler::{
    InstallScheduler, InstallState, LifecycleAction, ScheduleMode, UpdateSession,
};
use crate::upgrade::version_check::{UpdateCheckResult, UpdateChecker};
use crate::utils::path_validation::validate_download_url;

/// Result of a presenter action.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct ActionResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
}

impl ActionResult {
    fn ok() -> Self {
        Self {
            success: true,
            error: None,
        }
    }

    fn failed(error: &UpdateError) -> Self {
        Self {
            success: false,
            error: Some(error.to_string()),
        }
    }
}

/// Result of [`Updater::download_update_to_temp`].
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadResult {
    pub success: bool,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub download_path: Option<PathBuf>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub error: Option<String>,
    /// Set when the download was cancelled; not an error.
    pub cancelled: bool,
}

impl DownloadResult {
    fn failed(error: &UpdateError) -> Self {
        Self {
            success: false,
            download_path: None,
            error: Some(error.to_string()),
            cancelled: false,
        }
    }
}

/// What a lifecycle hook did.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct LifecycleOutcome {
    /// Installer that was handed to the OS, if any.
    pub launched: Option<PathBuf>,
    /// Whether the host should quit now.
    pub should_quit: bool,
    pub error: Option<String>,
}

/// The update coordinator.
///
/// `Updater` wires the registry check, the download manager, the install
/// scheduler and the OS launcher together behind the operations a presenter
/// calls. All state lives in this value; hosts share it behind an [`Arc`].
///
/// Every operation reports failures in its result instead of returning
/// `Err`, so a presenter never has to handle a fault that escaped the
/// coordinator.
///
/// # Examples
///
/// ```rust,no_run
/// use branchbook_updater::config::GlobalConfig;
/// use branchbook_updater::upgrade::Updater;
///
/// # async fn example() -> anyhow::Result<()> {
/// let config = GlobalConfig::load().await?;
/// let data_dir = branchbook_updater::utils::platform::get_data_dir()?;
/// let updater = Updater::from_config(&config, &data_dir)?;
///
/// let check = updater.check_for_updates().await;
/// if let Some(record) = check.latest_version.filter(|_| check.has_update) {
///     let result = updater
///         .download_update_to_temp(&record.download_url, "Branchbook-Setup.exe")
///         .await;
///     if let Some(path) = result.download_path {
///         updater.set_install_on_next_launch(true, Some(path)).await;
///     }
/// }
/// # Ok(())
/// # }
/// ```
pub struct Updater {
    app_version: String,
    platform: Platform,
    checker: UpdateChecker,
    downloads: DownloadManager,
    scheduler: Arc<AsyncMutex<InstallScheduler>>,
    launcher: Arc<dyn InstallerLauncher>,
    latest: Mutex<Option<VersionRecord>>,
    /// Outcome of the current download once the scheduler has taken it in.
    settled: Mutex<Option<SettledRx>>,
}

type SettledRx = watch::Receiver<Option<DownloadOutcome>>;

impl Updater {
    /// Build an updater from explicit parts.
    ///
    /// `download_dir` receives installers; `data_dir` holds the persisted
    /// install choice.
    pub fn new(
        registry: Arc<dyn VersionRegistry>,
        launcher: Arc<dyn InstallerLauncher>,
        download_dir: impl Into<PathBuf>,
        data_dir: &Path,
    ) -> Result<Self, UpdateError> {
        let downloads = DownloadManager::new(download_dir, EventBus::new())?;
        Ok(Self {
            app_version: env!("CARGO_PKG_VERSION").to_string(),
            platform: Platform::current(),
            checker: UpdateChecker::new(registry),
            downloads,
            scheduler: Arc::new(AsyncMutex::new(InstallScheduler::new(
                PendingInstallStore::in_dir(data_dir),
            ))),
            launcher,
            latest: Mutex::new(None),
            settled: Mutex::new(None),
        })
    }

    /// Updater talking to the configured registry and the OS launcher.
    pub fn from_config(config: &GlobalConfig, data_dir: &Path) -> Result<Self, UpdateError> {
        let registry = HttpVersionRegistry::new(
            config.registry.url.clone(),
            config.registry.table.clone(),
            config.registry.api_key.clone(),
            config.upgrade.timeout(),
        )?;
        Self::new(
            Arc::new(registry),
            Arc::new(SystemLauncher::new()),
            config.upgrade.resolved_download_dir(),
            data_dir,
        )
    }

    /// Override the version compared against the registry.
    #[must_use]
    pub fn with_app_version(mut self, version: impl Into<String>) -> Self {
        self.app_version = version.into();
        self
    }

    #[must_use]
    pub fn with_platform(mut self, platform: Platform) -> Self {
        self.platform = platform;
        self
    }

    pub fn app_version(&self) -> &str {
        &self.app_version
    }

    pub const fn platform(&self) -> Platform {
        self.platform
    }

    pub fn download_dir(&self) -> &Path {
        self.downloads.download_dir()
    }

    /// Newest record seen by the last successful check.
    pub fn latest_version(&self) -> Option<VersionRecord> {
        self.latest.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    /// Query the registry for a newer build.
    ///
    /// Safe to call while a download runs: the download is not touched and no
    /// second download is started.
    pub async fn check_for_updates(&self) -> UpdateCheckResult {
        let result = self.checker.check_for_update(self.platform, &self.app_version).await;
        if result.error.is_none() {
            *self.latest.lock().unwrap_or_else(PoisonError::into_inner) =
                result.latest_version.clone();
        }
        result
    }

    /// Open the installer URL in the default browser instead of downloading
    /// it in-process. Without `url`, the last checked record's URL is used.
    pub async fn download_update(&self, url: Option<&str>) -> ActionResult {
        let url = match url.map(str::to_string).or_else(|| {
            self.latest_version().map(|record| record.download_url)
        }) {
            Some(url) => url,
            None => {
                return ActionResult::failed(&UpdateError::Other {
                    message: "No update URL is known; check for updates first".to_string(),
                });
            }
        };

        let result = match validate_download_url(&url) {
            Ok(valid) => self.launcher.open_url(valid.as_str()).await,
            Err(e) => Err(e),
        };
        match result {
            Ok(()) => ActionResult::ok(),
            Err(e) => {
                warn!("Could not open download page: {}", e);
                ActionResult::failed(&e)
            }
        }
    }

    /// Download `url` into the temp download directory as `file_name` and
    /// wait for it to settle.
    ///
    /// The session leaves `Downloading` even if this future is dropped before
    /// the transfer ends; only the returned result is lost then.
    ///
    /// When `url` belongs to the last checked record and that record carries
    /// a checksum, the download is verified before it becomes ready.
    pub async fn download_update_to_temp(&self, url: &str, file_name: &str) -> DownloadResult {
        let record = self.latest_version().filter(|record| record.download_url == url);

        let settled = {
            let mut scheduler = self.scheduler.lock().await;
            if let Err(e) = scheduler.ensure_can_download() {
                return DownloadResult::failed(&e);
            }

            let expected = record.as_ref().and_then(|r| r.sha256.as_deref());
            let handle = match self.downloads.start_download(url, file_name, expected).await {
                Ok(handle) => handle,
                Err(e) => return DownloadResult::failed(&e),
            };

            if let Err(e) = scheduler.begin_download(record.map(|r| r.version)) {
                handle.cancel();
                return DownloadResult::failed(&e);
            }
            self.spawn_settle(handle)
        };

        let outcome = wait_settled(settled).await;

        match outcome {
            DownloadOutcome::Completed {
                path,
                ..
            } => DownloadResult {
                success: true,
                download_path: Some(path),
                error: None,
                cancelled: false,
            },
            DownloadOutcome::Failed(e) => DownloadResult::failed(&e),
            DownloadOutcome::Cancelled => DownloadResult {
                cancelled: true,
                ..DownloadResult::default()
            },
        }
    }

    /// Cancel the running download and wait for its partial file to be
    /// removed. `success` is `false` when nothing was cancelled.
    pub async fn cancel_download(&self) -> ActionResult {
        match self.downloads.cancel_active().await {
            Some(outcome) => {
                self.wait_for_settle().await;
                if outcome == DownloadOutcome::Cancelled {
                    ActionResult::ok()
                } else {
                    debug!("Download settled before the cancellation was observed");
                    ActionResult {
                        success: false,
                        error: None,
                    }
                }
            }
            None => ActionResult::failed(&UpdateError::NoActiveDownload),
        }
    }

    /// Feed the download's outcome into the scheduler from a task of its own,
    /// so the session settles whether or not anyone awaits the result.
    fn spawn_settle(&self, handle: DownloadHandle) -> SettledRx {
        let (tx, rx) = watch::channel(None);
        let scheduler = Arc::clone(&self.scheduler);
        tokio::spawn(async move {
            let outcome = handle.wait().await;
            {
                let mut scheduler = scheduler.lock().await;
                match &outcome {
                    DownloadOutcome::Completed {
                        path,
                        ..
                    } => scheduler.download_succeeded(path.clone()),
                    DownloadOutcome::Failed(e) => scheduler.download_failed(e.clone()),
                    DownloadOutcome::Cancelled => scheduler.download_cancelled(),
                }
            }
            tx.send_replace(Some(outcome));
        });
        *self.settled.lock().unwrap_or_else(PoisonError::into_inner) = Some(rx.clone());
        rx
    }

    async fn wait_for_settle(&self) {
        let settled = self.settled.lock().unwrap_or_else(PoisonError::into_inner).clone();
        if let Some(settled) = settled {
            wait_settled(settled).await;
        }
    }

    /// Launch the installer now and ask the host to restart.
    ///
    /// Uses the session's installer unless `download_path` is given.
    pub async fn install_and_restart(&self, download_path: Option<PathBuf>) -> ActionResult {
        let mut scheduler = self.scheduler.lock().await;
        let installer = match scheduler.begin_install(download_path).await {
            Ok(path) => path,
            Err(e) => return ActionResult::failed(&e),
        };

        if let Err(e) = self.launcher.launch(&installer).await {
            warn!("Installer launch failed: {}", e);
            scheduler.install_failed(e.clone());
            return ActionResult::failed(&e);
        }

        info!("Installer started; restarting");
        if let Err(e) = self.launcher.request_restart().await {
            warn!("Restart request failed: {}", e);
        }
        ActionResult::ok()
    }

    pub async fn set_install_on_close(
        &self,
        enabled: bool,
        download_path: Option<PathBuf>,
    ) -> ActionResult {
        self.set_schedule(ScheduleMode::OnClose, enabled, download_path).await
    }

    pub async fn set_install_on_next_launch(
        &self,
        enabled: bool,
        download_path: Option<PathBuf>,
    ) -> ActionResult {
        self.set_schedule(ScheduleMode::OnNextLaunch, enabled, download_path).await
    }

    async fn set_schedule(
        &self,
        mode: ScheduleMode,
        enabled: bool,
        download_path: Option<PathBuf>,
    ) -> ActionResult {
        let mut scheduler = self.scheduler.lock().await;
        let result = if enabled {
            scheduler.schedule(mode, download_path).await.map(|_| ())
        } else {
            scheduler.cancel_schedule(mode).await
        };
        match result {
            Ok(()) => ActionResult::ok(),
            Err(e) => ActionResult::failed(&e),
        }
    }

    /// Startup hook: runs an install deferred to this launch.
    ///
    /// Never fails. A pending choice whose installer vanished is discarded and
    /// reported in `error`.
    pub async fn on_startup(&self) -> LifecycleOutcome {
        let mut scheduler = self.scheduler.lock().await;
        let action = scheduler.on_startup().await;
        self.run_lifecycle(&mut scheduler, action, false).await
    }

    /// Close hook: cancels a running download and runs an install deferred to
    /// close. The host may always exit afterwards.
    pub async fn on_before_close(&self) -> LifecycleOutcome {
        if self.downloads.cancel_active().await.is_some() {
            self.wait_for_settle().await;
        }

        let mut scheduler = self.scheduler.lock().await;
        let action = scheduler.on_before_close().await;
        self.run_lifecycle(&mut scheduler, action, true).await
    }

    async fn run_lifecycle(
        &self,
        scheduler: &mut InstallScheduler,
        action: LifecycleAction,
        quitting: bool,
    ) -> LifecycleOutcome {
        match action {
            LifecycleAction::Nothing => LifecycleOutcome {
                launched: None,
                should_quit: quitting,
                error: None,
            },
            LifecycleAction::Discarded(e) => LifecycleOutcome {
                launched: None,
                should_quit: quitting,
                error: Some(e.to_string()),
            },
            LifecycleAction::LaunchInstaller(path) => match self.launcher.launch(&path).await {
                Ok(()) => {
                    if let Err(e) = self.launcher.request_restart().await {
                        warn!("Restart request failed: {}", e);
                    }
                    LifecycleOutcome {
                        launched: Some(path),
                        should_quit: true,
                        error: None,
                    }
                }
                Err(e) => {
                    warn!("Pending installer failed to launch: {}", e);
                    scheduler.install_failed(e.clone());
                    LifecycleOutcome {
                        launched: None,
                        should_quit: quitting,
                        error: Some(e.to_string()),
                    }
                }
            },
        }
    }

    pub fn subscribe(&self) -> Subscription {
        self.downloads.events().subscribe()
    }

    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.downloads.events().unsubscribe(id)
    }

    /// Snapshot of the session, with live progress while downloading.
    pub async fn session(&self) -> UpdateSession {
        let mut session = self.scheduler.lock().await.session();
        if session.state == InstallState::Downloading {
            session.progress = self.downloads.latest_progress();
        }
        session
    }

    /// Choice persisted for a later close or launch.
    pub async fn pending_choice(&self) -> PendingInstallChoice {
        self.scheduler.lock().await.store().load().await
    }

    /// Return and clear the last non-fatal error.
    pub async fn take_last_error(&self) -> Option<String> {
        self.scheduler.lock().await.take_last_error().map(|e| e.to_string())
    }
}

async fn wait_settled(mut settled: SettledRx) -> DownloadOutcome {
    match settled.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone().unwrap_or(DownloadOutcome::Cancelled),
        Err(_) => DownloadOutcome::Failed(UpdateError::Other {
            message: "download settle task stopped without reporting a result".to_string(),
        }),
    }
}
