//! Test utilities for branchbook-updater
//!
//! Available to unit tests and, through the `test-utils` feature, to the
//! integration suite:
//! - [`init_test_logging`] - one-time tracing setup honoring `RUST_LOG`
//! - [`StaticRegistry`] - in-memory [`VersionRegistry`] with a call counter
//! - [`RecordingLauncher`] - [`InstallerLauncher`] that records instead of
//!   spawning processes
//! - [`TestEnvironment`] - temp download and data directories plus an
//!   [`Updater`] wired to the fakes above
//!
//! # Example
//!
//! ```rust,no_run
//! use branchbook_updater::test_utils::{TestEnvironment, sample_record};
//!
//! # async fn example() {
//! let env = TestEnvironment::new();
//! env.registry.set(Some(sample_record("2.0.0", "https://cdn.example.com/a.exe")));
//! let updater = env.updater("1.1.0");
//! assert!(updater.check_for_updates().await.has_update);
//! # }
//! ```

use async_trait::async_trait;
use chrono::{TimeZone, Utc};
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicBool, AtomicUsize, Ordering};
use std::sync::{Arc, Mutex, Once, PoisonError};
use tempfile::TempDir;
use tracing::Level;
use tracing_subscriber::EnvFilter;

use crate::core::UpdateError;
use crate::upgrade::{
    InstallerLauncher, Platform, ReleaseStatus, Updater, VersionRecord, VersionRegistry,
};

static INIT_LOGGING: Once = Once::new();

/// Initialize logging for tests.
///
/// Runs once per process. Uses `level` when given, otherwise `RUST_LOG`, and
/// stays silent when neither is set.
///
/// ```bash
/// RUST_LOG=branchbook_updater=debug cargo test
/// ```
pub fn init_test_logging(level: Option<Level>) {
    INIT_LOGGING.call_once(|| {
        let filter = if let Some(level) = level {
            EnvFilter::new(level.to_string())
        } else if std::env::var("RUST_LOG").is_ok() {
            EnvFilter::from_default_env()
        } else {
            return;
        };

        let _ = tracing_subscriber::fmt()
            .with_env_filter(filter)
            .with_test_writer()
            .with_target(true)
            .with_thread_ids(false)
            .try_init();
    });
}

/// Published record for the current platform with fixed metadata.
pub fn sample_record(version: &str, download_url: &str) -> VersionRecord {
    VersionRecord {
        version: version.to_string(),
        platform: Platform::current(),
        architecture: crate::utils::platform::current_arch().to_string(),
        download_url: download_url.to_string(),
        file_size_bytes: 0,
        release_notes: Some(format!("Branchbook {version}")),
        status: ReleaseStatus::Published,
        created_at: Utc.with_ymd_and_hms(2026, 9, 1, 12, 0, 0).single().unwrap_or_default(),
        sha256: None,
    }
}

/// In-memory registry returning whatever was last [`set`](Self::set).
#[derive(Default)]
pub struct StaticRegistry {
    response: Mutex<Option<Result<Option<VersionRecord>, UpdateError>>>,
    calls: AtomicUsize,
}

impl StaticRegistry {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn set(&self, record: Option<VersionRecord>) {
        *self.response.lock().unwrap_or_else(PoisonError::into_inner) = Some(Ok(record));
    }

    pub fn fail(&self, error: UpdateError) {
        *self.response.lock().unwrap_or_else(PoisonError::into_inner) = Some(Err(error));
    }

    pub fn calls(&self) -> usize {
        self.calls.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl VersionRegistry for StaticRegistry {
    async fn latest_published(
        &self,
        platform: Platform,
    ) -> Result<Option<VersionRecord>, UpdateError> {
        self.calls.fetch_add(1, Ordering::SeqCst);
        let response = self.response.lock().unwrap_or_else(PoisonError::into_inner).clone();
        match response {
            Some(Ok(Some(record))) if record.platform == platform && record.is_published() => {
                Ok(Some(record))
            }
            Some(Ok(_)) | None => Ok(None),
            Some(Err(e)) => Err(e),
        }
    }
}

/// Launcher that records calls and can be told to fail launches.
#[derive(Default)]
pub struct RecordingLauncher {
    launched: Mutex<Vec<PathBuf>>,
    opened: Mutex<Vec<String>>,
    restarts: AtomicUsize,
    fail_launch: AtomicBool,
}

impl RecordingLauncher {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn fail_launches(&self, fail: bool) {
        self.fail_launch.store(fail, Ordering::SeqCst);
    }

    pub fn launched(&self) -> Vec<PathBuf> {
        self.launched.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn opened_urls(&self) -> Vec<String> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).clone()
    }

    pub fn restarts(&self) -> usize {
        self.restarts.load(Ordering::SeqCst)
    }
}

#[async_trait]
impl InstallerLauncher for RecordingLauncher {
    async fn launch(&self, installer: &Path) -> Result<(), UpdateError> {
        if self.fail_launch.load(Ordering::SeqCst) {
            return Err(UpdateError::LaunchFailed {
                path: installer.display().to_string(),
                reason: "launch disabled in test".to_string(),
            });
        }
        self.launched.lock().unwrap_or_else(PoisonError::into_inner).push(installer.to_path_buf());
        Ok(())
    }

    async fn open_url(&self, url: &str) -> Result<(), UpdateError> {
        self.opened.lock().unwrap_or_else(PoisonError::into_inner).push(url.to_string());
        Ok(())
    }

    async fn request_restart(&self) -> Result<(), UpdateError> {
        self.restarts.fetch_add(1, Ordering::SeqCst);
        Ok(())
    }
}

/// Temp directories plus fakes for building [`Updater`]s.
///
/// Several updaters built from one environment share the data directory,
/// which is how a restart is simulated.
pub struct TestEnvironment {
    pub temp: TempDir,
    pub registry: Arc<StaticRegistry>,
    pub launcher: Arc<RecordingLauncher>,
}

impl TestEnvironment {
    /// # Panics
    ///
    /// When the temp directory cannot be created.
    pub fn new() -> Self {
        init_test_logging(None);
        Self {
            temp: TempDir::new().expect("create temp dir"),
            registry: Arc::new(StaticRegistry::new()),
            launcher: Arc::new(RecordingLauncher::new()),
        }
    }

    pub fn download_dir(&self) -> PathBuf {
        self.temp.path().join("downloads")
    }

    pub fn data_dir(&self) -> PathBuf {
        self.temp.path().join("data")
    }

    /// A fresh updater (a new "process") reporting `app_version`.
    ///
    /// # Panics
    ///
    /// When the HTTP client cannot be built.
    pub fn updater(&self, app_version: &str) -> Updater {
        Updater::new(
            self.registry.clone(),
            self.launcher.clone(),
            self.download_dir(),
            &self.data_dir(),
        )
        .expect("build updater")
        .with_app_version(app_version)
    }

    /// Write a fake installer into the download directory.
    ///
    /// # Panics
    ///
    /// When the file cannot be written.
    pub fn installer(&self, name: &str) -> PathBuf {
        let dir = self.download_dir();
        std::fs::create_dir_all(&dir).expect("create download dir");
        let path = dir.join(name);
        std::fs::write(&path, b"MZ fake installer").expect("write installer");
        path
    }
}

impl Default for TestEnvironment {
    fn default() -> Self {
        Self::new()
    }
}
