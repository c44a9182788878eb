use serde::Serialize;
use std::sync::Arc;
use tracing::{debug, info, warn};

use crate::upgrade::registry::{Platform, VersionRecord, VersionRegistry};
use crate::upgrade::version::is_newer;

/// Outcome of one update check.
///
/// A check never fails from the caller's point of view: transport and decode
/// problems land in `error` with `has_update = false`, so a presenter can
/// render the result without a separate error path.
///
/// # Serialization
///
/// Serialized in camelCase for consumers that expect the same field names as
/// the desktop shell's IPC payloads:
///
/// ```json
/// {"hasUpdate": true, "latestVersion": {"version": "2.0.0", ...}, "error": null}
/// ```
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct UpdateCheckResult {
    /// Whether `latest_version` is strictly newer than the running version.
    pub has_update: bool,
    /// Newest published record for the platform, if the registry has one.
    pub latest_version: Option<VersionRecord>,
    /// Human readable failure, set only when the check itself failed.
    pub error: Option<String>,
}

impl UpdateCheckResult {
    fn failed(message: String) -> Self {
        Self {
            has_update: false,
            latest_version: None,
            error: Some(message),
        }
    }
}

/// Compares the running version against the newest published build.
///
/// `UpdateChecker` holds no state of its own beyond the registry handle, so
/// concurrent checks are independent and a check issued while a download is
/// running has no effect on that download.
///
/// # Examples
///
/// ```rust,no_run
/// use branchbook_updater::upgrade::{HttpVersionRegistry, Platform, UpdateChecker};
/// use std::sync::Arc;
/// use std::time::Duration;
///
/// # async fn example() -> anyhow::Result<()> {
/// let registry = HttpVersionRegistry::new(
///     "https://project.example.co",
///     "app_versions",
///     Some("anon-key".to_string()),
///     Duration::from_secs(15),
/// )?;
/// let checker = UpdateChecker::new(Arc::new(registry));
///
/// let result = checker.check_for_update(Platform::current(), "1.4.2").await;
/// if result.has_update {
///     println!("Update available");
/// }
/// # Ok(())
/// # }
/// ```
#[derive(Clone)]
pub struct UpdateChecker {
    registry: Arc<dyn VersionRegistry>,
}

impl UpdateChecker {
    pub fn new(registry: Arc<dyn VersionRegistry>) -> Self {
        Self {
            registry,
        }
    }

    /// Query the registry and compare against `current_version`.
    ///
    /// - no published record: `has_update = false`, no record, no error
    /// - a record not newer than `current_version`: `has_update = false` with
    ///   the record attached
    /// - any failure: `has_update = false` with `error` set
    pub async fn check_for_update(
        &self,
        platform: Platform,
        current_version: &str,
    ) -> UpdateCheckResult {
        debug!("Checking for updates (platform {}, current {})", platform, current_version);

        match self.registry.latest_published(platform).await {
            Ok(Some(record)) => {
                let has_update = is_newer(&record.version, current_version);
                if has_update {
                    info!("Update available: {} -> {}", current_version, record.version);
                } else {
                    debug!(
                        "Latest published {} is not newer than {}",
                        record.version, current_version
                    );
                }
                UpdateCheckResult {
                    has_update,
                    latest_version: Some(record),
                    error: None,
                }
            }
            Ok(None) => {
                debug!("No published build for {}", platform);
                UpdateCheckResult::default()
            }
            Err(e) => {
                warn!("Update check failed: {}", e);
                UpdateCheckResult::failed(e.to_string())
            }
        }
    }
}
