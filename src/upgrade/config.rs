use serde::{Deserialize, Serialize};
use std::path::PathBuf;
use std::time::Duration;

/// Update behavior settings, the `[upgrade]` table of `config.toml`.
///
/// # Default Behavior
///
/// - check once when the application starts
/// - re-check every 4 hours while it keeps running
/// - give the registry 15 seconds to answer
/// - download into `branchbook-updates` under the system temp directory
///
/// # TOML Example
///
/// ```toml
/// [upgrade]
/// check_on_startup = true
/// check_interval = 14400
/// check_timeout = 15
/// download_dir = "/var/tmp/branchbook-updates"
/// ```
///
/// ```rust
/// use branchbook_updater::upgrade::config::UpgradeConfig;
///
/// let config = UpgradeConfig::default();
/// assert!(config.check_on_startup);
/// assert_eq!(config.check_interval, 14400);
/// ```
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct UpgradeConfig {
    /// Whether the host runs an update check right after startup.
    #[serde(default = "default_check_on_startup")]
    pub check_on_startup: bool,

    /// Seconds between periodic checks. `0` disables the periodic check.
    #[serde(default = "default_check_interval")]
    pub check_interval: u64,

    /// Seconds before a registry query is abandoned.
    ///
    /// Applies to the version check only; downloads have no timeout and are
    /// stopped by cancellation instead.
    #[serde(default = "default_check_timeout")]
    pub check_timeout: u64,

    /// Where installers are downloaded. Defaults to a directory under the
    /// system temp directory.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_dir: Option<PathBuf>,
}

impl Default for UpgradeConfig {
    fn default() -> Self {
        Self {
            check_on_startup: default_check_on_startup(),
            check_interval: default_check_interval(),
            check_timeout: default_check_timeout(),
            download_dir: None,
        }
    }
}

const fn default_check_on_startup() -> bool {
    true
}

/// Four hours.
const fn default_check_interval() -> u64 {
    14_400
}

const fn default_check_timeout() -> u64 {
    15
}

impl UpgradeConfig {
    pub fn new() -> Self {
        Self::default()
    }

    /// Periodic check interval, `None` when disabled.
    #[must_use]
    pub const fn interval(&self) -> Option<Duration> {
        if self.check_interval == 0 {
            None
        } else {
            Some(Duration::from_secs(self.check_interval))
        }
    }

    /// Registry timeout; a zero value falls back to the default.
    #[must_use]
    pub const fn timeout(&self) -> Duration {
        if self.check_timeout == 0 {
            Duration::from_secs(default_check_timeout())
        } else {
            Duration::from_secs(self.check_timeout)
        }
    }

    /// Configured download directory or the temp-dir default.
    #[must_use]
    pub fn resolved_download_dir(&self) -> PathBuf {
        self.download_dir.clone().unwrap_or_else(crate::utils::platform::default_download_dir)
    }
}
