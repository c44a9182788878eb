//! Platform-specific helpers
//!
//! Directory resolution and the small amount of OS detection the updater
//! needs. Directory helpers honor environment overrides so tests and
//! portable installs can redirect state away from the user profile.
//!
//! | Purpose | Override | Default |
//! |---------|----------|---------|
//! | Persistent state | `BRANCHBOOK_DATA_DIR` | `dirs::data_dir()/branchbook` |
//! | Installer downloads | config `upgrade.download_dir` | `$TMPDIR/branchbook-updates` |

use anyhow::Result;
use std::path::{Path, PathBuf};

/// Environment variable overriding the persistent data directory.
pub const DATA_DIR_ENV: &str = "BRANCHBOOK_DATA_DIR";

#[must_use]
pub const fn is_windows() -> bool {
    cfg!(windows)
}

/// Architecture label in the form used by the release registry ("x64", "arm64").
#[must_use]
pub fn current_arch() -> &'static str {
    match std::env::consts::ARCH {
        "x86_64" => "x64",
        "aarch64" => "arm64",
        "x86" => "ia32",
        other => other,
    }
}

/// Directory holding the persisted pending-install choice.
pub fn get_data_dir() -> Result<PathBuf> {
    if let Ok(dir) = std::env::var(DATA_DIR_ENV)
        && !dir.is_empty()
    {
        return Ok(PathBuf::from(dir));
    }

    dirs::data_dir().map(|p| p.join("branchbook")).ok_or_else(|| {
        let platform_help = if is_windows() {
            "On Windows: Check that the APPDATA environment variable is set"
        } else if cfg!(target_os = "macos") {
            "On macOS: Check that the HOME environment variable is set"
        } else {
            "On Linux: Check that the XDG_DATA_HOME or HOME environment variable is set"
        };
        anyhow::anyhow!(
            "Could not determine data directory.\n\n{platform_help}\nOr set {DATA_DIR_ENV} explicitly"
        )
    })
}

/// Default directory installers are downloaded into.
#[must_use]
pub fn default_download_dir() -> PathBuf {
    std::env::temp_dir().join(crate::constants::DOWNLOAD_DIR_NAME)
}

#[cfg(windows)]
pub fn windows_long_path(path: &Path) -> PathBuf {
    let path_str = path.to_string_lossy();
    if path_str.len() > 260 && !path_str.starts_with(r"\\?\") {
        let absolute_path = if path.is_relative() {
            std::env::current_dir().unwrap_or_else(|_| PathBuf::from(".")).join(path)
        } else {
            path.to_path_buf()
        };

        let absolute_str = absolute_path.to_string_lossy();
        if absolute_str.len() > 260 {
            if let Some(stripped) = absolute_str.strip_prefix(r"\\") {
                PathBuf::from(format!(r"\\?\UNC\{}", stripped))
            } else {
                PathBuf::from(format!(r"\\?\{}", absolute_str))
            }
        } else {
            absolute_path
        }
    } else {
        path.to_path_buf()
    }
}

#[cfg(not(windows))]
pub fn windows_long_path(path: &Path) -> PathBuf {
    path.to_path_buf()
}
