//! File system helpers
//!
//! Atomic writes use the temp-and-rename strategy so a crash mid-write never
//! leaves a truncated file behind. The same idea backs installer downloads:
//! bytes go to a `.part` sibling and only a finished transfer is renamed into
//! place.

use anyhow::{Context, Result};
use std::fs;
use std::path::{Path, PathBuf};

/// Suffix appended to in-flight download files.
pub const PARTIAL_SUFFIX: &str = "part";

/// Create a directory and all its parents if missing.
pub fn ensure_dir(path: &Path) -> Result<()> {
    if !path.exists() {
        fs::create_dir_all(path)
            .with_context(|| format!("Failed to create directory: {}", path.display()))?;
    } else if !path.is_dir() {
        anyhow::bail!("Path exists but is not a directory: {}", path.display());
    }
    Ok(())
}

/// Write `content` to `path` through a temporary sibling and a rename.
pub fn atomic_write(path: &Path, content: &[u8]) -> Result<()> {
    use std::io::Write;

    let safe_path = crate::utils::platform::windows_long_path(path);

    if let Some(parent) = safe_path.parent() {
        ensure_dir(parent)?;
    }

    let temp_path = safe_path.with_extension("tmp");

    {
        let mut file = fs::File::create(&temp_path).with_context(|| {
            let platform_help = if crate::utils::platform::is_windows() {
                "On Windows: Check file permissions, path length, and that directory exists"
            } else {
                "Check file permissions and that directory exists"
            };

            format!("Failed to create temp file: {}\n\n{}", temp_path.display(), platform_help)
        })?;

        file.write_all(content)
            .with_context(|| format!("Failed to write to temp file: {}", temp_path.display()))?;

        file.sync_all().with_context(|| "Failed to sync file to disk")?;
    }

    fs::rename(&temp_path, &safe_path)
        .with_context(|| format!("Failed to rename temp file to: {}", safe_path.display()))?;

    Ok(())
}

/// Path of the in-flight sibling for a download destination.
#[must_use]
pub fn partial_path(destination: &Path) -> PathBuf {
    let mut name = destination.file_name().map(|n| n.to_os_string()).unwrap_or_default();
    name.push(".");
    name.push(PARTIAL_SUFFIX);
    destination.with_file_name(name)
}

/// Remove a file, treating "already gone" as success.
pub async fn remove_file_if_exists(path: &Path) -> std::io::Result<bool> {
    match tokio::fs::remove_file(path).await {
        Ok(()) => Ok(true),
        Err(e) if e.kind() == std::io::ErrorKind::NotFound => Ok(false),
        Err(e) => Err(e),
    }
}

/// Whether `path` currently names a regular file.
#[must_use]
pub fn is_existing_file(path: &Path) -> bool {
    path.metadata().map(|m| m.is_file()).unwrap_or(false)
}
