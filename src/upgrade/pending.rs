//! Persisted install choice.
//!
//! When the user defers installation the choice is written to
//! `pending_install.json` in the data directory so the next process can act on
//! it:
//!
//! ```json
//! {"mode": "installOnNextLaunch", "downloadPath": "/tmp/branchbook-updates/Branchbook-Setup-2.0.0.exe"}
//! ```
//!
//! The file is written atomically. A missing, empty or unreadable file reads
//! as [`PendingInstallChoice::none`]; a corrupt file is logged and ignored
//! rather than blocking startup.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tracing::{debug, warn};

use crate::utils::fs::atomic_write;

pub const PENDING_INSTALL_FILE: &str = "pending_install.json";

#[derive(Debug, Clone, Copy, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PendingInstallMode {
    #[default]
    None,
    InstallOnClose,
    InstallOnNextLaunch,
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct PendingInstallChoice {
    #[serde(default)]
    pub mode: PendingInstallMode,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub download_path: Option<PathBuf>,
}

impl PendingInstallChoice {
    #[must_use]
    pub fn none() -> Self {
        Self::default()
    }

    #[must_use]
    pub fn new(mode: PendingInstallMode, download_path: impl Into<PathBuf>) -> Self {
        Self {
            mode,
            download_path: Some(download_path.into()),
        }
    }

    /// A choice that can be acted on: a mode other than `none` and a path.
    #[must_use]
    pub fn is_actionable(&self) -> bool {
        self.mode != PendingInstallMode::None && self.download_path.is_some()
    }
}

/// File-backed storage for the [`PendingInstallChoice`].
#[derive(Debug, Clone)]
pub struct PendingInstallStore {
    path: PathBuf,
}

impl PendingInstallStore {
    /// Store at `pending_install.json` inside `data_dir`.
    pub fn in_dir(data_dir: &Path) -> Self {
        Self {
            path: data_dir.join(PENDING_INSTALL_FILE),
        }
    }

    pub fn path(&self) -> &Path {
        &self.path
    }

    pub async fn load(&self) -> PendingInstallChoice {
        let content = match tokio::fs::read_to_string(&self.path).await {
            Ok(content) => content,
            Err(e) if e.kind() == std::io::ErrorKind::NotFound => {
                return PendingInstallChoice::none();
            }
            Err(e) => {
                warn!("Could not read {}: {}", self.path.display(), e);
                return PendingInstallChoice::none();
            }
        };

        if content.trim().is_empty() {
            return PendingInstallChoice::none();
        }

        match serde_json::from_str::<PendingInstallChoice>(&content) {
            Ok(choice) if choice.is_actionable() => {
                debug!("Loaded pending install choice {:?}", choice.mode);
                choice
            }
            Ok(_) => PendingInstallChoice::none(),
            Err(e) => {
                warn!("Ignoring corrupt {}: {}", self.path.display(), e);
                PendingInstallChoice::none()
            }
        }
    }

    /// Persist `choice`; a `none` choice clears the file instead.
    pub async fn save(&self, choice: &PendingInstallChoice) -> Result<()> {
        if !choice.is_actionable() {
            return self.clear().await;
        }

        let json = serde_json::to_vec_pretty(choice)
            .context("Failed to serialize pending install choice")?;
        let path = self.path.clone();
        tokio::task::spawn_blocking(move || atomic_write(&path, &json))
            .await
            .context("Pending install writer panicked")?
            .with_context(|| format!("Failed to save {}", self.path.display()))?;

        debug!("Saved pending install choice {:?}", choice.mode);
        Ok(())
    }

    pub async fn clear(&self) -> Result<()> {
        crate::utils::fs::remove_file_if_exists(&self.path)
            .await
            .with_context(|| format!("Failed to remove {}", self.path.display()))?;
        Ok(())
    }
}
