//! Global configuration for the updater.
//!
//! # Location
//!
//! - **Unix/macOS**: `~/.branchbook/config.toml`
//! - **Windows**: `%LOCALAPPDATA%\branchbook\config.toml`
//! - **Override**: `BRANCHBOOK_CONFIG_PATH` or `--config <PATH>`
//!
//! A missing file is not an error; defaults apply.
//!
//! # File Format
//!
//! ```toml
//! [registry]
//! url = "https://project.example.co"
//! api_key = "public-anon-key"
//! table = "app_versions"
//!
//! [upgrade]
//! check_on_startup = true
//! check_interval = 14400
//! check_timeout = 15
//! ```
//!
//! # Security
//!
//! The registry key is the backend's public anonymous key, but the file is
//! still written with `0600` permissions on Unix.

use anyhow::{Context, Result};
use serde::{Deserialize, Serialize};
use std::path::{Path, PathBuf};
use tokio::fs;

use crate::upgrade::config::UpgradeConfig;

/// Environment variable overriding the config file location.
pub const CONFIG_PATH_ENV: &str = "BRANCHBOOK_CONFIG_PATH";

const DEFAULT_TABLE: &str = "app_versions";

fn default_table() -> String {
    DEFAULT_TABLE.to_string()
}

/// Connection settings for the version registry, the `[registry]` table.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RegistryConfig {
    /// Base URL of the hosted backend, without the `/rest/v1` suffix.
    #[serde(default)]
    pub url: String,

    /// Key sent as `apikey` and `Authorization: Bearer`.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub api_key: Option<String>,

    /// Table holding the version records.
    #[serde(default = "default_table")]
    pub table: String,
}

impl Default for RegistryConfig {
    fn default() -> Self {
        Self {
            url: String::new(),
            api_key: None,
            table: default_table(),
        }
    }
}

impl RegistryConfig {
    #[must_use]
    pub fn is_configured(&self) -> bool {
        !self.url.trim().is_empty()
    }
}

#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct GlobalConfig {
    #[serde(default)]
    pub registry: RegistryConfig,

    #[serde(default)]
    pub upgrade: UpgradeConfig,
}

impl GlobalConfig {
    /// Load from the default location, or defaults if the file is missing.
    ///
    /// ```rust,no_run
    /// use branchbook_updater::config::GlobalConfig;
    ///
    /// # async fn example() -> anyhow::Result<()> {
    /// let config = GlobalConfig::load().await?;
    /// println!("Registry: {}", config.registry.url);
    /// # Ok(())
    /// # }
    /// ```
    pub async fn load() -> Result<Self> {
        Self::load_with_optional(None).await
    }

    /// Load from `path` when given, otherwise from [`Self::default_path`].
    pub async fn load_with_optional(path: Option<PathBuf>) -> Result<Self> {
        let path = match path {
            Some(path) => path,
            None => Self::default_path()?,
        };
        if path.exists() {
            Self::load_from(&path).await
        } else {
            Ok(Self::default())
        }
    }

    /// # Errors
    ///
    /// Returns an error if the file cannot be read or is not valid TOML for
    /// this schema.
    pub async fn load_from(path: &Path) -> Result<Self> {
        let content = fs::read_to_string(path)
            .await
            .with_context(|| format!("Failed to read config from {}", path.display()))?;

        toml::from_str(&content)
            .with_context(|| format!("Failed to parse config from {}", path.display()))
    }

    /// Write the config as TOML, creating parent directories.
    pub async fn save_to(&self, path: &Path) -> Result<()> {
        if let Some(parent) = path.parent() {
            fs::create_dir_all(parent).await.with_context(|| {
                format!("Failed to create config directory: {}", parent.display())
            })?;
        }

        let content = toml::to_string_pretty(self).context("Failed to serialize config")?;

        fs::write(path, content)
            .await
            .with_context(|| format!("Failed to write config to {}", path.display()))?;

        #[cfg(unix)]
        {
            use std::os::unix::fs::PermissionsExt;

            let mut perms = fs::metadata(path)
                .await
                .with_context(|| format!("Failed to read permissions for {}", path.display()))?
                .permissions();
            perms.set_mode(0o600);
            fs::set_permissions(path, perms).await.with_context(|| {
                format!("Failed to set permissions on {}", path.display())
            })?;
        }

        Ok(())
    }

    /// Platform default config path, honoring `BRANCHBOOK_CONFIG_PATH`.
    pub fn default_path() -> Result<PathBuf> {
        if let Ok(path) = std::env::var(CONFIG_PATH_ENV)
            && !path.trim().is_empty()
        {
            return Ok(PathBuf::from(path));
        }

        let config_dir = if cfg!(target_os = "windows") {
            dirs::data_local_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine local data directory"))?
                .join("branchbook")
        } else {
            dirs::home_dir()
                .ok_or_else(|| anyhow::anyhow!("Unable to determine home directory"))?
                .join(".branchbook")
        };

        Ok(config_dir.join("config.toml"))
    }

    /// Example config with placeholder registry settings.
    pub fn init_example() -> Self {
        Self {
            registry: RegistryConfig {
                url: "https://your-project.example.co".to_string(),
                api_key: Some("YOUR_ANON_KEY".to_string()),
                table: default_table(),
            },
            upgrade: UpgradeConfig::default(),
        }
    }
}
