//! Version registry client.
//!
//! Published builds live in a table of the hosted backend and are read through
//! its PostgREST-style query endpoint:
//!
//! ```text
//! GET {url}/rest/v1/{table}?select=*&status=eq.published&platform=eq.darwin
//!     &order=created_at.desc&limit=1
//! apikey: <key>
//! Authorization: Bearer <key>
//! ```
//!
//! Rows come back as loosely typed JSON. They are decoded into [`VersionRow`]
//! and validated into [`VersionRecord`] here, at the boundary; nothing past
//! this module sees raw JSON.

use crate::constants::USER_AGENT;
use crate::core::UpdateError;
use async_trait::async_trait;
use chrono::{DateTime, NaiveDateTime, Utc};
use serde::{Deserialize, Serialize};
use std::fmt;
use std::str::FromStr;
use std::time::Duration;
use tracing::{debug, warn};

/// Operating system family a build targets.
///
/// The registry stores the identifiers used by the desktop shell
/// (`win32`, `darwin`, `linux`); common aliases are accepted on input.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum Platform {
    #[serde(rename = "win32", alias = "windows")]
    Windows,
    #[serde(rename = "darwin", alias = "macos")]
    MacOs,
    #[serde(rename = "linux")]
    Linux,
}

impl Platform {
    /// Platform of the running binary.
    #[must_use]
    pub const fn current() -> Self {
        if cfg!(windows) {
            Self::Windows
        } else if cfg!(target_os = "macos") {
            Self::MacOs
        } else {
            Self::Linux
        }
    }

    /// Identifier stored in the registry.
    #[must_use]
    pub const fn as_registry_id(self) -> &'static str {
        match self {
            Self::Windows => "win32",
            Self::MacOs => "darwin",
            Self::Linux => "linux",
        }
    }
}

impl fmt::Display for Platform {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_registry_id())
    }
}

impl FromStr for Platform {
    type Err = UpdateError;

    fn from_str(s: &str) -> Result<Self, Self::Err> {
        match s.trim().to_ascii_lowercase().as_str() {
            "win32" | "windows" | "win" => Ok(Self::Windows),
            "darwin" | "macos" | "mac" | "osx" => Ok(Self::MacOs),
            "linux" => Ok(Self::Linux),
            other => Err(UpdateError::RegistryResponse {
                reason: format!("unknown platform '{other}'"),
            }),
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ReleaseStatus {
    Draft,
    Published,
}

/// One published build for one platform and architecture.
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct VersionRecord {
    pub version: String,
    pub platform: Platform,
    pub architecture: String,
    pub download_url: String,
    pub file_size_bytes: u64,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub release_notes: Option<String>,
    pub status: ReleaseStatus,
    pub created_at: DateTime<Utc>,
    /// Hex SHA-256 of the installer, when the release tooling recorded one.
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub sha256: Option<String>,
}

impl VersionRecord {
    #[must_use]
    pub fn is_published(&self) -> bool {
        self.status == ReleaseStatus::Published
    }
}

/// Size column as stored; some rows carry it as a string.
#[derive(Debug, Deserialize)]
#[serde(untagged)]
enum LooseSize {
    Number(u64),
    Text(String),
}

/// A registry row exactly as the backend returns it.
#[derive(Debug, Deserialize)]
pub struct VersionRow {
    version: Option<String>,
    platform: Option<String>,
    #[serde(alias = "arch")]
    architecture: Option<String>,
    #[serde(alias = "downloadUrl", alias = "url")]
    download_url: Option<String>,
    #[serde(alias = "fileSize", alias = "file_size_bytes")]
    file_size: Option<LooseSize>,
    #[serde(alias = "releaseNotes", alias = "notes")]
    release_notes: Option<String>,
    status: Option<String>,
    #[serde(alias = "createdAt")]
    created_at: Option<String>,
    #[serde(alias = "checksum")]
    sha256: Option<String>,
}

impl TryFrom<VersionRow> for VersionRecord {
    type Error = UpdateError;

    fn try_from(row: VersionRow) -> Result<Self, Self::Error> {
        let missing = |field: &str| UpdateError::RegistryResponse {
            reason: format!("row is missing '{field}'"),
        };

        let version = row
            .version
            .map(|v| v.trim().to_string())
            .filter(|v| !v.is_empty())
            .ok_or_else(|| missing("version"))?;
        let platform = row.platform.ok_or_else(|| missing("platform"))?.parse::<Platform>()?;
        let download_url = row
            .download_url
            .map(|u| u.trim().to_string())
            .filter(|u| !u.is_empty())
            .ok_or_else(|| missing("download_url"))?;

        let status = match row.status.as_deref().map(str::to_ascii_lowercase).as_deref() {
            Some("published") => ReleaseStatus::Published,
            Some("draft") => ReleaseStatus::Draft,
            Some(other) => {
                return Err(UpdateError::RegistryResponse {
                    reason: format!("unknown status '{other}'"),
                });
            }
            None => return Err(missing("status")),
        };

        let file_size_bytes = match row.file_size {
            Some(LooseSize::Number(n)) => n,
            Some(LooseSize::Text(s)) => s.trim().parse().unwrap_or(0),
            None => 0,
        };

        let created_at = row.created_at.as_deref().map(parse_created_at).unwrap_or_default();

        Ok(Self {
            version,
            platform,
            architecture: row.architecture.unwrap_or_default(),
            download_url,
            file_size_bytes,
            release_notes: row.release_notes.filter(|n| !n.trim().is_empty()),
            status,
            created_at,
            sha256: row.sha256.map(|s| s.trim().to_ascii_lowercase()).filter(|s| !s.is_empty()),
        })
    }
}

/// Source of published builds.
///
/// Implementations return the newest `published` record for `platform`, or
/// `None` when there is none.
#[async_trait]
pub trait VersionRegistry: Send + Sync {
    async fn latest_published(
        &self,
        platform: Platform,
    ) -> Result<Option<VersionRecord>, UpdateError>;
}

/// Registry backed by the hosted backend's REST query layer.
#[derive(Clone)]
pub struct HttpVersionRegistry {
    client: reqwest::Client,
    base_url: String,
    table: String,
    api_key: Option<String>,
    timeout: Duration,
}

impl HttpVersionRegistry {
    pub fn new(
        base_url: impl Into<String>,
        table: impl Into<String>,
        api_key: Option<String>,
        timeout: Duration,
    ) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .timeout(timeout)
            .connect_timeout(timeout)
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpdateError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            base_url: base_url.into().trim_end_matches('/').to_string(),
            table: table.into(),
            api_key,
            timeout,
        })
    }

    fn endpoint(&self) -> String {
        format!("{}/rest/v1/{}", self.base_url, self.table)
    }
}

#[async_trait]
impl VersionRegistry for HttpVersionRegistry {
    async fn latest_published(
        &self,
        platform: Platform,
    ) -> Result<Option<VersionRecord>, UpdateError> {
        const OPERATION: &str = "querying the version registry";
        let timeout_secs = self.timeout.as_secs();

        if self.base_url.is_empty() {
            return Err(UpdateError::Config {
                message: "registry.url is not set".to_string(),
            });
        }

        let platform_filter = format!("eq.{}", platform.as_registry_id());
        let mut request = self.client.get(self.endpoint()).query(&[
            ("select", "*"),
            ("status", "eq.published"),
            ("platform", platform_filter.as_str()),
            ("order", "created_at.desc"),
            ("limit", "1"),
        ]);
        if let Some(key) = &self.api_key {
            request = request.header("apikey", key).bearer_auth(key);
        }

        debug!("Querying version registry for platform {}", platform);
        let response = request
            .send()
            .await
            .map_err(|e| UpdateError::from_transport(OPERATION, &e, timeout_secs))?;

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::HttpStatus {
                status: status.as_u16(),
                url: self.endpoint(),
            });
        }

        let rows: Vec<VersionRow> = response.json().await.map_err(|e| {
            if e.is_timeout() {
                UpdateError::from_transport(OPERATION, &e, timeout_secs)
            } else {
                UpdateError::RegistryResponse {
                    reason: e.to_string(),
                }
            }
        })?;

        let Some(row) = rows.into_iter().next() else {
            debug!("No published build for {}", platform);
            return Ok(None);
        };

        let record = VersionRecord::try_from(row)?;
        if !record.is_published() || record.platform != platform {
            warn!(
                "Registry returned a {:?} record for {} while asking for published {}",
                record.status, record.platform, platform
            );
            return Ok(None);
        }

        Ok(Some(record))
    }
}

/// Parse a registry timestamp. Offset-less values are read as UTC; anything
/// unreadable falls back to the epoch since the field only orders rows.
fn parse_created_at(ts: &str) -> DateTime<Utc> {
    let ts = ts.trim();
    if let Ok(dt) = DateTime::parse_from_rfc3339(ts) {
        return dt.with_timezone(&Utc);
    }
    for format in ["%Y-%m-%dT%H:%M:%S%.f", "%Y-%m-%d %H:%M:%S%.f"] {
        if let Ok(naive) = NaiveDateTime::parse_from_str(ts, format) {
            return naive.and_utc();
        }
    }
    warn!("Ignoring unreadable created_at '{}'", ts);
    DateTime::default()
}
