//! Error handling for the update coordinator
//!
//! The error system follows two rules:
//! 1. **Strongly-typed errors** ([`UpdateError`]) so callers can match on the
//!    failure class instead of parsing strings
//! 2. **User-friendly messages** ([`ErrorContext`]) with an actionable
//!    suggestion for the CLI
//!
//! # Error Categories
//!
//! Every [`UpdateError`] maps to one [`ErrorKind`]:
//! - **Transient**: network failures, timeouts, HTTP errors. Retrying may help.
//! - **Validation**: malformed URLs, disallowed file names. Rejected before any I/O.
//! - **Conflict**: the current state forbids the request (a download is already
//!   running, nothing is downloaded yet). Retrying without changing the state
//!   will not help.
//! - **Fatal**: disk and permission problems, corrupt downloads, installer
//!   launch failures.
//!
//! No variant carries a non-`Clone` source, so errors can be stored in the
//! session and replayed into events.

use colored::Colorize;
use std::fmt;
use std::path::Path;
use thiserror::Error;

/// Classification used to decide how an error is surfaced and whether a retry
/// is offered.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ErrorKind {
    Transient,
    Validation,
    Conflict,
    Fatal,
}

impl fmt::Display for ErrorKind {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        let label = match self {
            Self::Transient => "transient",
            Self::Validation => "validation",
            Self::Conflict => "conflict",
            Self::Fatal => "fatal",
        };
        f.write_str(label)
    }
}

#[derive(Error, Debug, Clone, PartialEq, Eq)]
pub enum UpdateError {
    #[error("Network error while {operation}: {reason}")]
    Network {
        operation: String,
        reason: String,
    },

    #[error("Timed out after {seconds}s while {operation}")]
    Timeout {
        operation: String,
        seconds: u64,
    },

    #[error("Server responded with HTTP {status} for {url}")]
    HttpStatus {
        status: u16,
        url: String,
    },

    #[error("Invalid response from version registry: {reason}")]
    RegistryResponse {
        reason: String,
    },

    #[error("Invalid download URL '{url}': {reason}")]
    InvalidUrl {
        url: String,
        reason: String,
    },

    #[error("Invalid file name '{name}': {reason}")]
    InvalidFileName {
        name: String,
        reason: String,
    },

    #[error("An update is already downloading")]
    AlreadyDownloading,

    #[error("No download is in progress")]
    NoActiveDownload,

    #[error("No downloaded installer is available")]
    NoDownloadedInstaller,

    #[error("Installer not found at {path}")]
    InstallerMissing {
        path: String,
    },

    #[error("Cannot {action} while {state}")]
    InvalidTransition {
        action: String,
        state: String,
    },

    #[error("File system error while {operation} ({path}): {reason}")]
    FileSystem {
        operation: String,
        path: String,
        reason: String,
    },

    #[error("Checksum mismatch for {path}: expected {expected}, got {actual}")]
    ChecksumMismatch {
        path: String,
        expected: String,
        actual: String,
    },

    #[error("Failed to launch installer {path}: {reason}")]
    LaunchFailed {
        path: String,
        reason: String,
    },

    #[error("Configuration error: {message}")]
    Config {
        message: String,
    },

    #[error("{message}")]
    Other {
        message: String,
    },
}

impl UpdateError {
    #[must_use]
    pub const fn kind(&self) -> ErrorKind {
        match self {
            Self::Network {
                ..
            }
            | Self::Timeout {
                ..
            }
            | Self::HttpStatus {
                ..
            }
            | Self::RegistryResponse {
                ..
            } => ErrorKind::Transient,
            Self::InvalidUrl {
                ..
            }
            | Self::InvalidFileName {
                ..
            }
            | Self::Config {
                ..
            } => ErrorKind::Validation,
            Self::AlreadyDownloading
            | Self::NoActiveDownload
            | Self::NoDownloadedInstaller
            | Self::InstallerMissing {
                ..
            }
            | Self::InvalidTransition {
                ..
            } => ErrorKind::Conflict,
            Self::FileSystem {
                ..
            }
            | Self::ChecksumMismatch {
                ..
            }
            | Self::LaunchFailed {
                ..
            }
            | Self::Other {
                ..
            } => ErrorKind::Fatal,
        }
    }

    /// Whether offering a plain "retry" to the user makes sense.
    #[must_use]
    pub const fn is_retryable(&self) -> bool {
        matches!(self.kind(), ErrorKind::Transient)
    }

    pub fn file_system(operation: impl Into<String>, path: &Path, err: &std::io::Error) -> Self {
        Self::FileSystem {
            operation: operation.into(),
            path: path.display().to_string(),
            reason: err.to_string(),
        }
    }

    pub fn installer_missing(path: &Path) -> Self {
        Self::InstallerMissing {
            path: path.display().to_string(),
        }
    }

    /// Map a transport error from `reqwest`, keeping timeouts distinct.
    pub fn from_transport(operation: &str, err: &reqwest::Error, timeout_secs: u64) -> Self {
        if err.is_timeout() {
            return Self::Timeout {
                operation: operation.to_string(),
                seconds: timeout_secs,
            };
        }
        if let Some(status) = err.status() {
            return Self::HttpStatus {
                status: status.as_u16(),
                url: err.url().map(ToString::to_string).unwrap_or_default(),
            };
        }
        Self::Network {
            operation: operation.to_string(),
            reason: err.to_string(),
        }
    }
}

/// An [`UpdateError`] decorated with details and a suggestion for display.
#[derive(Debug)]
pub struct ErrorContext {
    pub error: UpdateError,
    pub suggestion: Option<String>,
    pub details: Option<String>,
}

impl ErrorContext {
    #[must_use]
    pub const fn new(error: UpdateError) -> Self {
        Self {
            error,
            suggestion: None,
            details: None,
        }
    }

    pub fn with_suggestion(mut self, suggestion: impl Into<String>) -> Self {
        self.suggestion = Some(suggestion.into());
        self
    }

    pub fn with_details(mut self, details: impl Into<String>) -> Self {
        self.details = Some(details.into());
        self
    }

    /// Print the error to stderr with colors.
    pub fn display(&self) {
        eprintln!("{}: {}", "error".red().bold(), self.error);

        if let Some(details) = &self.details {
            eprintln!("{}: {}", "details".yellow(), details);
        }

        if let Some(suggestion) = &self.suggestion {
            eprintln!("{}: {}", "suggestion".green(), suggestion);
        }
    }
}

impl fmt::Display for ErrorContext {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "{}", self.error)?;

        if let Some(details) = &self.details {
            write!(f, "\nDetails: {details}")?;
        }

        if let Some(suggestion) = &self.suggestion {
            write!(f, "\nSuggestion: {suggestion}")?;
        }

        Ok(())
    }
}

impl std::error::Error for ErrorContext {}

/// Convert any error into an [`ErrorContext`] suitable for the terminal.
#[must_use]
pub fn user_friendly_error(error: anyhow::Error) -> ErrorContext {
    if let Some(update_error) = error.downcast_ref::<UpdateError>() {
        return create_error_context(update_error.clone());
    }

    if let Some(io_error) = error.downcast_ref::<std::io::Error>() {
        match io_error.kind() {
            std::io::ErrorKind::PermissionDenied => {
                return ErrorContext::new(UpdateError::FileSystem {
                    operation: "accessing a file".to_string(),
                    path: "unknown".to_string(),
                    reason: io_error.to_string(),
                })
                .with_suggestion("Check ownership of the data and download directories");
            }
            std::io::ErrorKind::NotFound => {
                return ErrorContext::new(UpdateError::FileSystem {
                    operation: "accessing a file".to_string(),
                    path: "unknown".to_string(),
                    reason: io_error.to_string(),
                })
                .with_suggestion("Check that the file or directory exists and the path is correct");
            }
            _ => {}
        }
    }

    if let Some(toml_error) = error.downcast_ref::<toml::de::Error>() {
        return ErrorContext::new(UpdateError::Config {
            message: toml_error.to_string(),
        })
        .with_suggestion("Check the TOML syntax of your config.toml");
    }

    // Generic error: keep the whole chain for diagnostics
    let mut message = error.to_string();
    let chain: Vec<String> =
        error.chain().skip(1).map(std::string::ToString::to_string).collect();

    if !chain.is_empty() {
        message.push_str("\n\nCaused by:");
        for (i, cause) in chain.iter().enumerate() {
            message.push_str(&format!("\n  {}: {}", i + 1, cause));
        }
    }

    ErrorContext::new(UpdateError::Other {
        message,
    })
}

fn create_error_context(error: UpdateError) -> ErrorContext {
    let suggestion = match &error {
        UpdateError::Network {
            ..
        }
        | UpdateError::HttpStatus {
            ..
        } => Some("Check your internet connection and try again"),
        UpdateError::Timeout {
            ..
        } => Some("The update server is slow to respond; try again later or raise upgrade.check_timeout"),
        UpdateError::RegistryResponse {
            ..
        } => Some("The version registry returned unexpected data; verify registry.url and registry.table"),
        UpdateError::InvalidUrl {
            ..
        } => Some("Download URLs must be absolute https:// URLs"),
        UpdateError::InvalidFileName {
            ..
        } => Some("Use a plain file name such as Branchbook-Setup-1.4.2.exe"),
        UpdateError::AlreadyDownloading => {
            Some("Wait for the current download to finish or cancel it first")
        }
        UpdateError::NoDownloadedInstaller
        | UpdateError::InstallerMissing {
            ..
        } => Some("Download the update again before installing"),
        UpdateError::ChecksumMismatch {
            ..
        } => Some("The download was corrupted; download the update again"),
        UpdateError::LaunchFailed {
            ..
        } => Some("Run the installer manually from the download directory"),
        UpdateError::Config {
            ..
        } => Some("Check ~/.branchbook/config.toml or the file given with --config"),
        _ => None,
    };

    let context = ErrorContext::new(error.clone()).with_details(format!("{} error", error.kind()));
    match suggestion {
        Some(s) => context.with_suggestion(s),
        None => context,
    }
}
