//! Core types for branchbook-updater
//!
//! ## Error Management
//!
//! - [`UpdateError`] - every failure mode of the update coordinator, with an
//!   [`ErrorKind`] telling transient, validation, conflict and fatal apart
//! - [`ErrorContext`] - user-facing wrapper with details and a suggestion
//! - [`user_friendly_error`] - turn any `anyhow::Error` into an [`ErrorContext`]
//!
//! ```rust,no_run
//! use branchbook_updater::core::{UpdateError, user_friendly_error};
//!
//! let err = anyhow::Error::new(UpdateError::AlreadyDownloading);
//! user_friendly_error(err).display();
//! ```

pub mod error;

pub use error::{ErrorContext, ErrorKind, UpdateError, user_friendly_error};
