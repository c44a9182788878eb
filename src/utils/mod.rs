//! Cross-platform utilities and helpers
//!
//! # Modules
//!
//! - [`fs`] - atomic writes and download file helpers
//! - [`path_validation`] - download URL and file name checks
//! - [`platform`] - data and download directory resolution
//! - [`progress`] - progress bars for the CLI

pub mod fs;
pub mod path_validation;
pub mod platform;
pub mod progress;

pub use fs::{atomic_write, ensure_dir};
pub use progress::ProgressBar;
