//! branchbook-updater - in-app update coordinator for Branchbook
//!
//! Branchbook is a desktop sales and expense tracker. This crate keeps it up to
//! date: it asks a hosted version registry whether a newer published build
//! exists for the running platform, downloads the installer in the background
//! with progress events, and launches it now, when the app closes, or on the
//! next launch.
//!
//! # Architecture Overview
//!
//! Everything hangs off one owned [`upgrade::Updater`]:
//! - [`upgrade::UpdateChecker`] queries the registry and compares versions
//! - [`upgrade::DownloadManager`] streams one installer at a time into a
//!   `.part` file, publishing [`upgrade::UpdateEvent`]s on an event bus
//! - [`upgrade::InstallScheduler`] is the install state machine; the only
//!   durable state is the pending install choice in `pending_install.json`
//! - [`upgrade::InstallerLauncher`] hands the installer to the OS
//!
//! The host (the CLI in [`cli`], or an embedding shell) calls the lifecycle
//! hooks [`upgrade::Updater::on_startup`] and
//! [`upgrade::Updater::on_before_close`] at the right moments.
//!
//! # Core Modules
//!
//! - [`cli`] - command-line host mirroring the library API
//! - [`config`] - global TOML configuration (`~/.branchbook/config.toml`)
//! - [`core`] - error taxonomy and user-facing error rendering
//! - [`upgrade`] - version check, downloads and install scheduling
//! - [`utils`] - file system, path validation, platform and progress helpers
//!
//! # Example
//!
//! ```rust,no_run
//! use branchbook_updater::config::GlobalConfig;
//! use branchbook_updater::upgrade::Updater;
//! use branchbook_updater::utils::platform::get_data_dir;
//!
//! # async fn example() -> anyhow::Result<()> {
//! let config = GlobalConfig::load().await?;
//! let updater = Updater::from_config(&config, &get_data_dir()?)?;
//!
//! // Run whatever was deferred to this launch first.
//! let startup = updater.on_startup().await;
//! if startup.should_quit {
//!     return Ok(());
//! }
//!
//! let check = updater.check_for_updates().await;
//! if check.has_update {
//!     println!("Update available: {:?}", check.latest_version);
//! }
//! # Ok(())
//! # }
//! ```
//!
//! # Command-Line Usage
//!
//! ```bash
//! branchbook-updater check
//! branchbook-updater download --then on-close
//! branchbook-updater hook before-close
//! branchbook-updater watch
//! ```

pub mod cli;
pub mod config;
pub mod constants;
pub mod core;
pub mod upgrade;
pub mod utils;

// test_utils module is available for both unit tests and integration tests
#[cfg(any(test, feature = "test-utils"))]
pub mod test_utils;
