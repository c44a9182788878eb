//! In-app update coordinator.
//!
//! Finds a newer published build, downloads its installer in the background
//! and hands it to the OS at the moment the user picked: right away, when the
//! application closes, or on its next launch.
//!
//! # Architecture Overview
//!
//! ```text
//! UpdateChecker ──(newer build)──► DownloadManager ──(installer ready)──► InstallScheduler
//!      │                               │                                     │
//!  VersionRegistry                 EventBus                          PendingInstallStore
//!  (REST query)            (progress / complete / cancelled)        (pending_install.json)
//!                                                                            │
//!                                                                   InstallerLauncher
//! ```
//!
//! - [`version_check::UpdateChecker`] compares the running version with the
//!   newest `published` [`registry::VersionRecord`] for the platform.
//! - [`download::DownloadManager`] streams one installer at a time into the
//!   download directory, publishing [`events::UpdateEvent`]s.
//! - [`scheduler::InstallScheduler`] is the state machine deciding when the
//!   installer runs, persisting deferred choices.
//! - [`updater::Updater`] ties them together behind the operations a
//!   presenter calls, plus the `on_startup` / `on_before_close` hooks.
//! - [`auto_check::AutoCheck`] re-runs the check on a timer.
//!
//! # Typical Flow
//!
//! ```bash
//! branchbook-updater check
//! branchbook-updater download --then next-launch
//! branchbook-updater hook startup      # run by the host on its next start
//! ```
//!
//! # Error Handling
//!
//! Components return [`UpdateError`](crate::core::UpdateError) internally;
//! [`Updater`] turns every failure into a result value so nothing escapes to
//! the host:
//!
//! ```rust,no_run
//! use branchbook_updater::upgrade::Updater;
//!
//! # async fn example(updater: &Updater) {
//! let result = updater.cancel_download().await;
//! if !result.success {
//!     eprintln!("{}", result.error.unwrap_or_default());
//! }
//! # }
//! ```

pub mod auto_check;
/// `[upgrade]` configuration table.
pub mod config;
pub mod download;
pub mod events;
/// OS primitives for launching installers and opening URLs.
pub mod launcher;
pub mod pending;
/// Version registry client and record types.
pub mod registry;
pub mod scheduler;
pub mod updater;
/// Download checksum verification.
pub mod verification;
pub mod version;
/// Update checks against the registry.
pub mod version_check;


pub use auto_check::AutoCheck;
pub use download::{DownloadHandle, DownloadManager, DownloadOutcome};
pub use events::{DownloadProgress, EventBus, Subscription, SubscriptionId, UpdateEvent};
pub use launcher::{InstallerLauncher, SystemLauncher};
pub use pending::{PendingInstallChoice, PendingInstallMode, PendingInstallStore};
pub use registry::{HttpVersionRegistry, Platform, ReleaseStatus, VersionRecord, VersionRegistry};
pub use scheduler::{InstallScheduler, InstallState, LifecycleAction, ScheduleMode, UpdateSession};
pub use updater::{ActionResult, DownloadResult, LifecycleOutcome, Updater};
pub use verification::ChecksumVerifier;
pub use version::compare_versions;
pub use version_check::{UpdateCheckResult, UpdateChecker};
