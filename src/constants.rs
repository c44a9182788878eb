//! Constants shared across modules.

use std::time::Duration;

/// `User-Agent` sent with registry queries and downloads.
pub const USER_AGENT: &str = concat!("branchbook-updater/", env!("CARGO_PKG_VERSION"));

/// Name of the downloads directory under the system temp directory.
pub const DOWNLOAD_DIR_NAME: &str = "branchbook-updates";

/// Window over which download speed is averaged.
pub const SPEED_WINDOW: Duration = Duration::from_secs(3);

/// Minimum sample span before a speed is reported.
pub const MIN_SPEED_SPAN: Duration = Duration::from_millis(200);
