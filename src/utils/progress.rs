//! Progress indicators for the CLI
//!
//! Thin wrapper over `indicatif` that starts hidden when
//! `BRANCHBOOK_NO_PROGRESS` is set or `--no-progress` was passed, so scripted
//! runs get clean output.
//!
//! ```rust,no_run
//! use branchbook_updater::utils::progress::ProgressBar;
//!
//! let bar = ProgressBar::new_download(Some(4096));
//! bar.set_position(1024);
//! bar.finish_with_message("done");
//! ```

use indicatif::{ProgressBar as IndicatifBar, ProgressStyle as IndicatifStyle};
use std::time::Duration;

/// Environment variable that disables all progress output.
pub const NO_PROGRESS_ENV: &str = "BRANCHBOOK_NO_PROGRESS";

fn is_progress_disabled() -> bool {
    std::env::var(NO_PROGRESS_ENV).is_ok()
}

#[derive(Clone)]
pub struct ProgressBar {
    inner: IndicatifBar,
}

impl ProgressBar {
    /// Byte-oriented bar; a spinner when the total size is unknown.
    pub fn new_download(total_bytes: Option<u64>) -> Self {
        let bar = if is_progress_disabled() {
            IndicatifBar::hidden()
        } else {
            match total_bytes {
                Some(len) if len > 0 => {
                    let bar = IndicatifBar::new(len);
                    bar.set_style(ProgressStyle::download());
                    bar
                }
                _ => {
                    let bar = IndicatifBar::new_spinner();
                    bar.set_style(ProgressStyle::spinner());
                    bar.enable_steady_tick(Duration::from_millis(100));
                    bar
                }
            }
        };
        Self {
            inner: bar,
        }
    }

    pub fn new_spinner() -> Self {
        Self::new_download(None)
    }

    /// Switch a spinner to a bar once the size becomes known.
    pub fn set_length(&self, len: u64) {
        if self.inner.is_hidden() || len == 0 || self.inner.length() == Some(len) {
            return;
        }
        self.inner.disable_steady_tick();
        self.inner.set_style(ProgressStyle::download());
        self.inner.set_length(len);
    }

    pub fn set_message(&self, msg: impl Into<String>) {
        self.inner.set_message(msg.into());
    }

    pub fn set_prefix(&self, prefix: impl Into<String>) {
        self.inner.set_prefix(prefix.into());
    }

    pub fn set_position(&self, pos: u64) {
        self.inner.set_position(pos);
    }

    pub fn finish_with_message(&self, msg: impl Into<String>) {
        self.inner.finish_with_message(msg.into());
    }

    pub fn abandon_with_message(&self, msg: impl Into<String>) {
        self.inner.abandon_with_message(msg.into());
    }

    pub fn finish_and_clear(&self) {
        self.inner.finish_and_clear();
    }
}

pub struct ProgressStyle;

impl ProgressStyle {
    pub fn download() -> IndicatifStyle {
        IndicatifStyle::default_bar()
            .template(
                "{prefix:.bold.cyan} [{bar:40.cyan/blue}] {bytes}/{total_bytes} {msg} ({eta})",
            )
            .unwrap_or_else(|_| IndicatifStyle::default_bar())
            .progress_chars("━╸━")
    }

    pub fn spinner() -> IndicatifStyle {
        IndicatifStyle::default_spinner()
            .template("{prefix:.bold} {spinner:.cyan} {bytes} {msg}")
            .unwrap_or_else(|_| IndicatifStyle::default_spinner())
            .tick_strings(&["⠋", "⠙", "⠹", "⠸", "⠼", "⠴", "⠦", "⠧", "⠇", "⠏"])
    }
}

/// Human readable transfer rate, e.g. `1.5 MiB/s`.
#[must_use]
pub fn format_speed(bytes_per_sec: u64) -> String {
    format!("{}/s", indicatif::HumanBytes(bytes_per_sec))
}
