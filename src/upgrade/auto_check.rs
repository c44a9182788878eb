//! Periodic background update check.

use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;
use tokio::task::JoinHandle;
use tokio::time::MissedTickBehavior;
use tokio_util::sync::CancellationToken;
use tracing::{debug, warn};

use crate::upgrade::updater::Updater;
use crate::upgrade::version_check::UpdateCheckResult;

const MIN_INTERVAL: Duration = Duration::from_millis(10);

/// Timer task that re-runs [`Updater::check_for_updates`] on an interval.
///
/// The first check runs one full interval after spawning; hosts that want a
/// check at startup run it themselves. Results are delivered on
/// [`AutoCheck::results`]. The timer stops on [`AutoCheck::shutdown`] or when
/// the value is dropped.
pub struct AutoCheck {
    cancel: CancellationToken,
    task: Option<JoinHandle<()>>,
    results: mpsc::UnboundedReceiver<UpdateCheckResult>,
}

impl AutoCheck {
    pub fn spawn(updater: Arc<Updater>, interval: Duration) -> Self {
        let interval = interval.max(MIN_INTERVAL);
        let cancel = CancellationToken::new();
        let (tx, results) = mpsc::unbounded_channel();

        let token = cancel.clone();
        let task = tokio::spawn(async move {
            let start = tokio::time::Instant::now() + interval;
            let mut ticker = tokio::time::interval_at(start, interval);
            ticker.set_missed_tick_behavior(MissedTickBehavior::Delay);

            loop {
                tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    _ = ticker.tick() => {}
                }

                debug!("Running periodic update check");
                let result = tokio::select! {
                    biased;
                    () = token.cancelled() => break,
                    result = updater.check_for_updates() => result,
                };
                if tx.send(result).is_err() {
                    break;
                }
            }
            debug!("Periodic update check stopped");
        });

        Self {
            cancel,
            task: Some(task),
            results,
        }
    }

    /// Wait for the next periodic result.
    pub async fn next_result(&mut self) -> Option<UpdateCheckResult> {
        self.results.recv().await
    }

    pub fn results(&mut self) -> &mut mpsc::UnboundedReceiver<UpdateCheckResult> {
        &mut self.results
    }

    /// Stop the timer and wait for the task to exit.
    ///
    /// Returns `false` when the task had already died, e.g. from a panic.
    pub async fn shutdown(mut self) -> bool {
        self.cancel.cancel();
        match self.task.take() {
            Some(task) => match task.await {
                Ok(()) => true,
                Err(e) => {
                    warn!("Periodic update check task ended abnormally: {}", e);
                    false
                }
            },
            None => true,
        }
    }
}

impl Drop for AutoCheck {
    fn drop(&mut self) {
        self.cancel.cancel();
    }
}
