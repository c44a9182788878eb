//! Background installer downloads.
//!
//! [`DownloadManager`] owns the single download slot of the process. A started
//! download runs on its own tokio task and streams the response body into a
//! `.part` sibling of the destination; the file is renamed into place only
//! when the whole body arrived. Failures and cancellation remove the partial
//! file before the terminal event is published.
//!
//! Event order for one download is always zero or more
//! [`UpdateEvent::DownloadProgress`] with non-decreasing `bytes_received`,
//! followed by exactly one terminal event.

use futures::StreamExt;
use std::collections::VecDeque;
use std::path::{Path, PathBuf};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::{Duration, Instant};
use tokio::fs;
use tokio::io::AsyncWriteExt;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::constants::{MIN_SPEED_SPAN, SPEED_WINDOW, USER_AGENT};
use crate::core::UpdateError;
use crate::upgrade::events::{DownloadProgress, EventBus, UpdateEvent};
use crate::upgrade::verification::ChecksumVerifier;
use crate::utils::fs::{partial_path, remove_file_if_exists};
use crate::utils::path_validation::{validate_download_url, validate_file_name};

/// How a download ended.
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum DownloadOutcome {
    Completed {
        path: PathBuf,
        bytes: u64,
    },
    Failed(UpdateError),
    Cancelled,
}

impl DownloadOutcome {
    #[must_use]
    pub const fn is_completed(&self) -> bool {
        matches!(self, Self::Completed { .. })
    }
}

/// Caller's view of a running download.
#[derive(Debug, Clone)]
pub struct DownloadHandle {
    id: u64,
    destination: PathBuf,
    cancel: CancellationToken,
    done: watch::Receiver<Option<DownloadOutcome>>,
}

impl DownloadHandle {
    #[must_use]
    pub const fn id(&self) -> u64 {
        self.id
    }

    /// Final path of the installer once the download completes.
    #[must_use]
    pub fn destination(&self) -> &Path {
        &self.destination
    }

    /// Request cancellation. Observed at the transfer's next poll.
    pub fn cancel(&self) {
        self.cancel.cancel();
    }

    /// Wait until the download has settled and its cleanup is done.
    pub async fn wait(&self) -> DownloadOutcome {
        wait_for_outcome(self.done.clone()).await
    }
}

async fn wait_for_outcome(mut done: watch::Receiver<Option<DownloadOutcome>>) -> DownloadOutcome {
    match done.wait_for(Option::is_some).await {
        Ok(outcome) => outcome.clone().unwrap_or(DownloadOutcome::Cancelled),
        Err(_) => DownloadOutcome::Failed(UpdateError::Other {
            message: "download task stopped without reporting a result".to_string(),
        }),
    }
}

struct ActiveDownload {
    id: u64,
    cancel: CancellationToken,
    done: watch::Receiver<Option<DownloadOutcome>>,
}

/// Rolling-window transfer rate.
///
/// Speed is measured across the samples of the last few seconds instead of
/// per chunk, so one large chunk arriving right after a stall does not show
/// up as a spike.
#[derive(Debug, Default)]
pub struct SpeedTracker {
    samples: VecDeque<(Instant, u64)>,
    last_speed: u64,
}

impl SpeedTracker {
    pub fn new() -> Self {
        Self::default()
    }

    /// Record the cumulative byte count at `now` and return bytes per second.
    pub fn record(&mut self, now: Instant, total_bytes: u64) -> u64 {
        self.samples.push_back((now, total_bytes));
        while self.samples.len() > 1
            && self
                .samples
                .front()
                .is_some_and(|(t, _)| now.saturating_duration_since(*t) > SPEED_WINDOW)
        {
            self.samples.pop_front();
        }

        if let Some((oldest_at, oldest_bytes)) = self.samples.front().copied() {
            let span = now.saturating_duration_since(oldest_at);
            if span >= MIN_SPEED_SPAN {
                let delta = total_bytes.saturating_sub(oldest_bytes);
                self.last_speed = (delta as f64 / span.as_secs_f64()) as u64;
            }
        }
        self.last_speed
    }
}

/// Owner of the process-wide download slot.
///
/// Cloning shares the slot, so every clone sees the same active download.
#[derive(Clone)]
pub struct DownloadManager {
    client: reqwest::Client,
    download_dir: PathBuf,
    events: EventBus,
    active: Arc<Mutex<Option<ActiveDownload>>>,
    progress: Arc<Mutex<Option<DownloadProgress>>>,
    next_id: Arc<AtomicU64>,
}

impl DownloadManager {
    pub fn new(download_dir: impl Into<PathBuf>, events: EventBus) -> Result<Self, UpdateError> {
        let client = reqwest::Client::builder()
            .user_agent(USER_AGENT)
            .build()
            .map_err(|e| UpdateError::Config {
                message: format!("failed to build HTTP client: {e}"),
            })?;

        Ok(Self {
            client,
            download_dir: download_dir.into(),
            events,
            active: Arc::new(Mutex::new(None)),
            progress: Arc::new(Mutex::new(None)),
            next_id: Arc::new(AtomicU64::new(1)),
        })
    }

    #[must_use]
    pub fn download_dir(&self) -> &Path {
        &self.download_dir
    }

    #[must_use]
    pub fn events(&self) -> &EventBus {
        &self.events
    }

    #[must_use]
    pub fn is_active(&self) -> bool {
        lock(&self.active).is_some()
    }

    /// Latest progress of the running (or last) download.
    #[must_use]
    pub fn latest_progress(&self) -> Option<DownloadProgress> {
        lock(&self.progress).clone()
    }

    /// Start streaming `url` into `file_name` inside the download directory.
    ///
    /// Validation happens before any I/O. Fails with
    /// [`UpdateError::AlreadyDownloading`] while another download holds the
    /// slot; the running download is not touched. With `expected_sha256` the
    /// body is hashed on the fly and a mismatch fails the download.
    pub async fn start_download(
        &self,
        url: &str,
        file_name: &str,
        expected_sha256: Option<&str>,
    ) -> Result<DownloadHandle, UpdateError> {
        let url = validate_download_url(url)?;
        validate_file_name(file_name)?;
        let verifier = expected_sha256.map(ChecksumVerifier::new).transpose()?;

        if self.is_active() {
            return Err(UpdateError::AlreadyDownloading);
        }

        fs::create_dir_all(&self.download_dir).await.map_err(|e| {
            UpdateError::file_system("creating the download directory", &self.download_dir, &e)
        })?;

        let destination = self.download_dir.join(file_name);
        let cancel = CancellationToken::new();
        let (done_tx, done_rx) = watch::channel(None);

        let id = {
            let mut slot = lock(&self.active);
            if slot.is_some() {
                return Err(UpdateError::AlreadyDownloading);
            }
            let id = self.next_id.fetch_add(1, Ordering::Relaxed);
            *slot = Some(ActiveDownload {
                id,
                cancel: cancel.clone(),
                done: done_rx.clone(),
            });
            id
        };
        *lock(&self.progress) = None;

        info!("Starting download {} of {} to {}", id, url, destination.display());

        let transfer = Transfer {
            id,
            client: self.client.clone(),
            url: url.to_string(),
            destination: destination.clone(),
            cancel: cancel.clone(),
            events: self.events.clone(),
            progress: Arc::clone(&self.progress),
            verifier,
        };
        let active = Arc::clone(&self.active);
        let events = self.events.clone();

        tokio::spawn(async move {
            let outcome = transfer.run().await;

            {
                let mut slot = lock(&active);
                if slot.as_ref().is_some_and(|a| a.id == id) {
                    *slot = None;
                }
            }

            events.publish(terminal_event(id, &outcome));
            done_tx.send_replace(Some(outcome));
        });

        Ok(DownloadHandle {
            id,
            destination,
            cancel,
            done: done_rx,
        })
    }

    /// Cancel the running download and wait for its cleanup.
    ///
    /// Returns `None` when nothing was downloading.
    pub async fn cancel_active(&self) -> Option<DownloadOutcome> {
        let (id, done) = {
            let slot = lock(&self.active);
            let active = slot.as_ref()?;
            active.cancel.cancel();
            (active.id, active.done.clone())
        };
        debug!("Cancellation requested for download {}", id);
        Some(wait_for_outcome(done).await)
    }
}

fn lock<T>(mutex: &Mutex<T>) -> MutexGuard<'_, T> {
    mutex.lock().unwrap_or_else(PoisonError::into_inner)
}

fn terminal_event(id: u64, outcome: &DownloadOutcome) -> UpdateEvent {
    match outcome {
        DownloadOutcome::Completed {
            path,
            ..
        } => UpdateEvent::DownloadComplete {
            download_id: id,
            success: true,
            download_path: Some(path.clone()),
            error: None,
        },
        DownloadOutcome::Failed(e) => UpdateEvent::DownloadComplete {
            download_id: id,
            success: false,
            download_path: None,
            error: Some(e.to_string()),
        },
        DownloadOutcome::Cancelled => UpdateEvent::DownloadCancelled {
            download_id: id,
        },
    }
}

enum TransferEnd {
    Finished {
        bytes: u64,
    },
    Cancelled,
}

struct Transfer {
    id: u64,
    client: reqwest::Client,
    url: String,
    destination: PathBuf,
    cancel: CancellationToken,
    events: EventBus,
    progress: Arc<Mutex<Option<DownloadProgress>>>,
    verifier: Option<ChecksumVerifier>,
}

impl Transfer {
    async fn run(mut self) -> DownloadOutcome {
        let partial = partial_path(&self.destination);
        let verifier = self.verifier.take();

        let result = match self.stream_to(&partial, verifier).await {
            Ok(TransferEnd::Finished {
                bytes,
            }) => match fs::rename(&partial, &self.destination).await {
                Ok(()) => Ok(TransferEnd::Finished {
                    bytes,
                }),
                Err(e) => Err(UpdateError::file_system(
                    "moving the finished download into place",
                    &self.destination,
                    &e,
                )),
            },
            other => other,
        };

        match result {
            Ok(TransferEnd::Finished {
                bytes,
            }) => {
                info!("Download {} finished: {} bytes", self.id, bytes);
                DownloadOutcome::Completed {
                    path: self.destination,
                    bytes,
                }
            }
            Ok(TransferEnd::Cancelled) => {
                self.discard(&partial).await;
                info!("Download {} cancelled", self.id);
                DownloadOutcome::Cancelled
            }
            Err(e) => {
                self.discard(&partial).await;
                warn!("Download {} failed: {}", self.id, e);
                DownloadOutcome::Failed(e)
            }
        }
    }

    async fn discard(&self, partial: &Path) {
        if let Err(e) = remove_file_if_exists(partial).await {
            warn!("Failed to remove partial download {}: {}", partial.display(), e);
        }
    }

    async fn stream_to(
        &self,
        partial: &Path,
        mut verifier: Option<ChecksumVerifier>,
    ) -> Result<TransferEnd, UpdateError> {
        const OPERATION: &str = "downloading the installer";

        let response = tokio::select! {
            biased;
            () = self.cancel.cancelled() => return Ok(TransferEnd::Cancelled),
            response = self.client.get(&self.url).send() => {
                response.map_err(|e| UpdateError::from_transport(OPERATION, &e, 0))?
            }
        };

        let status = response.status();
        if !status.is_success() {
            return Err(UpdateError::HttpStatus {
                status: status.as_u16(),
                url: self.url.clone(),
            });
        }

        let total = response.content_length().unwrap_or(0);
        let mut file = fs::File::create(partial)
            .await
            .map_err(|e| UpdateError::file_system("creating the download file", partial, &e))?;

        let mut stream = response.bytes_stream();
        let mut received: u64 = 0;
        let mut speed = SpeedTracker::new();
        speed.record(Instant::now(), 0);

        loop {
            let next = tokio::select! {
                biased;
                () = self.cancel.cancelled() => return Ok(TransferEnd::Cancelled),
                next = stream.next() => next,
            };

            let Some(chunk) = next else {
                break;
            };
            let chunk = chunk.map_err(|e| UpdateError::from_transport(OPERATION, &e, 0))?;

            file.write_all(&chunk)
                .await
                .map_err(|e| UpdateError::file_system("writing the download", partial, &e))?;
            if let Some(verifier) = verifier.as_mut() {
                verifier.update(&chunk);
            }
            received += chunk.len() as u64;

            let rate = speed.record(Instant::now(), received);
            self.emit_progress(received, total, DownloadProgress::percent_of(received, total), rate);
        }

        file.flush()
            .await
            .map_err(|e| UpdateError::file_system("writing the download", partial, &e))?;
        file.sync_all()
            .await
            .map_err(|e| UpdateError::file_system("syncing the download", partial, &e))?;
        drop(file);

        if total > 0 && received != total {
            return Err(UpdateError::Network {
                operation: OPERATION.to_string(),
                reason: format!("connection closed after {received} of {total} bytes"),
            });
        }

        if let Some(verifier) = verifier {
            verifier.finish(&self.destination)?;
        }

        let rate = speed.record(Instant::now(), received);
        self.emit_progress(received, total, 100, rate);

        Ok(TransferEnd::Finished {
            bytes: received,
        })
    }

    fn emit_progress(&self, received: u64, total: u64, percent: u8, speed: u64) {
        let progress = DownloadProgress {
            download_id: self.id,
            bytes_received: received,
            total_bytes: total,
            percent,
            speed,
        };
        *lock(&self.progress) = Some(progress.clone());
        self.events.publish(UpdateEvent::DownloadProgress(progress));
    }
}
