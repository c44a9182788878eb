//! Download event bus
//!
//! Publish/subscribe channel between the download task and any number of
//! presenters. Each subscriber gets its own unbounded queue, so a slow
//! consumer never stalls the transfer, and events from one download reach
//! each subscriber in publish order.

use serde::Serialize;
use std::collections::HashMap;
use std::path::PathBuf;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, PoisonError};
use tokio::sync::mpsc;
use tracing::trace;

/// Per-chunk progress snapshot.
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(rename_all = "camelCase")]
pub struct DownloadProgress {
    pub download_id: u64,
    pub bytes_received: u64,
    /// `Content-Length` of the response, `0` when the server sent none.
    pub total_bytes: u64,
    /// 0 to 100. Stays 0 for an unknown total until the transfer completes.
    pub percent: u8,
    /// Smoothed bytes per second.
    pub speed: u64,
}

impl DownloadProgress {
    /// Percentage for `received` out of `total`, clamped to 0..=100.
    #[must_use]
    pub fn percent_of(received: u64, total: u64) -> u8 {
        if total == 0 {
            return 0;
        }
        let pct = (u128::from(received) * 100) / u128::from(total);
        pct.min(100) as u8
    }
}

#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
#[serde(tag = "event", rename_all = "kebab-case")]
pub enum UpdateEvent {
    DownloadProgress(DownloadProgress),
    #[serde(rename_all = "camelCase")]
    DownloadComplete {
        download_id: u64,
        success: bool,
        download_path: Option<PathBuf>,
        error: Option<String>,
    },
    #[serde(rename_all = "camelCase")]
    DownloadCancelled {
        download_id: u64,
    },
}

impl UpdateEvent {
    /// Channel name the desktop shell uses for this event.
    #[must_use]
    pub const fn name(&self) -> &'static str {
        match self {
            Self::DownloadProgress(_) => "download-progress",
            Self::DownloadComplete {
                ..
            } => "download-complete",
            Self::DownloadCancelled {
                ..
            } => "download-cancelled",
        }
    }

    #[must_use]
    pub const fn download_id(&self) -> u64 {
        match self {
            Self::DownloadProgress(p) => p.download_id,
            Self::DownloadComplete {
                download_id,
                ..
            }
            | Self::DownloadCancelled {
                download_id,
            } => *download_id,
        }
    }

    /// Whether this is the last event of a download.
    #[must_use]
    pub const fn is_terminal(&self) -> bool {
        !matches!(self, Self::DownloadProgress(_))
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub struct SubscriptionId(u64);

/// Receiving end handed out by [`EventBus::subscribe`].
///
/// Dropping the subscription is equivalent to unsubscribing; the bus prunes
/// closed queues on the next publish.
pub struct Subscription {
    id: SubscriptionId,
    receiver: mpsc::UnboundedReceiver<UpdateEvent>,
}

impl Subscription {
    #[must_use]
    pub const fn id(&self) -> SubscriptionId {
        self.id
    }

    /// Wait for the next event; `None` once unsubscribed and drained.
    pub async fn recv(&mut self) -> Option<UpdateEvent> {
        self.receiver.recv().await
    }

    pub fn try_recv(&mut self) -> Option<UpdateEvent> {
        self.receiver.try_recv().ok()
    }
}

#[derive(Default)]
struct Subscribers {
    senders: HashMap<SubscriptionId, mpsc::UnboundedSender<UpdateEvent>>,
}

#[derive(Clone, Default)]
pub struct EventBus {
    subscribers: Arc<Mutex<Subscribers>>,
    next_id: Arc<AtomicU64>,
}

impl EventBus {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn subscribe(&self) -> Subscription {
        let id = SubscriptionId(self.next_id.fetch_add(1, Ordering::Relaxed));
        let (sender, receiver) = mpsc::unbounded_channel();
        self.lock().senders.insert(id, sender);
        Subscription {
            id,
            receiver,
        }
    }

    /// Stop delivery to `id`. Returns `false` if it was not subscribed.
    pub fn unsubscribe(&self, id: SubscriptionId) -> bool {
        self.lock().senders.remove(&id).is_some()
    }

    pub fn publish(&self, event: UpdateEvent) {
        trace!("Publishing {} for download {}", event.name(), event.download_id());
        self.lock().senders.retain(|_, sender| sender.send(event.clone()).is_ok());
    }

    #[must_use]
    pub fn subscriber_count(&self) -> usize {
        self.lock().senders.len()
    }

    fn lock(&self) -> std::sync::MutexGuard<'_, Subscribers> {
        self.subscribers.lock().unwrap_or_else(PoisonError::into_inner)
    }
}
