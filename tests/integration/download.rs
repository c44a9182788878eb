use branchbook_updater::core::{ErrorKind, UpdateError};
use branchbook_updater::upgrade::{
    DownloadManager, DownloadOutcome, EventBus, Subscription, UpdateEvent,
};
use branchbook_updater::utils::fs::partial_path;
use tempfile::TempDir;

use crate::common::{
    FixtureServer, INSTALLER_SIZE, SLOW_CHUNK_SIZE, SLOW_CHUNKS, installer_bytes,
    installer_sha256,
};

fn manager(temp: &TempDir) -> DownloadManager {
    DownloadManager::new(temp.path().join("downloads"), EventBus::new()).unwrap()
}

fn drain(subscription: &mut Subscription) -> Vec<UpdateEvent> {
    std::iter::from_fn(|| subscription.try_recv()).collect()
}

fn assert_well_ordered(events: &[UpdateEvent]) {
    let (last, progress) = events.split_last().expect("at least the terminal event");
    assert!(last.is_terminal(), "last event must be terminal: {last:?}");

    let mut previous = 0;
    for event in progress {
        let UpdateEvent::DownloadProgress(p) = event else {
            panic!("terminal event before the end: {event:?}");
        };
        assert!(p.bytes_received >= previous, "progress went backwards");
        previous = p.bytes_received;
    }
}

#[tokio::test]
async fn test_download_completes_with_progress() {
    let server = FixtureServer::start().await;
    let temp = TempDir::new().unwrap();
    let downloads = manager(&temp);
    let mut subscription = downloads.events().subscribe();

    let handle = downloads
        .start_download(
            &server.url("/files/setup.exe"),
            "Branchbook-Setup-2.0.0.exe",
            Some(&installer_sha256()),
        )
        .await
        .unwrap();

    let outcome = handle.wait().await;
    let DownloadOutcome::Completed {
        path,
        bytes,
    } = outcome
    else {
        panic!("download did not complete: {outcome:?}");
    };
    assert_eq!(bytes, INSTALLER_SIZE as u64);
    assert_eq!(path, handle.destination());
    assert_eq!(std::fs::read(&path).unwrap(), installer_bytes());
    assert!(!partial_path(&path).exists());
    assert!(!downloads.is_active());

    let events = drain(&mut subscription);
    assert_well_ordered(&events);
    assert!(matches!(
        events.last(),
        Some(UpdateEvent::DownloadComplete { success: true, .. })
    ));

    let UpdateEvent::DownloadProgress(last_progress) = &events[events.len() - 2] else {
        panic!("expected a final progress event");
    };
    assert_eq!(last_progress.percent, 100);
    assert_eq!(last_progress.total_bytes, INSTALLER_SIZE as u64);
    assert_eq!(last_progress.bytes_received, INSTALLER_SIZE as u64);
}

#[tokio::test]
async fn test_second_download_rejected_first_unaffected() {
    let server = FixtureServer::start().await;
    let temp = TempDir::new().unwrap();
    let downloads = manager(&temp);

    let first = downloads
        .start_download(&server.url("/files/slow.exe"), "slow.exe", None)
        .await
        .unwrap();

    let second = downloads.start_download(&server.url("/files/setup.exe"), "other.exe", None).await;
    assert_eq!(second.unwrap_err(), UpdateError::AlreadyDownloading);
    assert!(!temp.path().join("downloads").join("other.exe").exists());

    match first.wait().await {
        DownloadOutcome::Completed {
            bytes, ..
        } => assert_eq!(bytes, (SLOW_CHUNKS * SLOW_CHUNK_SIZE) as u64),
        other => panic!("first download was disturbed: {other:?}"),
    }

    // The slot is free again
    let third = downloads
        .start_download(&server.url("/files/setup.exe"), "other.exe", None)
        .await
        .unwrap();
    assert!(third.wait().await.is_completed());
}

#[tokio::test]
async fn test_cancel_removes_partial_file() {
    let server = FixtureServer::start().await;
    let temp = TempDir::new().unwrap();
    let downloads = manager(&temp);
    let mut subscription = downloads.events().subscribe();

    let handle = downloads
        .start_download(&server.url("/files/slow.exe"), "slow.exe", None)
        .await
        .unwrap();

    // Wait until bytes are on disk
    match subscription.recv().await {
        Some(UpdateEvent::DownloadProgress(p)) => assert!(p.bytes_received > 0),
        other => panic!("expected progress first, got {other:?}"),
    }
    let partial = partial_path(handle.destination());
    assert!(partial.exists());

    let outcome = downloads.cancel_active().await;
    assert_eq!(outcome, Some(DownloadOutcome::Cancelled));
    assert_eq!(handle.wait().await, DownloadOutcome::Cancelled);
    assert!(!partial.exists());
    assert!(!handle.destination().exists());
    assert!(!downloads.is_active());

    let rest = drain(&mut subscription);
    assert!(matches!(rest.last(), Some(UpdateEvent::DownloadCancelled { .. })));
    assert_eq!(rest.iter().filter(|e| e.is_terminal()).count(), 1);
}

#[tokio::test]
async fn test_http_error_fails_download() {
    let server = FixtureServer::start().await;
    let temp = TempDir::new().unwrap();
    let downloads = manager(&temp);
    let mut subscription = downloads.events().subscribe();

    let handle = downloads
        .start_download(&server.url("/files/missing.exe"), "missing.exe", None)
        .await
        .unwrap();

    match handle.wait().await {
        DownloadOutcome::Failed(UpdateError::HttpStatus {
            status, ..
        }) => assert_eq!(status, 404),
        other => panic!("expected HTTP 404, got {other:?}"),
    }
    assert!(!handle.destination().exists());
    assert!(!partial_path(handle.destination()).exists());

    let events = drain(&mut subscription);
    assert_eq!(events.len(), 1);
    assert!(matches!(
        &events[0],
        UpdateEvent::DownloadComplete { success: false, error: Some(_), .. }
    ));
}

#[tokio::test]
async fn test_checksum_mismatch_discards_download() {
    let server = FixtureServer::start().await;
    let temp = TempDir::new().unwrap();
    let downloads = manager(&temp);

    let wrong = "0".repeat(64);
    let handle = downloads
        .start_download(&server.url("/files/setup.exe"), "setup.exe", Some(&wrong))
        .await
        .unwrap();

    match handle.wait().await {
        DownloadOutcome::Failed(e @ UpdateError::ChecksumMismatch { .. }) => {
            assert_eq!(e.kind(), ErrorKind::Fatal);
        }
        other => panic!("expected a checksum mismatch, got {other:?}"),
    }
    assert!(!handle.destination().exists());
    assert!(!partial_path(handle.destination()).exists());
}

#[tokio::test]
async fn test_unknown_length_download() {
    let server = FixtureServer::start().await;
    let temp = TempDir::new().unwrap();
    let downloads = manager(&temp);
    let mut subscription = downloads.events().subscribe();

    let handle = downloads
        .start_download(&server.url("/files/unsized.exe"), "unsized.exe", None)
        .await
        .unwrap();
    assert!(handle.wait().await.is_completed());

    let events = drain(&mut subscription);
    assert_well_ordered(&events);
    let progress: Vec<_> = events
        .iter()
        .filter_map(|e| match e {
            UpdateEvent::DownloadProgress(p) => Some(p.clone()),
            _ => None,
        })
        .collect();
    assert!(progress.iter().all(|p| p.total_bytes == 0));
    assert_eq!(progress.last().map(|p| p.percent), Some(100));
}

#[tokio::test]
async fn test_truncated_body_is_transient_failure() {
    let server = FixtureServer::start().await;
    let temp = TempDir::new().unwrap();
    let downloads = manager(&temp);

    let handle = downloads
        .start_download(&server.url("/files/truncated.exe"), "truncated.exe", None)
        .await
        .unwrap();

    match handle.wait().await {
        DownloadOutcome::Failed(e) => assert!(e.is_retryable(), "unexpected error: {e}"),
        other => panic!("expected a failure, got {other:?}"),
    }
    assert!(!handle.destination().exists());
    assert!(!partial_path(handle.destination()).exists());
}
