use branchbook_updater::test_utils::TestEnvironment;
use branchbook_updater::upgrade::{
    HttpVersionRegistry, InstallState, PendingInstallMode, Platform, UpdateEvent, Updater,
};
use branchbook_updater::utils::fs::partial_path;
use serde_json::json;
use std::sync::Arc;
use std::time::Duration;

use crate::common::{FixtureServer, installer_sha256, registry_row};

const FILE_NAME: &str = "Branchbook-Setup-2.0.0.exe";

fn updater(server: &FixtureServer, env: &TestEnvironment) -> Updater {
    let registry = HttpVersionRegistry::new(
        server.base_url(),
        "app_versions",
        Some("anon-key".to_string()),
        Duration::from_secs(5),
    )
    .unwrap();

    Updater::new(Arc::new(registry), env.launcher.clone(), env.download_dir(), &env.data_dir())
        .unwrap()
        .with_app_version("1.1.0")
        .with_platform(Platform::Windows)
}

fn publish(server: &FixtureServer, path: &str, sha256: Option<String>) -> String {
    let url = server.url(path);
    let mut row = registry_row("2.0.0", "win32", &url);
    if let Some(sha) = sha256 {
        row["sha256"] = json!(sha);
    }
    server.set_rows(json!([row]));
    url
}

#[tokio::test]
async fn test_check_download_and_install_on_next_launch() {
    let server = FixtureServer::start().await;
    let env = TestEnvironment::new();
    let url = publish(&server, "/files/setup.exe", Some(installer_sha256()));

    let first_run = updater(&server, &env);
    let check = first_run.check_for_updates().await;
    assert!(check.has_update);
    assert_eq!(check.error, None);
    assert_eq!(check.latest_version.as_ref().map(|r| r.version.as_str()), Some("2.0.0"));

    let download = first_run.download_update_to_temp(&url, FILE_NAME).await;
    assert!(download.success, "download failed: {:?}", download.error);
    let installer = download.download_path.expect("installer path");
    assert_eq!(installer, env.download_dir().join(FILE_NAME));

    let session = first_run.session().await;
    assert_eq!(session.state, InstallState::ReadyToInstall);
    assert_eq!(session.target_version.as_deref(), Some("2.0.0"));

    let scheduled = first_run.set_install_on_next_launch(true, None).await;
    assert!(scheduled.success);
    assert_eq!(first_run.pending_choice().await.mode, PendingInstallMode::InstallOnNextLaunch);
    drop(first_run);

    // Restart: the startup hook consumes the choice and launches the installer
    let second_run = updater(&server, &env);
    let outcome = second_run.on_startup().await;
    assert_eq!(outcome.launched.as_deref(), Some(installer.as_path()));
    assert!(outcome.should_quit);
    assert_eq!(second_run.session().await.state, InstallState::Installing);
    assert_eq!(second_run.pending_choice().await.mode, PendingInstallMode::None);
    assert_eq!(env.launcher.launched(), vec![installer]);

    let third_run = updater(&server, &env);
    let outcome = third_run.on_startup().await;
    assert!(outcome.launched.is_none());
    assert!(!outcome.should_quit);
    assert_eq!(env.launcher.launched().len(), 1);
}

#[tokio::test]
async fn test_registry_checksum_mismatch_returns_to_idle() {
    let server = FixtureServer::start().await;
    let env = TestEnvironment::new();
    let url = publish(&server, "/files/setup.exe", Some("ab".repeat(32)));

    let updater = updater(&server, &env);
    assert!(updater.check_for_updates().await.has_update);

    let result = updater.download_update_to_temp(&url, FILE_NAME).await;
    assert!(!result.success);
    assert!(result.error.as_deref().is_some_and(|e| e.contains("Checksum mismatch")));

    let session = updater.session().await;
    assert_eq!(session.state, InstallState::Idle);
    assert!(session.error.is_some());
    assert!(!env.download_dir().join(FILE_NAME).exists());
}

#[tokio::test]
async fn test_cancel_download_through_updater() {
    let server = FixtureServer::start().await;
    let env = TestEnvironment::new();
    let updater = Arc::new(updater(&server, &env));
    let mut subscription = updater.subscribe();

    let url = server.url("/files/slow.exe");
    let task = tokio::spawn({
        let updater = Arc::clone(&updater);
        async move { updater.download_update_to_temp(&url, "slow.exe").await }
    });

    assert!(matches!(subscription.recv().await, Some(UpdateEvent::DownloadProgress(_))));
    let session = updater.session().await;
    assert_eq!(session.state, InstallState::Downloading);
    assert!(session.progress.is_some());

    // A check while downloading leaves the transfer alone
    let check = updater.check_for_updates().await;
    assert_eq!(check.error, None);
    assert_eq!(updater.session().await.state, InstallState::Downloading);

    let cancelled = updater.cancel_download().await;
    assert!(cancelled.success);

    let result = task.await.unwrap();
    assert!(result.cancelled);
    assert!(!result.success);
    assert_eq!(updater.session().await.state, InstallState::Idle);

    let destination = env.download_dir().join("slow.exe");
    assert!(!destination.exists());
    assert!(!partial_path(&destination).exists());

    assert!(updater.unsubscribe(subscription.id()));
}

#[tokio::test]
async fn test_second_download_rejected_through_updater() {
    let server = FixtureServer::start().await;
    let env = TestEnvironment::new();
    let updater = Arc::new(updater(&server, &env));
    let mut subscription = updater.subscribe();

    let url = server.url("/files/slow.exe");
    let task = tokio::spawn({
        let updater = Arc::clone(&updater);
        async move { updater.download_update_to_temp(&url, "slow.exe").await }
    });
    assert!(subscription.recv().await.is_some());

    let second = updater.download_update_to_temp(&server.url("/files/setup.exe"), FILE_NAME).await;
    assert!(!second.success);
    assert!(second.error.as_deref().is_some_and(|e| e.contains("already downloading")));

    let first = task.await.unwrap();
    assert!(first.success, "first download failed: {:?}", first.error);
    assert_eq!(updater.session().await.state, InstallState::ReadyToInstall);
}

#[tokio::test]
async fn test_before_close_cancels_download() {
    let server = FixtureServer::start().await;
    let env = TestEnvironment::new();
    let updater = Arc::new(updater(&server, &env));
    let mut subscription = updater.subscribe();

    let url = server.url("/files/slow.exe");
    let task = tokio::spawn({
        let updater = Arc::clone(&updater);
        async move { updater.download_update_to_temp(&url, "slow.exe").await }
    });
    assert!(subscription.recv().await.is_some());

    let outcome = updater.on_before_close().await;
    assert!(outcome.should_quit);
    assert!(outcome.launched.is_none());

    assert!(task.await.unwrap().cancelled);
    assert!(!partial_path(&env.download_dir().join("slow.exe")).exists());
    assert!(env.launcher.launched().is_empty());
}

#[tokio::test]
async fn test_install_on_close_flow() {
    let server = FixtureServer::start().await;
    let env = TestEnvironment::new();
    let url = publish(&server, "/files/setup.exe", None);
    let updater = updater(&server, &env);

    let download = updater.download_update_to_temp(&url, FILE_NAME).await;
    assert!(download.success);
    assert!(updater.set_install_on_close(true, None).await.success);
    assert_eq!(updater.session().await.state, InstallState::InstallScheduledOnClose);

    let outcome = updater.on_before_close().await;
    assert!(outcome.should_quit);
    assert_eq!(outcome.launched, download.download_path);
    assert_eq!(updater.pending_choice().await.mode, PendingInstallMode::None);
}

#[tokio::test]
async fn test_unreachable_registry_reports_error() {
    let server = FixtureServer::start().await;
    let env = TestEnvironment::new();
    server.fail_registry(axum::http::StatusCode::BAD_GATEWAY);

    let updater = updater(&server, &env);
    let check = updater.check_for_updates().await;
    assert!(!check.has_update);
    assert!(check.latest_version.is_none());
    assert!(check.error.as_deref().is_some_and(|e| e.contains("502")));
}

async fn wait_until_settled(updater: &Updater) -> InstallState {
    for _ in 0..200 {
        let state = updater.session().await.state;
        if state != InstallState::Downloading {
            return state;
        }
        tokio::time::sleep(Duration::from_millis(50)).await;
    }
    InstallState::Downloading
}

#[tokio::test]
async fn test_dropped_download_future_still_settles() {
    let server = FixtureServer::start().await;
    let env = TestEnvironment::new();
    let updater = updater(&server, &env);

    let url = server.url("/files/slow.exe");
    let download = updater.download_update_to_temp(&url, "slow.exe");
    let abandoned = tokio::time::timeout(Duration::from_millis(200), download).await;
    assert!(abandoned.is_err(), "slow download finished too early");

    assert_eq!(wait_until_settled(&updater).await, InstallState::ReadyToInstall);
    let session = updater.session().await;
    assert_eq!(session.download_path, Some(env.download_dir().join("slow.exe")));

    // The slot and the session are both free for the install flow
    assert!(updater.set_install_on_close(true, None).await.success);
}

#[tokio::test]
async fn test_cancel_after_dropped_download_future() {
    let server = FixtureServer::start().await;
    let env = TestEnvironment::new();
    let updater = updater(&server, &env);

    let url = server.url("/files/slow.exe");
    let download = updater.download_update_to_temp(&url, "slow.exe");
    let abandoned = tokio::time::timeout(Duration::from_millis(200), download).await;
    assert!(abandoned.is_err());
    assert_eq!(updater.session().await.state, InstallState::Downloading);

    assert!(updater.cancel_download().await.success);
    assert_eq!(updater.session().await.state, InstallState::Idle);
    assert!(!partial_path(&env.download_dir().join("slow.exe")).exists());

    let retry = updater.download_update_to_temp(&server.url("/files/setup.exe"), FILE_NAME).await;
    assert!(retry.success, "retry failed: {:?}", retry.error);
}
