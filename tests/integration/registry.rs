use axum::http::StatusCode;
use branchbook_updater::core::{ErrorKind, UpdateError};
use branchbook_updater::upgrade::{HttpVersionRegistry, Platform, VersionRegistry};
use serde_json::json;
use std::time::Duration;

use crate::common::{FixtureServer, INSTALLER_SIZE, registry_row};

fn registry(base_url: &str, api_key: Option<&str>) -> HttpVersionRegistry {
    HttpVersionRegistry::new(
        base_url,
        "app_versions",
        api_key.map(str::to_string),
        Duration::from_secs(5),
    )
    .unwrap()
}

#[tokio::test]
async fn test_query_shape_and_headers() {
    let server = FixtureServer::start().await;
    server.set_rows(json!([registry_row("2.0.0", "win32", "https://cdn.example.com/setup.exe")]));

    let record = registry(&server.base_url(), Some("anon-key"))
        .latest_published(Platform::Windows)
        .await
        .unwrap()
        .expect("a published record");

    assert_eq!(record.version, "2.0.0");
    assert_eq!(record.platform, Platform::Windows);
    assert_eq!(record.file_size_bytes, INSTALLER_SIZE as u64);
    assert!(record.is_published());

    let seen = server.last_query().expect("registry was queried");
    for part in [
        "select=*",
        "status=eq.published",
        "platform=eq.win32",
        "order=created_at.desc",
        "limit=1",
    ] {
        let encoded_star = part.replace('*', "%2A");
        assert!(
            seen.query.contains(part) || seen.query.contains(&encoded_star),
            "query {:?} is missing {part}",
            seen.query
        );
    }
    assert_eq!(seen.apikey.as_deref(), Some("anon-key"));
    assert_eq!(seen.authorization.as_deref(), Some("Bearer anon-key"));
}

#[tokio::test]
async fn test_no_headers_without_key() {
    let server = FixtureServer::start().await;
    registry(&server.base_url(), None).latest_published(Platform::Linux).await.unwrap();

    let seen = server.last_query().unwrap();
    assert!(seen.apikey.is_none());
    assert!(seen.authorization.is_none());
    assert!(seen.query.contains("platform=eq.linux"));
}

#[tokio::test]
async fn test_empty_result_is_not_an_error() {
    let server = FixtureServer::start().await;
    let result = registry(&server.base_url(), None).latest_published(Platform::MacOs).await;
    assert_eq!(result, Ok(None));
}

#[tokio::test]
async fn test_draft_row_is_ignored() {
    let server = FixtureServer::start().await;
    let mut row = registry_row("3.0.0-beta", "darwin", "https://cdn.example.com/b.dmg");
    row["status"] = json!("draft");
    server.set_rows(json!([row]));

    let result = registry(&server.base_url(), None).latest_published(Platform::MacOs).await;
    assert_eq!(result, Ok(None));
}

#[tokio::test]
async fn test_http_error_status() {
    let server = FixtureServer::start().await;
    server.fail_registry(StatusCode::SERVICE_UNAVAILABLE);

    let err =
        registry(&server.base_url(), None).latest_published(Platform::Windows).await.unwrap_err();
    assert!(matches!(err, UpdateError::HttpStatus { status: 503, .. }));
    assert!(err.is_retryable());
}

#[tokio::test]
async fn test_malformed_row_is_a_registry_error() {
    let server = FixtureServer::start().await;
    server.set_rows(json!([{ "platform": "win32", "status": "published" }]));

    let err =
        registry(&server.base_url(), None).latest_published(Platform::Windows).await.unwrap_err();
    assert!(matches!(err, UpdateError::RegistryResponse { .. }), "got {err:?}");
}

#[tokio::test]
async fn test_slow_registry_times_out() {
    let server = FixtureServer::start().await;
    let slow = HttpVersionRegistry::new(
        server.url("/slow"),
        "app_versions",
        None,
        Duration::from_millis(300),
    )
    .unwrap();

    let started = std::time::Instant::now();
    let err = slow.latest_published(Platform::Windows).await.unwrap_err();
    assert!(matches!(err, UpdateError::Timeout { .. }), "got {err:?}");
    assert_eq!(err.kind(), ErrorKind::Transient);
    assert!(started.elapsed() < Duration::from_secs(4));
}

#[tokio::test]
async fn test_unreachable_registry_is_network_error() {
    // Bind then drop to get a port nobody listens on
    let listener = std::net::TcpListener::bind("127.0.0.1:0").unwrap();
    let addr = listener.local_addr().unwrap();
    drop(listener);

    let err = registry(&format!("http://{addr}"), None)
        .latest_published(Platform::Windows)
        .await
        .unwrap_err();
    assert_eq!(err.kind(), ErrorKind::Transient);
}
