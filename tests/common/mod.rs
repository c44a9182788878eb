//! Local HTTP fixture server for integration tests
//!
//! Serves installers in the shapes the download manager has to cope with and
//! a stand-in for the hosted registry's REST endpoint. Every test starts its
//! own server on an ephemeral loopback port.

// Not every test file uses every route
#![allow(dead_code)]

use axum::Router;
use axum::body::Body;
use axum::extract::{RawQuery, State};
use axum::http::{HeaderMap, StatusCode, header};
use axum::response::{IntoResponse, Response};
use axum::routing::get;
use sha2::{Digest, Sha256};
use std::convert::Infallible;
use std::net::SocketAddr;
use std::sync::{Arc, Mutex};
use std::time::Duration;
use tokio::task::JoinHandle;

/// Size of the installer served by `/files/setup.exe`.
pub const INSTALLER_SIZE: usize = 256 * 1024;

/// Chunks served by `/files/slow.exe`, one every [`SLOW_CHUNK_DELAY`].
pub const SLOW_CHUNKS: usize = 40;
pub const SLOW_CHUNK_SIZE: usize = 8 * 1024;
pub const SLOW_CHUNK_DELAY: Duration = Duration::from_millis(50);

/// Deterministic installer bytes.
pub fn installer_bytes() -> Vec<u8> {
    (0..INSTALLER_SIZE).map(|i| (i % 251) as u8).collect()
}

pub fn installer_sha256() -> String {
    hex::encode(Sha256::digest(installer_bytes()))
}

/// Request the registry endpoint saw last.
#[derive(Debug, Clone, Default)]
pub struct RecordedQuery {
    pub query: String,
    pub apikey: Option<String>,
    pub authorization: Option<String>,
}

#[derive(Default)]
struct FixtureState {
    rows: Mutex<serde_json::Value>,
    last_query: Mutex<Option<RecordedQuery>>,
    registry_status: Mutex<Option<StatusCode>>,
}

pub struct FixtureServer {
    addr: SocketAddr,
    state: Arc<FixtureState>,
    task: JoinHandle<()>,
}

impl FixtureServer {
    pub async fn start() -> Self {
        let state = Arc::new(FixtureState {
            rows: Mutex::new(serde_json::json!([])),
            ..FixtureState::default()
        });

        let app = Router::new()
            .route("/files/setup.exe", get(installer))
            .route("/files/slow.exe", get(slow_installer))
            .route("/files/unsized.exe", get(unsized_installer))
            .route("/files/truncated.exe", get(truncated_installer))
            .route("/files/missing.exe", get(|| async { StatusCode::NOT_FOUND }))
            .route("/rest/v1/{table}", get(registry))
            .route("/slow/rest/v1/{table}", get(slow_registry))
            .with_state(Arc::clone(&state));

        let listener = tokio::net::TcpListener::bind("127.0.0.1:0").await.unwrap();
        let addr = listener.local_addr().unwrap();
        let task = tokio::spawn(async move {
            axum::serve(listener, app).await.unwrap();
        });

        Self {
            addr,
            state,
            task,
        }
    }

    /// Base URL, e.g. `http://127.0.0.1:41234`.
    pub fn base_url(&self) -> String {
        format!("http://{}", self.addr)
    }

    pub fn url(&self, path: &str) -> String {
        format!("{}{path}", self.base_url())
    }

    /// Rows returned by the registry endpoint.
    pub fn set_rows(&self, rows: serde_json::Value) {
        *self.state.rows.lock().unwrap() = rows;
    }

    /// Make the registry endpoint answer with `status` and an error body.
    pub fn fail_registry(&self, status: StatusCode) {
        *self.state.registry_status.lock().unwrap() = Some(status);
    }

    pub fn last_query(&self) -> Option<RecordedQuery> {
        self.state.last_query.lock().unwrap().clone()
    }
}

impl Drop for FixtureServer {
    fn drop(&mut self) {
        self.task.abort();
    }
}

/// A registry row as the hosted backend returns it.
pub fn registry_row(version: &str, platform: &str, download_url: &str) -> serde_json::Value {
    serde_json::json!({
        "id": 7,
        "version": version,
        "platform": platform,
        "architecture": "x64",
        "download_url": download_url,
        "file_size_bytes": INSTALLER_SIZE,
        "release_notes": format!("Branchbook {version}"),
        "status": "published",
        "created_at": "2026-09-01T12:00:00+00:00"
    })
}

async fn installer() -> impl IntoResponse {
    ([(header::CONTENT_TYPE, "application/octet-stream")], installer_bytes())
}

async fn slow_installer() -> Response {
    let stream = futures::stream::unfold(0usize, |sent| async move {
        if sent == SLOW_CHUNKS {
            return None;
        }
        tokio::time::sleep(SLOW_CHUNK_DELAY).await;
        Some((Ok::<_, Infallible>(vec![7u8; SLOW_CHUNK_SIZE]), sent + 1))
    });

    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, SLOW_CHUNKS * SLOW_CHUNK_SIZE)
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn unsized_installer() -> Response {
    let chunks: Vec<Result<Vec<u8>, Infallible>> =
        installer_bytes().chunks(64 * 1024).map(|c| Ok(c.to_vec())).collect();

    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .body(Body::from_stream(futures::stream::iter(chunks)))
        .unwrap()
}

/// Announces more bytes than it sends, then ends the body.
async fn truncated_installer() -> Response {
    let stream = futures::stream::once(async { Ok::<_, Infallible>(vec![1u8; 1024]) });

    Response::builder()
        .header(header::CONTENT_TYPE, "application/octet-stream")
        .header(header::CONTENT_LENGTH, 4096)
        .body(Body::from_stream(stream))
        .unwrap()
}

async fn registry(
    State(state): State<Arc<FixtureState>>,
    RawQuery(query): RawQuery,
    headers: HeaderMap,
) -> Response {
    let header_value =
        |name: &str| headers.get(name).and_then(|v| v.to_str().ok()).map(str::to_string);
    *state.last_query.lock().unwrap() = Some(RecordedQuery {
        query: query.unwrap_or_default(),
        apikey: header_value("apikey"),
        authorization: header_value("authorization"),
    });

    if let Some(status) = *state.registry_status.lock().unwrap() {
        return (status, r#"{"message":"unavailable"}"#).into_response();
    }

    let rows = state.rows.lock().unwrap().clone();
    axum::Json(rows).into_response()
}

async fn slow_registry() -> impl IntoResponse {
    tokio::time::sleep(Duration::from_secs(5)).await;
    axum::Json(serde_json::json!([]))
}
