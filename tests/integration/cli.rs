//! Smoke tests for the `branchbook-updater` binary.
//!
//! Each test gets its own config file, data directory and download directory
//! through environment variables, so nothing touches the real user profile.
//! No test here lets the binary launch an installer.

use assert_cmd::Command;
use predicates::prelude::*;
use serde_json::json;
use std::path::{Path, PathBuf};
use tempfile::TempDir;

use crate::common::{FixtureServer, installer_sha256, registry_row};

struct CliEnv {
    temp: TempDir,
}

impl CliEnv {
    fn new(registry_url: Option<&str>) -> Self {
        let temp = TempDir::new().unwrap();
        let downloads = temp.path().join("downloads");
        let mut config = String::new();
        if let Some(url) = registry_url {
            config.push_str(&format!("[registry]\nurl = \"{url}\"\napi_key = \"anon-key\"\n\n"));
        }
        config.push_str(&format!(
            "[upgrade]\ndownload_dir = {}\n",
            toml_string(&downloads)
        ));
        std::fs::write(temp.path().join("config.toml"), config).unwrap();
        Self {
            temp,
        }
    }

    fn download_dir(&self) -> PathBuf {
        self.temp.path().join("downloads")
    }

    fn command(&self) -> Command {
        let mut cmd = Command::cargo_bin("branchbook-updater").unwrap();
        cmd.env("BRANCHBOOK_CONFIG_PATH", self.temp.path().join("config.toml"))
            .env("BRANCHBOOK_DATA_DIR", self.temp.path().join("data"))
            .env("BRANCHBOOK_NO_PROGRESS", "1")
            .env_remove("RUST_LOG");
        cmd
    }

    fn installer(&self, name: &str) -> PathBuf {
        std::fs::create_dir_all(self.download_dir()).unwrap();
        let path = self.download_dir().join(name);
        std::fs::write(&path, b"MZ fake installer").unwrap();
        path
    }
}

fn toml_string(path: &Path) -> String {
    format!("'{}'", path.display())
}

/// Run a command off the async runtime so the fixture server keeps serving.
async fn run(mut cmd: Command) -> assert_cmd::assert::Assert {
    tokio::task::spawn_blocking(move || cmd.assert()).await.unwrap()
}

#[test]
fn test_help_lists_commands() {
    Command::cargo_bin("branchbook-updater")
        .unwrap()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("check"))
        .stdout(predicate::str::contains("download"))
        .stdout(predicate::str::contains("schedule"))
        .stdout(predicate::str::contains("hook"));
}

#[test]
fn test_status_without_registry() {
    let env = CliEnv::new(None);
    env.command()
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("not configured"))
        .stdout(predicate::str::contains("Pending:   none"));
}

#[test]
fn test_check_without_registry_fails() {
    let env = CliEnv::new(None);
    env.command()
        .arg("check")
        .assert()
        .failure()
        .stderr(predicate::str::contains("registry.url is not set"));
}

#[test]
fn test_invalid_config_is_reported() {
    let env = CliEnv::new(None);
    std::fs::write(env.temp.path().join("config.toml"), "[registry\nurl =").unwrap();
    env.command()
        .arg("status")
        .assert()
        .failure()
        .stderr(predicate::str::contains("error"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_check_reports_update() {
    let server = FixtureServer::start().await;
    let platform = branchbook_updater::upgrade::Platform::current().to_string();
    server.set_rows(json!([registry_row(
        "99.0.0",
        &platform,
        &server.url("/files/setup.exe")
    )]));
    let env = CliEnv::new(Some(&server.base_url()));

    let mut cmd = env.command();
    cmd.arg("check");
    run(cmd)
        .await
        .success()
        .stdout(predicate::str::contains("Update available"))
        .stdout(predicate::str::contains("99.0.0"));
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_with_checksum_output() {
    let server = FixtureServer::start().await;
    let env = CliEnv::new(Some(&server.base_url()));

    let mut cmd = env.command();
    cmd.args([
        "download",
        &server.url("/files/setup.exe"),
        "--file-name",
        "Branchbook-Setup.exe",
        "--sha256",
    ]);
    run(cmd)
        .await
        .success()
        .stdout(predicate::str::contains("Downloaded"))
        .stdout(predicate::str::contains(installer_sha256()));

    assert!(env.download_dir().join("Branchbook-Setup.exe").exists());
}

#[tokio::test(flavor = "multi_thread")]
async fn test_download_http_error_exits_nonzero() {
    let server = FixtureServer::start().await;
    let env = CliEnv::new(Some(&server.base_url()));

    let mut cmd = env.command();
    cmd.args(["download", &server.url("/files/missing.exe")]);
    run(cmd).await.failure().stderr(predicate::str::contains("404"));

    assert!(!env.download_dir().join("missing.exe").exists());
}

#[test]
fn test_download_rejects_bad_file_name() {
    let env = CliEnv::new(None);
    env.command()
        .args(["download", "https://example.com/setup.exe", "--file-name", "../evil.exe"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Invalid file name"));
}

#[test]
fn test_schedule_persists_across_processes() {
    let env = CliEnv::new(None);
    let installer = env.installer("Branchbook-Setup-2.0.0.exe");

    env.command()
        .args(["schedule", "next-launch"])
        .arg(&installer)
        .assert()
        .success()
        .stdout(predicate::str::contains("next launch"));

    let output = env.command().args(["status", "--json"]).output().unwrap();
    assert!(output.status.success());
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["pendingInstall"]["mode"], "installOnNextLaunch");

    env.command().args(["schedule", "cancel"]).assert().success();

    let output = env.command().args(["status", "--json"]).output().unwrap();
    let status: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(status["pendingInstall"]["mode"], "none");
}

#[test]
fn test_startup_hook_with_deleted_installer() {
    let env = CliEnv::new(None);
    let installer = env.installer("Branchbook-Setup-2.0.0.exe");

    env.command().args(["schedule", "next-launch"]).arg(&installer).assert().success();
    std::fs::remove_file(&installer).unwrap();

    let output = env.command().args(["hook", "startup", "--json"]).output().unwrap();
    assert!(output.status.success());
    let outcome: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(outcome["launched"], serde_json::Value::Null);
    assert_eq!(outcome["shouldQuit"], false);
    assert!(outcome["error"].as_str().is_some_and(|e| e.contains("not found")));

    // The choice was discarded
    env.command()
        .args(["hook", "startup"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to install"));
}

#[test]
fn test_before_close_hook_without_choice() {
    let env = CliEnv::new(None);
    env.command()
        .args(["hook", "before-close"])
        .assert()
        .success()
        .stdout(predicate::str::contains("may quit"));
}
