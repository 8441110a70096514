use assert_cmd::prelude::*;
use predicates::prelude::*;
use std::fs;
use std::path::{Path, PathBuf};
use std::process::Command;
use tempfile::tempdir;

fn write_config(dir: &Path, origin: &str, version: &str) -> PathBuf {
    let path = dir.join("config.yaml");
    let contents = format!(
        "origin: {origin}\nversion: {version}\nprecache:\n  - /\n  - /images/logo.png\ncache_dir: {}\nclear_timeout_secs: 2\n",
        dir.join("cache").display()
    );
    fs::write(&path, contents).expect("failed to write config");
    path
}

fn sitecache(config: &Path) -> Command {
    let mut cmd = Command::new(assert_cmd::cargo::cargo_bin!("sitecache"));
    cmd.arg("--config")
        .arg(config)
        .env_remove("SITECACHE_CONFIG")
        .env_remove("SITECACHE_FORMAT")
        .env_remove("SITECACHE_NO_CACHE")
        .env("NO_COLOR", "1");
    cmd
}

fn mock_site(server: &mut mockito::Server) -> Vec<mockito::Mock> {
    vec![
        server
            .mock("GET", "/")
            .with_status(200)
            .with_header("content-type", "text/html")
            .with_body("<html>home</html>")
            .create(),
        server
            .mock("GET", "/images/logo.png")
            .with_status(200)
            .with_header("content-type", "image/png")
            .with_body("PNGDATA")
            .create(),
    ]
}

#[test]
fn status_without_config_suggests_init() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("missing.yaml");

    sitecache(&config_path)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("Configuration not found"))
        .stdout(predicate::str::contains("sitecache init"));

    Ok(())
}

#[test]
fn status_uses_custom_config_path() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), "https://studio.example", "v7");

    let assert = sitecache(&config_path).arg("status").assert().success();

    let stdout = String::from_utf8_lossy(&assert.get_output().stdout);
    assert!(stdout.contains(&config_path.to_string_lossy().to_string()));
    assert!(stdout.contains("site-v7"));
    assert!(stdout.contains("site-runtime-v7"));
    assert!(stdout.contains("No version controls pages"));

    Ok(())
}

#[test]
fn init_writes_config() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("nested").join("config.yaml");

    sitecache(&config_path)
        .args(["init", "--origin", "https://studio.example", "--release", "v3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("site-v3"));

    let contents = fs::read_to_string(&config_path)?;
    assert!(contents.contains("origin: https://studio.example"));
    assert!(contents.contains("version: v3"));
    assert!(contents.contains("/images/logo.png"));

    Ok(())
}

#[test]
fn init_refuses_to_overwrite() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), "https://studio.example", "v1");

    sitecache(&config_path)
        .args(["init", "--origin", "https://other.example"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("--force"));

    sitecache(&config_path)
        .args(["init", "--origin", "https://other.example", "--force"])
        .assert()
        .success();

    assert!(fs::read_to_string(&config_path)?.contains("other.example"));
    Ok(())
}

#[test]
fn invalid_config_is_an_error() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("config.yaml");
    fs::write(&config_path, "origin: not a url\n")?;

    sitecache(&config_path)
        .arg("install")
        .assert()
        .failure()
        .stderr(predicate::str::starts_with("Error:"));

    Ok(())
}

#[test]
fn vitals_rates_sample() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = temp.path().join("unused.yaml");

    let assert = sitecache(&config_path)
        .args(["--format", "json", "vitals", "CLS", "0.3", "--id", "v3-42"])
        .assert()
        .success();

    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(json["data"]["metric_rating"], "poor");
    assert_eq!(json["data"]["value"], 300);
    assert_eq!(json["data"]["event_category"], "Web Vitals");
    assert_eq!(json["data"]["event_label"], "v3-42");

    sitecache(&config_path)
        .args(["vitals", "LCP", "2000"])
        .assert()
        .success()
        .stdout(predicate::str::contains("2000ms"))
        .stdout(predicate::str::contains("good"));

    Ok(())
}

#[test]
fn completion_generates_script() {
    Command::new(assert_cmd::cargo::cargo_bin!("sitecache"))
        .args(["completion", "bash"])
        .assert()
        .success()
        .stdout(predicate::str::contains("sitecache"));
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn install_activate_then_serve_offline() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _mocks = mock_site(&mut server);

    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &server.url(), "v1");

    sitecache(&config_path)
        .arg("install")
        .assert()
        .success()
        .stdout(predicate::str::contains("2 entries in site-v1"))
        .stdout(predicate::str::contains("v1 is active"));

    // Origin goes away; precached assets still serve
    server.reset();

    let assert = sitecache(&config_path)
        .args([
            "--format",
            "json",
            "fetch",
            "/images/logo.png",
            "--destination",
            "image",
        ])
        .assert()
        .success();

    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    assert_eq!(json["data"]["status"], 200);
    assert_eq!(json["data"]["route"], "cache-first");
    assert_eq!(json["data"]["cache"], "site-v1");
    assert_eq!(json["data"]["offline_fallback"], false);

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn install_fails_when_manifest_entry_missing() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _home = server.mock("GET", "/").with_status(200).create();
    let _logo = server.mock("GET", "/images/logo.png").with_status(404).create();

    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &server.url(), "v1");

    sitecache(&config_path)
        .arg("install")
        .assert()
        .failure()
        .stderr(predicate::str::contains("HTTP 404"));

    let assert = sitecache(&config_path)
        .args(["--format", "json", "cache", "list"])
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    let entries: u64 = json["data"]
        .as_array()
        .map(|rows| rows.iter().filter_map(|r| r["entries"].as_u64()).sum())
        .unwrap_or(0);
    assert_eq!(entries, 0);

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn fetch_after_first_install_uses_cache() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _mocks = mock_site(&mut server);

    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &server.url(), "v1");
    sitecache(&config_path).arg("install").assert().success();

    sitecache(&config_path)
        .args(["fetch", "/images/logo.png"])
        .assert()
        .success()
        .stdout(predicate::str::contains("cache-first"))
        .stdout(predicate::str::contains("site-v1"));

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn fetch_passes_through_while_waiting() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _mocks = mock_site(&mut server);

    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &server.url(), "v1");
    sitecache(&config_path).arg("install").assert().success();

    write_config(temp.path(), &server.url(), "v2");
    sitecache(&config_path).arg("install").assert().success();

    sitecache(&config_path)
        .args(["fetch", "/images/logo.png"])
        .assert()
        .success()
        .stdout(predicate::str::contains("passthrough (not activated)"));

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn new_version_waits_until_skip_waiting() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _mocks = mock_site(&mut server);

    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &server.url(), "v1");
    sitecache(&config_path).arg("install").assert().success();

    // Deploy v2
    write_config(temp.path(), &server.url(), "v2");
    sitecache(&config_path)
        .arg("install")
        .assert()
        .success()
        .stdout(predicate::str::contains("Waiting for v1"));

    sitecache(&config_path)
        .arg("activate")
        .assert()
        .failure()
        .stderr(predicate::str::contains("waiting for v1"));

    sitecache(&config_path)
        .args(["activate", "--skip-waiting"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Deleted old cache: site-v1"));

    sitecache(&config_path)
        .arg("status")
        .assert()
        .success()
        .stdout(predicate::str::contains("v2 controls pages"));

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn update_hands_over_control() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _mocks = mock_site(&mut server);

    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &server.url(), "v1");
    sitecache(&config_path).arg("install").assert().success();

    write_config(temp.path(), &server.url(), "v2");
    sitecache(&config_path)
        .args(["update", "--yes"])
        .assert()
        .success()
        .stdout(predicate::str::contains("v2 is active"))
        .stdout(predicate::str::contains("reload open pages"));

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn cache_clear_goes_through_worker() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _mocks = mock_site(&mut server);

    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &server.url(), "v1");
    sitecache(&config_path).arg("install").assert().success();

    sitecache(&config_path)
        .args(["cache", "clear"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Cleared 2 cache entries"));

    sitecache(&config_path)
        .args(["cache", "list"])
        .assert()
        .success()
        .stdout(predicate::str::contains("No caches found."));

    Ok(())
}

#[test]
fn cache_clear_refused_before_install() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), "https://studio.example", "v1");

    sitecache(&config_path)
        .args(["cache", "clear"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Caches were not cleared"))
        .stdout(predicate::str::contains("uninstalled"));

    Ok(())
}

#[cfg_attr(not(feature = "http-tests"), ignore)]
#[test]
fn cache_clear_refused_while_waiting() -> Result<(), Box<dyn std::error::Error>> {
    let mut server = mockito::Server::new();
    let _mocks = mock_site(&mut server);

    let temp = tempdir()?;
    let config_path = write_config(temp.path(), &server.url(), "v1");
    sitecache(&config_path).arg("install").assert().success();

    write_config(temp.path(), &server.url(), "v2");
    sitecache(&config_path).arg("install").assert().success();

    sitecache(&config_path)
        .args(["cache", "clear"])
        .assert()
        .failure()
        .stdout(predicate::str::contains("Caches were not cleared"));

    let assert = sitecache(&config_path)
        .args(["--format", "json", "cache", "list"])
        .assert()
        .success();
    let json: serde_json::Value = serde_json::from_slice(&assert.get_output().stdout)?;
    let names: Vec<&str> = json["data"]
        .as_array()
        .map(|rows| rows.iter().filter_map(|r| r["name"].as_str()).collect())
        .unwrap_or_default();
    assert!(names.contains(&"site-v1"));
    assert!(names.contains(&"site-v2"));

    Ok(())
}

#[test]
fn cache_path_reports_configured_dir() -> Result<(), Box<dyn std::error::Error>> {
    let temp = tempdir()?;
    let config_path = write_config(temp.path(), "https://studio.example", "v1");

    sitecache(&config_path)
        .args(["cache", "path"])
        .assert()
        .success()
        .stdout(predicate::str::contains(
            temp.path().join("cache").to_string_lossy().to_string(),
        ));

    Ok(())
}
