//! CLI integration tests
//!
//! These tests run the compiled binary and cover the paths that need no
//! container daemon: argument validation, configuration errors and `analyze`.

use binfinder::{DiffRecord, DiffStore, ImageRef, JsonDiffStore};
use std::fs;
use std::process::Command;
use tempfile::TempDir;

fn binfinder() -> Command {
    let mut command = Command::new(env!("CARGO_BIN_EXE_binfinder"));
    for var in [
        "BINFINDER_OUTPUT_DIR",
        "BINFINDER_WORKERS",
        "BINFINDER_LOG_LEVEL",
        "BINFINDER_LOG_JSON",
        "RUST_LOG",
    ] {
        command.env_remove(var);
    }
    command
}

#[test]
fn test_cli_help() {
    let output = binfinder().arg("--help").output().unwrap();

    assert!(output.status.success());
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.contains("scan"));
    assert!(stdout.contains("analyze"));
}

#[test]
fn test_cli_version() {
    let output = binfinder().arg("--version").output().unwrap();

    assert!(output.status.success());
    assert!(String::from_utf8_lossy(&output.stdout).contains(env!("CARGO_PKG_VERSION")));
}

#[test]
fn test_scan_without_source_is_usage_error() {
    let output = binfinder().arg("scan").output().unwrap();

    assert_eq!(output.status.code(), Some(2));
}

#[test]
fn test_scan_rejects_invalid_configuration() {
    let temp = TempDir::new().unwrap();
    let output = binfinder()
        .args(["scan", "--images", "alpine:3.10", "--workers", "0", "--output"])
        .arg(temp.path().join("data"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
    assert!(output.stdout.is_empty());
    assert!(!temp.path().join("data").exists());
}

#[test]
fn test_scan_rejects_unknown_config_keys() {
    let temp = TempDir::new().unwrap();
    let config = temp.path().join("binfinder.toml");
    fs::write(&config, "wrokers = 4\n").unwrap();

    let output = binfinder()
        .args(["scan", "--images", "alpine:3.10", "--config"])
        .arg(&config)
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
}

#[test]
fn test_analyze_writes_ranked_csv() {
    let temp = TempDir::new().unwrap();
    let data = temp.path().join("data");
    let store = JsonDiffStore::create(&data).unwrap();
    for (image, names) in [
        ("alpine:3.10", vec!["/usr/bin/sed", "/opt/tool"]),
        ("ubuntu:22.04", vec!["/usr/bin/sed"]),
    ] {
        store
            .save(&DiffRecord {
                image_name: ImageRef::new(image),
                elf_names: names.into_iter().map(String::from).collect(),
            })
            .unwrap();
    }
    let csv = temp.path().join("report.csv");

    let output = binfinder()
        .args(["-q", "analyze", "--output"])
        .arg(&data)
        .arg("--csv")
        .arg(&csv)
        .output()
        .unwrap();

    assert!(output.status.success());
    assert_eq!(
        fs::read_to_string(&csv).unwrap(),
        "binary,count\n/usr/bin/sed,2\n/opt/tool,1\n"
    );
    let stdout = String::from_utf8_lossy(&output.stdout);
    assert!(stdout.lines().next().unwrap().ends_with("/usr/bin/sed"));
}

#[test]
fn test_analyze_missing_directory_fails() {
    let temp = TempDir::new().unwrap();
    let output = binfinder()
        .args(["analyze", "--output"])
        .arg(temp.path().join("nope"))
        .arg("--csv")
        .arg(temp.path().join("out.csv"))
        .output()
        .unwrap();

    assert_eq!(output.status.code(), Some(1));
}
