//! Command-line behavior: exit codes and output formats

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

fn dapsync() -> Command {
    let mut cmd = Command::cargo_bin("dapsync").unwrap();
    cmd.env_remove("RUST_LOG").env_remove("DAPSYNC_CONFIG");
    cmd
}

fn populated_source() -> TempDir {
    let src = TempDir::new().unwrap();
    fs::create_dir_all(src.path().join("night1")).unwrap();
    fs::write(src.path().join("readme.txt"), b"hello").unwrap();
    fs::write(src.path().join("night1/obs.fits"), b"observation").unwrap();
    src
}

#[test]
fn test_help() {
    dapsync()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("without deleting anything"));
}

#[test]
fn test_sync_succeeds_with_exit_zero() {
    let src = populated_source();
    let dst = TempDir::new().unwrap();

    dapsync()
        .arg(src.path())
        .arg(dst.path())
        .assert()
        .code(0)
        .stdout(predicate::str::contains("2 copied"));

    assert_eq!(
        fs::read(dst.path().join("night1/obs.fits")).unwrap(),
        b"observation"
    );
}

#[test]
fn test_json_report() {
    let src = populated_source();
    let dst = TempDir::new().unwrap();

    let output = dapsync()
        .arg(src.path())
        .arg(dst.path())
        .arg("--json")
        .output()
        .unwrap();
    assert_eq!(output.status.code(), Some(0));

    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["copied"], 2);
    assert_eq!(report["scanned"], 2);
    assert_eq!(report["skipped"], 0);

    let output = dapsync()
        .arg(src.path())
        .arg(dst.path())
        .arg("--json")
        .output()
        .unwrap();
    let report: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert_eq!(report["copied"], 0);
    assert_eq!(report["skipped"], 2);
}

#[test]
fn test_missing_source_is_fatal() {
    let dir = TempDir::new().unwrap();

    dapsync()
        .arg(dir.path().join("does-not-exist"))
        .arg(dir.path().join("dst"))
        .assert()
        .code(2)
        .stderr(predicate::str::contains("Not found"));
}

#[test]
fn test_same_source_and_destination_rejected() {
    let dir = TempDir::new().unwrap();

    dapsync()
        .arg(dir.path())
        .arg(dir.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("invalid arguments"));
}

#[test]
fn test_unsupported_scheme_is_fatal() {
    let dst = TempDir::new().unwrap();

    dapsync()
        .arg("irods://zone.example.org/home")
        .arg(dst.path())
        .assert()
        .code(2)
        .stderr(predicate::str::contains("unsupported scheme"));
}

#[test]
fn test_zero_jobs_rejected() {
    let src = populated_source();
    let dst = TempDir::new().unwrap();

    dapsync()
        .arg(src.path())
        .arg(dst.path())
        .args(["--jobs", "0"])
        .assert()
        .code(2)
        .stderr(predicate::str::contains("concurrency"));
}

#[test]
fn test_exclude_flag() {
    let src = populated_source();
    fs::write(src.path().join("scratch.tmp"), b"tmp").unwrap();
    let dst = TempDir::new().unwrap();

    dapsync()
        .arg(src.path())
        .arg(dst.path())
        .args(["--exclude", "*.tmp"])
        .assert()
        .success();

    assert!(dst.path().join("readme.txt").exists());
    assert!(!dst.path().join("scratch.tmp").exists());
}

#[cfg(unix)]
#[test]
fn test_partial_failure_exit_code() {
    use std::os::unix::fs::PermissionsExt;

    let src = populated_source();
    let locked = src.path().join("locked.bin");
    fs::write(&locked, b"secret").unwrap();
    fs::set_permissions(&locked, fs::Permissions::from_mode(0o000)).unwrap();
    if fs::File::open(&locked).is_ok() {
        // Permissions are not enforced for this user
        return;
    }
    let dst = TempDir::new().unwrap();

    dapsync()
        .arg(src.path())
        .arg(dst.path())
        .args(["--retries", "0"])
        .assert()
        .code(1)
        .stdout(predicate::str::contains("Permission denied"));

    fs::set_permissions(&locked, fs::Permissions::from_mode(0o644)).unwrap();
}
