//! Tests for the tarseal binary

use std::fs;
use std::path::Path;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

/// Base directory with a config using cheap Argon2 costs and no replication
fn create_test_home() -> TempDir {
    let home = TempDir::new().unwrap();
    fs::write(
        home.path().join("config.json"),
        r#"{
            "replicator": "none",
            "notifier": "journal",
            "kdf": { "memory_cost": 256, "time_cost": 1, "parallelism": 1 }
        }"#,
    )
    .unwrap();
    home
}

fn tarseal(home: &Path) -> Command {
    let mut cmd = Command::cargo_bin("tarseal").unwrap();
    cmd.env("TARSEAL_HOME", home)
        .env("TARSEAL_PASSPHRASE", "cli test passphrase")
        .env_remove("RUST_LOG");
    cmd
}

fn create_source(parent: &Path) -> std::path::PathBuf {
    let source = parent.join("source");
    fs::create_dir_all(source.join("nested")).unwrap();
    fs::write(source.join("nested/file.txt"), b"cli round trip").unwrap();
    source
}

#[test]
fn test_init_writes_config() {
    let home = TempDir::new().unwrap();

    Command::cargo_bin("tarseal")
        .unwrap()
        .env("TARSEAL_HOME", home.path())
        .arg("init")
        .assert()
        .success()
        .stdout(predicate::str::contains("Wrote default config"));

    assert!(home.path().join("config.json").exists());
    assert!(home.path().join("backups").is_dir());
}

#[test]
fn test_config_redacts_passphrase() {
    let home = create_test_home();
    fs::write(
        home.path().join("config.json"),
        r#"{ "passphrase": "super secret value" }"#,
    )
    .unwrap();

    tarseal(home.path())
        .arg("config")
        .assert()
        .success()
        .stdout(predicate::str::contains("redacted"))
        .stdout(predicate::str::contains("super secret value").not());
}

#[test]
fn test_full_list_restore() {
    let home = create_test_home();
    let work = TempDir::new().unwrap();
    let source = create_source(work.path());
    let dest = work.path().join("restored");

    tarseal(home.path())
        .arg("full")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup created"))
        .stdout(predicate::str::contains(".tar.gz.enc"));

    tarseal(home.path())
        .args(["list", "--long"])
        .assert()
        .success()
        .stdout(predicate::str::contains("backup_full_"))
        .stdout(predicate::str::contains("Total: 1 backup(s)"));

    tarseal(home.path())
        .args(["verify", "latest"])
        .assert()
        .success()
        .stdout(predicate::str::contains("Backup OK"));

    tarseal(home.path())
        .arg("restore")
        .arg("latest")
        .arg(&dest)
        .assert()
        .success()
        .stdout(predicate::str::contains("Restore complete!"));

    assert_eq!(
        fs::read(dest.join("nested/file.txt")).unwrap(),
        b"cli round trip"
    );
}

#[test]
fn test_missing_passphrase_fails_before_archiving() {
    let home = create_test_home();
    let work = TempDir::new().unwrap();
    let source = create_source(work.path());

    Command::cargo_bin("tarseal")
        .unwrap()
        .env("TARSEAL_HOME", home.path())
        .env_remove("TARSEAL_PASSPHRASE")
        .arg("full")
        .arg(&source)
        .write_stdin("")
        .assert()
        .failure()
        .stderr(predicate::str::contains("No passphrase available"));

    let backups = home.path().join("backups");
    assert!(!backups.exists() || fs::read_dir(&backups).unwrap().count() == 0);
}

#[test]
fn test_restore_unknown_backup_fails() {
    let home = create_test_home();

    tarseal(home.path())
        .args(["restore", "backup_full_19990101_000000.tar.gz.enc"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("Backup not found"));
}

#[test]
fn test_list_empty() {
    let home = create_test_home();

    tarseal(home.path())
        .arg("list")
        .assert()
        .success()
        .stdout(predicate::str::contains("No backups found"));
}

#[test]
fn test_incremental_writes_snapshot_state() {
    let home = create_test_home();
    let work = TempDir::new().unwrap();
    let source = create_source(work.path());

    tarseal(home.path())
        .arg("incremental")
        .arg(&source)
        .assert()
        .success()
        .stdout(predicate::str::contains("backup_incremental_"));

    assert!(home.path().join("backups/backup.snar").exists());
    assert!(home.path().join("notifications.jsonl").exists());
}
