//! Integration tests for the Tidemark CLI

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;
use tempfile::TempDir;

/// Get the tidemark binary
#[allow(deprecated)]
fn tidemark_cmd() -> Command {
    Command::cargo_bin("tidemark").unwrap()
}

#[test]
fn test_help_command() {
    tidemark_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("Tidemark - database schema migrations"))
        .stdout(predicate::str::contains("migrate"))
        .stdout(predicate::str::contains("validate"))
        .stdout(predicate::str::contains("repair"))
        .stdout(predicate::str::contains("erase"))
        .stdout(predicate::str::contains("info"));
}

#[test]
fn test_migrate_help() {
    tidemark_cmd()
        .args(["migrate", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--skip-next"))
        .stdout(predicate::str::contains("--erase-on-validation-error"))
        .stdout(predicate::str::contains("--retry-repeatable"));
}

#[test]
fn test_erase_help() {
    tidemark_cmd()
        .args(["erase", "--help"])
        .assert()
        .success()
        .stdout(predicate::str::contains("--force"));
}

#[test]
fn test_missing_url_is_an_error() {
    let dir = TempDir::new().unwrap();
    tidemark_cmd()
        .current_dir(dir.path())
        .arg("info")
        .assert()
        .failure()
        .stderr(predicate::str::contains("no database URL"));
}

#[test]
fn test_invalid_placeholder_is_an_error() {
    let dir = TempDir::new().unwrap();
    tidemark_cmd()
        .current_dir(dir.path())
        .args(["--url", "app.db", "--placeholder", "broken", "info"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid placeholder"));
}

fn write_scripts(dir: &TempDir) {
    let migrations = dir.path().join("migrations");
    fs::create_dir_all(&migrations).unwrap();
    fs::write(
        migrations.join("V1__users.sql"),
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT NOT NULL);\n",
    )
    .unwrap();
    fs::write(
        migrations.join("V2__posts.sql"),
        "CREATE TABLE posts (id INTEGER PRIMARY KEY, user_id INTEGER REFERENCES users (id));\n",
    )
    .unwrap();
    fs::write(
        migrations.join("R__counts.sql"),
        "CREATE VIEW IF NOT EXISTS user_counts AS SELECT count(*) AS n FROM users;\nDROP VIEW user_counts;\n",
    )
    .unwrap();
}

#[test]
fn test_migrate_info_validate_against_sqlite() {
    let dir = TempDir::new().unwrap();
    write_scripts(&dir);

    tidemark_cmd()
        .current_dir(dir.path())
        .args(["--url", "app.db", "migrate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("V1__users.sql"))
        .stdout(predicate::str::contains("V2__posts.sql"))
        .stdout(predicate::str::contains("3 applied"));

    tidemark_cmd()
        .current_dir(dir.path())
        .args(["--url", "app.db", "info"])
        .assert()
        .success()
        .stdout(predicate::str::contains("users"))
        .stdout(predicate::str::contains("Success"));

    tidemark_cmd()
        .current_dir(dir.path())
        .args(["--url", "app.db", "validate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("validation passed"));

    // Second run: steady state.
    tidemark_cmd()
        .current_dir(dir.path())
        .args(["--url", "app.db", "migrate"])
        .assert()
        .success()
        .stdout(predicate::str::contains("nothing to do"));
}

#[test]
fn test_checksum_drift_fails_validate_and_repair_fixes_it() {
    let dir = TempDir::new().unwrap();
    write_scripts(&dir);

    tidemark_cmd()
        .current_dir(dir.path())
        .args(["--url", "app.db", "migrate"])
        .assert()
        .success();

    fs::write(
        dir.path().join("migrations/V1__users.sql"),
        "CREATE TABLE users (id INTEGER PRIMARY KEY, name TEXT);\n",
    )
    .unwrap();

    tidemark_cmd()
        .current_dir(dir.path())
        .args(["--url", "app.db", "validate"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid checksum for: V1__users.sql"));

    tidemark_cmd()
        .current_dir(dir.path())
        .args(["--url", "app.db", "repair"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 checksums repaired"));

    tidemark_cmd()
        .current_dir(dir.path())
        .args(["--url", "app.db", "validate"])
        .assert()
        .success();
}

#[test]
fn test_erase_with_force() {
    let dir = TempDir::new().unwrap();
    write_scripts(&dir);

    tidemark_cmd()
        .current_dir(dir.path())
        .args(["--url", "app.db", "migrate"])
        .assert()
        .success();

    tidemark_cmd()
        .current_dir(dir.path())
        .args(["--url", "app.db", "erase", "--force"])
        .assert()
        .success()
        .stdout(predicate::str::contains("1 schemas erased"));
}
