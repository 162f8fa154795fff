//! CLI integration tests
//!
//! Drive the `revtrail` binary against a temporary history database.

use serde_json::{json, Value};
use std::fs;
use std::path::{Path, PathBuf};
use std::process::{Command, Output};
use tempfile::TempDir;

fn write_json(dir: &Path, name: &str, value: Value) -> PathBuf {
    let path = dir.join(name);
    fs::write(&path, value.to_string()).unwrap();
    path
}

fn revtrail(dir: &TempDir, args: &[&str]) -> Output {
    let db = dir.path().join("history.db");
    Command::new(env!("CARGO_BIN_EXE_revtrail"))
        .current_dir(dir.path())
        .arg("--db")
        .arg(&db)
        .args(args)
        .output()
        .expect("Failed to execute CLI")
}

fn stdout(output: &Output) -> String {
    assert!(
        output.status.success(),
        "CLI failed: {}",
        String::from_utf8_lossy(&output.stderr)
    );
    String::from_utf8_lossy(&output.stdout).into_owned()
}

/// Two updates on users/ann; returns the path of the current snapshot
fn seed_ann(dir: &TempDir) -> PathBuf {
    let v0 = write_json(dir.path(), "v0.json", json!({"name": "Ann", "age": 30}));
    let v1 = write_json(dir.path(), "v1.json", json!({"name": "Ann", "age": 31}));
    let v2 = write_json(
        dir.path(),
        "v2.json",
        json!({"name": "Ann", "age": 31, "tags": ["x"]}),
    );

    let first = revtrail(
        dir,
        &[
            "record", "users", "ann",
            "--before", v0.to_str().unwrap(),
            "--after", v1.to_str().unwrap(),
            "--user", "admin",
            "--reason", "birthday",
        ],
    );
    assert_eq!(stdout(&first).trim(), "recorded version 0");

    let second = revtrail(
        dir,
        &[
            "record", "users", "ann",
            "--before", v1.to_str().unwrap(),
            "--after", v2.to_str().unwrap(),
        ],
    );
    assert_eq!(stdout(&second).trim(), "recorded version 1");
    v2
}

#[test]
fn test_record_then_log() {
    let dir = TempDir::new().unwrap();
    seed_ann(&dir);

    let log: Value = serde_json::from_str(&stdout(&revtrail(&dir, &["log", "users", "ann"]))).unwrap();
    let records = log.as_array().unwrap();
    assert_eq!(records.len(), 2);
    assert_eq!(records[0]["diff"], json!({"age": [30, 31]}));
    assert_eq!(records[0]["user"], json!("admin"));
    assert_eq!(records[1]["diff"], json!({"tags": [["x"]]}));

    let newest: Value = serde_json::from_str(&stdout(&revtrail(
        &dir,
        &["log", "users", "ann", "--desc", "--limit", "1"],
    )))
    .unwrap();
    assert_eq!(newest[0]["version"], json!(1));
}

#[test]
fn test_show_rebuilds_past_version() {
    let dir = TempDir::new().unwrap();
    let current = seed_ann(&dir);

    let shown: Value = serde_json::from_str(&stdout(&revtrail(
        &dir,
        &["show", "users", "ann", "0", "--current", current.to_str().unwrap()],
    )))
    .unwrap();
    assert_eq!(shown, json!({"name": "Ann", "age": 30}));
}

#[test]
fn test_show_rejects_non_numeric_version() {
    let dir = TempDir::new().unwrap();
    let output = revtrail(&dir, &["show", "users", "ann", "latest"]);
    assert!(!output.status.success());
    assert!(String::from_utf8_lossy(&output.stderr).contains("ERR_INVALID_ARGUMENT"));
}

#[test]
fn test_summary_expands_fields() {
    let dir = TempDir::new().unwrap();
    seed_ann(&dir);

    let text = stdout(&revtrail(&dir, &["summary", "users", "ann", "--expand", "age"]));
    let lines: Vec<&str> = text.lines().collect();
    assert_eq!(lines.len(), 2);
    assert!(lines[0].ends_with("modified age from 30 to 31 (birthday)"));
    assert!(lines[1].ends_with("modified tags"));
}

#[test]
fn test_record_honours_config() {
    let dir = TempDir::new().unwrap();
    let config = dir.path().join("history.toml");
    fs::write(&config, "omit = \"age\"\nrequired = [\"user\"]\n").unwrap();
    let before = write_json(dir.path(), "a.json", json!({"name": "A", "age": 1}));
    let after = write_json(dir.path(), "b.json", json!({"name": "A", "age": 2}));

    let output = revtrail(
        &dir,
        &[
            "record", "users", "u1",
            "--before", before.to_str().unwrap(),
            "--after", after.to_str().unwrap(),
            "--user", "admin",
            "--config", config.to_str().unwrap(),
        ],
    );
    assert_eq!(stdout(&output).trim(), "nothing recorded");
}

#[test]
fn test_record_delete() {
    let dir = TempDir::new().unwrap();
    let before = write_json(dir.path(), "bob.json", json!({"name": "Bob"}));

    let output = revtrail(
        &dir,
        &["record", "users", "bob", "--before", before.to_str().unwrap()],
    );
    assert_eq!(stdout(&output).trim(), "recorded version 0");

    let shown: Value =
        serde_json::from_str(&stdout(&revtrail(&dir, &["show", "users", "bob", "0"]))).unwrap();
    assert_eq!(shown, json!({"name": "Bob"}));
}
