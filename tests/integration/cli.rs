//! End-to-end tests for the `memtrail` binary

use std::fs;

use assert_cmd::Command;
use predicates::prelude::*;
use tempfile::TempDir;

use super::common::fixtures::{
    add_bytes, added_object, concrete, delta, TraceBuilder, TraceFile,
};

fn trace() -> TraceFile {
    TraceBuilder::new()
        .node(1)
        .node(2)
        .edge(1, 2)
        .memory(
            1,
            delta(
                vec![added_object(3, "buf", add_bytes(vec![concrete("7", &[0, 1])]))],
                vec![],
                vec![],
            ),
        )
        .memory(2, delta(vec![], vec![], vec![3]))
        .write()
}

fn memtrail(trace: &TraceFile, data_dir: &TempDir) -> Command {
    let mut cmd = Command::cargo_bin("memtrail").unwrap();
    cmd.env_remove("RUST_LOG")
        .arg("--data-dir")
        .arg(data_dir.path())
        .arg(trace.path());
    cmd
}

#[test]
fn test_summary_reports_shape() {
    let trace = trace();
    let data = TempDir::new().unwrap();

    memtrail(&trace, &data)
        .arg("summary")
        .assert()
        .success()
        .stdout(predicate::str::contains("\"nodes\": 2"))
        .stdout(predicate::str::contains("\"failures\": []"));
}

#[test]
fn test_objects_and_object_at_a_node() {
    let trace = trace();
    let data = TempDir::new().unwrap();

    memtrail(&trace, &data)
        .args(["objects", "1"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"name\": \"buf\""));

    memtrail(&trace, &data)
        .args(["object", "1", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"segment_plane\""));

    memtrail(&trace, &data)
        .args(["object", "2", "3"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("not live at node 2"));
}

#[test]
fn test_status_reports_deletion_site() {
    let trace = trace();
    let data = TempDir::new().unwrap();

    memtrail(&trace, &data)
        .args(["status", "2", "3"])
        .assert()
        .success()
        .stdout(predicate::str::contains("\"deleted\""))
        .stdout(predicate::str::contains("\"at\": 2"));
}

#[test]
fn test_unknown_node_fails() {
    let trace = trace();
    let data = TempDir::new().unwrap();

    memtrail(&trace, &data)
        .args(["snapshot", "99"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown node 99"));
}

#[test]
fn test_config_in_data_dir_controls_output() {
    let trace = trace();
    let data = TempDir::new().unwrap();
    fs::write(data.path().join("config.toml"), "[output]\npretty = false\n").unwrap();

    memtrail(&trace, &data)
        .args(["snapshot", "2"])
        .assert()
        .success()
        .stdout(predicate::eq("{\"objects\":{}}\n"));
}

#[test]
fn test_logs_go_to_the_data_dir() {
    let trace = trace();
    let data = TempDir::new().unwrap();

    memtrail(&trace, &data).arg("summary").assert().success();
    assert!(data.path().join("logs").join("memtrail.log").exists());

    memtrail(&trace, &data)
        .arg("--log-stderr")
        .arg("summary")
        .env("RUST_LOG", "memtrail=info")
        .assert()
        .success()
        .stderr(predicate::str::contains("Loaded trace"));
}
