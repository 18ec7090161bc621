// ABOUTME: Integration tests for the autodeploy CLI commands.
// ABOUTME: Validates --help output, init, plan, and status behavior without cloud access.

use assert_cmd::Command;
use predicates::prelude::*;
use std::fs;

fn autodeploy_cmd() -> Command {
    Command::new(assert_cmd::cargo::cargo_bin!("autodeploy"))
}

fn write_request(dir: &std::path::Path, body: &str) -> std::path::PathBuf {
    let path = dir.join("request.yml");
    fs::write(&path, body).unwrap();
    path
}

#[test]
fn help_shows_commands() {
    autodeploy_cmd()
        .arg("--help")
        .assert()
        .success()
        .stdout(predicate::str::contains("init"))
        .stdout(predicate::str::contains("plan"))
        .stdout(predicate::str::contains("deploy"))
        .stdout(predicate::str::contains("status"))
        .stdout(predicate::str::contains("logs"));
}

#[test]
fn init_creates_config_file() {
    let temp_dir = tempfile::tempdir().unwrap();
    let config_path = temp_dir.path().join("autodeploy.yml");

    autodeploy_cmd()
        .current_dir(temp_dir.path())
        .args(["init", "--region", "eu-west-1"])
        .assert()
        .success();

    assert!(config_path.exists(), "autodeploy.yml should be created");
    let content = fs::read_to_string(&config_path).unwrap();
    assert!(content.contains("region: eu-west-1"));
}

#[test]
fn init_refuses_to_overwrite_existing_config() {
    let temp_dir = tempfile::tempdir().unwrap();
    fs::write(temp_dir.path().join("autodeploy.yml"), "region: us-east-1\n").unwrap();

    autodeploy_cmd()
        .current_dir(temp_dir.path())
        .arg("init")
        .assert()
        .failure()
        .stderr(predicate::str::contains("already exists"));
}

#[test]
fn plan_prints_the_chosen_shape() {
    let temp_dir = tempfile::tempdir().unwrap();
    let request = write_request(
        temp_dir.path(),
        "repository: .\nanalysis:\n  has_dockerfile: true\n  declared_ports: [8080]\n",
    );

    autodeploy_cmd()
        .current_dir(temp_dir.path())
        .arg("plan")
        .arg(&request)
        .assert()
        .success()
        .stdout(predicate::str::contains("Shape:   container"))
        .stdout(predicate::str::contains("8080"));
}

#[test]
fn plan_json_is_machine_readable() {
    let temp_dir = tempfile::tempdir().unwrap();
    let request = write_request(
        temp_dir.path(),
        "repository: .\nanalysis:\n  entry_point: app.py\n",
    );

    let output = autodeploy_cmd()
        .current_dir(temp_dir.path())
        .args(["plan", "--json"])
        .arg(&request)
        .output()
        .unwrap();
    assert!(output.status.success());
    let value: serde_json::Value = serde_json::from_slice(&output.stdout).unwrap();
    assert!(value.get("shape").is_some());
}

#[test]
fn plan_with_template_prints_terraform() {
    let temp_dir = tempfile::tempdir().unwrap();
    let request = write_request(
        temp_dir.path(),
        "repository: .\nanalysis:\n  entry_point: app.py\n",
    );

    autodeploy_cmd()
        .current_dir(temp_dir.path())
        .args(["plan", "--template"])
        .arg(&request)
        .assert()
        .success()
        .stdout(predicate::str::contains("provider \"aws\""));
}

#[test]
fn status_rejects_malformed_job_id() {
    let temp_dir = tempfile::tempdir().unwrap();

    autodeploy_cmd()
        .current_dir(temp_dir.path())
        .args(["status", "nope"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("invalid job id"));
}

#[test]
fn status_reports_unknown_job() {
    let temp_dir = tempfile::tempdir().unwrap();

    autodeploy_cmd()
        .current_dir(temp_dir.path())
        .args(["status", "6f1c2a8e-3b4d-4c5e-9f60-718293a4b5c6"])
        .assert()
        .failure()
        .stderr(predicate::str::contains("unknown job"));
}
