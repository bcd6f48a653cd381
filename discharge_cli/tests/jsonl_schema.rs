use assert_cmd::prelude::*;
use rstest::rstest;
use std::fs;
use std::path::PathBuf;
use std::process::Command;
use tempfile::tempdir;

fn write_config(dir: &tempfile::TempDir, fail_after_reads: Option<u64>) -> PathBuf {
    let fault = fail_after_reads
        .map(|n| format!("fail_after_reads = {n}"))
        .unwrap_or_default();
    let toml = format!(
        r#"
[instrument]
backend = "sim"

[discharge]
kind = "constant"
current_a = 0.5
cutoff_v = 3.2
measure_interval_s = 2.0

[simulation]
virtual_time = true
{fault}
"#
    );
    let path = dir.path().join("cfg.toml");
    fs::write(&path, toml).unwrap();
    path
}

fn json_line(stdout: &[u8], key: &str) -> serde_json::Value {
    let stdout = String::from_utf8_lossy(stdout);
    let line = stdout
        .lines()
        .find(|l| l.contains(key))
        .unwrap_or_else(|| panic!("no JSON line with {key}; stdout was: {stdout}"));
    serde_json::from_str(line).expect("valid JSON")
}

/// Validate the JSON summary of a session that reached cutoff.
#[rstest]
fn json_success_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, None);

    let out = Command::cargo_bin("discharge")
        .unwrap()
        .current_dir(dir.path())
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .assert()
        .success()
        .get_output()
        .stdout
        .clone();
    let v = json_line(&out, "\"stop_reason\"");

    assert!(v.get("timestamp").and_then(|x| x.as_i64()).is_some());
    assert_eq!(v["stop_reason"], "CutoffReached");
    assert_eq!(v["profile"], "constant");
    assert!(v["samples"].as_u64().unwrap() > 101);
    assert!(v["duration_s"].as_f64().unwrap() > 0.0);
    assert!(v["initial_voc_v"].as_f64().unwrap() > 4.0);
    let cap = v["capacity_ah"].as_f64().unwrap();
    assert!(cap > 0.05 && cap < 0.15, "capacity {cap}");
    assert_eq!(v["model_file"], "battery_model.csv");
    assert!(v["raw_file"].is_null());
    assert_eq!(v["degraded"], false);
}

/// Errors in JSON mode carry the stop reason and exit code.
#[rstest]
fn json_fault_schema() {
    let dir = tempdir().unwrap();
    let cfg = write_config(&dir, Some(10));

    let out = Command::cargo_bin("discharge")
        .unwrap()
        .current_dir(dir.path())
        .arg("--json")
        .arg("--log-level")
        .arg("error")
        .arg("--config")
        .arg(&cfg)
        .arg("run")
        .assert()
        .code(3)
        .get_output()
        .stdout
        .clone();
    let v = json_line(&out, "\"reason\"");

    assert_eq!(v["reason"], "InstrumentFault");
    assert_eq!(v["exit_code"], 3);
    assert!(v["message"].as_str().unwrap().contains("timed out"));
}
