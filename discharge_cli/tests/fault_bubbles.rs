use assert_cmd::prelude::*;
use predicates::prelude::*;
use rstest::rstest;
use std::fs;
use std::process::Command;
use tempfile::tempdir;

#[rstest]
fn sim_timeout_bubbles_to_cli() {
    let dir = tempdir().unwrap();
    let toml = r#"
[instrument]
backend = "sim"

[discharge]
kind = "constant"
current_a = 0.5
cutoff_v = 3.2
measure_interval_s = 2.0

[simulation]
virtual_time = true
# probe succeeds, the discharge fails a few samples in
fail_after_reads = 10
"#;
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, toml).unwrap();

    let mut cmd = Command::cargo_bin("discharge").unwrap();
    cmd.current_dir(dir.path())
        .arg("--config")
        .arg(&cfg)
        .arg("--log-level")
        .arg("error")
        .arg("run");
    cmd.assert()
        .code(3)
        .stderr(predicate::str::contains(
            "What happened: Instrument read timed out",
        ));
    assert!(!dir.path().join("battery_model.csv").exists());
}

#[rstest]
fn unreachable_tcp_instrument_is_an_instrument_fault() {
    let dir = tempdir().unwrap();
    // Port 1 on loopback refuses connections
    let toml = r#"
[instrument]
backend = "tcp"
address = "127.0.0.1:1"
timeout_ms = 200

[discharge]
kind = "constant"
current_a = 0.5
cutoff_v = 3.2
measure_interval_s = 2.0
"#;
    let cfg = dir.path().join("cfg.toml");
    fs::write(&cfg, toml).unwrap();

    Command::cargo_bin("discharge")
        .unwrap()
        .arg("--config")
        .arg(&cfg)
        .arg("self-check")
        .assert()
        .code(3)
        .stderr(predicate::str::contains("Could not reach the instrument"));
}
