use discharge_config::{Backend, DischargeKind, TerminalsCfg, WiringCfg, load_file, load_toml};
use discharge_traits::{Terminals, Wiring};
use rstest::rstest;

const CONSTANT: &str = r#"
[instrument]
backend = "sim"
nplc = 1.0
line_frequency_hz = 50

[discharge]
kind = "constant"
current_a = 0.5
cutoff_v = 3.0
measure_interval_s = 10
"#;

const LIST: &str = r#"
[discharge]
kind = "list"
steps = [
    { current_a = 0.1, duration_s = 60 },
    { current_a = 0.8, duration_s = 5 },
]
cutoff_v = 3.0
measure_interval_s = 10
settle_s = 0.2
"#;

#[test]
fn accepts_constant_profile_with_defaults() {
    let cfg = load_toml(CONSTANT).expect("parse TOML");
    cfg.validate().expect("valid config should pass");
    assert_eq!(cfg.discharge.kind, DischargeKind::Constant);
    assert_eq!(cfg.instrument.backend, Backend::Sim);
    assert_eq!(cfg.instrument.wiring, WiringCfg::FourWire);
    assert!((cfg.discharge.settle_s - 0.5).abs() < f64::EPSILON);
    assert_eq!(cfg.output.model_file, "battery_model.csv");
}

#[test]
fn accepts_list_profile() {
    let cfg = load_toml(LIST).expect("parse TOML");
    cfg.validate().expect("valid list config should pass");
    assert_eq!(cfg.discharge.steps.len(), 2);
    assert!((cfg.discharge.steps[1].current_a - 0.8).abs() < f64::EPSILON);
}

#[rstest]
#[case("current_a = 0.5", "current_a = 0.0000001", "discharge.current_a must be in")]
#[case("current_a = 0.5", "current_a = 2.0", "discharge.current_a must be in")]
#[case("current_a = 0.5", "", "current_a is required")]
#[case("cutoff_v = 3.0", "cutoff_v = 0.05", "cutoff_v must be >=")]
#[case("measure_interval_s = 10", "measure_interval_s = 0.5", "measure_interval_s must be in")]
#[case("measure_interval_s = 10", "measure_interval_s = 601", "measure_interval_s must be in")]
#[case("nplc = 1.0", "nplc = 50.0", "nplc must be in")]
#[case("line_frequency_hz = 50", "line_frequency_hz = 55", "line_frequency_hz must be 50 or 60")]
#[case(
    "backend = \"sim\"",
    "backend = \"tcp\"",
    "address is required"
)]
fn rejects_out_of_range_constant(#[case] from: &str, #[case] to: &str, #[case] needle: &str) {
    let text = CONSTANT.replace(from, to);
    let cfg = load_toml(&text).expect("parse TOML");
    let err = cfg.validate().expect_err("should reject");
    assert!(
        format!("{err}").contains(needle),
        "error {err} does not mention {needle}"
    );
}

#[test]
fn rejects_profile_with_both_current_and_steps() {
    let text = LIST.replace("kind = \"list\"", "kind = \"list\"\ncurrent_a = 0.2");
    let cfg = load_toml(&text).expect("parse TOML");
    let err = cfg.validate().expect_err("mutually exclusive");
    assert!(format!("{err}").contains("must be unset"));
}

#[test]
fn rejects_single_step_list() {
    let text = LIST.replace("    { current_a = 0.8, duration_s = 5 },\n", "");
    let cfg = load_toml(&text).expect("parse TOML");
    let err = cfg.validate().expect_err("too few steps");
    assert!(format!("{err}").contains("2..=10"));
}

#[test]
fn rejects_sub_second_step() {
    let text = LIST.replace("duration_s = 5", "duration_s = 0.5");
    let cfg = load_toml(&text).expect("parse TOML");
    let err = cfg.validate().expect_err("short step");
    assert!(format!("{err}").contains("steps[1].duration_s"));
}

#[test]
fn rejects_settle_longer_than_interval() {
    let text = LIST.replace("settle_s = 0.2", "settle_s = 10");
    let cfg = load_toml(&text).expect("parse TOML");
    assert!(cfg.validate().is_err());
}

#[test]
fn unknown_kind_fails_to_parse() {
    let text = CONSTANT.replace("kind = \"constant\"", "kind = \"pulsed\"");
    assert!(load_toml(&text).is_err());
}

#[test]
fn load_file_reads_from_disk() {
    let dir = tempfile::tempdir().expect("tempdir");
    let path = dir.path().join("discharge.toml");
    std::fs::write(&path, LIST).expect("write config");
    let cfg = load_file(&path).expect("load");
    assert_eq!(cfg.discharge.kind, DischargeKind::List);

    let missing = dir.path().join("nope.toml");
    let err = load_file(&missing).expect_err("missing file");
    assert!(format!("{err}").contains("read config"));
}

#[rstest]
#[case(TerminalsCfg::Front, Terminals::Front)]
#[case(TerminalsCfg::Rear, Terminals::Rear)]
fn terminals_map_to_instrument_selection(#[case] cfg: TerminalsCfg, #[case] want: Terminals) {
    assert_eq!(Terminals::from(cfg), want);
}

#[rstest]
#[case(WiringCfg::TwoWire, Wiring::TwoWire)]
#[case(WiringCfg::FourWire, Wiring::FourWire)]
fn wiring_maps_to_instrument_selection(#[case] cfg: WiringCfg, #[case] want: Wiring) {
    assert_eq!(Wiring::from(cfg), want);
}
