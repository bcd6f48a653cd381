use std::sync::Arc;
use std::time::Duration;

use discharge_hardware::{SimCell, SimulatedSourceMeter};
use discharge_traits::{SourceMeter, VirtualClock};
use rstest::rstest;

#[rstest]
#[case(-0.1, 3600, 0.1)]
#[case(-0.05, 1800, 0.025)]
#[case(0.0, 3600, 0.0)]
fn drawn_charge_follows_current_and_time(
    #[case] amps: f64,
    #[case] secs: u64,
    #[case] expected_ah: f64,
) {
    let clock = VirtualClock::new();
    let mut sm = SimulatedSourceMeter::new(SimCell::default(), Arc::new(clock.clone()));
    sm.set_output(true).unwrap();
    sm.set_source_current(amps).unwrap();
    clock.advance(Duration::from_secs(secs));
    assert!((sm.drawn_ah() - expected_ah).abs() < 1e-9);
}

#[test]
fn output_off_stops_discharge() {
    let clock = VirtualClock::new();
    let mut sm = SimulatedSourceMeter::new(SimCell::default(), Arc::new(clock.clone()));
    sm.set_output(true).unwrap();
    sm.set_source_current(-0.1).unwrap();
    clock.advance(Duration::from_secs(60));
    sm.set_output(false).unwrap();
    clock.advance(Duration::from_secs(600));
    let drawn = sm.drawn_ah();
    assert!((drawn - 0.1 * 60.0 / 3600.0).abs() < 1e-12);
}

#[test]
fn source_level_beyond_range_is_rejected() {
    let clock = VirtualClock::new();
    let mut sm = SimulatedSourceMeter::new(SimCell::default(), Arc::new(clock));
    sm.set_current_range(0.1).unwrap();
    assert!(sm.set_source_current(-0.5).is_err());
    assert!(sm.set_source_current(-0.1).is_ok());
}
