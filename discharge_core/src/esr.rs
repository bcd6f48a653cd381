//! ESR sampler.
//!
//! One measurement steps the source from the ongoing load to a test level and
//! reads the terminal voltage on both sides of the step. The load current is
//! restored on every exit path, including failed reads after the step.

use std::time::Duration;

use discharge_traits::{Clock, SourceMeter};
use tracing::debug;

use crate::error::Result;
use crate::hw_error::hw;

/// Result of one ESR measurement.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct EsrReading {
    /// Terminal voltage under the load current.
    pub v_before: f64,
    /// Terminal voltage at the test current.
    pub v_after: f64,
    /// Ohms; `NaN` when the test and load currents coincide.
    pub esr: f64,
    /// Source level in effect before (and after) the measurement.
    pub load_current: f64,
}

/// Measure ESR by stepping the source to `-|test_current|`.
///
/// `esr = |v_after - v_before| / |-|test_current| - load_current|`: the
/// denominator is the current step the source actually made, so the sign of
/// `test_current` does not matter.
///
/// With `test_current == 0` this doubles as the open-circuit read: `v_before`
/// is the loaded voltage and `v_after` the open-circuit voltage.
pub fn measure_esr<I>(
    inst: &mut I,
    clock: &dyn Clock,
    test_current: f64,
    settle: Duration,
) -> Result<EsrReading>
where
    I: SourceMeter + ?Sized,
{
    let load_current = hw(inst.source_current(), "read source level")?;
    let v_before = hw(inst.measure_voltage(), "read loaded voltage")?;
    // 0.0 - x keeps an open-circuit request at +0.0 rather than -0.0
    let test_level = 0.0 - test_current.abs();

    hw(inst.set_source_current(test_level), "set test current")?;
    let stepped = (|| {
        if !settle.is_zero() {
            clock.sleep(settle);
        }
        hw(inst.measure_voltage(), "read test voltage")
    })();
    let restored = hw(inst.set_source_current(load_current), "restore load current");
    let v_after = stepped?;
    restored?;

    let denom = (test_level - load_current).abs();
    let esr = if denom > 0.0 {
        (v_after - v_before).abs() / denom
    } else {
        debug!(test_current, load_current, "esr undefined: no current step");
        f64::NAN
    };
    Ok(EsrReading {
        v_before,
        v_after,
        esr,
        load_current,
    })
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{Event, ScriptedMeter};
    use discharge_traits::VirtualClock;
    use rstest::rstest;

    #[test]
    fn open_circuit_step_from_load() {
        // 4.0 V open circuit, 0.2 ohm
        let mut m = ScriptedMeter::new(|i| 4.0 + 0.2 * i);
        m.set_source_current(-0.5).unwrap();
        let clock = VirtualClock::new();
        let r = measure_esr(&mut m, &clock, 0.0, Duration::from_millis(500)).unwrap();
        assert!((r.v_before - 3.9).abs() < 1e-12);
        assert!((r.v_after - 4.0).abs() < 1e-12);
        assert!((r.esr - 0.2).abs() < 1e-12);
        assert_eq!(r.load_current, -0.5);
        assert_eq!(m.level(), -0.5);
        assert_eq!(clock.elapsed(), Duration::from_millis(500));
    }

    #[rstest]
    #[case(1.0)]
    #[case(-1.0)]
    fn nonzero_test_current_divides_by_the_applied_step(#[case] test_current: f64) {
        // 4.0 V open circuit, 0.2 ohm; load -0.5 A, test level -1.0 A
        let mut m = ScriptedMeter::new(|i| 4.0 + 0.2 * i);
        m.set_source_current(-0.5).unwrap();
        let clock = VirtualClock::new();
        let r = measure_esr(&mut m, &clock, test_current, Duration::ZERO).unwrap();
        assert!((r.v_before - 3.9).abs() < 1e-12);
        assert!((r.v_after - 3.8).abs() < 1e-12);
        // 0.1 V over a 0.5 A step
        assert!((r.esr - 0.2).abs() < 1e-12, "esr {}", r.esr);
        assert!(m.events().contains(&Event::SourceCurrent(-1.0)));
        assert_eq!(m.level(), -0.5);
    }

    #[test]
    fn zero_load_and_zero_test_is_nan() {
        let mut m = ScriptedMeter::new(|_| 3.7);
        let clock = VirtualClock::new();
        let r = measure_esr(&mut m, &clock, 0.0, Duration::ZERO).unwrap();
        assert!(r.esr.is_nan());
        assert_eq!(clock.elapsed(), Duration::ZERO);
    }

    #[test]
    fn load_restored_when_second_read_fails() {
        let mut m = ScriptedMeter::new(|i| 4.0 + 0.1 * i).fail_measure_after(1);
        m.set_source_current(-0.3).unwrap();
        let clock = VirtualClock::new();
        assert!(measure_esr(&mut m, &clock, 0.0, Duration::ZERO).is_err());
        assert_eq!(m.level(), -0.3);
        let last = m.events().last().cloned();
        assert_eq!(last, Some(Event::SourceCurrent(-0.3)));
    }
}
