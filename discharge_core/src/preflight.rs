//! Instrument setup and the open-circuit probe that precedes a session.

use std::time::Duration;

use discharge_traits::{Clock, SourceMeter, Terminals, Wiring};
use tracing::info;

use crate::error::Result;
use crate::guard::InstrumentGuard;
use crate::hw_error::hw;
use crate::params::VOLTAGE_RANGES_V;

/// Static instrument configuration applied once after connecting.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct InstrumentSetup {
    pub terminals: Terminals,
    pub wiring: Wiring,
    pub nplc: f64,
    pub line_frequency_hz: f64,
}

impl From<&discharge_config::InstrumentCfg> for InstrumentSetup {
    fn from(c: &discharge_config::InstrumentCfg) -> Self {
        Self {
            terminals: c.terminals.into(),
            wiring: c.wiring.into(),
            nplc: c.nplc,
            line_frequency_hz: c.line_frequency_hz,
        }
    }
}

/// Reset and configure the instrument; returns its identification string.
pub fn configure<I: SourceMeter + ?Sized>(inst: &mut I, setup: &InstrumentSetup) -> Result<String> {
    let idn = hw(inst.identify(), "identify instrument")?;
    hw(inst.reset(), "reset instrument")?;
    hw(inst.set_terminals(setup.terminals), "select terminals")?;
    hw(inst.set_wiring(setup.wiring), "select wiring")?;
    hw(inst.set_line_frequency(setup.line_frequency_hz), "set line frequency")?;
    hw(inst.set_nplc(setup.nplc), "set nplc")?;
    info!(idn = %idn, ?setup, "instrument configured");
    Ok(idn)
}

/// Read the open-circuit voltage at zero source current on the widest range.
///
/// The output is only on for the duration of the read and is turned off again
/// on every path.
pub fn probe_open_circuit<I: SourceMeter + ?Sized>(
    inst: &mut I,
    clock: &dyn Clock,
    settle: Duration,
) -> Result<f64> {
    let widest = VOLTAGE_RANGES_V[VOLTAGE_RANGES_V.len() - 1];
    hw(inst.set_source_current(0.0), "zero source current")?;
    hw(inst.set_voltage_range(widest), "set voltage range")?;
    hw(inst.set_compliance_voltage(widest), "set compliance")?;
    let mut guard = InstrumentGuard::engage(inst)?;
    if !settle.is_zero() {
        clock.sleep(settle);
    }
    let voc = hw(guard.measure_voltage(), "read open-circuit voltage")?;
    guard.release()?;
    info!(voc, "open-circuit voltage");
    Ok(voc)
}
