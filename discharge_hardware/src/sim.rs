//! Simulated SourceMeter wired to an idealised battery.
//!
//! Charge is integrated against the shared `Clock`, so pairing the simulator
//! with a `VirtualClock` lets a full discharge run in microseconds.

use std::sync::Arc;
use std::time::Instant;

use discharge_traits::{Clock, HwResult, SourceMeter, Terminals, Wiring};
use tracing::{debug, trace};

use crate::error::HwError;

/// Electrical parameters of the simulated cell.
#[derive(Debug, Clone, Copy)]
pub struct SimCell {
    pub capacity_ah: f64,
    /// Open-circuit voltage when full.
    pub full_voc: f64,
    /// Open-circuit voltage at the end of rated capacity.
    pub empty_voc: f64,
    pub esr_ohm: f64,
}

impl Default for SimCell {
    fn default() -> Self {
        Self {
            capacity_ah: 0.1,
            full_voc: 4.2,
            empty_voc: 3.0,
            esr_ohm: 0.15,
        }
    }
}

impl SimCell {
    /// Open-circuit voltage after `drawn_ah` has been removed.
    pub fn voc_at(&self, drawn_ah: f64) -> f64 {
        let span = self.full_voc - self.empty_voc;
        let frac = drawn_ah / self.capacity_ah;
        if frac >= 1.0 {
            // Past rated capacity the voltage collapses quickly.
            return self.empty_voc - 2.0 * span * (frac - 1.0);
        }
        let soc = (1.0 - frac).clamp(0.0, 1.0);
        let knee = 1.0 - (1.0 - soc).powi(6);
        self.empty_voc + span * (0.85 * soc + 0.15 * knee)
    }
}

pub struct SimulatedSourceMeter {
    cell: SimCell,
    clock: Arc<dyn Clock + Send + Sync>,
    last_update: Instant,
    drawn_coulombs: f64,
    source_a: f64,
    current_range_a: f64,
    voltage_range_v: f64,
    compliance_v: f64,
    line_hz: f64,
    nplc: f64,
    output: bool,
    wiring: Wiring,
    terminals: Terminals,
    autozeros: u64,
    reads: u64,
    fail_after_reads: Option<u64>,
}

impl SimulatedSourceMeter {
    pub fn new(cell: SimCell, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        let last_update = clock.now();
        Self {
            cell,
            clock,
            last_update,
            drawn_coulombs: 0.0,
            source_a: 0.0,
            current_range_a: 1.05,
            voltage_range_v: 21.0,
            compliance_v: 21.0,
            line_hz: 60.0,
            nplc: 1.0,
            output: false,
            wiring: Wiring::TwoWire,
            terminals: Terminals::Front,
            autozeros: 0,
            reads: 0,
            fail_after_reads: None,
        }
    }

    /// Make every voltage read after the first `n` fail with a timeout.
    pub fn fail_after_reads(mut self, n: u64) -> Self {
        self.fail_after_reads = Some(n);
        self
    }

    /// Charge removed so far, in ampere-hours.
    pub fn drawn_ah(&mut self) -> f64 {
        self.integrate();
        self.drawn_coulombs / 3600.0
    }

    pub fn output_enabled(&self) -> bool {
        self.output
    }

    pub fn auto_zero_count(&self) -> u64 {
        self.autozeros
    }

    pub fn wiring(&self) -> Wiring {
        self.wiring
    }

    pub fn terminals(&self) -> Terminals {
        self.terminals
    }

    pub fn nplc(&self) -> f64 {
        self.nplc
    }

    fn integrate(&mut self) {
        let now = self.clock.now();
        let dt = now.saturating_duration_since(self.last_update).as_secs_f64();
        self.last_update = now;
        if self.output {
            // Negative source current discharges the cell.
            self.drawn_coulombs -= self.source_a * dt;
        }
    }
}

impl SourceMeter for SimulatedSourceMeter {
    fn identify(&mut self) -> HwResult<String> {
        Ok("SIMULATED,SourceMeter 2400,0000000,1.0".to_string())
    }

    fn reset(&mut self) -> HwResult<()> {
        self.integrate();
        self.source_a = 0.0;
        self.output = false;
        debug!("sim reset");
        Ok(())
    }

    fn set_source_current(&mut self, amps: f64) -> HwResult<()> {
        self.integrate();
        if amps.abs() > self.current_range_a * 1.05 {
            return Err(Box::new(HwError::Instrument(format!(
                "source level {amps} A outside range {} A",
                self.current_range_a
            ))));
        }
        self.source_a = amps;
        Ok(())
    }

    fn source_current(&mut self) -> HwResult<f64> {
        Ok(self.source_a)
    }

    fn set_current_range(&mut self, amps: f64) -> HwResult<()> {
        self.integrate();
        self.current_range_a = amps.abs();
        Ok(())
    }

    fn current_range(&mut self) -> HwResult<f64> {
        Ok(self.current_range_a)
    }

    fn set_voltage_range(&mut self, volts: f64) -> HwResult<()> {
        self.voltage_range_v = volts;
        Ok(())
    }

    fn voltage_range(&mut self) -> HwResult<f64> {
        Ok(self.voltage_range_v)
    }

    fn set_compliance_voltage(&mut self, volts: f64) -> HwResult<()> {
        self.compliance_v = volts;
        Ok(())
    }

    fn compliance_voltage(&mut self) -> HwResult<f64> {
        Ok(self.compliance_v)
    }

    fn set_wiring(&mut self, wiring: Wiring) -> HwResult<()> {
        self.wiring = wiring;
        Ok(())
    }

    fn set_terminals(&mut self, terminals: Terminals) -> HwResult<()> {
        self.terminals = terminals;
        Ok(())
    }

    fn set_nplc(&mut self, nplc: f64) -> HwResult<()> {
        self.nplc = nplc;
        Ok(())
    }

    fn set_line_frequency(&mut self, hz: f64) -> HwResult<()> {
        self.line_hz = hz;
        Ok(())
    }

    fn line_frequency(&mut self) -> HwResult<f64> {
        Ok(self.line_hz)
    }

    fn auto_zero_once(&mut self) -> HwResult<()> {
        self.autozeros += 1;
        Ok(())
    }

    fn set_output(&mut self, enabled: bool) -> HwResult<()> {
        self.integrate();
        self.output = enabled;
        debug!(enabled, "sim output");
        Ok(())
    }

    fn measure_voltage(&mut self) -> HwResult<f64> {
        self.integrate();
        if !self.output {
            return Err(Box::new(HwError::OutputOff));
        }
        self.reads += 1;
        if let Some(limit) = self.fail_after_reads
            && self.reads > limit
        {
            return Err(Box::new(HwError::Timeout));
        }
        let voc = self.cell.voc_at(self.drawn_coulombs / 3600.0);
        let v = voc + self.source_a * self.cell.esr_ohm;
        trace!(v, source_a = self.source_a, "sim read");
        Ok(v)
    }
}
