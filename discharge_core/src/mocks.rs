//! Scripted SourceMeter for driving the controller without hardware.

use discharge_traits::{HwResult, SourceMeter, Terminals, Wiring};

/// Instrument calls recorded by `ScriptedMeter`, in order.
#[derive(Debug, Clone, PartialEq)]
pub enum Event {
    SourceCurrent(f64),
    CurrentRange(f64),
    VoltageRange(f64),
    Compliance(f64),
    Output(bool),
    AutoZero,
    Measure,
}

type VoltageFn = Box<dyn FnMut(f64) -> f64 + Send>;

/// A meter whose voltage reading is a function of the commanded source level.
///
/// The closure may capture a `VirtualClock` to make the voltage time-dependent.
pub struct ScriptedMeter {
    voltage: VoltageFn,
    level: f64,
    current_range: f64,
    voltage_range: f64,
    compliance: f64,
    line_hz: f64,
    output: bool,
    reads: u64,
    fail_measure_after: Option<u64>,
    fail_output_off: bool,
    events: Vec<Event>,
}

impl ScriptedMeter {
    pub fn new<F>(voltage: F) -> Self
    where
        F: FnMut(f64) -> f64 + Send + 'static,
    {
        Self {
            voltage: Box::new(voltage),
            level: 0.0,
            current_range: 1.05,
            voltage_range: 21.0,
            compliance: 21.0,
            line_hz: 60.0,
            output: false,
            reads: 0,
            fail_measure_after: None,
            fail_output_off: false,
            events: Vec::new(),
        }
    }

    /// Fail every voltage read after the first `n`.
    pub fn fail_measure_after(mut self, n: u64) -> Self {
        self.fail_measure_after = Some(n);
        self
    }

    /// Make `set_output(false)` fail (teardown error path).
    pub fn fail_output_off(mut self) -> Self {
        self.fail_output_off = true;
        self
    }

    pub fn level(&self) -> f64 {
        self.level
    }

    pub fn output_enabled(&self) -> bool {
        self.output
    }

    pub fn reads(&self) -> u64 {
        self.reads
    }

    pub fn events(&self) -> &[Event] {
        &self.events
    }

    pub fn count(&self, pred: impl Fn(&Event) -> bool) -> usize {
        self.events.iter().filter(|e| pred(e)).count()
    }
}

fn scripted_err(msg: &str) -> Box<dyn std::error::Error + Send + Sync> {
    Box::new(std::io::Error::other(msg.to_string()))
}

impl SourceMeter for ScriptedMeter {
    fn identify(&mut self) -> HwResult<String> {
        Ok("SCRIPTED,2400,0,0".into())
    }

    fn reset(&mut self) -> HwResult<()> {
        self.level = 0.0;
        self.output = false;
        Ok(())
    }

    fn set_source_current(&mut self, amps: f64) -> HwResult<()> {
        self.events.push(Event::SourceCurrent(amps));
        self.level = amps;
        Ok(())
    }

    fn source_current(&mut self) -> HwResult<f64> {
        Ok(self.level)
    }

    fn set_current_range(&mut self, amps: f64) -> HwResult<()> {
        self.events.push(Event::CurrentRange(amps));
        self.current_range = amps;
        Ok(())
    }

    fn current_range(&mut self) -> HwResult<f64> {
        Ok(self.current_range)
    }

    fn set_voltage_range(&mut self, volts: f64) -> HwResult<()> {
        self.events.push(Event::VoltageRange(volts));
        self.voltage_range = volts;
        Ok(())
    }

    fn voltage_range(&mut self) -> HwResult<f64> {
        Ok(self.voltage_range)
    }

    fn set_compliance_voltage(&mut self, volts: f64) -> HwResult<()> {
        self.events.push(Event::Compliance(volts));
        self.compliance = volts;
        Ok(())
    }

    fn compliance_voltage(&mut self) -> HwResult<f64> {
        Ok(self.compliance)
    }

    fn set_wiring(&mut self, _wiring: Wiring) -> HwResult<()> {
        Ok(())
    }

    fn set_terminals(&mut self, _terminals: Terminals) -> HwResult<()> {
        Ok(())
    }

    fn set_nplc(&mut self, _nplc: f64) -> HwResult<()> {
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
        self.events.push(Event::AutoZero);
        Ok(())
    }

    fn set_output(&mut self, enabled: bool) -> HwResult<()> {
        self.events.push(Event::Output(enabled));
        if !enabled && self.fail_output_off {
            return Err(scripted_err("output relay stuck"));
        }
        self.output = enabled;
        Ok(())
    }

    fn measure_voltage(&mut self) -> HwResult<f64> {
        self.events.push(Event::Measure);
        self.reads += 1;
        if let Some(n) = self.fail_measure_after
            && self.reads > n
        {
            return Err(scripted_err("scripted read failure"));
        }
        Ok((self.voltage)(self.level))
    }
}
