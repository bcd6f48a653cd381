pub mod clock;

pub use clock::virtual_clock::VirtualClock;
pub use clock::{Clock, MonotonicClock};

/// Error type crossing the instrument trait boundary.
pub type HwResult<T> = Result<T, Box<dyn std::error::Error + Send + Sync>>;

/// Sense wiring used for voltage readback.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Wiring {
    TwoWire,
    FourWire,
}

/// Front or rear input/output jacks.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum Terminals {
    Front,
    Rear,
}

/// Programmable current source with a voltmeter (SourceMeter class instrument).
///
/// Currents are in amperes with the instrument's sign convention: a negative
/// source current sinks current from the device under test, i.e. discharges it.
pub trait SourceMeter {
    /// Identification string (model, serial, firmware).
    fn identify(&mut self) -> HwResult<String>;
    /// Return to power-on defaults and configure current sourcing with voltage sensing.
    fn reset(&mut self) -> HwResult<()>;

    fn set_source_current(&mut self, amps: f64) -> HwResult<()>;
    fn source_current(&mut self) -> HwResult<f64>;
    fn set_current_range(&mut self, amps: f64) -> HwResult<()>;
    fn current_range(&mut self) -> HwResult<f64>;

    fn set_voltage_range(&mut self, volts: f64) -> HwResult<()>;
    fn voltage_range(&mut self) -> HwResult<f64>;
    fn set_compliance_voltage(&mut self, volts: f64) -> HwResult<()>;
    fn compliance_voltage(&mut self) -> HwResult<f64>;

    fn set_wiring(&mut self, wiring: Wiring) -> HwResult<()>;
    fn set_terminals(&mut self, terminals: Terminals) -> HwResult<()>;
    /// Integration time per reading, in power-line cycles.
    fn set_nplc(&mut self, nplc: f64) -> HwResult<()>;
    fn set_line_frequency(&mut self, hz: f64) -> HwResult<()>;
    fn line_frequency(&mut self) -> HwResult<f64>;

    /// Run a single auto-zero (offset correction) cycle now.
    fn auto_zero_once(&mut self) -> HwResult<()>;
    fn set_output(&mut self, enabled: bool) -> HwResult<()>;
    /// Take one voltage reading at the present source level.
    fn measure_voltage(&mut self) -> HwResult<f64>;

    /// Audible tone; purely cosmetic, implementations may ignore it.
    fn beep(&mut self, _hz: f64, _secs: f64) -> HwResult<()> {
        Ok(())
    }
}

impl<T: SourceMeter + ?Sized> SourceMeter for Box<T> {
    fn identify(&mut self) -> HwResult<String> {
        (**self).identify()
    }
    fn reset(&mut self) -> HwResult<()> {
        (**self).reset()
    }
    fn set_source_current(&mut self, amps: f64) -> HwResult<()> {
        (**self).set_source_current(amps)
    }
    fn source_current(&mut self) -> HwResult<f64> {
        (**self).source_current()
    }
    fn set_current_range(&mut self, amps: f64) -> HwResult<()> {
        (**self).set_current_range(amps)
    }
    fn current_range(&mut self) -> HwResult<f64> {
        (**self).current_range()
    }
    fn set_voltage_range(&mut self, volts: f64) -> HwResult<()> {
        (**self).set_voltage_range(volts)
    }
    fn voltage_range(&mut self) -> HwResult<f64> {
        (**self).voltage_range()
    }
    fn set_compliance_voltage(&mut self, volts: f64) -> HwResult<()> {
        (**self).set_compliance_voltage(volts)
    }
    fn compliance_voltage(&mut self) -> HwResult<f64> {
        (**self).compliance_voltage()
    }
    fn set_wiring(&mut self, wiring: Wiring) -> HwResult<()> {
        (**self).set_wiring(wiring)
    }
    fn set_terminals(&mut self, terminals: Terminals) -> HwResult<()> {
        (**self).set_terminals(terminals)
    }
    fn set_nplc(&mut self, nplc: f64) -> HwResult<()> {
        (**self).set_nplc(nplc)
    }
    fn set_line_frequency(&mut self, hz: f64) -> HwResult<()> {
        (**self).set_line_frequency(hz)
    }
    fn line_frequency(&mut self) -> HwResult<f64> {
        (**self).line_frequency()
    }
    fn auto_zero_once(&mut self) -> HwResult<()> {
        (**self).auto_zero_once()
    }
    fn set_output(&mut self, enabled: bool) -> HwResult<()> {
        (**self).set_output(enabled)
    }
    fn measure_voltage(&mut self) -> HwResult<f64> {
        (**self).measure_voltage()
    }
    fn beep(&mut self, hz: f64, secs: f64) -> HwResult<()> {
        (**self).beep(hz, secs)
    }
}
