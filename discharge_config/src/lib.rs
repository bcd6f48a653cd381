#![cfg_attr(all(not(debug_assertions), not(test)), deny(warnings))]
#![cfg_attr(
    all(not(debug_assertions), not(test)),
    deny(clippy::all, clippy::pedantic, clippy::nursery)
)]
#![allow(clippy::module_name_repetitions, clippy::missing_errors_doc)]
//! Config schema for the battery discharge modeler.
//!
//! - `Config` and sub-structs are deserialized from TOML and validated.
//! - `limits` holds the instrument and test ranges shared with the core,
//!   which re-checks them once the initial open-circuit voltage is known.
use discharge_traits::{Terminals, Wiring};
use serde::Deserialize;
use std::path::Path;

/// Ranges enforced on test parameters.
pub mod limits {
    /// Smallest discharge current the source can regulate (A).
    pub const MIN_CURRENT_A: f64 = 1e-6;
    /// Largest source current outside the 200 V range (A).
    pub const MAX_CURRENT_A: f64 = 1.05;
    /// Largest source current on the 200 V range (A).
    pub const MAX_CURRENT_HV_A: f64 = 0.105;
    /// Nominal voltage range above which the high-voltage current limit applies (V).
    pub const HV_RANGE_V: f64 = 200.0;
    pub const MIN_LIST_STEPS: usize = 2;
    pub const MAX_LIST_STEPS: usize = 10;
    pub const MIN_STEP_DURATION_S: f64 = 1.0;
    pub const MIN_CUTOFF_V: f64 = 0.1;
    /// Cutoff may not exceed this fraction of the initial open-circuit voltage.
    pub const MAX_CUTOFF_RATIO: f64 = 0.98;
    pub const MIN_INTERVAL_S: f64 = 1.0;
    pub const MAX_INTERVAL_S: f64 = 600.0;
    /// Initial open-circuit voltage below this is treated as "no battery".
    pub const MIN_INITIAL_VOC_V: f64 = 0.1;
    pub const MIN_NPLC: f64 = 0.01;
    pub const MAX_NPLC: f64 = 10.0;
    pub const MAX_SETTLE_S: f64 = 10.0;
}

use limits::*;

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum Backend {
    /// Simulated battery; no hardware required.
    #[default]
    Sim,
    /// Raw SCPI socket (`host:port`).
    Tcp,
    /// RS-232 port (requires the `hardware` feature).
    Serial,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum TerminalsCfg {
    #[default]
    Front,
    Rear,
}

#[derive(Debug, Deserialize, Clone, Copy, Default, PartialEq, Eq)]
#[serde(rename_all = "kebab-case")]
pub enum WiringCfg {
    TwoWire,
    #[default]
    FourWire,
}

impl From<TerminalsCfg> for Terminals {
    fn from(c: TerminalsCfg) -> Self {
        match c {
            TerminalsCfg::Front => Terminals::Front,
            TerminalsCfg::Rear => Terminals::Rear,
        }
    }
}

impl From<WiringCfg> for Wiring {
    fn from(c: WiringCfg) -> Self {
        match c {
            WiringCfg::TwoWire => Wiring::TwoWire,
            WiringCfg::FourWire => Wiring::FourWire,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct InstrumentCfg {
    pub backend: Backend,
    /// `host:port` for tcp, device path for serial.
    pub address: Option<String>,
    pub baud: u32,
    /// Per-transaction I/O timeout.
    pub timeout_ms: u64,
    pub terminals: TerminalsCfg,
    pub wiring: WiringCfg,
    /// Integration time per reading in power-line cycles.
    pub nplc: f64,
    pub line_frequency_hz: f64,
}

impl Default for InstrumentCfg {
    fn default() -> Self {
        Self {
            backend: Backend::Sim,
            address: None,
            baud: 9600,
            timeout_ms: 2000,
            terminals: TerminalsCfg::Front,
            wiring: WiringCfg::FourWire,
            nplc: 1.0,
            line_frequency_hz: 60.0,
        }
    }
}

#[derive(Debug, Deserialize, Clone, Copy, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum DischargeKind {
    Constant,
    List,
}

/// One entry of a current list; `current_a` is the discharge magnitude.
#[derive(Debug, Deserialize, Clone, Copy, PartialEq)]
pub struct StepCfg {
    pub current_a: f64,
    pub duration_s: f64,
}

#[derive(Debug, Deserialize)]
pub struct DischargeCfg {
    pub kind: DischargeKind,
    /// Discharge magnitude for `kind = "constant"`.
    #[serde(default)]
    pub current_a: Option<f64>,
    /// Steps for `kind = "list"`, executed cyclically.
    #[serde(default)]
    pub steps: Vec<StepCfg>,
    pub cutoff_v: f64,
    pub measure_interval_s: f64,
    /// Open-circuit settle time inside each ESR measurement.
    #[serde(default = "default_settle_s")]
    pub settle_s: f64,
}

fn default_settle_s() -> f64 {
    0.5
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct SimulationCfg {
    pub capacity_ah: f64,
    pub full_voc: f64,
    pub empty_voc: f64,
    pub esr_ohm: f64,
    /// Run the simulated session on virtual time (completes instantly).
    pub virtual_time: bool,
    /// Fault injection: fail every voltage read after this many.
    pub fail_after_reads: Option<u64>,
}

impl Default for SimulationCfg {
    fn default() -> Self {
        Self {
            capacity_ah: 0.1,
            full_voc: 4.2,
            empty_voc: 3.0,
            esr_ohm: 0.15,
            virtual_time: true,
            fail_after_reads: None,
        }
    }
}

#[derive(Debug, Deserialize)]
#[serde(default)]
pub struct OutputCfg {
    /// Battery model CSV for the simulator.
    pub model_file: String,
    /// Optional setup + raw data + model dump.
    pub raw_file: Option<String>,
}

impl Default for OutputCfg {
    fn default() -> Self {
        Self {
            model_file: "battery_model.csv".to_string(),
            raw_file: None,
        }
    }
}

#[derive(Debug, Deserialize, Default)]
#[serde(default)]
pub struct Logging {
    pub file: Option<String>,  // path to .log (JSON lines)
    pub level: Option<String>, // "info","debug"
    /// Log rotation policy: "never" | "daily" | "hourly" (default: never)
    pub rotation: Option<String>,
}

#[derive(Debug, Deserialize)]
pub struct Config {
    #[serde(default)]
    pub instrument: InstrumentCfg,
    pub discharge: DischargeCfg,
    #[serde(default)]
    pub simulation: SimulationCfg,
    #[serde(default)]
    pub output: OutputCfg,
    #[serde(default)]
    pub logging: Logging,
}

pub fn load_toml(s: &str) -> Result<Config, toml::de::Error> {
    toml::from_str::<Config>(s)
}

pub fn load_file(path: &Path) -> eyre::Result<Config> {
    let text = std::fs::read_to_string(path)
        .map_err(|e| eyre::eyre!("read config {}: {}", path.display(), e))?;
    load_toml(&text).map_err(|e| eyre::eyre!("parse config {}: {}", path.display(), e))
}

fn check_current(what: &str, amps: f64) -> eyre::Result<()> {
    if !(MIN_CURRENT_A..=MAX_CURRENT_A).contains(&amps) {
        eyre::bail!("{what} must be in [{MIN_CURRENT_A}, {MAX_CURRENT_A}] A, got {amps}");
    }
    Ok(())
}

impl Config {
    pub fn validate(&self) -> eyre::Result<()> {
        // Instrument
        let inst = &self.instrument;
        if !(MIN_NPLC..=MAX_NPLC).contains(&inst.nplc) {
            eyre::bail!("instrument.nplc must be in [{MIN_NPLC}, {MAX_NPLC}]");
        }
        if ![50.0, 60.0].contains(&inst.line_frequency_hz) {
            eyre::bail!("instrument.line_frequency_hz must be 50 or 60");
        }
        if inst.timeout_ms == 0 {
            eyre::bail!("instrument.timeout_ms must be >= 1");
        }
        if inst.backend != Backend::Sim && inst.address.as_deref().is_none_or(str::is_empty) {
            eyre::bail!("instrument.address is required for the tcp and serial backends");
        }
        if inst.backend == Backend::Serial && inst.baud == 0 {
            eyre::bail!("instrument.baud must be > 0");
        }

        // Discharge profile: exactly one of current_a / steps
        let d = &self.discharge;
        match d.kind {
            DischargeKind::Constant => {
                if !d.steps.is_empty() {
                    eyre::bail!("discharge.steps must be empty when kind = \"constant\"");
                }
                let Some(amps) = d.current_a else {
                    eyre::bail!("discharge.current_a is required when kind = \"constant\"");
                };
                check_current("discharge.current_a", amps)?;
            }
            DischargeKind::List => {
                if d.current_a.is_some() {
                    eyre::bail!("discharge.current_a must be unset when kind = \"list\"");
                }
                if !(MIN_LIST_STEPS..=MAX_LIST_STEPS).contains(&d.steps.len()) {
                    eyre::bail!(
                        "discharge.steps must have {MIN_LIST_STEPS}..={MAX_LIST_STEPS} entries, got {}",
                        d.steps.len()
                    );
                }
                for (i, s) in d.steps.iter().enumerate() {
                    check_current(&format!("discharge.steps[{i}].current_a"), s.current_a)?;
                    if s.duration_s.is_nan() || s.duration_s < MIN_STEP_DURATION_S {
                        eyre::bail!(
                            "discharge.steps[{i}].duration_s must be >= {MIN_STEP_DURATION_S} s"
                        );
                    }
                }
            }
        }
        if d.cutoff_v.is_nan() || d.cutoff_v < MIN_CUTOFF_V {
            eyre::bail!("discharge.cutoff_v must be >= {MIN_CUTOFF_V} V");
        }
        if !(MIN_INTERVAL_S..=MAX_INTERVAL_S).contains(&d.measure_interval_s) {
            eyre::bail!(
                "discharge.measure_interval_s must be in [{MIN_INTERVAL_S}, {MAX_INTERVAL_S}] s"
            );
        }
        if !(0.0..=MAX_SETTLE_S).contains(&d.settle_s) {
            eyre::bail!("discharge.settle_s must be in [0, {MAX_SETTLE_S}] s");
        }
        if d.settle_s >= d.measure_interval_s {
            eyre::bail!("discharge.settle_s must be shorter than measure_interval_s");
        }

        // Simulation
        let sim = &self.simulation;
        if sim.capacity_ah.is_nan() || sim.capacity_ah <= 0.0 {
            eyre::bail!("simulation.capacity_ah must be > 0");
        }
        if !(sim.empty_voc > 0.0 && sim.full_voc > sim.empty_voc) {
            eyre::bail!("simulation voltages must satisfy full_voc > empty_voc > 0");
        }
        if sim.esr_ohm < 0.0 {
            eyre::bail!("simulation.esr_ohm must be >= 0");
        }

        // Output
        if self.output.model_file.trim().is_empty() {
            eyre::bail!("output.model_file must not be empty");
        }

        // Logging
        if let Some(rot) = self.logging.rotation.as_deref()
            && !matches!(rot, "never" | "daily" | "hourly")
        {
            eyre::bail!("logging.rotation must be one of never|daily|hourly");
        }

        Ok(())
    }
}
