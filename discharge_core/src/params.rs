//! Validated, immutable test parameters.
//!
//! `TestParameters` can only be obtained through `TestParametersBuilder::build`,
//! which enforces every range check that depends on the probed battery. Once
//! built, nothing mutates it.

use std::time::Duration;

use discharge_config::limits::*;
use discharge_traits::{Terminals, Wiring};

use crate::error::{BuildError, DischargeError, Result};
use crate::util::{autozero_duration, secs};

/// Nominal voltage ranges of the instrument, smallest first.
pub const VOLTAGE_RANGES_V: [f64; 4] = [0.2, 2.0, 20.0, 200.0];
/// Usable fraction above a range's nominal full scale.
pub const OVERRANGE: f64 = 1.05;

/// One step of a current list. `current_a` is the discharge magnitude.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct Step {
    pub current_a: f64,
    pub duration_s: f64,
}

/// Discharge profile; constant current and current list are mutually exclusive by construction.
#[derive(Debug, Clone, PartialEq)]
pub enum Profile {
    Constant { current_a: f64 },
    List { steps: Vec<Step>, primary: usize },
}

impl Profile {
    pub fn constant(current_a: f64) -> Self {
        Profile::Constant { current_a }
    }

    /// Build a list profile, selecting the primary (sampled) step.
    pub fn list(steps: Vec<Step>) -> Self {
        let primary = select_primary(&steps);
        Profile::List { steps, primary }
    }

    pub fn name(&self) -> &'static str {
        match self {
            Profile::Constant { .. } => "constant",
            Profile::List { .. } => "list",
        }
    }

    /// Largest current magnitude ever commanded.
    pub fn max_current_a(&self) -> f64 {
        match self {
            Profile::Constant { current_a } => current_a.abs(),
            Profile::List { steps, .. } => steps
                .iter()
                .map(|s| s.current_a.abs())
                .fold(0.0, f64::max),
        }
    }

    /// Mean current magnitude over one cycle, weighted by step duration.
    pub fn average_current_a(&self) -> f64 {
        match self {
            Profile::Constant { current_a } => current_a.abs(),
            Profile::List { steps, .. } => {
                let total: f64 = steps.iter().map(|s| s.duration_s).sum();
                if total <= 0.0 {
                    return 0.0;
                }
                steps
                    .iter()
                    .map(|s| s.current_a.abs() * s.duration_s)
                    .sum::<f64>()
                    / total
            }
        }
    }
}

/// Index of the step sampled during a list discharge.
///
/// Longest duration wins; ties go to the larger current magnitude; remaining
/// ties go to the earliest step in list order.
pub fn select_primary(steps: &[Step]) -> usize {
    let mut best = 0;
    for (i, s) in steps.iter().enumerate().skip(1) {
        let b = &steps[best];
        let longer = s.duration_s > b.duration_s;
        let same_len_stronger =
            s.duration_s == b.duration_s && s.current_a.abs() > b.current_a.abs();
        if longer || same_len_stronger {
            best = i;
        }
    }
    best
}

/// Smallest nominal voltage range whose overrange covers `volts`.
pub fn select_voltage_range(volts: f64) -> Option<f64> {
    VOLTAGE_RANGES_V
        .iter()
        .copied()
        .find(|r| volts.abs() <= r * OVERRANGE)
}

/// Largest source current permitted on a voltage range.
pub fn max_current_for_range(range_v: f64) -> f64 {
    if range_v >= HV_RANGE_V {
        MAX_CURRENT_HV_A
    } else {
        MAX_CURRENT_A
    }
}

/// Measurement timing knobs.
#[derive(Debug, Clone, Copy, PartialEq)]
pub struct SamplingCfg {
    /// Open-circuit settle time inside each ESR measurement (s).
    pub settle_s: f64,
    pub nplc: f64,
    pub line_frequency_hz: f64,
}

impl Default for SamplingCfg {
    fn default() -> Self {
        Self {
            settle_s: 0.5,
            nplc: 1.0,
            line_frequency_hz: 60.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq)]
pub struct TestParameters {
    profile: Profile,
    cutoff_v: f64,
    measure_interval_s: f64,
    terminals: Terminals,
    wiring: Wiring,
    initial_voc: f64,
    voltage_range_v: f64,
    sampling: SamplingCfg,
}

impl TestParameters {
    pub fn builder() -> TestParametersBuilder {
        TestParametersBuilder::default()
    }

    pub fn profile(&self) -> &Profile {
        &self.profile
    }

    pub fn cutoff_v(&self) -> f64 {
        self.cutoff_v
    }

    pub fn measure_interval_s(&self) -> f64 {
        self.measure_interval_s
    }

    pub fn measure_interval(&self) -> Duration {
        secs(self.measure_interval_s)
    }

    pub fn max_discharge_current_a(&self) -> f64 {
        self.profile.max_current_a()
    }

    pub fn terminals(&self) -> Terminals {
        self.terminals
    }

    pub fn wiring(&self) -> Wiring {
        self.wiring
    }

    pub fn initial_voc(&self) -> f64 {
        self.initial_voc
    }

    pub fn voltage_range_v(&self) -> f64 {
        self.voltage_range_v
    }

    /// Compliance is pinned to the nominal voltage range.
    pub fn compliance_v(&self) -> f64 {
        self.voltage_range_v
    }

    pub fn sampling(&self) -> &SamplingCfg {
        &self.sampling
    }

    pub fn settle(&self) -> Duration {
        secs(self.sampling.settle_s)
    }

    pub fn autozero_duration(&self) -> Duration {
        autozero_duration(self.sampling.nplc, self.sampling.line_frequency_hz)
    }
}

#[derive(Debug, Default)]
pub struct TestParametersBuilder {
    profile: Option<Profile>,
    cutoff_v: Option<f64>,
    measure_interval_s: Option<f64>,
    terminals: Option<Terminals>,
    wiring: Option<Wiring>,
    initial_voc: Option<f64>,
    sampling: Option<SamplingCfg>,
}

fn invalid(msg: String) -> eyre::Report {
    eyre::Report::new(DischargeError::Validation(msg))
}

impl TestParametersBuilder {
    pub fn profile(mut self, profile: Profile) -> Self {
        self.profile = Some(profile);
        self
    }

    pub fn cutoff_v(mut self, volts: f64) -> Self {
        self.cutoff_v = Some(volts);
        self
    }

    pub fn measure_interval_s(mut self, secs: f64) -> Self {
        self.measure_interval_s = Some(secs);
        self
    }

    pub fn terminals(mut self, terminals: Terminals) -> Self {
        self.terminals = Some(terminals);
        self
    }

    pub fn wiring(mut self, wiring: Wiring) -> Self {
        self.wiring = Some(wiring);
        self
    }

    pub fn initial_voc(mut self, volts: f64) -> Self {
        self.initial_voc = Some(volts);
        self
    }

    pub fn sampling(mut self, sampling: SamplingCfg) -> Self {
        self.sampling = Some(sampling);
        self
    }

    pub fn build(self) -> Result<TestParameters> {
        let profile = self
            .profile
            .ok_or_else(|| eyre::Report::new(BuildError::MissingProfile))?;
        let cutoff_v = self
            .cutoff_v
            .ok_or_else(|| eyre::Report::new(BuildError::MissingCutoff))?;
        let measure_interval_s = self
            .measure_interval_s
            .ok_or_else(|| eyre::Report::new(BuildError::MissingInterval))?;
        let initial_voc = self
            .initial_voc
            .ok_or_else(|| eyre::Report::new(BuildError::MissingInitialVoc))?;
        let sampling = self.sampling.unwrap_or_default();

        if initial_voc.is_nan() || initial_voc < MIN_INITIAL_VOC_V {
            return Err(invalid(format!(
                "initial open-circuit voltage {initial_voc:.4} V is below {MIN_INITIAL_VOC_V} V; is a battery connected?"
            )));
        }
        let voltage_range_v = select_voltage_range(initial_voc).ok_or_else(|| {
            invalid(format!(
                "initial open-circuit voltage {initial_voc:.4} V exceeds every voltage range"
            ))
        })?;
        let max_allowed = max_current_for_range(voltage_range_v);

        let check_current = |what: &str, amps: f64| -> Result<()> {
            if !(MIN_CURRENT_A..=max_allowed).contains(&amps) {
                return Err(invalid(format!(
                    "{what} {amps} A outside [{MIN_CURRENT_A}, {max_allowed}] A for the {voltage_range_v} V range"
                )));
            }
            Ok(())
        };
        match &profile {
            Profile::Constant { current_a } => check_current("discharge current", *current_a)?,
            Profile::List { steps, primary } => {
                if !(MIN_LIST_STEPS..=MAX_LIST_STEPS).contains(&steps.len()) {
                    return Err(invalid(format!(
                        "current list needs {MIN_LIST_STEPS}..={MAX_LIST_STEPS} steps, got {}",
                        steps.len()
                    )));
                }
                let expected = select_primary(steps);
                if *primary != expected {
                    return Err(invalid(format!(
                        "primary step {primary} is not the sampled step; expected {expected}"
                    )));
                }
                for (i, s) in steps.iter().enumerate() {
                    check_current(&format!("step {i} current"), s.current_a)?;
                    if s.duration_s.is_nan() || s.duration_s < MIN_STEP_DURATION_S {
                        return Err(invalid(format!(
                            "step {i} duration {} s is shorter than {MIN_STEP_DURATION_S} s",
                            s.duration_s
                        )));
                    }
                }
            }
        }

        let max_cutoff = MAX_CUTOFF_RATIO * initial_voc;
        if !(MIN_CUTOFF_V..=max_cutoff).contains(&cutoff_v) {
            return Err(invalid(format!(
                "cutoff voltage {cutoff_v} V outside [{MIN_CUTOFF_V}, {max_cutoff:.4}] V"
            )));
        }
        if !(MIN_INTERVAL_S..=MAX_INTERVAL_S).contains(&measure_interval_s) {
            return Err(invalid(format!(
                "measure interval {measure_interval_s} s outside [{MIN_INTERVAL_S}, {MAX_INTERVAL_S}] s"
            )));
        }
        if !(MIN_NPLC..=MAX_NPLC).contains(&sampling.nplc) {
            return Err(invalid(format!("nplc {} outside range", sampling.nplc)));
        }
        if sampling.line_frequency_hz.is_nan() || sampling.line_frequency_hz <= 0.0 {
            return Err(invalid("line frequency must be positive".to_string()));
        }
        if !(0.0..MAX_SETTLE_S.min(measure_interval_s)).contains(&sampling.settle_s) {
            return Err(invalid(format!(
                "settle time {} s must be below the measure interval",
                sampling.settle_s
            )));
        }

        Ok(TestParameters {
            profile,
            cutoff_v,
            measure_interval_s,
            terminals: self.terminals.unwrap_or(Terminals::Front),
            wiring: self.wiring.unwrap_or(Wiring::FourWire),
            initial_voc,
            voltage_range_v,
            sampling,
        })
    }
}
