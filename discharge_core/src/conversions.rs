//! `From` implementations bridging `discharge_config` types to core types,
//! plus construction of `TestParameters` from a loaded config.
//!
//! Terminal and wiring selections convert in `discharge_config`, which owns
//! the config side of both enums.

use discharge_config::{Config, DischargeKind, StepCfg};

use crate::error::{DischargeError, Result};
use crate::params::{Profile, SamplingCfg, Step, TestParameters};

impl From<&StepCfg> for Step {
    fn from(c: &StepCfg) -> Self {
        Self {
            current_a: c.current_a,
            duration_s: c.duration_s,
        }
    }
}

impl From<&Config> for SamplingCfg {
    fn from(c: &Config) -> Self {
        Self {
            settle_s: c.discharge.settle_s,
            nplc: c.instrument.nplc,
            line_frequency_hz: c.instrument.line_frequency_hz,
        }
    }
}

/// Profile described by the `[discharge]` table.
pub fn profile_from_config(cfg: &Config) -> Result<Profile> {
    let d = &cfg.discharge;
    match d.kind {
        DischargeKind::Constant => d.current_a.map(Profile::constant).ok_or_else(|| {
            eyre::Report::new(DischargeError::Validation(
                "constant profile needs discharge.current_a".into(),
            ))
        }),
        DischargeKind::List => Ok(Profile::list(d.steps.iter().map(Step::from).collect())),
    }
}

impl TestParameters {
    /// Validate a loaded config against the probed open-circuit voltage.
    pub fn from_config(cfg: &Config, initial_voc: f64) -> Result<Self> {
        TestParameters::builder()
            .profile(profile_from_config(cfg)?)
            .cutoff_v(cfg.discharge.cutoff_v)
            .measure_interval_s(cfg.discharge.measure_interval_s)
            .terminals(cfg.instrument.terminals.into())
            .wiring(cfg.instrument.wiring.into())
            .initial_voc(initial_voc)
            .sampling(SamplingCfg::from(cfg))
            .build()
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use discharge_traits::{Terminals, Wiring};

    const LIST: &str = r#"
[instrument]
terminals = "rear"
wiring = "two-wire"
line_frequency_hz = 50

[discharge]
kind = "list"
steps = [
    { current_a = 0.5, duration_s = 30 },
    { current_a = 0.8, duration_s = 30 },
    { current_a = 0.1, duration_s = 5 },
]
cutoff_v = 3.0
measure_interval_s = 10
"#;

    #[test]
    fn list_config_maps_to_parameters() {
        let cfg = discharge_config::load_toml(LIST).unwrap();
        let p = TestParameters::from_config(&cfg, 4.1).unwrap();
        assert_eq!(p.terminals(), Terminals::Rear);
        assert_eq!(p.wiring(), Wiring::TwoWire);
        assert_eq!(p.sampling().line_frequency_hz, 50.0);
        match p.profile() {
            Profile::List { steps, primary } => {
                assert_eq!(steps.len(), 3);
                assert_eq!(*primary, 1);
            }
            other => panic!("expected list profile, got {other:?}"),
        }
    }

    #[test]
    fn cutoff_above_probed_voc_is_rejected() {
        let cfg = discharge_config::load_toml(LIST).unwrap();
        let err = TestParameters::from_config(&cfg, 3.05).unwrap_err();
        assert!(matches!(
            err.downcast_ref::<DischargeError>(),
            Some(DischargeError::Validation(_))
        ));
    }
}
