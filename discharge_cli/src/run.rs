//! Session assembly: backend selection, probe, discharge, extraction, persistence.

use std::path::{Path, PathBuf};
use std::sync::Arc;
use std::sync::atomic::{AtomicBool, Ordering};
use std::time::Duration;

use discharge_config::{Backend, Config};
use discharge_core::error::{DischargeError, Result, StopReason};
use discharge_core::persist::{read_raw_csv, write_model_file, write_raw_dump};
use discharge_core::util::{capacity_ah, secs};
use discharge_core::{
    BatteryModel, DynDischarger, InstrumentSetup, SessionReport, TestParameters, configure,
    extract_model, probe_open_circuit, run_session,
};
use discharge_hardware::{SimCell, SimulatedSourceMeter};
use discharge_traits::{Clock, MonotonicClock, SourceMeter, VirtualClock};
use eyre::WrapErr;
use tracing::{info, warn};

pub type SharedClock = Arc<dyn Clock + Send + Sync>;

/// Tone played at the end of a session when `--beep` is given.
const BEEP_HZ: f64 = 2000.0;
const BEEP_SECS: f64 = 0.5;

/// Simulated sessions on virtual time finish without waiting; everything else is wall time.
pub fn session_clock(cfg: &Config) -> SharedClock {
    if cfg.instrument.backend == Backend::Sim && cfg.simulation.virtual_time {
        Arc::new(VirtualClock::new())
    } else {
        Arc::new(MonotonicClock::new())
    }
}

fn address(cfg: &Config) -> Result<&str> {
    cfg.instrument
        .address
        .as_deref()
        .filter(|a| !a.is_empty())
        .ok_or_else(|| {
            eyre::Report::new(DischargeError::Validation(
                "instrument.address is required for this backend".into(),
            ))
        })
}

/// Open the configured backend. The simulator shares `clock` with the controller.
pub fn open_instrument(cfg: &Config, clock: &SharedClock) -> Result<Box<dyn SourceMeter>> {
    let timeout = Duration::from_millis(cfg.instrument.timeout_ms);
    match cfg.instrument.backend {
        Backend::Sim => {
            let s = &cfg.simulation;
            let cell = SimCell {
                capacity_ah: s.capacity_ah,
                full_voc: s.full_voc,
                empty_voc: s.empty_voc,
                esr_ohm: s.esr_ohm,
            };
            let mut sim = SimulatedSourceMeter::new(cell, Arc::clone(clock));
            if let Some(n) = s.fail_after_reads {
                sim = sim.fail_after_reads(n);
            }
            info!(?cell, virtual_time = s.virtual_time, "using simulated instrument");
            Ok(Box::new(sim))
        }
        Backend::Tcp => {
            let addr = address(cfg)?;
            let inst = discharge_hardware::transport::connect_tcp(addr, timeout)
                .wrap_err_with(|| format!("connect to instrument at {addr}"))?;
            Ok(Box::new(inst))
        }
        #[cfg(feature = "hardware")]
        Backend::Serial => {
            let port = address(cfg)?;
            let inst =
                discharge_hardware::transport::open_serial(port, cfg.instrument.baud, timeout)
                    .wrap_err_with(|| format!("open instrument port {port}"))?;
            Ok(Box::new(inst))
        }
        #[cfg(not(feature = "hardware"))]
        Backend::Serial => {
            let _ = timeout;
            Err(eyre::Report::new(DischargeError::Validation(
                "serial backend requires building with --features hardware".into(),
            )))
        }
    }
}

/// Output paths and end-of-session options for `run`.
#[derive(Debug, Clone)]
pub struct RunOptions {
    pub model_out: PathBuf,
    pub raw_out: Option<PathBuf>,
    pub beep: bool,
}

impl RunOptions {
    /// CLI flags take precedence over the `[output]` table.
    pub fn resolve(
        cfg: &Config,
        model_out: Option<PathBuf>,
        raw_out: Option<PathBuf>,
        beep: bool,
    ) -> Self {
        Self {
            model_out: model_out.unwrap_or_else(|| PathBuf::from(&cfg.output.model_file)),
            raw_out: raw_out.or_else(|| cfg.output.raw_file.as_ref().map(PathBuf::from)),
            beep,
        }
    }
}

/// What `run` reports back to the user.
#[derive(Debug)]
pub struct RunSummary {
    pub idn: String,
    pub initial_voc: f64,
    pub profile: &'static str,
    pub report: SessionReport,
    /// Set when a model was extracted and written.
    pub model_file: Option<PathBuf>,
    pub raw_file: Option<PathBuf>,
}

/// Probe, discharge to cutoff (or cancellation), extract and persist.
pub fn run_discharge(
    cfg: &Config,
    opts: &RunOptions,
    shutdown: &Arc<AtomicBool>,
) -> Result<RunSummary> {
    let clock = session_clock(cfg);
    let mut inst = open_instrument(cfg, &clock)?;
    let idn = configure(inst.as_mut(), &InstrumentSetup::from(&cfg.instrument))?;

    if shutdown.load(Ordering::Relaxed) {
        return Err(eyre::Report::new(DischargeError::Cancelled));
    }

    let initial_voc = probe_open_circuit(inst.as_mut(), &*clock, secs(cfg.discharge.settle_s))?;
    let params = TestParameters::from_config(cfg, initial_voc)?;
    let profile = params.profile().name();
    info!(
        initial_voc,
        profile,
        cutoff_v = params.cutoff_v(),
        voltage_range_v = params.voltage_range_v(),
        "starting discharge"
    );

    let flag = Arc::clone(shutdown);
    let mut discharger = DynDischarger::builder()
        .with_clock(Arc::clone(&clock))
        .with_cancel_check(move || flag.load(Ordering::Relaxed))
        .with_boxed_instrument(inst)
        .with_params(params)
        .build()?;
    let report = run_session(&mut discharger)?;

    let (model_file, raw_file) = persist_outputs(opts, discharger.params(), &report)?;
    if opts.beep {
        if let Err(e) = discharger.instrument_mut().beep(BEEP_HZ, BEEP_SECS) {
            warn!(error = %e, "beep failed");
        }
    }

    Ok(RunSummary {
        idn,
        initial_voc,
        profile,
        report,
        model_file,
        raw_file,
    })
}

/// Write the model and optional raw dump for a session that reached cutoff.
///
/// Cancelled sessions leave no files behind. Returns the paths written.
pub fn persist_outputs(
    opts: &RunOptions,
    params: &TestParameters,
    report: &SessionReport,
) -> Result<(Option<PathBuf>, Option<PathBuf>)> {
    if report.stop() != StopReason::CutoffReached {
        info!(stop = %report.stop(), "session did not reach cutoff; nothing written");
        return Ok((None, None));
    }
    let model_file = match &report.model {
        Some(model) => {
            write_model_file(&opts.model_out, model)?;
            Some(opts.model_out.clone())
        }
        None => None,
    };
    if let Some(raw) = &opts.raw_out {
        write_raw_dump(raw, params, &report.outcome, report.model.as_ref())?;
    }
    Ok((model_file, opts.raw_out.clone()))
}

/// Identification and open-circuit voltage of the connected cell.
#[derive(Debug)]
pub struct SelfCheck {
    pub idn: String,
    pub voc: f64,
}

pub fn self_check(cfg: &Config) -> Result<SelfCheck> {
    let clock = session_clock(cfg);
    let mut inst = open_instrument(cfg, &clock)?;
    let idn = configure(inst.as_mut(), &InstrumentSetup::from(&cfg.instrument))?;
    let voc = probe_open_circuit(inst.as_mut(), &*clock, secs(cfg.discharge.settle_s))?;
    Ok(SelfCheck { idn, voc })
}

/// Rebuild a model from recorded raw data and write it to `model_out`.
///
/// Capacity is `current_a` times the last recorded timestamp.
pub fn extract_from_raw(raw: &Path, current_a: f64, model_out: &Path) -> Result<BatteryModel> {
    if !(current_a.is_finite() && current_a > 0.0) {
        return Err(eyre::Report::new(DischargeError::Validation(format!(
            "--current-a must be a positive number of amps, got {current_a}"
        ))));
    }
    let mut series = read_raw_csv(raw)?;
    let last_t = series.last_timestamp().unwrap_or(0.0);
    series.freeze(capacity_ah(current_a, last_t));
    let model = extract_model(&series)?;
    write_model_file(model_out, &model)?;
    Ok(model)
}

#[cfg(test)]
mod tests {
    use super::*;
    use discharge_core::mocks::ScriptedMeter;
    use discharge_core::{Discharger, Profile};
    use std::sync::atomic::AtomicUsize;

    fn params() -> TestParameters {
        TestParameters::builder()
            .profile(Profile::constant(0.5))
            .cutoff_v(3.0)
            .measure_interval_s(10.0)
            .initial_voc(4.2)
            .build()
            .unwrap()
    }

    fn options(dir: &tempfile::TempDir) -> RunOptions {
        RunOptions {
            model_out: dir.path().join("model.csv"),
            raw_out: Some(dir.path().join("raw.csv")),
            beep: false,
        }
    }

    #[test]
    fn cancelled_session_writes_nothing() {
        let dir = tempfile::tempdir().unwrap();
        let clock = VirtualClock::new();
        let reads = Arc::new(AtomicUsize::new(0));
        let meter = {
            let reads = Arc::clone(&reads);
            ScriptedMeter::new(move |_| {
                reads.fetch_add(1, Ordering::Relaxed);
                4.0
            })
        };
        let mut d = Discharger::new(meter, params())
            .with_clock(Arc::new(clock))
            .with_cancel_check(move || reads.load(Ordering::Relaxed) >= 4);
        let report = run_session(&mut d).unwrap();
        assert_eq!(report.stop(), StopReason::UserCancelled);
        assert!(!report.outcome.series.is_empty());

        let opts = options(&dir);
        let written = persist_outputs(&opts, d.params(), &report).unwrap();
        assert_eq!(written, (None, None));
        assert!(!opts.model_out.exists());
        assert!(!dir.path().join("raw.csv").exists());
    }

    #[test]
    fn cutoff_session_writes_model_and_raw_dump() {
        let dir = tempfile::tempdir().unwrap();
        let clock = VirtualClock::new();
        let meter = {
            let clock = clock.clone();
            ScriptedMeter::new(move |_| 4.2 - 0.01 * clock.elapsed().as_secs_f64())
        };
        let mut d = Discharger::new(meter, params()).with_clock(Arc::new(clock));
        let report = run_session(&mut d).unwrap();
        assert_eq!(report.stop(), StopReason::CutoffReached);

        let opts = options(&dir);
        let (model, raw) = persist_outputs(&opts, d.params(), &report).unwrap();
        assert_eq!(model.as_deref(), Some(opts.model_out.as_path()));
        assert!(opts.model_out.exists());
        assert!(raw.is_some_and(|p| p.exists()));
    }
}
