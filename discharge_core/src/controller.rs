//! The discharge controller (`Discharger`).
//!
//! Drives one session from `Init` to `Stopped`: configures ranges, enables the
//! output behind an `InstrumentGuard`, runs the profile's sampling loop until
//! cutoff or cancellation, then restores the safe state and freezes the raw
//! series with the session capacity.

use std::sync::Arc;
use std::time::{Duration, Instant};

use discharge_traits::{Clock, MonotonicClock, SourceMeter};
use tracing::{debug, info};

use crate::error::{DischargeError, Result, StopReason};
use crate::esr::measure_esr;
use crate::guard::InstrumentGuard;
use crate::hw_error::hw;
use crate::params::{Profile, Step, TestParameters};
use crate::samples::{RawSample, RawSampleSeries};
use crate::status::SessionState;
use crate::util::{capacity_ah, pace_step, secs};

/// What a completed session hands back.
#[derive(Debug, Clone)]
pub struct DischargeOutcome {
    pub stop: StopReason,
    /// Frozen; `capacity_ah()` holds the session capacity.
    pub series: RawSampleSeries,
    /// Wall time from output-on to stop.
    pub duration_s: f64,
}

impl DischargeOutcome {
    pub fn capacity_ah(&self) -> f64 {
        self.series.capacity_ah()
    }
}

pub struct Discharger<I: SourceMeter> {
    instrument: I,
    params: TestParameters,
    clock: Arc<dyn Clock + Send + Sync>,
    cancel_check: Option<Box<dyn Fn() -> bool>>,
    state: SessionState,
}

impl<I: SourceMeter> core::fmt::Debug for Discharger<I> {
    fn fmt(&self, f: &mut core::fmt::Formatter<'_>) -> core::fmt::Result {
        f.debug_struct("Discharger")
            .field("profile", &self.params.profile().name())
            .field("cutoff_v", &self.params.cutoff_v())
            .field("state", &self.state)
            .finish()
    }
}

impl<I: SourceMeter> Discharger<I> {
    pub fn new(instrument: I, params: TestParameters) -> Self {
        Self {
            instrument,
            params,
            clock: Arc::new(MonotonicClock::new()),
            cancel_check: None,
            state: SessionState::Init,
        }
    }

    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = clock;
        self
    }

    /// Polled at every loop iteration and pacing increment; `true` cancels.
    pub fn with_cancel_check<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.cancel_check = Some(Box::new(f));
        self
    }

    pub fn state(&self) -> SessionState {
        self.state
    }

    pub fn params(&self) -> &TestParameters {
        &self.params
    }

    pub fn instrument(&self) -> &I {
        &self.instrument
    }

    pub fn instrument_mut(&mut self) -> &mut I {
        &mut self.instrument
    }

    pub fn into_instrument(self) -> I {
        self.instrument
    }

    /// Run the session to completion.
    ///
    /// Cutoff and cancellation return `Ok` with the matching stop reason.
    /// Instrument failures return `Err` after the safe state has been forced.
    pub fn run(&mut self) -> Result<DischargeOutcome> {
        if self.state != SessionState::Init {
            return Err(eyre::Report::new(DischargeError::State(format!(
                "session already ran (state {:?})",
                self.state
            ))));
        }
        let Self {
            instrument,
            params,
            clock,
            cancel_check,
            state,
        } = self;

        let result = run_session(
            instrument,
            params,
            &**clock,
            cancel_check.as_deref(),
            state,
        );
        *state = SessionState::Stopped;
        info!(state = ?*state, ok = result.is_ok(), "session stopped");
        result
    }
}

fn run_session<I: SourceMeter>(
    inst: &mut I,
    params: &TestParameters,
    clock: &(dyn Clock + Send + Sync),
    cancel: Option<&dyn Fn() -> bool>,
    state: &mut SessionState,
) -> Result<DischargeOutcome> {
    hw(inst.set_source_current(0.0), "zero source current")?;
    hw(inst.set_voltage_range(params.voltage_range_v()), "set voltage range")?;
    hw(inst.set_compliance_voltage(params.compliance_v()), "set compliance")?;
    hw(
        inst.set_current_range(params.max_discharge_current_a()),
        "set current range",
    )?;

    let mut guard = InstrumentGuard::engage(inst)?;
    let epoch = clock.now();
    *state = SessionState::Active;
    info!(
        profile = params.profile().name(),
        cutoff_v = params.cutoff_v(),
        interval_s = params.measure_interval_s(),
        "discharge started"
    );

    let mut session = Session {
        params,
        clock,
        cancel,
        epoch,
        series: RawSampleSeries::new(),
    };
    let stop = match params.profile() {
        Profile::Constant { current_a } => session.run_constant(&mut *guard, *current_a)?,
        Profile::List { steps, primary } => session.run_list(&mut *guard, steps, *primary)?,
    };
    *state = match stop {
        StopReason::UserCancelled => SessionState::Cancelled,
        _ => SessionState::CutoffReached,
    };
    guard.release()?;
    let duration_s = clock.secs_since(epoch);

    let mut series = session.series;
    let last_t = series.last_timestamp().unwrap_or(0.0);
    let capacity = capacity_ah(params.profile().average_current_a(), last_t);
    series.freeze(capacity);
    info!(
        stop = %stop,
        samples = series.len(),
        capacity_ah = capacity,
        duration_s,
        "discharge finished"
    );
    Ok(DischargeOutcome {
        stop,
        series,
        duration_s,
    })
}

struct Session<'a> {
    params: &'a TestParameters,
    clock: &'a (dyn Clock + Send + Sync),
    cancel: Option<&'a dyn Fn() -> bool>,
    epoch: Instant,
    series: RawSampleSeries,
}

impl Session<'_> {
    fn cancelled(&self) -> bool {
        self.cancel.is_some_and(|f| f())
    }

    fn cutoff(&self, vload: f64) -> bool {
        vload <= self.params.cutoff_v()
    }

    /// Auto-zero, take one open-circuit ESR sample, append it. Returns Vload.
    fn sample<I: SourceMeter + ?Sized>(&mut self, inst: &mut I) -> Result<f64> {
        hw(inst.auto_zero_once(), "auto-zero")?;
        let r = measure_esr(inst, self.clock, 0.0, self.params.settle())?;
        let t_s = self.clock.secs_since(self.epoch);
        self.series.push(RawSample {
            t_s,
            voc: r.v_after,
            vload: r.v_before,
            esr: r.esr,
        })?;
        info!(
            n = self.series.len(),
            t_s,
            voc = r.v_after,
            vload = r.v_before,
            esr = r.esr,
            "sample"
        );
        Ok(r.v_before)
    }

    /// Sleep toward `deadline` in short increments. Returns `true` if cancelled.
    fn pace_until(&self, deadline: Instant) -> bool {
        let step = pace_step(self.params.measure_interval());
        loop {
            if self.cancelled() {
                return true;
            }
            let now = self.clock.now();
            if now >= deadline {
                return false;
            }
            self.clock.sleep(step.min(deadline - now));
        }
    }

    /// Constant-profile pacing: the interval less the modelled auto-zero time.
    fn sample_period(&self) -> Duration {
        self.params
            .measure_interval()
            .saturating_sub(self.params.autozero_duration())
    }

    fn run_constant<I: SourceMeter + ?Sized>(
        &mut self,
        inst: &mut I,
        current_a: f64,
    ) -> Result<StopReason> {
        hw(
            inst.set_source_current(-current_a.abs()),
            "command discharge current",
        )?;
        let period = self.sample_period();
        loop {
            if self.cancelled() {
                return Ok(StopReason::UserCancelled);
            }
            let started = self.clock.now();
            let vload = self.sample(inst)?;
            if self.cutoff(vload) {
                return Ok(StopReason::CutoffReached);
            }
            if self.pace_until(started + period) {
                return Ok(StopReason::UserCancelled);
            }
        }
    }

    fn run_list<I: SourceMeter + ?Sized>(
        &mut self,
        inst: &mut I,
        steps: &[Step],
        primary: usize,
    ) -> Result<StopReason> {
        // primary-step samples are a full interval apart
        let period = self.params.measure_interval();
        let mut idx = 0;
        loop {
            if self.cancelled() {
                return Ok(StopReason::UserCancelled);
            }
            let step = steps[idx];
            hw(
                inst.set_source_current(-step.current_a.abs()),
                "command step current",
            )?;
            let step_end = self.clock.now() + secs(step.duration_s);
            debug!(idx, current_a = step.current_a, primary = idx == primary, "step");

            if idx == primary {
                let mut last = self.clock.now();
                let vload = self.sample(inst)?;
                if self.cutoff(vload) {
                    return Ok(StopReason::CutoffReached);
                }
                loop {
                    let next = last + period;
                    if next >= step_end {
                        break;
                    }
                    if self.pace_until(next) {
                        return Ok(StopReason::UserCancelled);
                    }
                    last = self.clock.now();
                    let vload = self.sample(inst)?;
                    if self.cutoff(vload) {
                        return Ok(StopReason::CutoffReached);
                    }
                }
            }
            if self.pace_until(step_end) {
                return Ok(StopReason::UserCancelled);
            }
            idx = (idx + 1) % steps.len();
        }
    }
}
