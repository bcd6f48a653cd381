//! Type-state builder for a boxed `Discharger`.
//!
//! `build()` only exists once an instrument and test parameters are set.
//! `try_build()` is always available and reports what is missing.

use std::marker::PhantomData;
use std::sync::Arc;

use discharge_traits::{Clock, MonotonicClock, SourceMeter};

use crate::controller::Discharger;
use crate::error::{BuildError, Result};
use crate::params::TestParameters;

/// Dynamic-dispatch controller used by the CLI.
pub type DynDischarger = Discharger<Box<dyn SourceMeter>>;

pub struct Missing;
pub struct Set;

pub struct DischargerBuilder<I, P> {
    instrument: Option<Box<dyn SourceMeter>>,
    params: Option<TestParameters>,
    clock: Option<Arc<dyn Clock + Send + Sync>>,
    cancel_check: Option<Box<dyn Fn() -> bool>>,
    _i: PhantomData<I>,
    _p: PhantomData<P>,
}

impl Default for DischargerBuilder<Missing, Missing> {
    fn default() -> Self {
        Self {
            instrument: None,
            params: None,
            clock: None,
            cancel_check: None,
            _i: PhantomData,
            _p: PhantomData,
        }
    }
}

impl DynDischarger {
    pub fn builder() -> DischargerBuilder<Missing, Missing> {
        DischargerBuilder::default()
    }
}

impl<I, P> DischargerBuilder<I, P> {
    /// Fallible build available in any type-state.
    pub fn try_build(self) -> Result<DynDischarger> {
        let instrument = self
            .instrument
            .ok_or_else(|| eyre::Report::new(BuildError::MissingInstrument))?;
        let params = self
            .params
            .ok_or_else(|| eyre::Report::new(BuildError::MissingParameters))?;
        let clock = self
            .clock
            .unwrap_or_else(|| Arc::new(MonotonicClock::new()));
        let mut d = Discharger::new(instrument, params).with_clock(clock);
        if let Some(f) = self.cancel_check {
            d = d.with_cancel_check(f);
        }
        Ok(d)
    }

    /// Defaults to `MonotonicClock`.
    pub fn with_clock(mut self, clock: Arc<dyn Clock + Send + Sync>) -> Self {
        self.clock = Some(clock);
        self
    }

    pub fn with_cancel_check<F>(mut self, f: F) -> Self
    where
        F: Fn() -> bool + 'static,
    {
        self.cancel_check = Some(Box::new(f));
        self
    }
}

impl<P> DischargerBuilder<Missing, P> {
    pub fn with_instrument(
        self,
        instrument: impl SourceMeter + 'static,
    ) -> DischargerBuilder<Set, P> {
        self.with_boxed_instrument(Box::new(instrument))
    }

    pub fn with_boxed_instrument(
        self,
        instrument: Box<dyn SourceMeter>,
    ) -> DischargerBuilder<Set, P> {
        DischargerBuilder {
            instrument: Some(instrument),
            params: self.params,
            clock: self.clock,
            cancel_check: self.cancel_check,
            _i: PhantomData,
            _p: PhantomData,
        }
    }
}

impl<I> DischargerBuilder<I, Missing> {
    pub fn with_params(self, params: TestParameters) -> DischargerBuilder<I, Set> {
        DischargerBuilder {
            instrument: self.instrument,
            params: Some(params),
            clock: self.clock,
            cancel_check: self.cancel_check,
            _i: PhantomData,
            _p: PhantomData,
        }
    }
}

impl DischargerBuilder<Set, Set> {
    pub fn build(self) -> Result<DynDischarger> {
        self.try_build()
    }
}
