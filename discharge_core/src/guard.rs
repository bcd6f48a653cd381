//! Scoped instrument acquisition.
//!
//! While an `InstrumentGuard` is alive the instrument may be sourcing current.
//! Dropping it (early return, `?`, panic unwind) forces source current to zero
//! and disables the output. `release` does the same teardown but reports
//! failures to the caller.

use std::ops::{Deref, DerefMut};

use discharge_traits::SourceMeter;
use tracing::{debug, warn};

use crate::error::Result;
use crate::hw_error::hw;

pub struct InstrumentGuard<'a, I: SourceMeter + ?Sized> {
    inst: &'a mut I,
    armed: bool,
}

impl<'a, I: SourceMeter + ?Sized> InstrumentGuard<'a, I> {
    /// Enable the output and take responsibility for turning it off again.
    pub fn engage(inst: &'a mut I) -> Result<Self> {
        // Armed before enabling so a failed enable still runs teardown.
        let guard = Self { inst, armed: true };
        hw(guard.inst.set_output(true), "enable output")?;
        debug!("output enabled");
        Ok(guard)
    }

    /// Force the safe state and surface the first teardown error.
    pub fn release(mut self) -> Result<()> {
        self.armed = false;
        let zero = hw(self.inst.set_source_current(0.0), "zero source current");
        let off = hw(self.inst.set_output(false), "disable output");
        debug!("output disabled");
        zero.and(off)
    }
}

impl<I: SourceMeter + ?Sized> Deref for InstrumentGuard<'_, I> {
    type Target = I;

    fn deref(&self) -> &I {
        self.inst
    }
}

impl<I: SourceMeter + ?Sized> DerefMut for InstrumentGuard<'_, I> {
    fn deref_mut(&mut self) -> &mut I {
        self.inst
    }
}

impl<I: SourceMeter + ?Sized> Drop for InstrumentGuard<'_, I> {
    fn drop(&mut self) {
        if !self.armed {
            return;
        }
        if let Err(e) = self.inst.set_source_current(0.0) {
            warn!(error = %e, "safe-state: zeroing source current failed");
        }
        if let Err(e) = self.inst.set_output(false) {
            warn!(error = %e, "safe-state: disabling output failed");
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::mocks::{Event, ScriptedMeter};

    #[test]
    fn drop_forces_safe_state() {
        let mut m = ScriptedMeter::new(|_| 4.0);
        {
            let mut g = InstrumentGuard::engage(&mut m).unwrap();
            g.set_source_current(-0.5).unwrap();
            assert!(g.output_enabled());
        }
        assert!(!m.output_enabled());
        assert_eq!(m.level(), 0.0);
    }

    #[test]
    fn release_reports_teardown_error() {
        let mut m = ScriptedMeter::new(|_| 4.0).fail_output_off();
        let g = InstrumentGuard::engage(&mut m).unwrap();
        assert!(g.release().is_err());
        // Zeroing still happened and drop did not retry.
        assert_eq!(m.level(), 0.0);
        assert_eq!(m.count(|e| *e == Event::Output(false)), 1);
    }
}
