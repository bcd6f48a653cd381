//! Maps `Box<dyn Error>` from trait boundaries to typed `DischargeError`.
//!
//! The `SourceMeter` trait uses `Box<dyn Error + Send + Sync>` so any backend
//! can plug in; this module converts those to our typed error enum, with an
//! optional feature-gated path for `discharge_hardware::HwError` downcasting.

use discharge_traits::HwResult;
use eyre::WrapErr;

use crate::error::{DischargeError, Result};

/// Map a trait-boundary error to a typed `DischargeError`.
///
/// Attempts to downcast known hardware error types first, then falls back
/// to string-based heuristics.
pub fn map_hw_error(e: &(dyn std::error::Error + 'static)) -> DischargeError {
    #[cfg(feature = "hardware-errors")]
    {
        if let Some(hw) = e.downcast_ref::<discharge_hardware::HwError>() {
            return match hw {
                discharge_hardware::HwError::Timeout => DischargeError::Timeout,
                other => DischargeError::InstrumentFault(other.to_string()),
            };
        }
    }

    let s = e.to_string();
    if s.to_lowercase().contains("timeout") || s.to_lowercase().contains("timed out") {
        DischargeError::Timeout
    } else {
        DischargeError::InstrumentFault(s)
    }
}

/// Convert an instrument call result, attaching `what` as context.
pub(crate) fn hw<T>(r: HwResult<T>, what: &'static str) -> Result<T> {
    r.map_err(|e| eyre::Report::new(map_hw_error(&*e)))
        .wrap_err(what)
}
