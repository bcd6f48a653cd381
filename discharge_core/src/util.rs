//! Timing and unit helpers for discharge_core.

use std::time::Duration;

/// Seconds per hour, for ampere-second to ampere-hour conversion.
pub const SECS_PER_HOUR: f64 = 3600.0;
/// Fixed command/processing overhead added to the auto-zero estimate.
pub const AUTOZERO_OVERHEAD_S: f64 = 0.02;
/// Pacing never sleeps in increments shorter than this.
pub const MIN_PACE_STEP: Duration = Duration::from_millis(1);
/// Pacing increments are at most this fraction of the measure interval.
pub const PACE_DIVISOR: u32 = 10_000;

/// Convert seconds to a `Duration`, clamping negative and non-finite input to zero.
#[inline]
pub fn secs(s: f64) -> Duration {
    if s.is_finite() && s > 0.0 {
        Duration::from_secs_f64(s)
    } else {
        Duration::ZERO
    }
}

/// Modelled duration of one auto-zero cycle: two integrations plus fixed overhead.
#[inline]
pub fn autozero_duration(nplc: f64, line_frequency_hz: f64) -> Duration {
    if line_frequency_hz <= 0.0 {
        return secs(AUTOZERO_OVERHEAD_S);
    }
    secs(2.0 * nplc / line_frequency_hz + AUTOZERO_OVERHEAD_S)
}

/// Sleep increment used while pacing toward a deadline.
#[inline]
pub fn pace_step(interval: Duration) -> Duration {
    (interval / PACE_DIVISOR).max(MIN_PACE_STEP)
}

/// Charge delivered at `current_a` for `seconds`, in ampere-hours.
#[inline]
pub fn capacity_ah(current_a: f64, seconds: f64) -> f64 {
    current_a.abs() * seconds / SECS_PER_HOUR
}

/// Round to 0.1 mAh for reporting.
#[inline]
pub fn round_capacity(ah: f64) -> f64 {
    (ah * 1e4).round() / 1e4
}
