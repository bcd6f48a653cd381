use std::thread;
use std::time::{Duration, Instant};

/// Monotonic clock abstraction for session timing and pacing.
///
/// - now(): returns a monotonic Instant
/// - sleep(): suspends for the provided duration (implementations may simulate)
/// - secs_since(): elapsed seconds from an epoch Instant as `f64`
pub trait Clock {
    fn now(&self) -> Instant;
    fn sleep(&self, d: Duration);

    /// Seconds elapsed since `epoch`, saturating at 0 when `epoch` lies in the future.
    fn secs_since(&self, epoch: Instant) -> f64 {
        self.now().saturating_duration_since(epoch).as_secs_f64()
    }
}

/// Default, real-time monotonic clock backed by std::time::Instant.
#[derive(Debug, Default, Clone, Copy)]
pub struct MonotonicClock;

impl MonotonicClock {
    #[inline]
    pub fn new() -> Self {
        Self
    }
}

impl Clock for MonotonicClock {
    #[inline]
    fn now(&self) -> Instant {
        Instant::now()
    }

    #[inline]
    fn sleep(&self, d: Duration) {
        if d.is_zero() {
            return;
        }
        thread::sleep(d);
    }
}

pub mod virtual_clock {
    use super::*;
    use std::sync::{Arc, Mutex};

    /// Deterministic clock whose time only moves when slept on or advanced.
    ///
    /// Clones share the same timeline, so a simulated instrument and the
    /// controller driving it observe identical elapsed time. Used by tests
    /// and by simulated dry runs that should not wait in real time.
    #[derive(Debug, Clone)]
    pub struct VirtualClock {
        origin: Instant,
        offset: Arc<Mutex<Duration>>,
    }

    impl Default for VirtualClock {
        fn default() -> Self {
            Self::new()
        }
    }

    impl VirtualClock {
        pub fn new() -> Self {
            Self {
                origin: Instant::now(),
                offset: Arc::new(Mutex::new(Duration::ZERO)),
            }
        }

        /// Advance the clock by the given duration.
        pub fn advance(&self, d: Duration) {
            if let Ok(mut off) = self.offset.lock() {
                *off = off.saturating_add(d);
            }
        }

        /// Total simulated time elapsed since construction.
        pub fn elapsed(&self) -> Duration {
            self.offset.lock().map(|g| *g).unwrap_or(Duration::ZERO)
        }
    }

    impl Clock for VirtualClock {
        fn now(&self) -> Instant {
            self.origin + self.elapsed()
        }

        fn sleep(&self, d: Duration) {
            self.advance(d);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::virtual_clock::VirtualClock;
    use super::*;

    #[test]
    fn virtual_clock_sleep_advances_shared_timeline() {
        let clock = VirtualClock::new();
        let twin = clock.clone();
        let epoch = clock.now();
        twin.sleep(Duration::from_millis(1500));
        assert!((clock.secs_since(epoch) - 1.5).abs() < 1e-9);
    }

    #[test]
    fn secs_since_saturates_for_future_epoch() {
        let clock = VirtualClock::new();
        let future = clock.now() + Duration::from_secs(5);
        assert_eq!(clock.secs_since(future), 0.0);
    }
}
