//! Monotonic time source and stopwatch timers

use std::time::{Duration, Instant};

/// Monotonic time, as an offset from an arbitrary origin
pub trait Clock {
    fn now(&self) -> Duration;
}

/// Wall-clock backed by `Instant`
pub struct MonotonicClock {
    origin: Instant,
}

impl MonotonicClock {
    pub fn new() -> Self {
        Self {
            origin: Instant::now(),
        }
    }
}

impl Default for MonotonicClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for MonotonicClock {
    fn now(&self) -> Duration {
        self.origin.elapsed()
    }
}

/// Stopwatch measuring time since its last reset
#[derive(Debug, Clone, Copy)]
pub struct Timer {
    started: Duration,
}

impl Timer {
    pub fn start(now: Duration) -> Self {
        Self { started: now }
    }

    pub fn reset(&mut self, now: Duration) {
        self.started = now;
    }

    pub fn elapsed(&self, now: Duration) -> Duration {
        now.saturating_sub(self.started)
    }

    pub fn elapsed_secs(&self, now: Duration) -> f64 {
        self.elapsed(now).as_secs_f64()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_timer_reset() {
        let mut timer = Timer::start(Duration::from_secs(2));
        assert_eq!(timer.elapsed(Duration::from_secs(5)), Duration::from_secs(3));

        timer.reset(Duration::from_secs(5));
        assert_eq!(timer.elapsed_secs(Duration::from_millis(5500)), 0.5);
        // Never negative
        assert_eq!(timer.elapsed(Duration::from_secs(1)), Duration::ZERO);
    }

    #[test]
    fn test_monotonic_clock_advances() {
        let clock = MonotonicClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
