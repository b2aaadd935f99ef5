use std::sync::{Arc, Mutex};
use std::time::Instant;

/// Source of "now" in seconds, used for the idle-timeout policy.
pub trait Clock: Send {
    fn now(&self) -> f64;
}

/// Monotonic wall clock, seconds since construction.
#[derive(Clone, Debug)]
pub struct SystemClock {
    start: Instant,
}

impl SystemClock {
    pub fn new() -> Self {
        Self { start: Instant::now() }
    }
}

impl Default for SystemClock {
    fn default() -> Self {
        Self::new()
    }
}

impl Clock for SystemClock {
    fn now(&self) -> f64 {
        self.start.elapsed().as_secs_f64()
    }
}

/// Deterministic clock for tests and offline replay.
///
/// Clones share the same time. With a non-zero `step`, every read advances
/// the clock by `step` after returning the current value, so a polling loop
/// makes progress without real waiting.
#[derive(Clone, Debug)]
pub struct ManualClock {
    time: Arc<Mutex<f64>>,
    step: f64,
}

impl ManualClock {
    pub fn new(start: f64) -> Self {
        Self::stepping(start, 0.0)
    }

    pub fn stepping(start: f64, step: f64) -> Self {
        Self { time: Arc::new(Mutex::new(start)), step }
    }

    pub fn set(&self, time: f64) {
        if let Ok(mut t) = self.time.lock() {
            *t = time;
        }
    }

    pub fn advance(&self, seconds: f64) {
        if let Ok(mut t) = self.time.lock() {
            *t += seconds;
        }
    }

    pub fn peek(&self) -> f64 {
        self.time.lock().map(|t| *t).unwrap_or(f64::NAN)
    }
}

impl Clock for ManualClock {
    fn now(&self) -> f64 {
        match self.time.lock() {
            Ok(mut t) => {
                let current = *t;
                *t += self.step;
                current
            }
            Err(_) => f64::NAN,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_manual_clock_shared_between_clones() {
        let clock = ManualClock::new(10.0);
        let handle = clock.clone();
        handle.advance(2.5);
        assert_eq!(clock.now(), 12.5);
        handle.set(1.0);
        assert_eq!(clock.now(), 1.0);
    }

    #[test]
    fn test_stepping_clock_advances_per_read() {
        let clock = ManualClock::stepping(0.0, 0.5);
        assert_eq!(clock.now(), 0.0);
        assert_eq!(clock.now(), 0.5);
        assert_eq!(clock.peek(), 1.0);
    }

    #[test]
    fn test_system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now();
        let b = clock.now();
        assert!(b >= a);
    }
}
