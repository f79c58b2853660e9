//! Monotonic nanosecond clock (spec.md §1 "the TSC clock... contract is
//! 'monotonic nanosecond timestamp'").
//!
//! The spec treats the TSC cycle-counter calibration itself as an
//! external collaborator; what every module in this crate needs is just
//! the contract: a fast, monotonic `u64` nanosecond timestamp, one per
//! worker, cheap enough to call every batch. [`DpClock`] is the trait
//! boundary; [`SystemClock`] is a real implementation over
//! [`std::time::Instant`], and [`MockClock`] lets tests and scenario
//! vectors (S1, S6) drive time explicitly.

use std::sync::atomic::{AtomicU64, Ordering};
use std::time::Instant;

pub trait DpClock: Send + Sync {
    /// Current time in nanoseconds since an arbitrary, per-process epoch.
    /// Only deltas between calls on the same clock are meaningful.
    fn now_ns(&self) -> u64;
}

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

impl DpClock for SystemClock {
    fn now_ns(&self) -> u64 {
        self.start.elapsed().as_nanos() as u64
    }
}

/// A clock whose value is set explicitly, for deterministic tests of TTL
/// expiry and layer rotation (scenarios S1, S6).
#[derive(Default)]
pub struct MockClock {
    now: AtomicU64,
}

impl MockClock {
    pub fn new(start_ns: u64) -> Self {
        Self { now: AtomicU64::new(start_ns) }
    }

    pub fn set(&self, now_ns: u64) {
        self.now.store(now_ns, Ordering::Relaxed);
    }

    pub fn advance(&self, delta_ns: u64) {
        self.now.fetch_add(delta_ns, Ordering::Relaxed);
    }
}

impl DpClock for MockClock {
    fn now_ns(&self) -> u64 {
        self.now.load(Ordering::Relaxed)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn mock_clock_advances_monotonically() {
        let clock = MockClock::new(1_000);
        assert_eq!(clock.now_ns(), 1_000);
        clock.advance(500);
        assert_eq!(clock.now_ns(), 1_500);
        clock.set(10_000);
        assert_eq!(clock.now_ns(), 10_000);
    }

    #[test]
    fn system_clock_is_monotonic() {
        let clock = SystemClock::new();
        let a = clock.now_ns();
        let b = clock.now_ns();
        assert!(b >= a);
    }
}
