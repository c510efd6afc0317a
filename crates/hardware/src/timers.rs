//! Pulse timers: the engine's only time source.
//!
//! The contract is absolute, not relative: `wait_until(prev, dt)` sleeps to
//! `prev + dt` and returns that target, so consecutive waits never
//! accumulate drift from the work done between them.

use std::thread;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// A monotonic high-resolution tick source.
pub trait PulseTimer: Send + Sync {
    /// Takes the current time point; the anchor for subsequent waits.
    fn start(&self) -> Instant;

    /// Waits until `prev + delta_us` microseconds and returns the new
    /// anchor. A non-positive delta returns immediately.
    fn wait_until(&self, prev: Instant, delta_us: i64) -> Instant;

    /// One-shot relative delay.
    fn wait_us(&self, delta_us: i64) {
        let anchor = self.start();
        self.wait_until(anchor, delta_us);
    }
}

fn target_of(prev: Instant, delta_us: i64) -> Instant {
    if delta_us <= 0 {
        prev
    } else {
        prev + Duration::from_micros(delta_us as u64)
    }
}

/// Spins on the clock. Lowest jitter, one core burned; the default for real
/// execution.
#[derive(Debug, Default)]
pub struct BusyWaitTimer;

impl PulseTimer for BusyWaitTimer {
    fn start(&self) -> Instant {
        Instant::now()
    }

    fn wait_until(&self, prev: Instant, delta_us: i64) -> Instant {
        let target = target_of(prev, delta_us);
        while Instant::now() < target {
            std::hint::spin_loop();
        }
        target
    }
}

/// Sleeps the thread for the remaining time. Larger jitter, no busy core.
#[derive(Debug, Default)]
pub struct SleepTimer;

impl PulseTimer for SleepTimer {
    fn start(&self) -> Instant {
        Instant::now()
    }

    fn wait_until(&self, prev: Instant, delta_us: i64) -> Instant {
        let target = target_of(prev, delta_us);
        let now = Instant::now();
        if target > now {
            thread::sleep(target - now);
        }
        target
    }
}

/// Does not wait at all; records every requested delay for inspection.
#[derive(Debug, Default)]
pub struct FakeTimer {
    delays: Mutex<Vec<i64>>,
}

impl FakeTimer {
    pub fn new() -> Self {
        Self::default()
    }

    /// All delays requested so far, in microseconds, in request order.
    pub fn recorded(&self) -> Vec<i64> {
        self.delays.lock().clone()
    }

    pub fn last_delay(&self) -> Option<i64> {
        self.delays.lock().last().copied()
    }
}

impl PulseTimer for FakeTimer {
    fn start(&self) -> Instant {
        Instant::now()
    }

    fn wait_until(&self, _prev: Instant, delta_us: i64) -> Instant {
        self.delays.lock().push(delta_us);
        Instant::now()
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn fake_timer_records_delays_in_order() {
        let t = FakeTimer::new();
        let anchor = t.start();
        t.wait_until(anchor, 50);
        t.wait_until(anchor, 51);
        t.wait_us(52);
        assert_eq!(t.recorded(), vec![50, 51, 52]);
        assert_eq!(t.last_delay(), Some(52));
    }

    #[test]
    fn busy_wait_reaches_the_target() {
        let t = BusyWaitTimer;
        let anchor = t.start();
        let after = t.wait_until(anchor, 200);
        assert!(Instant::now() >= after);
        assert_eq!(after - anchor, Duration::from_micros(200));
    }

    #[test]
    fn sleep_timer_returns_the_absolute_target() {
        let t = SleepTimer;
        let anchor = t.start();
        let after = t.wait_until(anchor, 100);
        assert_eq!(after - anchor, Duration::from_micros(100));
        // a negative delta does not panic and keeps the anchor
        assert_eq!(t.wait_until(anchor, -5), anchor);
    }
}
