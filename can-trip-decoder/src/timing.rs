//! High-resolution waits
//!
//! `thread::sleep` overshoots by up to a scheduler tick, which adds up over a
//! trip of thousands of samples. [`PreciseDelay`] sleeps for the bulk of the
//! wait and busy-spins on the monotonic clock for the last `spin_margin`.

use std::time::{Duration, Instant};

/// Default busy-spin tail
pub const DEFAULT_SPIN_MARGIN: Duration = Duration::from_millis(2);

/// Hybrid coarse-sleep then fine-spin wait
#[derive(Debug, Clone, Copy)]
pub struct PreciseDelay {
    spin_margin: Duration,
}

impl PreciseDelay {
    pub fn new(spin_margin: Duration) -> Self {
        Self { spin_margin }
    }

    pub fn spin_margin(&self) -> Duration {
        self.spin_margin
    }

    /// Block until `target`
    pub fn sleep_until(&self, target: Instant) {
        let now = Instant::now();
        if target <= now {
            return;
        }

        let remaining = target - now;
        if remaining > self.spin_margin {
            std::thread::sleep(remaining - self.spin_margin);
        }

        while Instant::now() < target {
            std::hint::spin_loop();
        }
    }

    /// Block for `duration` from now
    pub fn delay(&self, duration: Duration) {
        self.sleep_until(Instant::now() + duration);
    }

    pub fn delay_ms(&self, millis: u64) {
        self.delay(Duration::from_millis(millis));
    }
}

impl Default for PreciseDelay {
    fn default() -> Self {
        Self::new(DEFAULT_SPIN_MARGIN)
    }
}
