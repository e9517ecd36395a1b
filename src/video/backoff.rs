//! Reconnect backoff and the sleep primitive used by the source manager

use std::time::{Duration, Instant};

use tokio_util::sync::CancellationToken;

pub const DEFAULT_BACKOFF_BASE: Duration = Duration::from_secs(2);
pub const DEFAULT_BACKOFF_MAX: Duration = Duration::from_secs(30);

/// Doubling delay between failed acquisitions, capped at `max`
#[derive(Debug, Clone)]
pub struct Backoff {
    base: Duration,
    max: Duration,
    current: Duration,
}

impl Backoff {
    pub fn new(base: Duration, max: Duration) -> Self {
        let max = max.max(base);
        Self {
            base,
            max,
            current: base,
        }
    }

    /// Delay to wait before the next attempt
    pub fn current(&self) -> Duration {
        self.current
    }

    /// Return the delay for this failure and double it for the next one
    pub fn next_delay(&mut self) -> Duration {
        let delay = self.current;
        self.current = self.current.saturating_mul(2).min(self.max);
        delay
    }

    /// Back to the base delay (after a successful acquisition)
    pub fn reset(&mut self) {
        self.current = self.base;
    }

    pub fn base(&self) -> Duration {
        self.base
    }

    pub fn max(&self) -> Duration {
        self.max
    }
}

impl Default for Backoff {
    fn default() -> Self {
        Self::new(DEFAULT_BACKOFF_BASE, DEFAULT_BACKOFF_MAX)
    }
}

/// Blocking sleep used by the producer thread
pub trait Sleeper: Send {
    /// Sleep for `duration`. Returns `false` if the wait was cut short by
    /// shutdown.
    fn sleep(&mut self, duration: Duration) -> bool;
}

/// Granularity at which a sleeping producer notices shutdown
const SHUTDOWN_POLL: Duration = Duration::from_millis(50);

/// Real sleeper: `std::thread::sleep` in short slices, aborted on shutdown
pub struct ThreadSleeper {
    shutdown: CancellationToken,
}

impl ThreadSleeper {
    pub fn new(shutdown: CancellationToken) -> Self {
        Self { shutdown }
    }
}

impl Sleeper for ThreadSleeper {
    fn sleep(&mut self, duration: Duration) -> bool {
        let deadline = Instant::now() + duration;
        loop {
            if self.shutdown.is_cancelled() {
                return false;
            }
            let now = Instant::now();
            if now >= deadline {
                return true;
            }
            std::thread::sleep((deadline - now).min(SHUTDOWN_POLL));
        }
    }
}
