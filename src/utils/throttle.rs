//! Log throttling utility
//!
//! A source that flaps produces the same warning on every reconnect cycle.
//! The throttler lets the first occurrence of a key through, swallows the
//! repeats for an interval, and reports how many were swallowed when the key
//! is allowed again.

use std::collections::HashMap;
use std::time::{Duration, Instant};

use parking_lot::Mutex;

/// Outcome of a throttle check
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum ThrottleDecision {
    /// Emit the message; `suppressed` repeats were swallowed since the last one
    Log { suppressed: u64 },
    /// Drop the message
    Suppress,
}

impl ThrottleDecision {
    pub fn should_log(&self) -> bool {
        matches!(self, ThrottleDecision::Log { .. })
    }
}

struct KeyState {
    last_logged: Instant,
    suppressed: u64,
}

/// Per-key rate limiter for log messages
pub struct LogThrottler {
    keys: Mutex<HashMap<String, KeyState>>,
    interval: Duration,
}

impl LogThrottler {
    pub fn new(interval: Duration) -> Self {
        Self {
            keys: Mutex::new(HashMap::new()),
            interval,
        }
    }

    pub fn with_secs(secs: u64) -> Self {
        Self::new(Duration::from_secs(secs))
    }

    /// Decide whether a message with `key` should be emitted now
    pub fn check(&self, key: &str) -> ThrottleDecision {
        self.check_at(key, Instant::now())
    }

    fn check_at(&self, key: &str, now: Instant) -> ThrottleDecision {
        let mut keys = self.keys.lock();
        match keys.get_mut(key) {
            Some(state) if now.duration_since(state.last_logged) < self.interval => {
                state.suppressed = state.suppressed.saturating_add(1);
                ThrottleDecision::Suppress
            }
            Some(state) => {
                let suppressed = std::mem::take(&mut state.suppressed);
                state.last_logged = now;
                ThrottleDecision::Log { suppressed }
            }
            None => {
                keys.insert(
                    key.to_string(),
                    KeyState {
                        last_logged: now,
                        suppressed: 0,
                    },
                );
                ThrottleDecision::Log { suppressed: 0 }
            }
        }
    }

    /// Forget a key once its error condition recovered
    pub fn clear(&self, key: &str) {
        self.keys.lock().remove(key);
    }
}

impl Default for LogThrottler {
    /// 5 second interval
    fn default() -> Self {
        Self::with_secs(5)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_first_call_logs() {
        let throttler = LogThrottler::with_secs(1);
        assert_eq!(
            throttler.check("read_failed"),
            ThrottleDecision::Log { suppressed: 0 }
        );
    }

    #[test]
    fn test_repeats_are_counted() {
        let throttler = LogThrottler::new(Duration::from_secs(10));
        let start = Instant::now();

        assert!(throttler.check_at("k", start).should_log());
        assert_eq!(
            throttler.check_at("k", start + Duration::from_secs(1)),
            ThrottleDecision::Suppress
        );
        assert_eq!(
            throttler.check_at("k", start + Duration::from_secs(2)),
            ThrottleDecision::Suppress
        );
        assert_eq!(
            throttler.check_at("k", start + Duration::from_secs(11)),
            ThrottleDecision::Log { suppressed: 2 }
        );
    }

    #[test]
    fn test_keys_are_independent() {
        let throttler = LogThrottler::with_secs(10);
        assert!(throttler.check("key1").should_log());
        assert!(throttler.check("key2").should_log());
        assert!(!throttler.check("key1").should_log());
        assert!(!throttler.check("key2").should_log());
    }

    #[test]
    fn test_clear() {
        let throttler = LogThrottler::with_secs(10);
        assert!(throttler.check("k").should_log());
        assert!(!throttler.check("k").should_log());
        throttler.clear("k");
        assert!(throttler.check("k").should_log());
    }
}
