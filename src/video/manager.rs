//! Video source manager: connect / read / reconnect state machine
//!
//! Owned by the pipeline thread. Acquisition failures are retried with an
//! exponential backoff; a failed read drops the handle and pauses for a short
//! fixed interval before the next acquisition cycle.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::time::Duration;

use serde::Serialize;
use tokio::sync::watch;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info};

use super::backoff::{Backoff, Sleeper};
use super::frame::Frame;
use super::source::{CaptureDevice, CaptureHandle, SourceError, SourceState, READ_THROTTLE_KEY};
use crate::logs::LogSink;
use crate::utils::{LogThrottler, ThrottleDecision};

/// Name used for source events in the log sink
const LOG_SOURCE: &str = "Video";

/// Default pause after a mid-stream read failure
pub const DEFAULT_READ_FAILURE_PAUSE: Duration = Duration::from_millis(500);

/// Counters shared with the status endpoint
#[derive(Debug, Default)]
pub struct SourceCounters {
    connects: AtomicU64,
    connect_failures: AtomicU64,
    read_failures: AtomicU64,
    frames: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct SourceStats {
    pub connects: u64,
    pub connect_failures: u64,
    pub read_failures: u64,
    pub frames: u64,
}

impl SourceCounters {
    pub fn snapshot(&self) -> SourceStats {
        SourceStats {
            connects: self.connects.load(Ordering::Relaxed),
            connect_failures: self.connect_failures.load(Ordering::Relaxed),
            read_failures: self.read_failures.load(Ordering::Relaxed),
            frames: self.frames.load(Ordering::Relaxed),
        }
    }
}

pub struct VideoSourceManager {
    device: Box<dyn CaptureDevice>,
    handle: Option<Box<dyn CaptureHandle>>,
    backoff: Backoff,
    read_failure_pause: Duration,
    sleeper: Box<dyn Sleeper>,
    state: watch::Sender<SourceState>,
    counters: Arc<SourceCounters>,
    logs: Arc<LogSink>,
    throttler: LogThrottler,
}

impl VideoSourceManager {
    pub fn new(
        device: Box<dyn CaptureDevice>,
        backoff: Backoff,
        sleeper: Box<dyn Sleeper>,
        logs: Arc<LogSink>,
    ) -> Self {
        let (state, _) = watch::channel(SourceState::Disconnected);
        Self {
            device,
            handle: None,
            backoff,
            read_failure_pause: DEFAULT_READ_FAILURE_PAUSE,
            sleeper,
            state,
            counters: Arc::new(SourceCounters::default()),
            logs,
            throttler: LogThrottler::with_secs(5),
        }
    }

    pub fn with_read_failure_pause(mut self, pause: Duration) -> Self {
        self.read_failure_pause = pause;
        self
    }

    pub fn state(&self) -> SourceState {
        *self.state.borrow()
    }

    /// Read-only view of the connection state
    pub fn subscribe(&self) -> watch::Receiver<SourceState> {
        self.state.subscribe()
    }

    pub fn counters(&self) -> Arc<SourceCounters> {
        self.counters.clone()
    }

    pub fn backoff(&self) -> &Backoff {
        &self.backoff
    }

    pub fn source_name(&self) -> String {
        self.device.describe()
    }

    fn set_state(&self, state: SourceState) {
        self.state.send_if_modified(|current| {
            if *current == state {
                return false;
            }
            debug!("Source state: {} -> {}", current, state);
            *current = state;
            true
        });
    }

    /// Single acquisition attempt
    ///
    /// On failure the backoff delay is slept here (on the calling thread) and
    /// doubled for the next attempt.
    pub fn acquire(&mut self) -> Result<(), SourceError> {
        self.release_handle();
        self.set_state(SourceState::Connecting);

        match self.device.open() {
            Ok(handle) => {
                self.handle = Some(handle);
                self.backoff.reset();
                self.counters.connects.fetch_add(1, Ordering::Relaxed);
                // a fresh session reports its first read failure again
                self.throttler.clear(READ_THROTTLE_KEY);
                self.set_state(SourceState::Connected);
                self.logs.success(
                    LOG_SOURCE,
                    format!("Connected to {}", self.device.describe()),
                );
                Ok(())
            }
            Err(e) => {
                self.counters
                    .connect_failures
                    .fetch_add(1, Ordering::Relaxed);
                let delay = self.backoff.next_delay();
                self.logs.warning(
                    LOG_SOURCE,
                    format!("{}; retrying in {}s", e, delay.as_secs_f32()),
                );
                self.sleeper.sleep(delay);
                Err(e)
            }
        }
    }

    /// Run acquisition attempts until connected
    ///
    /// Returns `false` if shutdown was requested first.
    pub fn ensure_connected(&mut self, shutdown: &CancellationToken) -> bool {
        while self.handle.is_none() {
            if shutdown.is_cancelled() {
                return false;
            }
            let _ = self.acquire();
        }
        true
    }

    /// Read the next frame from the open handle
    ///
    /// Any failure releases the handle, moves to `Disconnected` and sleeps the
    /// fixed read-failure pause.
    pub fn read_frame(&mut self) -> Result<Frame, SourceError> {
        let Some(handle) = self.handle.as_mut() else {
            return Err(SourceError::NotConnected);
        };

        match handle.read_frame() {
            Ok(frame) => {
                self.counters.frames.fetch_add(1, Ordering::Relaxed);
                Ok(frame)
            }
            Err(e) => {
                self.counters.read_failures.fetch_add(1, Ordering::Relaxed);
                self.release();
                match self.throttler.check(e.throttle_key()) {
                    ThrottleDecision::Log { suppressed: 0 } => {
                        self.logs.warning(LOG_SOURCE, format!("{}; reconnecting", e));
                    }
                    ThrottleDecision::Log { suppressed } => {
                        self.logs.warning(
                            LOG_SOURCE,
                            format!("{}; reconnecting (suppressed {} repeats)", e, suppressed),
                        );
                    }
                    ThrottleDecision::Suppress => {}
                }
                self.sleeper.sleep(self.read_failure_pause);
                Err(e)
            }
        }
    }

    /// Drop the open handle, if any
    pub fn release(&mut self) {
        if self.release_handle() {
            info!("Released video source {}", self.device.describe());
        }
        self.set_state(SourceState::Disconnected);
    }

    fn release_handle(&mut self) -> bool {
        self.handle.take().is_some()
    }
}

impl Drop for VideoSourceManager {
    fn drop(&mut self) {
        self.release();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::backoff::testing::RecordingSleeper;
    use crate::video::source::testing::{OpenStep, ScriptedDevice};

    fn manager(device: ScriptedDevice, sleeper: RecordingSleeper) -> VideoSourceManager {
        VideoSourceManager::new(
            Box::new(device),
            Backoff::default(),
            Box::new(sleeper),
            Arc::new(LogSink::new()),
        )
    }

    fn secs(values: &[u64]) -> Vec<Duration> {
        values.iter().map(|s| Duration::from_secs(*s)).collect()
    }

    #[test]
    fn test_backoff_sequence_and_reset() {
        let device = ScriptedDevice::new([
            OpenStep::Fail,
            OpenStep::Fail,
            OpenStep::Fail,
            OpenStep::Frames(1),
            OpenStep::Fail,
        ]);
        let log = device.log.clone();
        let sleeper = RecordingSleeper::default();
        let mut mgr = manager(device, sleeper.clone());
        let token = CancellationToken::new();

        assert!(mgr.ensure_connected(&token));
        assert_eq!(mgr.state(), SourceState::Connected);
        assert_eq!(sleeper.recorded(), secs(&[2, 4, 8]));
        assert_eq!(mgr.backoff().current(), Duration::from_secs(2));

        // one frame, then the read fails and the fixed pause applies
        assert!(mgr.read_frame().is_ok());
        assert!(matches!(
            mgr.read_frame(),
            Err(SourceError::ReadFailed { .. })
        ));
        assert_eq!(mgr.state(), SourceState::Disconnected);
        assert_eq!(sleeper.recorded().last(), Some(&DEFAULT_READ_FAILURE_PAUSE));

        // backoff starts from base again after the successful acquisition
        assert!(mgr.acquire().is_err());
        assert_eq!(sleeper.recorded().last(), Some(&Duration::from_secs(2)));

        let log = log.lock();
        assert_eq!(log.opens, 5);
        assert_eq!(log.releases, 1);
    }

    #[test]
    fn test_backoff_capped_for_long_outage() {
        let sleeper = RecordingSleeper::default();
        let mut mgr = manager(ScriptedDevice::new([]), sleeper.clone());
        for _ in 0..12 {
            assert!(mgr.acquire().is_err());
        }
        let recorded = sleeper.recorded();
        assert!(recorded.iter().all(|d| *d <= Duration::from_secs(30)));
        assert_eq!(recorded.last(), Some(&Duration::from_secs(30)));
        assert_eq!(mgr.counters().snapshot().connect_failures, 12);
    }

    #[test]
    fn test_read_without_handle() {
        let mut mgr = manager(ScriptedDevice::new([]), RecordingSleeper::default());
        assert_eq!(mgr.read_frame().unwrap_err(), SourceError::NotConnected);
    }

    #[test]
    fn test_shutdown_stops_reconnect_loop() {
        let token = CancellationToken::new();
        token.cancel();
        let mut mgr = manager(ScriptedDevice::new([]), RecordingSleeper::default());
        assert!(!mgr.ensure_connected(&token));
    }

    #[test]
    fn test_state_watch_follows_transitions() {
        let device = ScriptedDevice::new([OpenStep::Frames(0)]);
        let mut mgr = manager(device, RecordingSleeper::default());
        let rx = mgr.subscribe();
        assert_eq!(*rx.borrow(), SourceState::Disconnected);

        mgr.acquire().unwrap();
        assert_eq!(*rx.borrow(), SourceState::Connected);

        assert!(mgr.read_frame().is_err());
        assert_eq!(*rx.borrow(), SourceState::Disconnected);
    }

    #[test]
    fn test_failures_are_logged() {
        let logs = Arc::new(LogSink::new());
        let mut mgr = VideoSourceManager::new(
            Box::new(ScriptedDevice::new([OpenStep::Fail, OpenStep::Frames(1)])),
            Backoff::default(),
            Box::new(RecordingSleeper::default()),
            logs.clone(),
        );
        assert!(mgr.ensure_connected(&CancellationToken::new()));

        let entries = logs.recent(10);
        assert_eq!(entries.len(), 2);
        assert_eq!(entries[0].level, crate::logs::LogLevel::Warning);
        assert!(entries[0].message.contains("scripted failure"));
        assert_eq!(entries[1].level, crate::logs::LogLevel::Success);
    }

    #[test]
    fn test_read_failure_after_reconnect_is_logged() {
        let logs = Arc::new(LogSink::new());
        let mut mgr = VideoSourceManager::new(
            Box::new(ScriptedDevice::new([OpenStep::Frames(0), OpenStep::Frames(0)])),
            Backoff::default(),
            Box::new(RecordingSleeper::default()),
            logs.clone(),
        );
        let token = CancellationToken::new();

        assert!(mgr.ensure_connected(&token));
        assert!(mgr.read_frame().is_err());
        assert!(mgr.ensure_connected(&token));
        assert!(mgr.read_frame().is_err());

        let warnings: Vec<_> = logs
            .recent(10)
            .into_iter()
            .filter(|e| e.level == crate::logs::LogLevel::Warning)
            .collect();
        assert_eq!(warnings.len(), 2);
        assert!(warnings.iter().all(|e| e.message.contains("end of script")));
    }
}
