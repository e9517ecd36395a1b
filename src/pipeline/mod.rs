//! Frame pipeline (producer)
//!
//! One dedicated thread reads frames from the source manager, runs them
//! through the active plugin and publishes the result to the
//! [`LatestFrameSlot`]. Plugin failures, including panics, are contained:
//! the unmodified source frame is published instead.

pub mod slot;

use std::any::Any;
use std::panic::{catch_unwind, AssertUnwindSafe};
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::Arc;
use std::thread::JoinHandle;
use std::time::Duration;

use serde::Serialize;
use tokio_util::sync::CancellationToken;
use tracing::{debug, info, warn};

use crate::logs::{LogLevel, LogSink};
use crate::plugin::{ActivePlugin, PluginError, PluginRegistry};
use crate::video::{Frame, SourceState, VideoSourceManager};

pub use slot::{LatestFrameSlot, PublishedFrame};

const LOG_SOURCE: &str = "Pipeline";

/// Pause after each published frame
pub const DEFAULT_YIELD_PAUSE: Duration = Duration::from_millis(10);

/// Counters shared with the status endpoint
#[derive(Debug, Default)]
pub struct PipelineCounters {
    published: AtomicU64,
    processed: AtomicU64,
    plugin_failures: AtomicU64,
}

#[derive(Debug, Clone, Copy, Default, Serialize, PartialEq, Eq)]
pub struct PipelineStats {
    /// Frames published to the slot
    pub published: u64,
    /// Frames successfully transformed by a plugin
    pub processed: u64,
    /// Frames where the plugin failed and the source frame was published
    pub plugin_failures: u64,
}

impl PipelineCounters {
    pub fn snapshot(&self) -> PipelineStats {
        PipelineStats {
            published: self.published.load(Ordering::Relaxed),
            processed: self.processed.load(Ordering::Relaxed),
            plugin_failures: self.plugin_failures.load(Ordering::Relaxed),
        }
    }
}

/// Result of one pipeline iteration
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StepOutcome {
    /// A frame was published with this version
    Published(u64),
    /// The read failed; the next step reconnects
    ReadFailed,
    /// Shutdown was requested
    Shutdown,
}

pub struct FramePipeline {
    source: VideoSourceManager,
    registry: Arc<PluginRegistry>,
    slot: Arc<LatestFrameSlot>,
    logs: Arc<LogSink>,
    counters: Arc<PipelineCounters>,
    yield_pause: Duration,
    shutdown: CancellationToken,
}

impl FramePipeline {
    pub fn new(
        source: VideoSourceManager,
        registry: Arc<PluginRegistry>,
        slot: Arc<LatestFrameSlot>,
        logs: Arc<LogSink>,
        shutdown: CancellationToken,
    ) -> Self {
        Self {
            source,
            registry,
            slot,
            logs,
            counters: Arc::new(PipelineCounters::default()),
            yield_pause: DEFAULT_YIELD_PAUSE,
            shutdown,
        }
    }

    pub fn with_yield_pause(mut self, pause: Duration) -> Self {
        self.yield_pause = pause;
        self
    }

    pub fn counters(&self) -> Arc<PipelineCounters> {
        self.counters.clone()
    }

    pub fn source(&self) -> &VideoSourceManager {
        &self.source
    }

    /// Run one iteration: reconnect if needed, read, process, publish
    pub fn step(&mut self) -> StepOutcome {
        if self.shutdown.is_cancelled() {
            return StepOutcome::Shutdown;
        }

        if self.source.state() != SourceState::Connected
            && !self.source.ensure_connected(&self.shutdown)
        {
            return StepOutcome::Shutdown;
        }

        let frame = match self.source.read_frame() {
            Ok(frame) => frame,
            Err(e) => {
                debug!("Frame read failed: {}", e);
                return StepOutcome::ReadFailed;
            }
        };

        let (frame, plugin_logs) = match self.registry.active() {
            Some(active) => {
                let (frame, lines) = self.run_plugin(&active, frame);
                (frame, Some((active, lines)))
            }
            None => (frame, None),
        };

        let version = self.slot.publish(frame);
        self.counters.published.fetch_add(1, Ordering::Relaxed);

        if let Some((active, lines)) = plugin_logs {
            for line in lines {
                self.logs.append(active.name(), line, LogLevel::Ai);
            }
        }

        StepOutcome::Published(version)
    }

    /// Process `frame` with `active`, falling back to the input on failure
    fn run_plugin(&self, active: &ActivePlugin, frame: Frame) -> (Frame, Vec<String>) {
        let mut plugin = active.lock();
        if !plugin.processes_frames() {
            return (frame, Vec::new());
        }

        let result = catch_unwind(AssertUnwindSafe(|| plugin.process(&frame)));
        drop(plugin);

        let error = match result {
            Ok(Ok(output)) => {
                self.counters.processed.fetch_add(1, Ordering::Relaxed);
                return (output.frame, output.logs);
            }
            Ok(Err(e)) => PluginError::Runtime {
                plugin: active.name().to_string(),
                reason: format!("{:#}", e),
            },
            Err(payload) => PluginError::Runtime {
                plugin: active.name().to_string(),
                reason: format!("panicked: {}", panic_message(payload.as_ref())),
            },
        };

        self.counters.plugin_failures.fetch_add(1, Ordering::Relaxed);
        self.logs.error(active.name(), error.to_string());
        (frame, Vec::new())
    }

    /// Loop until shutdown, then release the source
    pub fn run(mut self) {
        info!("Frame pipeline started ({})", self.source.source_name());
        loop {
            match self.step() {
                StepOutcome::Shutdown => break,
                StepOutcome::Published(_) => std::thread::sleep(self.yield_pause),
                StepOutcome::ReadFailed => {}
            }
        }
        self.source.release();
        info!("Frame pipeline stopped");
    }

    /// Start the loop on a dedicated OS thread
    pub fn spawn(self) -> std::io::Result<PipelineHandle> {
        let shutdown = self.shutdown.clone();
        let counters = self.counters.clone();
        let join = std::thread::Builder::new()
            .name("frame-pipeline".to_string())
            .spawn(move || self.run())?;
        Ok(PipelineHandle {
            join: Some(join),
            shutdown,
            counters,
        })
    }
}

fn panic_message(payload: &(dyn Any + Send)) -> String {
    if let Some(s) = payload.downcast_ref::<&str>() {
        (*s).to_string()
    } else if let Some(s) = payload.downcast_ref::<String>() {
        s.clone()
    } else {
        "unknown panic".to_string()
    }
}

/// Owner side of a running pipeline thread
pub struct PipelineHandle {
    join: Option<JoinHandle<()>>,
    shutdown: CancellationToken,
    counters: Arc<PipelineCounters>,
}

impl PipelineHandle {
    pub fn counters(&self) -> Arc<PipelineCounters> {
        self.counters.clone()
    }

    pub fn is_running(&self) -> bool {
        self.join.as_ref().is_some_and(|j| !j.is_finished())
    }

    /// Request shutdown and wait for the thread to exit
    pub fn stop(&mut self) {
        self.shutdown.cancel();
        if let Some(join) = self.join.take() {
            if join.join().is_err() {
                warn!("Frame pipeline thread panicked");
            }
        }
    }
}

impl Drop for PipelineHandle {
    fn drop(&mut self) {
        self.stop();
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::plugin::registry::testing::{registry, write_manifest};
    use crate::video::backoff::testing::RecordingSleeper;
    use crate::video::backoff::Backoff;
    use crate::video::source::testing::{OpenStep, ScriptedDevice};

    struct Fixture {
        pipeline: FramePipeline,
        registry: Arc<PluginRegistry>,
        slot: Arc<LatestFrameSlot>,
        logs: Arc<LogSink>,
        _dir: tempfile::TempDir,
    }

    fn fixture(device: ScriptedDevice) -> Fixture {
        let dir = tempfile::tempdir().unwrap();
        write_manifest(dir.path(), "red", r#"{"name": "Red", "entry": "paint"}"#);
        write_manifest(
            dir.path(),
            "blue",
            r#"{"name": "Blue", "entry": "paint", "settings": {"color": [0, 0, 255]}}"#,
        );
        write_manifest(dir.path(), "failing", r#"{"name": "Failing", "entry": "always_fail"}"#);
        write_manifest(dir.path(), "panicky", r#"{"name": "Panicky", "entry": "panics"}"#);
        write_manifest(dir.path(), "idle", r#"{"name": "Idle", "entry": "no_process"}"#);

        let logs = Arc::new(LogSink::new());
        let registry = Arc::new(registry(dir.path()));
        let slot = Arc::new(LatestFrameSlot::new());
        let source = VideoSourceManager::new(
            Box::new(device),
            Backoff::default(),
            Box::new(RecordingSleeper::default()),
            logs.clone(),
        );
        let pipeline = FramePipeline::new(
            source,
            registry.clone(),
            slot.clone(),
            logs.clone(),
            CancellationToken::new(),
        );
        Fixture {
            pipeline,
            registry,
            slot,
            logs,
            _dir: dir,
        }
    }

    #[test]
    fn test_passthrough_without_plugin() {
        let mut fx = fixture(ScriptedDevice::endless());
        assert_eq!(fx.pipeline.step(), StepOutcome::Published(1));
        assert_eq!(fx.pipeline.step(), StepOutcome::Published(2));

        let current = fx.slot.current().unwrap();
        assert_eq!(current.frame.sequence, 2);
        assert_eq!(current.frame.pixel(0, 0), Some([2, 2, 2]));
    }

    #[test]
    fn test_failing_plugin_still_advances_slot() {
        let mut fx = fixture(ScriptedDevice::endless());
        fx.registry.load("failing").unwrap();

        const N: u64 = 25;
        for i in 1..=N {
            assert_eq!(fx.pipeline.step(), StepOutcome::Published(i));
            let current = fx.slot.current().unwrap();
            // pass-through frame: the scripted source's gray level
            let shade = (i % 256) as u8;
            assert_eq!(current.frame.pixel(0, 0), Some([shade, shade, shade]));
        }
        assert_eq!(fx.slot.version(), N);

        let stats = fx.pipeline.counters().snapshot();
        assert_eq!(stats.published, N);
        assert_eq!(stats.plugin_failures, N);
        assert_eq!(stats.processed, 0);

        // every failure is logged under the plugin's name
        let errors: Vec<_> = fx
            .logs
            .recent(100)
            .into_iter()
            .filter(|e| e.level == LogLevel::Error)
            .collect();
        assert_eq!(errors.len(), N as usize);
        assert!(errors
            .iter()
            .all(|e| e.source == "Failing" && e.message.contains("model exploded")));
    }

    #[test]
    fn test_non_processing_plugin_runs_pass_through() {
        let mut fx = fixture(ScriptedDevice::endless());
        fx.registry.load("idle").unwrap();

        for i in 1..=3u64 {
            assert_eq!(fx.pipeline.step(), StepOutcome::Published(i));
            let current = fx.slot.current().unwrap();
            assert_eq!(current.frame.sequence, i);
            let shade = i as u8;
            assert_eq!(current.frame.pixel(0, 0), Some([shade, shade, shade]));
        }

        let stats = fx.pipeline.counters().snapshot();
        assert_eq!(stats.published, 3);
        assert_eq!(stats.processed, 0);
        assert_eq!(stats.plugin_failures, 0);
        assert!(!fx
            .logs
            .recent(100)
            .iter()
            .any(|e| e.level == LogLevel::Error || e.level == LogLevel::Ai));
    }

    #[test]
    fn test_panicking_plugin_is_contained() {
        let mut fx = fixture(ScriptedDevice::endless());
        fx.registry.load("panicky").unwrap();

        for i in 1..=3 {
            assert_eq!(fx.pipeline.step(), StepOutcome::Published(i));
        }
        assert_eq!(fx.pipeline.counters().snapshot().plugin_failures, 3);
        assert!(fx
            .logs
            .recent(100)
            .iter()
            .any(|e| e.source == "Panicky" && e.message.contains("panicked")));
    }

    #[test]
    fn test_plugin_logs_forwarded_as_ai() {
        let mut fx = fixture(ScriptedDevice::endless());
        fx.registry.load("red").unwrap();
        fx.pipeline.step();

        let current = fx.slot.current().unwrap();
        assert_eq!(current.frame.pixel(3, 3), Some([255, 0, 0]));

        let last = fx.logs.recent(1).pop().unwrap();
        assert_eq!(last.level, LogLevel::Ai);
        assert_eq!(last.source, "Red");
    }

    #[test]
    fn test_swap_between_frames() {
        let mut fx = fixture(ScriptedDevice::endless());
        fx.registry.load("red").unwrap();
        fx.pipeline.step();
        fx.registry.load("blue").unwrap();
        fx.pipeline.step();
        assert_eq!(
            fx.slot.current().unwrap().frame.pixel(0, 0),
            Some([0, 0, 255])
        );

        fx.registry.unload();
        fx.pipeline.step();
        assert_eq!(
            fx.slot.current().unwrap().frame.pixel(0, 0),
            Some([3, 3, 3])
        );
    }

    #[test]
    fn test_read_failure_then_reconnect() {
        let device = ScriptedDevice::new([OpenStep::Frames(1), OpenStep::Fail, OpenStep::Frames(5)]);
        let log = device.log.clone();
        let mut fx = fixture(device);

        assert_eq!(fx.pipeline.step(), StepOutcome::Published(1));
        assert_eq!(fx.pipeline.step(), StepOutcome::ReadFailed);
        assert_eq!(fx.pipeline.source().state(), SourceState::Disconnected);
        // reconnect: one failed attempt, then success
        assert_eq!(fx.pipeline.step(), StepOutcome::Published(2));
        assert_eq!(log.lock().opens, 3);
    }

    #[test]
    fn test_shutdown_stops_step() {
        let mut fx = fixture(ScriptedDevice::endless());
        fx.pipeline.shutdown.cancel();
        assert_eq!(fx.pipeline.step(), StepOutcome::Shutdown);
        assert!(fx.slot.is_empty());
    }

    #[test]
    fn test_spawned_thread_publishes_and_stops() {
        let fx = fixture(ScriptedDevice::endless());
        let slot = fx.slot.clone();
        let mut handle = fx
            .pipeline
            .with_yield_pause(Duration::from_millis(1))
            .spawn()
            .unwrap();

        let deadline = std::time::Instant::now() + Duration::from_secs(5);
        while slot.version() < 10 && std::time::Instant::now() < deadline {
            std::thread::sleep(Duration::from_millis(5));
        }
        assert!(slot.version() >= 10);
        assert!(handle.is_running());

        handle.stop();
        assert!(!handle.is_running());
        assert!(handle.counters().snapshot().published >= 10);
    }
}
