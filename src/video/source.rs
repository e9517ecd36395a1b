//! Capture source abstraction
//!
//! A `CaptureDevice` knows how to open a connection to a video source; the
//! returned `CaptureHandle` yields decoded frames until it fails. Dropping a
//! handle releases the underlying device or connection.

use std::fmt;

use serde::Serialize;
use thiserror::Error;

use super::frame::Frame;

/// Connection state of the video source
///
/// Only the pipeline thread changes it; everyone else observes it through a
/// `watch` channel.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "snake_case")]
pub enum SourceState {
    /// No handle is open
    Disconnected,
    /// An acquisition attempt is in progress (or backing off)
    Connecting,
    /// A handle is open and delivering frames
    Connected,
}

impl fmt::Display for SourceState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            SourceState::Disconnected => write!(f, "disconnected"),
            SourceState::Connecting => write!(f, "connecting"),
            SourceState::Connected => write!(f, "connected"),
        }
    }
}

/// Throttle key shared by all mid-stream read failures
pub const READ_THROTTLE_KEY: &str = "source_read";

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum SourceError {
    /// Source could not be opened (retried with backoff)
    #[error("cannot connect to {source_name}: {reason}")]
    ConnectFailed { source_name: String, reason: String },

    /// Mid-stream failure, including a read that returned no data
    #[error("read from {source_name} failed: {reason}")]
    ReadFailed { source_name: String, reason: String },

    #[error("source is not connected")]
    NotConnected,
}

impl SourceError {
    pub fn connect(source_name: impl Into<String>, reason: impl fmt::Display) -> Self {
        SourceError::ConnectFailed {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    pub fn read(source_name: impl Into<String>, reason: impl fmt::Display) -> Self {
        SourceError::ReadFailed {
            source_name: source_name.into(),
            reason: reason.to_string(),
        }
    }

    /// Short key used to rate-limit repeated log lines
    pub fn throttle_key(&self) -> &'static str {
        match self {
            SourceError::ConnectFailed { .. } => "source_connect",
            SourceError::ReadFailed { .. } => READ_THROTTLE_KEY,
            SourceError::NotConnected => "source_not_connected",
        }
    }
}

/// Something that can be opened to produce frames
pub trait CaptureDevice: Send {
    /// Human-readable name used in logs (device path or URL)
    fn describe(&self) -> String;

    /// Open the source. A failure must not leave anything open.
    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, SourceError>;
}

/// An open capture session
pub trait CaptureHandle: Send {
    /// Block until the next frame is available
    fn read_frame(&mut self) -> Result<Frame, SourceError>;
}

#[cfg(test)]
pub(crate) mod testing {
    //! Scripted fakes for driving the source manager synchronously

    use std::collections::VecDeque;
    use std::sync::Arc;

    use parking_lot::Mutex;

    use super::*;

    /// What the fake device does on each `open`
    #[derive(Debug, Clone)]
    pub enum OpenStep {
        Fail,
        /// Open a handle that yields this many frames, then fails
        Frames(usize),
    }

    #[derive(Debug, Default)]
    pub struct ScriptLog {
        pub opens: usize,
        pub releases: usize,
        pub frames: u64,
    }

    /// Replays `OpenStep`s; once the script is exhausted every open fails
    pub struct ScriptedDevice {
        steps: VecDeque<OpenStep>,
        pub log: Arc<Mutex<ScriptLog>>,
        width: u32,
        height: u32,
    }

    impl ScriptedDevice {
        pub fn new(steps: impl IntoIterator<Item = OpenStep>) -> Self {
            Self {
                steps: steps.into_iter().collect(),
                log: Arc::new(Mutex::new(ScriptLog::default())),
                width: 8,
                height: 6,
            }
        }

        /// A device that connects once and then streams forever
        pub fn endless() -> Self {
            Self::new([OpenStep::Frames(usize::MAX)])
        }
    }

    impl CaptureDevice for ScriptedDevice {
        fn describe(&self) -> String {
            "scripted".to_string()
        }

        fn open(&mut self) -> Result<Box<dyn CaptureHandle>, SourceError> {
            self.log.lock().opens += 1;
            match self.steps.pop_front() {
                Some(OpenStep::Frames(remaining)) => Ok(Box::new(ScriptedHandle {
                    remaining,
                    log: self.log.clone(),
                    width: self.width,
                    height: self.height,
                })),
                Some(OpenStep::Fail) | None => {
                    Err(SourceError::connect("scripted", "scripted failure"))
                }
            }
        }
    }

    struct ScriptedHandle {
        remaining: usize,
        log: Arc<Mutex<ScriptLog>>,
        width: u32,
        height: u32,
    }

    impl CaptureHandle for ScriptedHandle {
        fn read_frame(&mut self) -> Result<Frame, SourceError> {
            if self.remaining == 0 {
                return Err(SourceError::read("scripted", "end of script"));
            }
            self.remaining -= 1;
            let mut log = self.log.lock();
            log.frames += 1;
            let shade = (log.frames % 256) as u8;
            let frame = Frame::solid(self.width, self.height, [shade, shade, shade])
                .map_err(|e| SourceError::read("scripted", e))?;
            Ok(frame.with_sequence(log.frames))
        }
    }

    impl Drop for ScriptedHandle {
        fn drop(&mut self) {
            self.log.lock().releases += 1;
        }
    }
}
