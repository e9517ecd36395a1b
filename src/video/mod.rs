//! Video acquisition module
//!
//! This module provides the frame types, JPEG codec, and the capture sources
//! (local V4L2 device or remote MJPEG endpoint) behind the reconnecting
//! `VideoSourceManager`.

pub mod backoff;
pub mod codec;
pub mod device;
pub mod draw;
pub mod frame;
pub mod manager;
pub mod mjpeg;
pub mod remote;
pub mod source;

pub use backoff::{Backoff, Sleeper, ThreadSleeper};
pub use codec::{decode_jpeg, encode_jpeg, jpeg_for, CodecError};
pub use device::V4l2Device;
pub use frame::{Frame, FrameError, Raster};
pub use manager::{SourceCounters, SourceStats, VideoSourceManager};
pub use remote::RemoteMjpegDevice;
pub use source::{CaptureDevice, CaptureHandle, SourceError, SourceState};
