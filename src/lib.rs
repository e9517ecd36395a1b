//! Vision Relay - live video relay with hot-swappable inference plugins
//!
//! Frames are pulled from a local V4L2 device or a remote MJPEG endpoint,
//! run through the active plugin on a dedicated producer thread and
//! re-streamed to any number of HTTP viewers as multipart MJPEG.

pub mod config;
pub mod error;
pub mod logs;
pub mod pipeline;
pub mod plugin;
pub mod state;
pub mod stream;
pub mod utils;
pub mod video;
pub mod web;

pub use error::{AppError, Result};
