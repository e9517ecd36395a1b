//! Video streaming module
//!
//! Multipart MJPEG fan-out to HTTP viewers.
//!
//! # Components
//!
//! - `MjpegBroadcaster` - per-client streams sampling the latest-frame slot
//! - `PlaceholderRenderer` - "waiting for video" image while nothing was published

pub mod broadcaster;
pub mod placeholder;

pub use broadcaster::{
    BroadcasterConfig, ClientGuard, ClientId, ClientSession, ClientStats, FpsCalculator,
    MjpegBroadcaster,
};
pub use placeholder::{PlaceholderRenderer, DEFAULT_PLACEHOLDER_TEXT};
