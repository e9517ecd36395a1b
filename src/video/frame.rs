//! Video frame data structures

use std::future::Future;
use std::sync::Arc;

use bytes::Bytes;
use thiserror::Error;
use tokio::sync::OnceCell;

/// Bytes per pixel of every raster in the pipeline (packed RGB24)
pub const CHANNELS: usize = 3;

#[derive(Debug, Error, PartialEq, Eq)]
pub enum FrameError {
    #[error("invalid frame geometry {width}x{height}")]
    InvalidGeometry { width: u32, height: u32 },

    #[error("frame data size mismatch: expected {expected} bytes, got {actual}")]
    SizeMismatch { expected: usize, actual: usize },
}

fn expected_len(width: u32, height: u32) -> Result<usize, FrameError> {
    if width == 0 || height == 0 {
        return Err(FrameError::InvalidGeometry { width, height });
    }
    (width as usize)
        .checked_mul(height as usize)
        .and_then(|px| px.checked_mul(CHANNELS))
        .ok_or(FrameError::InvalidGeometry { width, height })
}

/// An immutable RGB24 frame
///
/// Cloning is cheap: pixel data and the cached JPEG encoding are shared.
#[derive(Debug, Clone)]
pub struct Frame {
    /// Packed RGB rows, `width * height * 3` bytes
    data: Bytes,
    width: u32,
    height: u32,
    /// Sequence number assigned by the capture source
    pub sequence: u64,
    /// JPEG encoding, computed once on first request
    jpeg: Arc<OnceCell<Bytes>>,
}

impl Frame {
    /// Create a frame, validating that `data` matches the geometry
    pub fn new(width: u32, height: u32, data: impl Into<Bytes>) -> Result<Self, FrameError> {
        let data = data.into();
        let expected = expected_len(width, height)?;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            data,
            width,
            height,
            sequence: 0,
            jpeg: Arc::new(OnceCell::new()),
        })
    }

    /// A frame filled with a single color
    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self, FrameError> {
        Raster::solid(width, height, rgb).map(Raster::into_frame)
    }

    pub fn with_sequence(mut self, sequence: u64) -> Self {
        self.sequence = sequence;
        self
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    /// Get frame data as bytes slice
    pub fn data(&self) -> &[u8] {
        &self.data
    }

    /// RGB value at (x, y)
    pub fn pixel(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Cached JPEG encoding, if one was stored already
    pub fn cached_jpeg(&self) -> Option<Bytes> {
        self.jpeg.get().cloned()
    }

    /// Cached JPEG encoding, running `init` if none exists yet
    ///
    /// Concurrent callers wait for the one running `init` instead of
    /// starting their own. A failed `init` leaves the cache empty.
    pub async fn jpeg_or_try_init<F, Fut, E>(&self, init: F) -> Result<Bytes, E>
    where
        F: FnOnce() -> Fut,
        Fut: Future<Output = Result<Bytes, E>>,
    {
        self.jpeg.get_or_try_init(init).await.cloned()
    }

    /// Copy the pixels into a mutable raster (for drawing)
    pub fn to_raster(&self) -> Raster {
        Raster {
            width: self.width,
            height: self.height,
            data: self.data.to_vec(),
        }
    }
}

/// A mutable RGB24 image, used by plugins and the placeholder renderer
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct Raster {
    width: u32,
    height: u32,
    data: Vec<u8>,
}

impl Raster {
    pub fn new(width: u32, height: u32, data: Vec<u8>) -> Result<Self, FrameError> {
        let expected = expected_len(width, height)?;
        if data.len() != expected {
            return Err(FrameError::SizeMismatch {
                expected,
                actual: data.len(),
            });
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn solid(width: u32, height: u32, rgb: [u8; 3]) -> Result<Self, FrameError> {
        let len = expected_len(width, height)?;
        let mut data = Vec::with_capacity(len);
        for _ in 0..(len / CHANNELS) {
            data.extend_from_slice(&rgb);
        }
        Ok(Self {
            width,
            height,
            data,
        })
    }

    pub fn width(&self) -> u32 {
        self.width
    }

    pub fn height(&self) -> u32 {
        self.height
    }

    pub fn data(&self) -> &[u8] {
        &self.data
    }

    pub fn data_mut(&mut self) -> &mut [u8] {
        &mut self.data
    }

    pub fn get(&self, x: u32, y: u32) -> Option<[u8; 3]> {
        if x >= self.width || y >= self.height {
            return None;
        }
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        Some([self.data[idx], self.data[idx + 1], self.data[idx + 2]])
    }

    /// Set a pixel; coordinates outside the raster are ignored
    pub fn put(&mut self, x: i32, y: i32, rgb: [u8; 3]) {
        if x < 0 || y < 0 || x >= self.width as i32 || y >= self.height as i32 {
            return;
        }
        let idx = (y as usize * self.width as usize + x as usize) * CHANNELS;
        self.data[idx..idx + CHANNELS].copy_from_slice(&rgb);
    }

    /// Freeze into an immutable frame
    pub fn into_frame(self) -> Frame {
        Frame {
            data: Bytes::from(self.data),
            width: self.width,
            height: self.height,
            sequence: 0,
            jpeg: Arc::new(OnceCell::new()),
        }
    }
}
