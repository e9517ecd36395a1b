//! Multipart MJPEG framing
//!
//! Writing side: `create_mjpeg_part` wraps one JPEG into a
//! `multipart/x-mixed-replace` part. Reading side: `MjpegSplitter` pulls whole
//! JPEG images out of an arbitrary chunked byte stream by scanning for the
//! SOI/EOI markers, so it copes with parts that carry a `Content-Length`
//! header as well as parts that don't.

use bytes::{Buf, BufMut, Bytes, BytesMut};
use thiserror::Error;

/// Multipart boundary name
pub const BOUNDARY: &str = "frame";

/// `Content-Type` of the whole stream response
pub const STREAM_CONTENT_TYPE: &str = "multipart/x-mixed-replace; boundary=frame";

/// Upper bound for a single JPEG in an incoming stream
pub const MAX_JPEG_BYTES: usize = 5 * 1024 * 1024;

const SOI: [u8; 2] = [0xFF, 0xD8];
const EOI: [u8; 2] = [0xFF, 0xD9];

/// Create MJPEG multipart frame bytes
pub fn create_mjpeg_part(jpeg_data: &[u8]) -> Bytes {
    let mut buf = BytesMut::with_capacity(64 + jpeg_data.len());

    buf.put_slice(b"--frame\r\n");
    buf.put_slice(b"Content-Type: image/jpeg\r\n");
    buf.put_slice(b"\r\n");
    buf.put_slice(jpeg_data);
    buf.put_slice(b"\r\n");

    buf.freeze()
}

#[derive(Debug, Error, PartialEq, Eq)]
pub enum MjpegError {
    #[error("no complete JPEG within {0} buffered bytes")]
    Overflow(usize),
}

/// Incremental JPEG extractor for MJPEG byte streams
pub struct MjpegSplitter {
    buffer: BytesMut,
    max_frame_bytes: usize,
}

impl MjpegSplitter {
    pub fn new() -> Self {
        Self::with_limit(MAX_JPEG_BYTES)
    }

    pub fn with_limit(max_frame_bytes: usize) -> Self {
        Self {
            buffer: BytesMut::with_capacity(64 * 1024),
            max_frame_bytes,
        }
    }

    /// Feed a chunk received from the network
    pub fn push(&mut self, chunk: &[u8]) {
        self.buffer.extend_from_slice(chunk);
    }

    pub fn buffered(&self) -> usize {
        self.buffer.len()
    }

    /// Take the next complete JPEG, if the buffer holds one
    ///
    /// Bytes before the SOI marker (boundaries, part headers) are discarded.
    pub fn next_jpeg(&mut self) -> Result<Option<Bytes>, MjpegError> {
        let Some(start) = find_marker(&self.buffer, SOI, 0) else {
            // keep a trailing 0xFF, it may be the first half of a marker
            let keep = usize::from(self.buffer.last() == Some(&0xFF));
            let drop = self.buffer.len() - keep;
            self.buffer.advance(drop);
            return Ok(None);
        };
        self.buffer.advance(start);

        match find_marker(&self.buffer, EOI, SOI.len()) {
            Some(end) => {
                let jpeg = self.buffer.split_to(end + EOI.len()).freeze();
                Ok(Some(jpeg))
            }
            None if self.buffer.len() > self.max_frame_bytes => {
                let size = self.buffer.len();
                self.buffer.clear();
                Err(MjpegError::Overflow(size))
            }
            None => Ok(None),
        }
    }

    pub fn reset(&mut self) {
        self.buffer.clear();
    }
}

impl Default for MjpegSplitter {
    fn default() -> Self {
        Self::new()
    }
}

fn find_marker(haystack: &[u8], marker: [u8; 2], from: usize) -> Option<usize> {
    if haystack.len() < from + 2 {
        return None;
    }
    haystack[from..]
        .windows(2)
        .position(|w| w == marker)
        .map(|pos| pos + from)
}
