//! JPEG encode/decode for RGB frames (libjpeg-turbo)

use bytes::Bytes;
use thiserror::Error;

use super::frame::{Frame, FrameError, CHANNELS};

/// Default JPEG quality for the outgoing stream
pub const DEFAULT_JPEG_QUALITY: u8 = 80;

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("JPEG codec failed: {0}")]
    Jpeg(#[from] turbojpeg::Error),

    #[error("decoded image is invalid: {0}")]
    Frame(#[from] FrameError),

    #[error("not a JPEG image")]
    NotJpeg,

    #[error("encoder task failed: {0}")]
    Task(String),
}

/// Encode an RGB frame as baseline JPEG (4:2:0)
pub fn encode_jpeg(frame: &Frame, quality: u8) -> Result<Bytes, CodecError> {
    let width = frame.width() as usize;
    let image = turbojpeg::Image {
        pixels: frame.data(),
        width,
        pitch: width * CHANNELS,
        height: frame.height() as usize,
        format: turbojpeg::PixelFormat::RGB,
    };
    let quality = quality.clamp(1, 100) as i32;
    let jpeg = turbojpeg::compress(image, quality, turbojpeg::Subsamp::Sub2x2)?;
    Ok(Bytes::copy_from_slice(&jpeg))
}

/// JPEG bytes for `frame`, shared through the frame's encode cache
///
/// Every viewer of the same published frame gets the same buffer. The
/// encode runs once on the blocking pool; callers arriving while it runs
/// wait for its result.
pub async fn jpeg_for(frame: &Frame, quality: u8) -> Result<Bytes, CodecError> {
    frame
        .jpeg_or_try_init(|| {
            let frame = frame.clone();
            async move {
                tokio::task::spawn_blocking(move || encode_jpeg(&frame, quality))
                    .await
                    .map_err(|e| CodecError::Task(e.to_string()))?
            }
        })
        .await
}

/// Decode a JPEG into an RGB frame
pub fn decode_jpeg(jpeg: &[u8]) -> Result<Frame, CodecError> {
    if !is_jpeg(jpeg) {
        return Err(CodecError::NotJpeg);
    }
    let image = turbojpeg::decompress(jpeg, turbojpeg::PixelFormat::RGB)?;
    let width = image.width as u32;
    let height = image.height as u32;
    let row = image.width * CHANNELS;
    let pixels = if image.pitch == row {
        image.pixels
    } else {
        image
            .pixels
            .chunks(image.pitch)
            .take(image.height)
            .flat_map(|line| line[..row].iter().copied())
            .collect()
    };
    Ok(Frame::new(width, height, pixels)?)
}

/// Check SOI marker
pub fn is_jpeg(data: &[u8]) -> bool {
    data.len() >= 4 && data[0] == 0xFF && data[1] == 0xD8
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::frame::Raster;

    #[test]
    fn test_encode_produces_jpeg_markers() {
        let frame = Frame::solid(64, 48, [200, 30, 30]).unwrap();
        let jpeg = encode_jpeg(&frame, 85).unwrap();
        assert!(is_jpeg(&jpeg));
        assert_eq!(&jpeg[jpeg.len() - 2..], &[0xFF, 0xD9]);
    }

    #[test]
    fn test_decode_restores_geometry_and_color() {
        let mut raster = Raster::solid(32, 16, [0, 0, 255]).unwrap();
        raster.put(0, 0, [0, 0, 250]);
        let jpeg = encode_jpeg(&raster.into_frame(), 95).unwrap();

        let decoded = decode_jpeg(&jpeg).unwrap();
        assert_eq!(decoded.width(), 32);
        assert_eq!(decoded.height(), 16);
        let [r, g, b] = decoded.pixel(16, 8).unwrap();
        assert!(b > 200 && r < 40 && g < 40, "got {:?}", [r, g, b]);
    }

    #[tokio::test]
    async fn test_jpeg_for_is_cached() {
        let frame = Frame::solid(16, 16, [1, 2, 3]).unwrap();
        let first = jpeg_for(&frame, 80).await.unwrap();
        let second = jpeg_for(&frame.clone(), 10).await.unwrap();
        // same buffer, the lower quality request did not re-encode
        assert_eq!(first.as_ptr(), second.as_ptr());
    }

    #[tokio::test(flavor = "multi_thread", worker_threads = 4)]
    async fn test_concurrent_jpeg_for_encodes_once() {
        let frame = Frame::solid(320, 240, [40, 80, 120]).unwrap();
        let tasks: Vec<_> = (0..32)
            .map(|_| {
                let frame = frame.clone();
                tokio::spawn(async move { jpeg_for(&frame, 80).await.unwrap() })
            })
            .collect();

        let first = frame.clone();
        for task in tasks {
            let jpeg = task.await.unwrap();
            assert_eq!(jpeg.as_ptr(), first.cached_jpeg().unwrap().as_ptr());
        }
    }

    #[test]
    fn test_decode_rejects_garbage() {
        assert!(matches!(
            decode_jpeg(b"definitely not a jpeg"),
            Err(CodecError::NotJpeg)
        ));
    }
}
