//! Local V4L2 capture device
//!
//! The device is asked for MJPEG first (cheap on USB bandwidth), falling back
//! to whatever YUYV or RGB3 format the driver settles on. Every buffer is
//! converted to an RGB24 `Frame`.

use std::path::{Path, PathBuf};
use std::time::Duration;

use super::frame::{Frame, CHANNELS};
use super::source::{CaptureDevice, CaptureHandle, SourceError};

/// Pixel layouts we know how to turn into RGB24
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum WireFormat {
    Mjpeg,
    Yuyv,
    Rgb24,
}

impl WireFormat {
    pub fn from_fourcc(fourcc: &[u8; 4]) -> Option<Self> {
        match fourcc {
            b"MJPG" | b"JPEG" => Some(WireFormat::Mjpeg),
            b"YUYV" => Some(WireFormat::Yuyv),
            b"RGB3" => Some(WireFormat::Rgb24),
            _ => None,
        }
    }
}

/// Convert packed YUYV 4:2:2 to RGB24 (BT.601, limited range)
pub fn yuyv_to_rgb(src: &[u8], width: u32, height: u32) -> Option<Vec<u8>> {
    let pixels = width as usize * height as usize;
    if width % 2 != 0 || src.len() < pixels * 2 {
        return None;
    }
    let mut out = Vec::with_capacity(pixels * CHANNELS);
    for quad in src[..pixels * 2].chunks_exact(4) {
        let (y0, u, y1, v) = (quad[0], quad[1], quad[2], quad[3]);
        out.extend_from_slice(&yuv_to_rgb(y0, u, v));
        out.extend_from_slice(&yuv_to_rgb(y1, u, v));
    }
    Some(out)
}

fn yuv_to_rgb(y: u8, u: u8, v: u8) -> [u8; 3] {
    let c = (y as i32 - 16).max(0) * 298;
    let d = u as i32 - 128;
    let e = v as i32 - 128;
    let clip = |x: i32| ((x + 128) >> 8).clamp(0, 255) as u8;
    [
        clip(c + 409 * e),
        clip(c - 100 * d - 208 * e),
        clip(c + 516 * d),
    ]
}

/// Decode one captured buffer into an RGB frame
pub fn buffer_to_frame(
    format: WireFormat,
    buf: &[u8],
    width: u32,
    height: u32,
) -> Result<Frame, String> {
    match format {
        WireFormat::Mjpeg => super::codec::decode_jpeg(buf).map_err(|e| e.to_string()),
        WireFormat::Yuyv => {
            let rgb = yuyv_to_rgb(buf, width, height)
                .ok_or_else(|| format!("short YUYV buffer ({} bytes)", buf.len()))?;
            Frame::new(width, height, rgb).map_err(|e| e.to_string())
        }
        WireFormat::Rgb24 => {
            let len = width as usize * height as usize * CHANNELS;
            if buf.len() < len {
                return Err(format!("short RGB buffer ({} bytes)", buf.len()));
            }
            Frame::new(width, height, buf[..len].to_vec()).map_err(|e| e.to_string())
        }
    }
}

/// A V4L2 capture node such as `/dev/video0`
pub struct V4l2Device {
    path: PathBuf,
    width: u32,
    height: u32,
    read_timeout: Duration,
}

impl V4l2Device {
    pub fn new(path: impl AsRef<Path>, width: u32, height: u32, read_timeout: Duration) -> Self {
        Self {
            path: path.as_ref().to_path_buf(),
            width,
            height,
            read_timeout,
        }
    }
}

#[cfg(feature = "v4l2")]
mod imp {
    use tracing::{info, warn};
    use v4l::buffer::Type;
    use v4l::io::traits::CaptureStream;
    use v4l::prelude::MmapStream;
    use v4l::video::Capture;
    use v4l::{Device, FourCC};

    use super::*;

    const BUFFER_COUNT: u32 = 4;

    pub(super) struct V4l2Handle {
        // field order matters: the stream unmaps its buffers before the fd closes
        stream: MmapStream<'static>,
        _device: Device,
        name: String,
        format: WireFormat,
        width: u32,
        height: u32,
        sequence: u64,
    }

    pub(super) fn open(dev: &V4l2Device) -> Result<V4l2Handle, SourceError> {
        let name = dev.path.display().to_string();
        let device =
            Device::with_path(&dev.path).map_err(|e| SourceError::connect(name.clone(), e))?;

        let mut format = device
            .format()
            .map_err(|e| SourceError::connect(name.clone(), e))?;
        format.width = dev.width;
        format.height = dev.height;
        format.fourcc = FourCC::new(b"MJPG");
        let format = match device.set_format(&format) {
            Ok(format) => format,
            Err(e) => {
                warn!("Failed to set MJPEG format on {}: {}", name, e);
                device
                    .format()
                    .map_err(|e| SourceError::connect(name.clone(), e))?
            }
        };

        let wire = WireFormat::from_fourcc(&format.fourcc.repr).ok_or_else(|| {
            SourceError::connect(
                name.clone(),
                format!("unsupported pixel format {}", format.fourcc),
            )
        })?;

        let mut stream = MmapStream::with_buffers(&device, Type::VideoCapture, BUFFER_COUNT)
            .map_err(|e| SourceError::connect(name.clone(), e))?;
        stream.set_timeout(dev.read_timeout);

        info!(
            "Opened {} ({}x{} {})",
            name, format.width, format.height, format.fourcc
        );

        Ok(V4l2Handle {
            stream,
            _device: device,
            name,
            format: wire,
            width: format.width,
            height: format.height,
            sequence: 0,
        })
    }

    impl CaptureHandle for V4l2Handle {
        fn read_frame(&mut self) -> Result<Frame, SourceError> {
            let (buf, meta) = self
                .stream
                .next()
                .map_err(|e| SourceError::read(self.name.clone(), e))?;
            let used = (meta.bytesused as usize).min(buf.len());
            if used == 0 {
                return Err(SourceError::read(self.name.clone(), "empty buffer"));
            }
            let frame = buffer_to_frame(self.format, &buf[..used], self.width, self.height)
                .map_err(|e| SourceError::read(self.name.clone(), e))?;
            self.sequence += 1;
            Ok(frame.with_sequence(self.sequence))
        }
    }
}

impl CaptureDevice for V4l2Device {
    fn describe(&self) -> String {
        self.path.display().to_string()
    }

    #[cfg(feature = "v4l2")]
    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, SourceError> {
        Ok(Box::new(imp::open(self)?))
    }

    #[cfg(not(feature = "v4l2"))]
    fn open(&mut self) -> Result<Box<dyn CaptureHandle>, SourceError> {
        let _ = (self.width, self.height, self.read_timeout);
        Err(SourceError::connect(
            self.describe(),
            "built without V4L2 support (enable the `v4l2` feature)",
        ))
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_fourcc_mapping() {
        assert_eq!(WireFormat::from_fourcc(b"MJPG"), Some(WireFormat::Mjpeg));
        assert_eq!(WireFormat::from_fourcc(b"YUYV"), Some(WireFormat::Yuyv));
        assert_eq!(WireFormat::from_fourcc(b"NV12"), None);
    }

    #[test]
    fn test_yuyv_gray_and_white() {
        // two pixels: black-ish (Y=16) and white (Y=235), neutral chroma
        let rgb = yuyv_to_rgb(&[16, 128, 235, 128], 2, 1).unwrap();
        assert_eq!(&rgb[..3], &[0, 0, 0]);
        assert!(rgb[3..].iter().all(|c| *c >= 254));
    }

    #[test]
    fn test_yuyv_rejects_short_buffer() {
        assert!(yuyv_to_rgb(&[0; 6], 2, 2).is_none());
        assert!(buffer_to_frame(WireFormat::Yuyv, &[0; 6], 2, 2).is_err());
    }

    #[test]
    fn test_rgb_buffer_with_padding() {
        let mut buf = vec![7u8; 2 * 2 * 3];
        buf.extend_from_slice(&[0, 0, 0, 0]);
        let frame = buffer_to_frame(WireFormat::Rgb24, &buf, 2, 2).unwrap();
        assert_eq!(frame.pixel(1, 1), Some([7, 7, 7]));
    }
}
