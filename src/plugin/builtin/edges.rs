//! Sobel edge detector

use crate::plugin::{Plugin, PluginManifest, PluginOutput};
use crate::video::Frame;

use super::luma_plane;

const DEFAULT_THRESHOLD: u32 = 96;
const EDGE_COLOR: [u8; 3] = [0, 255, 0];

/// Highlights edges whose gradient magnitude exceeds `threshold`
///
/// Settings: `threshold` (0-1020, default 96) and `overlay` (draw on top of
/// the source instead of on black, default true).
pub struct EdgesPlugin {
    threshold: u32,
    overlay: bool,
}

impl EdgesPlugin {
    pub fn new(threshold: u32, overlay: bool) -> Self {
        Self { threshold, overlay }
    }
}

pub(super) fn create(manifest: &PluginManifest) -> anyhow::Result<Box<dyn Plugin>> {
    let threshold = manifest.setting("threshold").unwrap_or(DEFAULT_THRESHOLD);
    anyhow::ensure!(threshold <= 1020, "threshold {} out of range", threshold);
    let overlay = manifest.setting("overlay").unwrap_or(true);
    Ok(Box::new(EdgesPlugin::new(threshold, overlay)))
}

impl Plugin for EdgesPlugin {
    fn process(&mut self, frame: &Frame) -> anyhow::Result<PluginOutput> {
        let (w, h) = (frame.width() as usize, frame.height() as usize);
        let gray = luma_plane(frame.data());
        let mut raster = frame.to_raster();
        if !self.overlay {
            raster.data_mut().fill(0);
        }

        let mut edge_pixels = 0usize;
        for y in 1..h.saturating_sub(1) {
            for x in 1..w.saturating_sub(1) {
                let p = |dx: isize, dy: isize| {
                    gray[(y as isize + dy) as usize * w + (x as isize + dx) as usize] as i32
                };
                let gx = p(1, -1) + 2 * p(1, 0) + p(1, 1) - p(-1, -1) - 2 * p(-1, 0) - p(-1, 1);
                let gy = p(-1, 1) + 2 * p(0, 1) + p(1, 1) - p(-1, -1) - 2 * p(0, -1) - p(1, -1);
                if gx.unsigned_abs() + gy.unsigned_abs() > self.threshold {
                    raster.put(x as i32, y as i32, EDGE_COLOR);
                    edge_pixels += 1;
                }
            }
        }

        let out = raster.into_frame().with_sequence(frame.sequence);
        let mut output = PluginOutput::new(out);
        if frame.sequence % 100 == 1 {
            let pct = 100.0 * edge_pixels as f32 / (w * h) as f32;
            output = output.with_log(format!("Edge density {:.1}%", pct));
        }
        Ok(output)
    }
}
