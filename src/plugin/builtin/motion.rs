//! Frame-differencing motion detector

use crate::plugin::{Plugin, PluginManifest, PluginOutput};
use crate::video::draw::{draw_label, draw_rect};
use crate::video::Frame;

use super::luma_plane;

const DEFAULT_THRESHOLD: u8 = 25;
const DEFAULT_MIN_AREA: f32 = 0.005;
const BOX_COLOR: [u8; 3] = [255, 40, 40];

/// Compares each frame with the previous one and boxes the changed region
///
/// Logs one line when motion starts and one when it stops.
pub struct MotionPlugin {
    threshold: u8,
    min_area: f32,
    previous: Option<(u32, u32, Vec<u8>)>,
    in_motion: bool,
}

impl MotionPlugin {
    pub fn new(threshold: u8, min_area: f32) -> Self {
        Self {
            threshold,
            min_area,
            previous: None,
            in_motion: false,
        }
    }
}

pub(super) fn create(manifest: &PluginManifest) -> anyhow::Result<Box<dyn Plugin>> {
    let threshold = manifest.setting("threshold").unwrap_or(DEFAULT_THRESHOLD);
    let min_area = manifest.setting("min_area").unwrap_or(DEFAULT_MIN_AREA);
    anyhow::ensure!(
        (0.0..=1.0).contains(&min_area),
        "min_area must be a fraction, got {}",
        min_area
    );
    Ok(Box::new(MotionPlugin::new(threshold, min_area)))
}

struct Region {
    left: u32,
    top: u32,
    right: u32,
    bottom: u32,
    changed: usize,
}

fn changed_region(prev: &[u8], cur: &[u8], width: u32, threshold: u8) -> Option<Region> {
    let mut region: Option<Region> = None;
    for (i, (a, b)) in prev.iter().zip(cur).enumerate() {
        if a.abs_diff(*b) <= threshold {
            continue;
        }
        let x = i as u32 % width;
        let y = i as u32 / width;
        match region.as_mut() {
            Some(r) => {
                r.left = r.left.min(x);
                r.right = r.right.max(x);
                r.top = r.top.min(y);
                r.bottom = r.bottom.max(y);
                r.changed += 1;
            }
            None => {
                region = Some(Region {
                    left: x,
                    top: y,
                    right: x,
                    bottom: y,
                    changed: 1,
                })
            }
        }
    }
    region
}

impl Plugin for MotionPlugin {
    fn process(&mut self, frame: &Frame) -> anyhow::Result<PluginOutput> {
        let (w, h) = (frame.width(), frame.height());
        let gray = luma_plane(frame.data());

        let region = match self.previous.as_ref() {
            Some((pw, ph, prev)) if *pw == w && *ph == h => {
                changed_region(prev, &gray, w, self.threshold)
            }
            _ => None,
        };
        self.previous = Some((w, h, gray));

        let total = (w as usize * h as usize) as f32;
        let region = region.filter(|r| r.changed as f32 / total >= self.min_area);

        let output = match region {
            Some(r) => {
                let pct = 100.0 * r.changed as f32 / total;
                let mut raster = frame.to_raster();
                draw_rect(
                    &mut raster,
                    r.left as i32,
                    r.top as i32,
                    r.right as i32,
                    r.bottom as i32,
                    2,
                    BOX_COLOR,
                );
                let label = format!("MOTION {:.0}%", pct);
                draw_label(
                    &mut raster,
                    r.left as i32,
                    r.top as i32 - 12,
                    &label,
                    1,
                    [255, 255, 255],
                    BOX_COLOR,
                );
                let mut out = PluginOutput::new(raster.into_frame().with_sequence(frame.sequence));
                if !self.in_motion {
                    out = out.with_log(format!(
                        "Motion detected: {:.1}% of frame at ({}, {})-({}, {})",
                        pct, r.left, r.top, r.right, r.bottom
                    ));
                }
                self.in_motion = true;
                out
            }
            None => {
                let mut out = PluginOutput::new(frame.clone());
                if self.in_motion {
                    out = out.with_log("Motion ended");
                }
                self.in_motion = false;
                out
            }
        };
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::draw::fill_rect;
    use crate::video::Raster;

    fn frame_with_square(offset: i32) -> Frame {
        let mut raster = Raster::solid(40, 30, [0, 0, 0]).unwrap();
        fill_rect(&mut raster, offset, 10, offset + 5, 15, [255, 255, 255]);
        raster.into_frame()
    }

    #[test]
    fn test_first_frame_is_passthrough() {
        let mut plugin = MotionPlugin::new(DEFAULT_THRESHOLD, DEFAULT_MIN_AREA);
        let frame = frame_with_square(0);
        let out = plugin.process(&frame).unwrap();
        assert_eq!(out.frame.data(), frame.data());
        assert!(out.logs.is_empty());
    }

    #[test]
    fn test_motion_start_and_end_logged_once() {
        let mut plugin = MotionPlugin::new(DEFAULT_THRESHOLD, DEFAULT_MIN_AREA);
        plugin.process(&frame_with_square(0)).unwrap();

        let moved = plugin.process(&frame_with_square(20)).unwrap();
        assert_eq!(moved.logs.len(), 1);
        assert!(moved.logs[0].starts_with("Motion detected"));
        assert_ne!(moved.frame.data(), frame_with_square(20).data());

        let moved_again = plugin.process(&frame_with_square(30)).unwrap();
        assert!(moved_again.logs.is_empty());

        let still = plugin.process(&frame_with_square(30)).unwrap();
        assert_eq!(still.logs, vec!["Motion ended".to_string()]);
    }

    #[test]
    fn test_geometry_change_resets_reference() {
        let mut plugin = MotionPlugin::new(DEFAULT_THRESHOLD, DEFAULT_MIN_AREA);
        plugin.process(&Frame::solid(8, 8, [0, 0, 0]).unwrap()).unwrap();
        let out = plugin
            .process(&Frame::solid(16, 8, [255, 255, 255]).unwrap())
            .unwrap();
        assert!(out.logs.is_empty());
    }
}
