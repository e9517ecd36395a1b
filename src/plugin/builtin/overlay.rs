use chrono::Local;

use crate::plugin::{Plugin, PluginManifest, PluginOutput};
use crate::video::draw::draw_label;
use crate::video::Frame;

/// Stamps a frame counter, wall clock and optional label in the top-left corner
pub struct OverlayPlugin {
    label: Option<String>,
    scale: u32,
    frames: u64,
    /// Emit a progress log line every N frames (0 disables)
    log_every: u64,
}

impl OverlayPlugin {
    pub fn new(label: Option<String>, scale: u32, log_every: u64) -> Self {
        Self {
            label,
            scale: scale.max(1),
            frames: 0,
            log_every,
        }
    }
}

pub(super) fn create(manifest: &PluginManifest) -> anyhow::Result<Box<dyn Plugin>> {
    Ok(Box::new(OverlayPlugin::new(
        manifest.setting("label"),
        manifest.setting("scale").unwrap_or(2),
        manifest.setting("log_every").unwrap_or(0),
    )))
}

impl Plugin for OverlayPlugin {
    fn process(&mut self, frame: &Frame) -> anyhow::Result<PluginOutput> {
        self.frames += 1;
        let mut text = format!(
            "#{} {}",
            self.frames,
            Local::now().format("%H:%M:%S")
        );
        if let Some(label) = &self.label {
            text = format!("{} {}", label, text);
        }

        let mut raster = frame.to_raster();
        draw_label(
            &mut raster,
            4,
            4,
            &text,
            self.scale,
            [255, 255, 255],
            [0, 0, 0],
        );

        let mut output = PluginOutput::new(raster.into_frame().with_sequence(frame.sequence));
        if self.log_every > 0 && self.frames % self.log_every == 0 {
            output = output.with_log(format!("Overlay processed {} frames", self.frames));
        }
        Ok(output)
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_overlay_marks_corner_only() {
        let mut plugin = OverlayPlugin::new(Some("CAM".to_string()), 1, 0);
        let frame = Frame::solid(200, 50, [0, 0, 200]).unwrap();
        let out = plugin.process(&frame).unwrap();

        assert_eq!(out.frame.pixel(4, 4), Some([0, 0, 0]));
        assert_eq!(out.frame.pixel(199, 49), Some([0, 0, 200]));
        assert!(out.logs.is_empty());
    }

    #[test]
    fn test_progress_log_interval() {
        let mut plugin = OverlayPlugin::new(None, 1, 2);
        let frame = Frame::solid(64, 32, [0, 0, 0]).unwrap();
        let logs: Vec<usize> = (0..4)
            .map(|_| plugin.process(&frame).unwrap().logs.len())
            .collect();
        assert_eq!(logs, vec![0, 1, 0, 1]);
    }
}
