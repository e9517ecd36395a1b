use crate::plugin::{Plugin, PluginManifest, PluginOutput};
use crate::video::Frame;

use super::luma;

/// Desaturates the frame
pub struct GrayscalePlugin;

pub(super) fn create(_manifest: &PluginManifest) -> anyhow::Result<Box<dyn Plugin>> {
    Ok(Box::new(GrayscalePlugin))
}

impl Plugin for GrayscalePlugin {
    fn process(&mut self, frame: &Frame) -> anyhow::Result<PluginOutput> {
        let mut raster = frame.to_raster();
        for px in raster.data_mut().chunks_exact_mut(3) {
            let y = luma(px);
            px.fill(y);
        }
        let out = raster.into_frame().with_sequence(frame.sequence);
        Ok(PluginOutput::new(out))
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::video::Raster;

    #[test]
    fn test_pixels_become_gray() {
        let mut raster = Raster::solid(4, 4, [200, 10, 10]).unwrap();
        raster.put(3, 3, [255, 255, 255]);
        let input = raster.into_frame().with_sequence(9);

        let out = GrayscalePlugin.process(&input).unwrap();
        let [r, g, b] = out.frame.pixel(0, 0).unwrap();
        assert!(r == g && g == b);
        assert_eq!(out.frame.pixel(3, 3), Some([255, 255, 255]));
        assert_eq!(out.frame.sequence, 9);
        assert!(out.logs.is_empty());
    }
}
