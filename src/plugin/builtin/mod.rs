//! Built-in plugin implementations
//!
//! Manifests select one of these through their `entry` field.

mod edges;
mod grayscale;
mod motion;
mod overlay;

pub use edges::EdgesPlugin;
pub use grayscale::GrayscalePlugin;
pub use motion::MotionPlugin;
pub use overlay::OverlayPlugin;

use super::registry::PluginFactory;

/// Entry name to constructor
pub const FACTORIES: &[(&str, PluginFactory)] = &[
    ("edges", edges::create as PluginFactory),
    ("grayscale", grayscale::create as PluginFactory),
    ("motion", motion::create as PluginFactory),
    ("overlay", overlay::create as PluginFactory),
];

/// BT.601 luma of an RGB pixel
pub(crate) fn luma(px: &[u8]) -> u8 {
    ((77 * px[0] as u32 + 150 * px[1] as u32 + 29 * px[2] as u32) >> 8) as u8
}

/// Luma plane of a packed RGB buffer
pub(crate) fn luma_plane(rgb: &[u8]) -> Vec<u8> {
    rgb.chunks_exact(3).map(luma).collect()
}
