//! "Waiting for video" placeholder image
//!
//! Shown to viewers while the slot has never been populated. The image
//! carries the configured message, the source state, how long we have been
//! waiting and a small moving marker so viewers can see the stream is alive.

use std::time::Duration;

use crate::video::draw::{draw_rect, draw_text, fill_rect, text_height, text_width};
use crate::video::{Frame, FrameError, Raster, SourceState};

pub const DEFAULT_PLACEHOLDER_TEXT: &str = "WAITING FOR VIDEO FEED...";

const BACKGROUND: [u8; 3] = [24, 24, 32];
const FOREGROUND: [u8; 3] = [230, 230, 230];
const DIM: [u8; 3] = [140, 140, 150];
const ACCENT: [u8; 3] = [80, 160, 255];

/// Number of marker positions along the progress bar
const MARKER_STEPS: u64 = 30;

#[derive(Debug, Clone)]
pub struct PlaceholderRenderer {
    width: u32,
    height: u32,
    message: String,
}

impl PlaceholderRenderer {
    pub fn new(width: u32, height: u32, message: impl Into<String>) -> Self {
        Self {
            width,
            height,
            message: message.into(),
        }
    }

    /// Status line under the message
    pub fn status_line(state: SourceState, waiting: Duration) -> String {
        format!(
            "SOURCE {} - {}S",
            state.to_string().to_uppercase(),
            waiting.as_secs()
        )
    }

    /// Draw the placeholder; `phase` moves the activity marker
    pub fn render(
        &self,
        state: SourceState,
        waiting: Duration,
        phase: u64,
    ) -> Result<Frame, FrameError> {
        let mut image = Raster::solid(self.width, self.height, BACKGROUND)?;
        let (w, h) = (self.width as i32, self.height as i32);

        let msg_scale = fit_scale(&self.message, w * 4 / 5, h / 6);
        let msg_w = text_width(&self.message, msg_scale);
        let msg_h = text_height(msg_scale);
        let msg_y = h / 2 - msg_h;
        draw_text(
            &mut image,
            (w - msg_w) / 2,
            msg_y,
            &self.message,
            msg_scale,
            FOREGROUND,
        );

        let status = Self::status_line(state, waiting);
        let status_scale = (msg_scale / 2).max(1);
        let status_y = msg_y + msg_h + text_height(status_scale);
        draw_text(
            &mut image,
            (w - text_width(&status, status_scale)) / 2,
            status_y,
            &status,
            status_scale,
            DIM,
        );

        let bar_w = (w * 2 / 5).max(MARKER_STEPS as i32);
        let bar_h = (h / 60).max(3);
        let bar_x = (w - bar_w) / 2;
        let bar_y = status_y + text_height(status_scale) * 2;
        draw_rect(&mut image, bar_x, bar_y, bar_x + bar_w - 1, bar_y + bar_h - 1, 1, DIM);
        let step_w = bar_w / MARKER_STEPS as i32;
        let marker_x = bar_x + (phase % MARKER_STEPS) as i32 * step_w;
        fill_rect(
            &mut image,
            marker_x,
            bar_y,
            marker_x + step_w - 1,
            bar_y + bar_h - 1,
            ACCENT,
        );

        Ok(image.into_frame())
    }
}

/// Largest integer scale at which `text` fits into `max_w` x `max_h`
fn fit_scale(text: &str, max_w: i32, max_h: i32) -> u32 {
    let unit_w = text_width(text, 1).max(1);
    let unit_h = text_height(1);
    let scale = (max_w / unit_w).min(max_h / unit_h);
    scale.max(1) as u32
}
