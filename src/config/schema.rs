use std::time::Duration;

use serde::{Deserialize, Serialize};

use crate::stream::{BroadcasterConfig, DEFAULT_PLACEHOLDER_TEXT};

/// Main application configuration
#[derive(Debug, Clone, Default, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct AppConfig {
    /// Video source settings
    pub source: SourceConfig,
    /// Producer loop settings
    pub pipeline: PipelineConfig,
    /// MJPEG output settings
    pub stream: StreamConfig,
    /// Plugin discovery settings
    pub plugins: PluginsConfig,
    /// Web server settings
    pub web: WebConfig,
}

/// Where frames come from
#[derive(Debug, Clone, Copy, Default, Serialize, Deserialize, PartialEq, Eq)]
#[serde(rename_all = "lowercase")]
pub enum SourceMode {
    /// Local V4L2 device
    Local,
    /// Remote MJPEG endpoint over HTTP
    #[default]
    Remote,
}

/// Video source configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct SourceConfig {
    pub mode: SourceMode,
    /// Video device path (e.g., /dev/video0)
    pub device: String,
    /// Requested capture resolution (local mode)
    pub width: u32,
    pub height: u32,
    /// MJPEG stream URL (remote mode)
    pub remote_url: String,
    pub connect_timeout_ms: u64,
    pub read_timeout_ms: u64,
    /// First reconnect delay, doubled on every failure
    pub backoff_base_ms: u64,
    /// Reconnect delay ceiling
    pub backoff_max_ms: u64,
    /// Pause after a mid-stream read failure
    pub read_failure_pause_ms: u64,
}

impl Default for SourceConfig {
    fn default() -> Self {
        Self {
            mode: SourceMode::Remote,
            device: "/dev/video0".to_string(),
            width: 1280,
            height: 720,
            remote_url: "http://127.0.0.1:8000/video_feed".to_string(),
            connect_timeout_ms: 5000,
            read_timeout_ms: 5000,
            backoff_base_ms: 2000,
            backoff_max_ms: 30_000,
            read_failure_pause_ms: 500,
        }
    }
}

impl SourceConfig {
    pub fn connect_timeout(&self) -> Duration {
        Duration::from_millis(self.connect_timeout_ms)
    }

    pub fn read_timeout(&self) -> Duration {
        Duration::from_millis(self.read_timeout_ms)
    }

    pub fn backoff_base(&self) -> Duration {
        Duration::from_millis(self.backoff_base_ms)
    }

    pub fn backoff_max(&self) -> Duration {
        Duration::from_millis(self.backoff_max_ms)
    }

    pub fn read_failure_pause(&self) -> Duration {
        Duration::from_millis(self.read_failure_pause_ms)
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PipelineConfig {
    /// Pause after each published frame
    pub yield_ms: u64,
}

impl Default for PipelineConfig {
    fn default() -> Self {
        Self { yield_ms: 10 }
    }
}

impl PipelineConfig {
    pub fn yield_pause(&self) -> Duration {
        Duration::from_millis(self.yield_ms)
    }
}

/// MJPEG output configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct StreamConfig {
    /// Chunks per second sent to each client
    pub fps: u32,
    /// JPEG quality (1-100)
    pub jpeg_quality: u8,
    pub placeholder_width: u32,
    pub placeholder_height: u32,
    pub placeholder_text: String,
}

impl Default for StreamConfig {
    fn default() -> Self {
        Self {
            fps: 30,
            jpeg_quality: 80,
            placeholder_width: 1280,
            placeholder_height: 720,
            placeholder_text: DEFAULT_PLACEHOLDER_TEXT.to_string(),
        }
    }
}

impl StreamConfig {
    pub fn broadcaster_config(&self) -> BroadcasterConfig {
        BroadcasterConfig {
            fps: self.fps,
            jpeg_quality: self.jpeg_quality,
            placeholder_width: self.placeholder_width,
            placeholder_height: self.placeholder_height,
            placeholder_text: self.placeholder_text.clone(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct PluginsConfig {
    /// Directory holding one sub-directory per plugin
    pub dir: String,
    /// Plugin loaded at startup
    pub startup: Option<String>,
}

impl Default for PluginsConfig {
    fn default() -> Self {
        Self {
            dir: "plugins".to_string(),
            startup: None,
        }
    }
}

/// Web server configuration
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq)]
#[serde(default)]
pub struct WebConfig {
    pub bind_address: String,
    pub port: u16,
    /// Directory served under `/static` (and `/` when it has an index.html)
    pub static_dir: String,
}

impl Default for WebConfig {
    fn default() -> Self {
        Self {
            bind_address: "0.0.0.0".to_string(),
            port: 5000,
            static_dir: "static".to_string(),
        }
    }
}
