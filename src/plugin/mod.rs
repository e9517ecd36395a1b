//! Inference plugins
//!
//! A plugin turns one frame into an annotated frame plus a list of log
//! lines. Plugins are compiled in and looked up by the `entry` field of a
//! `model.json` manifest; the registry keeps at most one of them active and
//! swaps it atomically.

pub mod builtin;
pub mod manifest;
pub mod registry;

use thiserror::Error;

use crate::video::Frame;

pub use manifest::{ManifestError, PluginInfo, PluginManifest};
pub use registry::{ActivePlugin, PluginFactory, PluginRegistry};

/// Result of processing one frame
#[derive(Debug, Clone)]
pub struct PluginOutput {
    pub frame: Frame,
    /// Human-readable lines forwarded to the log sink
    pub logs: Vec<String>,
}

impl PluginOutput {
    pub fn new(frame: Frame) -> Self {
        Self {
            frame,
            logs: Vec::new(),
        }
    }

    pub fn with_log(mut self, line: impl Into<String>) -> Self {
        self.logs.push(line.into());
        self
    }
}

/// Per-frame inference unit
///
/// `process` runs on the pipeline thread. It may fail or even panic; the
/// pipeline contains both and publishes the unmodified frame instead.
pub trait Plugin: Send {
    /// Process one frame
    fn process(&mut self, frame: &Frame) -> anyhow::Result<PluginOutput>;

    /// Whether this unit actually transforms frames
    ///
    /// A plugin that returns `false` is kept active but the pipeline passes
    /// frames through untouched.
    fn processes_frames(&self) -> bool {
        true
    }

    /// Optional warm-up hook, run once before the plugin becomes active
    fn warm_up(&mut self) -> anyhow::Result<()> {
        Ok(())
    }
}

#[derive(Debug, Error, Clone, PartialEq, Eq)]
pub enum PluginError {
    /// No plugin directory or manifest for this identifier
    #[error("plugin '{0}' not found")]
    NotFound(String),

    /// The plugin exists but could not be constructed
    #[error("failed to load plugin '{id}': {reason}")]
    LoadError { id: String, reason: String },

    /// `process` failed or panicked
    #[error("plugin '{plugin}' failed: {reason}")]
    Runtime { plugin: String, reason: String },
}

impl PluginError {
    pub fn load(id: impl Into<String>, reason: impl std::fmt::Display) -> Self {
        PluginError::LoadError {
            id: id.into(),
            reason: reason.to_string(),
        }
    }
}
