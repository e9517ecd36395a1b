use std::sync::Arc;

use crate::config::ConfigStore;
use crate::logs::LogSink;
use crate::pipeline::{LatestFrameSlot, PipelineCounters};
use crate::plugin::PluginRegistry;
use crate::stream::MjpegBroadcaster;
use crate::video::{SourceCounters, SourceState};

/// Application-wide state shared across handlers
///
/// The producer thread owns the source manager itself; handlers only see
/// the slot, the registry, the log sink, a read-only source-state watch
/// (through the broadcaster) and the counters.
pub struct AppState {
    /// Configuration store
    pub config: ConfigStore,
    /// Event log exposed by `/api/logs`
    pub logs: Arc<LogSink>,
    /// Plugin discovery and hot-swap
    pub registry: Arc<PluginRegistry>,
    /// Latest published frame
    pub slot: Arc<LatestFrameSlot>,
    /// MJPEG fan-out
    pub broadcaster: Arc<MjpegBroadcaster>,
    /// Source manager counters
    pub source_counters: Arc<SourceCounters>,
    /// Producer counters
    pub pipeline_counters: Arc<PipelineCounters>,
    /// Human-readable description of the video source
    pub source_name: String,
}

impl AppState {
    /// Create new application state
    #[allow(clippy::too_many_arguments)]
    pub fn new(
        config: ConfigStore,
        logs: Arc<LogSink>,
        registry: Arc<PluginRegistry>,
        slot: Arc<LatestFrameSlot>,
        broadcaster: Arc<MjpegBroadcaster>,
        source_counters: Arc<SourceCounters>,
        pipeline_counters: Arc<PipelineCounters>,
        source_name: String,
    ) -> Arc<Self> {
        Arc::new(Self {
            config,
            logs,
            registry,
            slot,
            broadcaster,
            source_counters,
            pipeline_counters,
            source_name,
        })
    }

    pub fn source_state(&self) -> SourceState {
        self.broadcaster.source_state()
    }
}
