//! In-memory event log exposed through `/api/logs`
//!
//! A bounded ring of structured entries. Pipeline, registry and plugin
//! events land here so the web UI can poll them; every entry is mirrored to
//! `tracing` as well.

use std::collections::VecDeque;
use std::fmt;

use chrono::Local;
use parking_lot::RwLock;
use serde::{Deserialize, Serialize};

/// Maximum number of entries kept in memory
pub const LOG_CAPACITY: usize = 1000;

/// Default number of entries returned by `/api/logs`
pub const DEFAULT_RECENT_LIMIT: usize = 100;

/// Timestamp layout used for entries
const TIMESTAMP_FORMAT: &str = "%Y-%m-%d %H:%M:%S";

/// Entry severity / classification
///
/// `Ai` marks lines produced by an inference plugin, as opposed to
/// pipeline-level events.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "UPPERCASE")]
pub enum LogLevel {
    Info,
    Success,
    Warning,
    Error,
    Ai,
}

impl fmt::Display for LogLevel {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            LogLevel::Info => write!(f, "INFO"),
            LogLevel::Success => write!(f, "SUCCESS"),
            LogLevel::Warning => write!(f, "WARNING"),
            LogLevel::Error => write!(f, "ERROR"),
            LogLevel::Ai => write!(f, "AI"),
        }
    }
}

/// A single log record
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
pub struct LogEntry {
    pub timestamp: String,
    pub source: String,
    pub level: LogLevel,
    pub message: String,
}

/// Bounded, append-only log store
pub struct LogSink {
    entries: RwLock<VecDeque<LogEntry>>,
    capacity: usize,
}

impl LogSink {
    pub fn new() -> Self {
        Self::with_capacity(LOG_CAPACITY)
    }

    pub fn with_capacity(capacity: usize) -> Self {
        let capacity = capacity.max(1);
        Self {
            entries: RwLock::new(VecDeque::with_capacity(capacity.min(LOG_CAPACITY))),
            capacity,
        }
    }

    /// Append an entry, evicting the oldest once the capacity is reached
    pub fn append(&self, source: &str, message: impl Into<String>, level: LogLevel) -> LogEntry {
        let entry = LogEntry {
            timestamp: Local::now().format(TIMESTAMP_FORMAT).to_string(),
            source: source.to_string(),
            level,
            message: message.into(),
        };

        match level {
            LogLevel::Error => tracing::error!(source = %entry.source, "{}", entry.message),
            LogLevel::Warning => tracing::warn!(source = %entry.source, "{}", entry.message),
            LogLevel::Ai => tracing::debug!(source = %entry.source, "{}", entry.message),
            LogLevel::Info | LogLevel::Success => {
                tracing::info!(source = %entry.source, "{}", entry.message)
            }
        }

        let mut entries = self.entries.write();
        while entries.len() >= self.capacity {
            entries.pop_front();
        }
        entries.push_back(entry.clone());
        entry
    }

    pub fn info(&self, source: &str, message: impl Into<String>) {
        self.append(source, message, LogLevel::Info);
    }

    pub fn success(&self, source: &str, message: impl Into<String>) {
        self.append(source, message, LogLevel::Success);
    }

    pub fn warning(&self, source: &str, message: impl Into<String>) {
        self.append(source, message, LogLevel::Warning);
    }

    pub fn error(&self, source: &str, message: impl Into<String>) {
        self.append(source, message, LogLevel::Error);
    }

    /// Most recent `limit` entries, oldest first / newest last
    pub fn recent(&self, limit: usize) -> Vec<LogEntry> {
        let entries = self.entries.read();
        let start = entries.len().saturating_sub(limit);
        entries.range(start..).cloned().collect()
    }

    pub fn len(&self) -> usize {
        self.entries.read().len()
    }

    pub fn is_empty(&self) -> bool {
        self.entries.read().is_empty()
    }

    pub fn clear(&self) {
        self.entries.write().clear();
    }
}

impl Default for LogSink {
    fn default() -> Self {
        Self::new()
    }
}
