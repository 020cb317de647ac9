//! Human-readable status lines for front ends
//!
//! The server reports connects, disconnects, received payloads and faults
//! through a [`LogSink`]. Sinks are a side channel only: nothing they do is
//! fed back into the network core.

use std::sync::Mutex;

use tracing::{error, info};

/// Which pane a line belongs to
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash)]
pub enum LogKind {
    /// Lifecycle: listening, connected, disconnected, stopped
    Status,
    /// Payloads that arrived from a peer
    Received,
    /// What was handed on to the host application
    Output,
    /// Recoverable faults
    Error,
}

pub trait LogSink: Send + Sync {
    fn log(&self, kind: LogKind, line: &str);
}

/// Forwards every line to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingLogSink;

impl LogSink for TracingLogSink {
    fn log(&self, kind: LogKind, line: &str) {
        match kind {
            LogKind::Error => error!(target: "scriptsocket::log", "{}", line),
            _ => info!(target: "scriptsocket::log", kind = ?kind, "{}", line),
        }
    }
}

/// Keeps lines in memory for a front end to render
#[derive(Debug, Default)]
pub struct MemoryLogSink {
    lines: Mutex<Vec<(LogKind, String)>>,
}

impl MemoryLogSink {
    pub fn new() -> Self {
        Self::default()
    }

    /// All lines in arrival order
    pub fn lines(&self) -> Vec<(LogKind, String)> {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clone()
    }

    /// Lines of one kind in arrival order
    pub fn lines_of(&self, kind: LogKind) -> Vec<String> {
        self.lines()
            .into_iter()
            .filter(|(k, _)| *k == kind)
            .map(|(_, line)| line)
            .collect()
    }

    pub fn clear(&self) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .clear();
    }
}

impl LogSink for MemoryLogSink {
    fn log(&self, kind: LogKind, line: &str) {
        self.lines
            .lock()
            .unwrap_or_else(|poisoned| poisoned.into_inner())
            .push((kind, line.to_string()));
    }
}
