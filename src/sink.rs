//! Operator-facing output sink
//!
//! Every component receives an `Arc<dyn OutputSink>` instead of opening its
//! own log handle. The binaries use [`TracingSink`]; tests use
//! [`MemorySink`] to assert on what was reported.

use serde::Serialize;
use std::sync::Mutex;

/// Severity of a sink record
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize)]
#[serde(rename_all = "lowercase")]
pub enum RecordLevel {
    Debug,
    Info,
    Warn,
    Error,
}

/// A single line of operator output
#[derive(Debug, Clone, Serialize)]
pub struct Record {
    /// Severity
    pub level: RecordLevel,
    /// Node the record concerns, if any
    pub node: Option<String>,
    /// Message text
    pub message: String,
}

impl Record {
    pub fn new(level: RecordLevel, node: Option<&str>, message: impl Into<String>) -> Self {
        Self {
            level,
            node: node.map(str::to_string),
            message: message.into(),
        }
    }
}

/// Destination for operator output
pub trait OutputSink: Send + Sync {
    /// Record one line
    fn record(&self, record: Record);

    fn info(&self, message: &str) {
        self.record(Record::new(RecordLevel::Info, None, message));
    }

    fn warn(&self, message: &str) {
        self.record(Record::new(RecordLevel::Warn, None, message));
    }

    fn node_info(&self, node: &str, message: &str) {
        self.record(Record::new(RecordLevel::Info, Some(node), message));
    }

    fn node_warn(&self, node: &str, message: &str) {
        self.record(Record::new(RecordLevel::Warn, Some(node), message));
    }

    fn node_error(&self, node: &str, message: &str) {
        self.record(Record::new(RecordLevel::Error, Some(node), message));
    }

    /// Multi-line remote output, recorded at debug level
    fn node_output(&self, node: &str, output: &str) {
        for line in output.lines().filter(|l| !l.trim().is_empty()) {
            self.record(Record::new(RecordLevel::Debug, Some(node), line));
        }
    }
}

/// Sink forwarding records to `tracing`
#[derive(Debug, Default, Clone, Copy)]
pub struct TracingSink;

impl OutputSink for TracingSink {
    fn record(&self, record: Record) {
        let node = record.node.as_deref().unwrap_or("-");
        match record.level {
            RecordLevel::Debug => tracing::debug!(node, "{}", record.message),
            RecordLevel::Info => tracing::info!(node, "{}", record.message),
            RecordLevel::Warn => tracing::warn!(node, "{}", record.message),
            RecordLevel::Error => tracing::error!(node, "{}", record.message),
        }
    }
}

/// Sink that keeps every record in memory
#[derive(Debug, Default)]
pub struct MemorySink {
    records: Mutex<Vec<Record>>,
}

impl MemorySink {
    pub fn new() -> Self {
        Self::default()
    }

    /// Snapshot of all records so far
    pub fn records(&self) -> Vec<Record> {
        self.records
            .lock()
            .map(|r| r.clone())
            .unwrap_or_default()
    }

    /// Records concerning one node
    pub fn for_node(&self, node: &str) -> Vec<Record> {
        self.records()
            .into_iter()
            .filter(|r| r.node.as_deref() == Some(node))
            .collect()
    }

    /// Whether any record message contains `needle`
    pub fn contains(&self, needle: &str) -> bool {
        self.records().iter().any(|r| r.message.contains(needle))
    }
}

impl OutputSink for MemorySink {
    fn record(&self, record: Record) {
        if let Ok(mut records) = self.records.lock() {
            records.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_filters_by_node() {
        let sink = MemorySink::new();
        sink.info("starting");
        sink.node_info("s1", "connected");
        sink.node_warn("a1", "slow");

        assert_eq!(sink.records().len(), 3);
        assert_eq!(sink.for_node("s1").len(), 1);
        assert!(sink.contains("slow"));
    }

    #[test]
    fn test_node_output_skips_blank_lines() {
        let sink = MemorySink::new();
        sink.node_output("s1", "line one\n\n  \nline two\n");

        let records = sink.for_node("s1");
        assert_eq!(records.len(), 2);
        assert!(records.iter().all(|r| r.level == RecordLevel::Debug));
    }
}
