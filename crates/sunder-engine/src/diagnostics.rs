//! # Diagnostics Sink
//!
//! Append-only observer of per-worker actions. The engine only ever
//! writes to it; nothing is read back, and a sink must never block or
//! fail the core. The default sink forwards to `tracing`; tests use
//! [`MemorySink`] to assert on the action stream.

use std::sync::Arc;

use serde::Serialize;

use sunder_core::block::BlockId;

/// Everything a worker can be observed doing.
#[derive(Debug, Clone, Copy, Serialize, PartialEq, Eq)]
#[serde(rename_all = "snake_case")]
pub enum Action {
    /// A message was deposited into a worker's mailbox.
    Receive,
    /// A worker took a message out of its mailbox.
    Take,
    /// A summary was sent forward along an edge.
    Forward,
    /// A violation condition was sent backward along an edge.
    Backward,
    /// A worker reached a terminal phase.
    Finish,
    /// Final statistics emitted by a finishing worker.
    Dump,
    /// A broadcast round completed.
    Broadcast,
    /// A message brought no new information and was dropped.
    AlreadyEnqueued,
}

/// One appended record.
#[derive(Debug, Clone, Serialize)]
pub struct ActionRecord {
    pub worker: BlockId,
    pub action: Action,
    /// One-line rendering of the triggering message.
    pub message: String,
    /// RFC 3339 wall-clock timestamp.
    pub timestamp: String,
}

impl ActionRecord {
    pub fn new(worker: impl Into<BlockId>, action: Action, message: impl Into<String>) -> Self {
        Self {
            worker: worker.into(),
            action,
            message: message.into(),
            timestamp: chrono::Utc::now().to_rfc3339(),
        }
    }
}

/// Fire-and-forget action log. Implementations must return promptly and
/// swallow their own failures.
pub trait DiagnosticsSink: Send + Sync {
    fn log(&self, record: ActionRecord);
}

/// Default sink: one `tracing` event per record.
pub struct TracingSink;

impl DiagnosticsSink for TracingSink {
    fn log(&self, record: ActionRecord) {
        tracing::debug!(
            worker = %record.worker,
            action = ?record.action,
            message = %record.message,
            "worker action"
        );
    }
}

/// Discards everything.
pub struct NullSink;

impl DiagnosticsSink for NullSink {
    fn log(&self, _record: ActionRecord) {}
}

/// In-memory sink for tests.
#[derive(Default)]
pub struct MemorySink {
    records: std::sync::Mutex<Vec<ActionRecord>>,
}

impl MemorySink {
    pub fn new() -> Arc<Self> {
        Arc::new(Self::default())
    }

    pub fn records(&self) -> Vec<ActionRecord> {
        match self.records.lock() {
            Ok(guard) => guard.clone(),
            Err(poisoned) => poisoned.into_inner().clone(),
        }
    }

    pub fn count(&self, action: Action) -> usize {
        self.records().iter().filter(|r| r.action == action).count()
    }
}

impl DiagnosticsSink for MemorySink {
    fn log(&self, record: ActionRecord) {
        if let Ok(mut guard) = self.records.lock() {
            guard.push(record);
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_memory_sink_appends_in_order() {
        let sink = MemorySink::new();
        sink.log(ActionRecord::new("B1", Action::Receive, "first"));
        sink.log(ActionRecord::new("B1", Action::Take, "second"));
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].action, Action::Receive);
        assert_eq!(records[1].action, Action::Take);
    }

    #[test]
    fn test_record_has_rfc3339_timestamp() {
        let r = ActionRecord::new("B2", Action::Broadcast, "x");
        assert!(chrono::DateTime::parse_from_rfc3339(&r.timestamp).is_ok());
    }
}
