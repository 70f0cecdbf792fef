// src/audit.rs

use chrono::{DateTime, Utc};
use std::sync::{Arc, Mutex};
use tracing::info;

/// Outcome of one proxied call attempt.
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum CallOutcome {
    Success,
    Error,
}

/// One observability record per call attempt. Carries the truncated token
/// suffix only; the full credential never reaches the sink.
#[derive(Debug, Clone)]
pub struct CallRecord {
    pub context: String,
    pub token_suffix: String,
    pub endpoint: String,
    pub outcome: CallOutcome,
    pub detail: Option<String>,
    pub at: DateTime<Utc>,
}

/// Sink for per-attempt call records. Used to diagnose which token/server
/// combination is failing.
pub trait AuditSink: Send + Sync {
    fn record(&self, record: CallRecord);
}

/// Default sink: structured log lines via `tracing`.
#[derive(Debug, Default)]
pub struct TracingAuditSink;

impl AuditSink for TracingAuditSink {
    fn record(&self, record: CallRecord) {
        info!(
            call.context = %record.context,
            token.preview = %record.token_suffix,
            endpoint = %record.endpoint,
            outcome = ?record.outcome,
            detail = record.detail.as_deref().unwrap_or(""),
            "Proxied call attempt"
        );
    }
}

/// Sink that keeps every record in memory. Test fixture.
#[derive(Debug, Default, Clone)]
pub struct RecordingAuditSink {
    records: Arc<Mutex<Vec<CallRecord>>>,
}

impl RecordingAuditSink {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn records(&self) -> Vec<CallRecord> {
        self.records.lock().expect("audit records lock poisoned").clone()
    }
}

impl AuditSink for RecordingAuditSink {
    fn record(&self, record: CallRecord) {
        self.records
            .lock()
            .expect("audit records lock poisoned")
            .push(record);
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn recording_sink_keeps_records_in_order() {
        let sink = RecordingAuditSink::new();
        for (i, outcome) in [CallOutcome::Success, CallOutcome::Error].iter().enumerate() {
            sink.record(CallRecord {
                context: format!("CALL {i}"),
                token_suffix: "...abcdef".to_string(),
                endpoint: "https://example.com/generate".to_string(),
                outcome: *outcome,
                detail: None,
                at: Utc::now(),
            });
        }
        let records = sink.records();
        assert_eq!(records.len(), 2);
        assert_eq!(records[0].context, "CALL 0");
        assert_eq!(records[1].outcome, CallOutcome::Error);
    }
}
