use std::sync::Arc;

use serde::{Deserialize, Serialize};
use tokio::sync::mpsc;
use tracing::debug;

/// One row per externally-observable request outcome. Emitted at most once
/// per request id; the row describes the attempt whose bytes the client saw.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct UsageRecord {
    pub request_id: String,
    pub trace_id: String,
    pub api_key_name: String,
    pub provider: String,
    pub model: String,
    pub input_tokens: u64,
    pub output_tokens: u64,
    pub cost: f64,
    pub duration_ms: u64,
    pub status: u16,
    pub error_kind: Option<String>,
    pub started_at: i64,
    pub completed_at: i64,
}

/// Best-effort usage export. Must not block the request path.
pub trait UsageSink: Send + Sync {
    fn record(&self, record: UsageRecord);
}

pub type SharedUsageSink = Arc<dyn UsageSink>;

#[derive(Debug, Default)]
pub struct NoopUsageSink;

impl UsageSink for NoopUsageSink {
    fn record(&self, _record: UsageRecord) {}
}

/// Queue-backed sink: the request path enqueues, a drain task owned by the
/// caller consumes. A full/closed queue drops the record.
#[derive(Debug, Clone)]
pub struct ChannelUsageSink {
    tx: mpsc::UnboundedSender<UsageRecord>,
}

impl ChannelUsageSink {
    pub fn channel() -> (Self, mpsc::UnboundedReceiver<UsageRecord>) {
        let (tx, rx) = mpsc::unbounded_channel();
        (Self { tx }, rx)
    }
}

impl UsageSink for ChannelUsageSink {
    fn record(&self, record: UsageRecord) {
        if self.tx.send(record).is_err() {
            debug!("usage sink receiver dropped, record discarded");
        }
    }
}

/// Request-lifecycle event for the trace collaborator.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct TraceEvent {
    pub trace_id: String,
    pub request_id: String,
    pub phase: String,
    pub provider: Option<String>,
    pub model: Option<String>,
    pub detail: Option<String>,
    pub at_unix_ms: i64,
}

pub trait TraceSink: Send + Sync {
    fn record(&self, event: TraceEvent);
}

pub type SharedTraceSink = Arc<dyn TraceSink>;

#[derive(Debug, Default)]
pub struct NoopTraceSink;

impl TraceSink for NoopTraceSink {
    fn record(&self, _event: TraceEvent) {}
}

#[cfg(test)]
mod tests {
    use super::*;

    fn record(request_id: &str) -> UsageRecord {
        UsageRecord {
            request_id: request_id.to_string(),
            trace_id: "t".into(),
            api_key_name: "k".into(),
            provider: "p".into(),
            model: "m".into(),
            input_tokens: 1,
            output_tokens: 2,
            cost: 0.0,
            duration_ms: 3,
            status: 200,
            error_kind: None,
            started_at: 0,
            completed_at: 0,
        }
    }

    #[tokio::test]
    async fn channel_sink_delivers() {
        let (sink, mut rx) = ChannelUsageSink::channel();
        sink.record(record("r1"));
        let received = rx.recv().await.unwrap();
        assert_eq!(received.request_id, "r1");
    }

    #[test]
    fn channel_sink_survives_dropped_receiver() {
        let (sink, rx) = ChannelUsageSink::channel();
        drop(rx);
        sink.record(record("r2"));
    }
}
