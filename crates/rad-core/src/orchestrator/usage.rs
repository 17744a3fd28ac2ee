use std::time::Duration;

use rad_common::GatewayError;
use rad_provider_core::{SharedUsageSink, UsageRecord};
use rad_transform::{Metadata, Usage};

pub(crate) fn unix_ms() -> i64 {
    (time::OffsetDateTime::now_utc().unix_timestamp_nanos() / 1_000_000) as i64
}

/// Enforces the at-most-once usage invariant: whatever the retry count or
/// termination path, the first emit wins and later calls are ignored.
pub(crate) struct UsageRecorder {
    sink: SharedUsageSink,
    metadata: Metadata,
    started_at: i64,
    emitted: bool,
}

impl UsageRecorder {
    pub fn new(sink: SharedUsageSink, metadata: Metadata) -> Self {
        Self {
            sink,
            metadata,
            started_at: unix_ms(),
            emitted: false,
        }
    }

    pub fn emit_success(&mut self, provider: &str, model: &str, usage: Usage, elapsed: Duration) {
        self.emit(provider, model, usage, elapsed, 200, None);
    }

    pub fn emit_error(
        &mut self,
        provider: &str,
        model: &str,
        error: &GatewayError,
        elapsed: Duration,
    ) {
        self.emit(
            provider,
            model,
            Usage::default(),
            elapsed,
            error.http_status(),
            Some(error.kind.as_str()),
        );
    }

    pub fn emit_outcome(
        &mut self,
        provider: &str,
        model: &str,
        usage: Option<Usage>,
        elapsed: Duration,
        status: u16,
        error_kind: Option<&str>,
    ) {
        self.emit(
            provider,
            model,
            usage.unwrap_or_default(),
            elapsed,
            status,
            error_kind,
        );
    }

    fn emit(
        &mut self,
        provider: &str,
        model: &str,
        usage: Usage,
        elapsed: Duration,
        status: u16,
        error_kind: Option<&str>,
    ) {
        if self.emitted {
            return;
        }
        self.emitted = true;
        self.sink.record(UsageRecord {
            request_id: self.metadata.request_id.clone(),
            trace_id: self.metadata.trace_id.clone(),
            api_key_name: self.metadata.api_key_name.clone(),
            provider: provider.to_string(),
            model: model.to_string(),
            input_tokens: usage.prompt_tokens,
            output_tokens: usage.completion_tokens,
            cost: usage.cost_total,
            duration_ms: elapsed.as_millis() as u64,
            status,
            error_kind: error_kind.map(|kind| kind.to_string()),
            started_at: self.started_at,
            completed_at: unix_ms(),
        });
    }
}
