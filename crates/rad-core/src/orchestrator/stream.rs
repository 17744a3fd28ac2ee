use std::sync::Arc;
use std::time::Instant;

use rad_common::ErrorKind;
use rad_provider_core::EventStream;
use rad_transform::{Metadata, UnifiedStreamEvent, Usage};

use crate::middleware::MiddlewareChain;

use super::usage::UsageRecorder;

/// Orchestrator-monitored unified stream. Applies stream middleware per
/// event, guarantees a single terminating event toward the consumer, and
/// emits the usage record exactly once — on termination, or on drop when
/// the client disconnects mid-stream.
pub struct UnifiedStream {
    inner: EventStream,
    middleware: Arc<MiddlewareChain>,
    recorder: Option<UsageRecorder>,
    metadata: Metadata,
    provider: String,
    provider_model: String,
    started: Instant,
    finish_usage: Option<Usage>,
    done: bool,
}

impl UnifiedStream {
    #[allow(clippy::too_many_arguments)]
    pub(crate) fn new(
        inner: EventStream,
        middleware: Arc<MiddlewareChain>,
        recorder: UsageRecorder,
        metadata: Metadata,
        provider: String,
        provider_model: String,
        started: Instant,
    ) -> Self {
        Self {
            inner,
            middleware,
            recorder: Some(recorder),
            metadata,
            provider,
            provider_model,
            started,
            finish_usage: None,
            done: false,
        }
    }

    /// Next unified event, or `None` after the terminating event.
    pub async fn next(&mut self) -> Option<UnifiedStreamEvent> {
        if self.done {
            return None;
        }

        let Some(mut event) = self.inner.recv().await else {
            // Producer went away without a terminal event; synthesize one so
            // the client-facing stream still terminates explicitly.
            self.done = true;
            self.finalize(Some(ErrorKind::UpstreamServerError));
            return Some(UnifiedStreamEvent::Error {
                kind: ErrorKind::UpstreamServerError,
                message: "stream ended unexpectedly".to_string(),
            });
        };

        if let Err(err) = self.middleware.apply_stream_event(&self.metadata, &mut event) {
            self.done = true;
            self.finalize(Some(ErrorKind::InvalidRequest));
            return Some(UnifiedStreamEvent::Error {
                kind: ErrorKind::InvalidRequest,
                message: err.to_string(),
            });
        }

        match &event {
            UnifiedStreamEvent::FinishReason { usage, .. } => {
                if let Some(usage) = usage {
                    self.finish_usage = Some(*usage);
                }
            }
            UnifiedStreamEvent::Done => {
                self.done = true;
                self.finalize(None);
            }
            UnifiedStreamEvent::Error { kind, .. } => {
                self.done = true;
                self.finalize(Some(*kind));
            }
            _ => {}
        }

        Some(event)
    }

    pub fn provider(&self) -> &str {
        &self.provider
    }

    fn finalize(&mut self, error: Option<ErrorKind>) {
        let Some(mut recorder) = self.recorder.take() else {
            return;
        };
        let (status, error_kind) = match error {
            None => (200, None),
            Some(kind) => (kind.http_status(), Some(kind.as_str())),
        };
        recorder.emit_outcome(
            &self.provider,
            &self.provider_model,
            self.finish_usage,
            self.started.elapsed(),
            status,
            error_kind,
        );
    }
}

impl Drop for UnifiedStream {
    fn drop(&mut self) {
        // Client disconnected before the stream terminated.
        self.finalize(Some(ErrorKind::CanceledByClient));
    }
}

impl std::fmt::Debug for UnifiedStream {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("UnifiedStream")
            .field("provider", &self.provider)
            .field("provider_model", &self.provider_model)
            .field("done", &self.done)
            .finish()
    }
}
