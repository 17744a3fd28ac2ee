use std::collections::HashMap;
use std::sync::Arc;
use std::time::Instant;

use tracing::{info, warn};

use rad_common::{ErrorKind, GatewayError};
use rad_provider_core::{
    AdapterError, AdapterOutput, Admission, BreakerMap, ErrorWindows, EventStream,
    InflightCounters, LoadBalancer, Observed, RouterTable, SharedAdapter, SharedTraceSink,
    SharedUsageSink, TraceEvent,
};
use rad_transform::{Metadata, UnifiedRequest, UnifiedResponse};

use crate::middleware::MiddlewareChain;

mod stream;
mod usage;

pub use stream::UnifiedStream;
use usage::UsageRecorder;

/// Everything the orchestrator needs, built once at startup.
pub struct OrchestratorParts {
    pub adapters: HashMap<String, SharedAdapter>,
    pub router: Arc<RouterTable>,
    pub balancer: LoadBalancer,
    pub breakers: Arc<BreakerMap>,
    pub inflight: Arc<InflightCounters>,
    pub errors: Arc<ErrorWindows>,
    pub middleware: Arc<MiddlewareChain>,
    pub usage: SharedUsageSink,
    pub trace: SharedTraceSink,
    pub max_cross_retries: u32,
}

#[derive(Debug)]
pub enum Dispatched {
    Response(UnifiedResponse),
    Stream(UnifiedStream),
}

/// The request pipeline: candidate resolution, breaker gating, adapter
/// dispatch with cross-candidate failover, and usage accounting.
pub struct Orchestrator {
    adapters: HashMap<String, SharedAdapter>,
    router: Arc<RouterTable>,
    balancer: LoadBalancer,
    breakers: Arc<BreakerMap>,
    inflight: Arc<InflightCounters>,
    errors: Arc<ErrorWindows>,
    middleware: Arc<MiddlewareChain>,
    usage: SharedUsageSink,
    trace: SharedTraceSink,
    max_cross_retries: u32,
}

impl Orchestrator {
    pub fn new(parts: OrchestratorParts) -> Self {
        Self {
            adapters: parts.adapters,
            router: parts.router,
            balancer: parts.balancer,
            breakers: parts.breakers,
            inflight: parts.inflight,
            errors: parts.errors,
            middleware: parts.middleware,
            usage: parts.usage,
            trace: parts.trace,
            max_cross_retries: parts.max_cross_retries,
        }
    }

    pub async fn process(&self, mut request: UnifiedRequest) -> Result<Dispatched, GatewayError> {
        let started = Instant::now();
        let metadata = request.metadata.clone();
        let mut recorder = UsageRecorder::new(self.usage.clone(), metadata.clone());

        self.trace_phase(&metadata, "received", None, Some(&request.model));

        if let Err(err) = self.middleware.apply_unified_request(&mut request) {
            let err: GatewayError = err.into();
            self.fail(&metadata, &mut recorder, started, None, &request.model, err.clone());
            return Err(err);
        }

        let all_candidates = self.router.resolve(&request.model);
        if all_candidates.is_empty() {
            let err = GatewayError::new(
                ErrorKind::NoRouteAvailable,
                format!("no route for model {}", request.model),
            );
            self.fail(&metadata, &mut recorder, started, None, &request.model, err.clone());
            return Err(err);
        }

        let observed = Observed {
            inflight: &self.inflight,
            errors: &self.errors,
            breakers: &self.breakers,
        };
        let k = self.max_cross_retries as usize + 1;
        let candidates = self
            .balancer
            .select(&request, all_candidates, &observed, k);

        let mut last_error: Option<AdapterError> = None;
        let mut attempts = 0u32;

        for candidate in &candidates {
            let Some(adapter) = self.adapters.get(&candidate.provider) else {
                warn!(provider = %candidate.provider, "route references unknown adapter");
                continue;
            };

            let breaker = self
                .breakers
                .get(&candidate.provider, &candidate.provider_model);
            let admission = breaker.try_acquire();
            if admission == Admission::Rejected {
                continue;
            }

            attempts += 1;
            self.trace_phase(
                &metadata,
                "attempt",
                Some(&candidate.provider),
                Some(&candidate.provider_model),
            );
            info!(
                event = "upstream_attempt",
                trace_id = %metadata.trace_id,
                request_id = %metadata.request_id,
                provider = %candidate.provider,
                model = %candidate.provider_model,
                attempt = attempts,
                probe = admission == Admission::Probe,
            );

            let outcome = {
                let _inflight = self
                    .inflight
                    .acquire(&candidate.provider, &candidate.provider_model);
                adapter.execute(&request, &candidate.provider_model).await
            };

            match outcome {
                Ok(AdapterOutput::Response(mut response)) => {
                    breaker.record_success();
                    self.errors
                        .record(&candidate.provider, &candidate.provider_model, true);

                    if let Err(err) = self
                        .middleware
                        .apply_unified_response(&metadata, &mut response)
                    {
                        let err: GatewayError = err.into();
                        self.fail(
                            &metadata,
                            &mut recorder,
                            started,
                            Some(candidate),
                            &request.model,
                            err.clone(),
                        );
                        return Err(err);
                    }

                    recorder.emit_success(
                        &candidate.provider,
                        &candidate.provider_model,
                        response.usage,
                        started.elapsed(),
                    );
                    self.trace_phase(
                        &metadata,
                        "responded",
                        Some(&candidate.provider),
                        Some(&candidate.provider_model),
                    );
                    info!(
                        event = "upstream_responded",
                        trace_id = %metadata.trace_id,
                        request_id = %metadata.request_id,
                        provider = %candidate.provider,
                        model = %candidate.provider_model,
                        elapsed_ms = started.elapsed().as_millis() as u64,
                        total_tokens = response.usage.total_tokens,
                    );
                    return Ok(Dispatched::Response(response));
                }
                Ok(AdapterOutput::Stream(inner)) => {
                    // Failover stops at the first forwarded byte; an accepted
                    // stream counts as the breaker success.
                    breaker.record_success();
                    self.errors
                        .record(&candidate.provider, &candidate.provider_model, true);
                    self.trace_phase(
                        &metadata,
                        "stream_started",
                        Some(&candidate.provider),
                        Some(&candidate.provider_model),
                    );
                    let stream = self.monitor_stream(
                        inner,
                        recorder,
                        metadata,
                        candidate.provider.clone(),
                        candidate.provider_model.clone(),
                        started,
                    );
                    return Ok(Dispatched::Stream(stream));
                }
                Err(err) => {
                    if err.is_client_attributable() {
                        // The request itself is at fault: no breaker change,
                        // no failover.
                        breaker.abort_probe();
                        let gateway: GatewayError = err.into();
                        self.fail(
                            &metadata,
                            &mut recorder,
                            started,
                            Some(candidate),
                            &request.model,
                            gateway.clone(),
                        );
                        return Err(gateway);
                    }

                    breaker.record_failure();
                    self.errors
                        .record(&candidate.provider, &candidate.provider_model, false);
                    warn!(
                        event = "upstream_failed",
                        trace_id = %metadata.trace_id,
                        provider = %candidate.provider,
                        model = %candidate.provider_model,
                        error = %err,
                        "candidate failed, trying next"
                    );
                    last_error = Some(err);
                }
            }
        }

        let err = match last_error {
            // Attempts were made: surface the last upstream error kind so
            // 429 stays 429 and timeouts stay 504.
            Some(last) if attempts > 0 => GatewayError::from(last),
            _ => GatewayError::new(
                ErrorKind::AllProvidersFailed,
                format!("no usable candidate for model {}", request.model),
            ),
        };
        self.fail(&metadata, &mut recorder, started, None, &request.model, err.clone());
        Err(err)
    }

    /// Read-only view for the façade's models listing.
    pub fn models(&self) -> Vec<String> {
        self.router.models()
    }

    fn monitor_stream(
        &self,
        inner: EventStream,
        recorder: UsageRecorder,
        metadata: Metadata,
        provider: String,
        provider_model: String,
        started: Instant,
    ) -> UnifiedStream {
        UnifiedStream::new(
            inner,
            self.middleware.clone(),
            recorder,
            metadata,
            provider,
            provider_model,
            started,
        )
    }

    fn fail(
        &self,
        metadata: &Metadata,
        recorder: &mut UsageRecorder,
        started: Instant,
        candidate: Option<&rad_provider_core::CandidateRoute>,
        logical_model: &str,
        err: GatewayError,
    ) {
        self.middleware.apply_error(metadata, &err);
        let (provider, model) = match candidate {
            Some(candidate) => (
                candidate.provider.as_str(),
                candidate.provider_model.as_str(),
            ),
            None => ("", logical_model),
        };
        recorder.emit_error(provider, model, &err, started.elapsed());
        self.trace_phase(metadata, "failed", None, Some(logical_model));
        warn!(
            event = "request_failed",
            trace_id = %metadata.trace_id,
            request_id = %metadata.request_id,
            kind = %err.kind.as_str(),
            status = err.http_status(),
            elapsed_ms = started.elapsed().as_millis() as u64,
        );
    }

    fn trace_phase(
        &self,
        metadata: &Metadata,
        phase: &str,
        provider: Option<&str>,
        model: Option<&str>,
    ) {
        self.trace.record(TraceEvent {
            trace_id: metadata.trace_id.clone(),
            request_id: metadata.request_id.clone(),
            phase: phase.to_string(),
            provider: provider.map(|value| value.to_string()),
            model: model.map(|value| value.to_string()),
            detail: None,
            at_unix_ms: usage::unix_ms(),
        });
    }
}

impl std::fmt::Debug for Orchestrator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("Orchestrator")
            .field("adapters", &self.adapters.keys().collect::<Vec<_>>())
            .field("max_cross_retries", &self.max_cross_retries)
            .finish()
    }
}
