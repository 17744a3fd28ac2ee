use std::collections::HashMap;
use std::sync::atomic::{AtomicU32, Ordering};
use std::sync::{Arc, Mutex};
use std::time::Duration;

use async_trait::async_trait;

use rad_common::{ErrorKind, RouteEntry, RouteTarget};
use rad_core::middleware::MiddlewareChain;
use rad_core::orchestrator::{Dispatched, Orchestrator, OrchestratorParts};
use rad_provider_core::{
    AdapterError, AdapterOutput, BreakerConfig, BreakerMap, ErrorWindows, EventStream,
    InflightCounters, LoadBalancer, NoopTraceSink, ProviderAdapter, RouterTable, SharedAdapter,
    UsageRecord, UsageSink,
};
use rad_transform::{
    ApiType, FinishReason, Message, Metadata, Parameters, Role, UnifiedRequest, UnifiedResponse,
    UnifiedStreamEvent, Usage,
};

/// Scripted adapter: pops one outcome per call.
enum Step {
    Ok,
    Status(u16),
    OkStream(Vec<UnifiedStreamEvent>),
}

struct StubAdapter {
    name: String,
    calls: AtomicU32,
    script: Mutex<Vec<Step>>,
}

impl StubAdapter {
    fn new(name: &str, script: Vec<Step>) -> Arc<Self> {
        Arc::new(Self {
            name: name.to_string(),
            calls: AtomicU32::new(0),
            script: Mutex::new(script),
        })
    }

    fn calls(&self) -> u32 {
        self.calls.load(Ordering::Acquire)
    }

    fn response(&self) -> UnifiedResponse {
        UnifiedResponse {
            id: format!("{}-resp", self.name),
            model: "m".into(),
            created_unix: 0,
            finish_reason: FinishReason::Stop,
            content: format!("answer from {}", self.name),
            tool_calls: Vec::new(),
            usage: Usage::from_tokens(7, 3),
            embeddings: None,
        }
    }
}

#[async_trait]
impl ProviderAdapter for StubAdapter {
    fn name(&self) -> &str {
        &self.name
    }

    fn supports(&self, _api_type: ApiType) -> bool {
        true
    }

    async fn execute(
        &self,
        _request: &UnifiedRequest,
        _provider_model: &str,
    ) -> Result<AdapterOutput, AdapterError> {
        self.calls.fetch_add(1, Ordering::AcqRel);
        let step = {
            let mut script = self.script.lock().unwrap();
            if script.is_empty() {
                Step::Ok
            } else {
                script.remove(0)
            }
        };
        match step {
            Step::Ok => Ok(AdapterOutput::Response(self.response())),
            Step::Status(status) => Err(AdapterError::from_status(status, "stubbed", None)),
            Step::OkStream(events) => {
                let (tx, stream) = EventStream::channel(16);
                tokio::spawn(async move {
                    for event in events {
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                });
                Ok(AdapterOutput::Stream(stream))
            }
        }
    }
}

#[derive(Default)]
struct CapturingSink {
    records: Mutex<Vec<UsageRecord>>,
}

impl UsageSink for CapturingSink {
    fn record(&self, record: UsageRecord) {
        self.records.lock().unwrap().push(record);
    }
}

struct Harness {
    orchestrator: Orchestrator,
    usage: Arc<CapturingSink>,
    breakers: Arc<BreakerMap>,
}

fn harness(adapters: Vec<SharedAdapter>, max_cross_retries: u32) -> Harness {
    let routes = vec![RouteEntry {
        model: "test-model".to_string(),
        // Priority encodes the intended order so failover is deterministic.
        targets: adapters
            .iter()
            .enumerate()
            .map(|(position, adapter)| RouteTarget {
                provider: adapter.name().to_string(),
                provider_model: "upstream-model".to_string(),
                weight: 1,
                priority: -(position as i32),
            })
            .collect(),
    }];

    let usage = Arc::new(CapturingSink::default());
    let breakers = Arc::new(BreakerMap::new(BreakerConfig {
        failure_threshold: 3,
        cooldown: Duration::from_secs(60),
        half_open_success_threshold: 1,
    }));

    let orchestrator = Orchestrator::new(OrchestratorParts {
        adapters: adapters
            .into_iter()
            .map(|adapter| (adapter.name().to_string(), adapter))
            .collect::<HashMap<_, _>>(),
        router: Arc::new(RouterTable::new(&routes)),
        // Deterministic ordering: tiebreaks only (priority, then weight).
        balancer: LoadBalancer::new(vec![(1.0, Box::new(rad_provider_core::BreakerAware))]),
        breakers: breakers.clone(),
        inflight: Arc::new(InflightCounters::new()),
        errors: Arc::new(ErrorWindows::new()),
        middleware: Arc::new(MiddlewareChain::default()),
        usage: usage.clone(),
        trace: Arc::new(NoopTraceSink),
        max_cross_retries,
    });

    Harness {
        orchestrator,
        usage,
        breakers,
    }
}

fn request(stream: bool) -> UnifiedRequest {
    UnifiedRequest {
        api_type: ApiType::Chat,
        model: "test-model".to_string(),
        messages: vec![Message::text(Role::User, "hi")],
        parameters: Parameters {
            stream,
            ..Parameters::default()
        },
        tools: Vec::new(),
        metadata: Metadata {
            request_id: "req-1".into(),
            trace_id: "trace-1".into(),
            api_key_name: "team-a".into(),
        },
    }
}

#[tokio::test]
async fn success_on_first_candidate() {
    let primary = StubAdapter::new("primary", vec![Step::Ok]);
    let h = harness(vec![primary.clone()], 2);

    let out = h.orchestrator.process(request(false)).await.unwrap();
    match out {
        Dispatched::Response(response) => assert_eq!(response.content, "answer from primary"),
        other => panic!("unexpected output: {other:?}"),
    }
    assert_eq!(primary.calls(), 1);

    let records = h.usage.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider, "primary");
    assert_eq!(records[0].status, 200);
    assert_eq!(records[0].input_tokens, 7);
}

#[tokio::test]
async fn failover_to_secondary_on_upstream_error() {
    // Seed scenario 4: primary exhausts its local retries with 5xx, the
    // secondary serves; breaker failure lands on the primary.
    let primary = StubAdapter::new("primary", vec![Step::Status(500)]);
    let secondary = StubAdapter::new("secondary", vec![Step::Ok]);
    let h = harness(vec![primary.clone(), secondary.clone()], 2);

    let out = h.orchestrator.process(request(false)).await.unwrap();
    match out {
        Dispatched::Response(response) => assert_eq!(response.content, "answer from secondary"),
        other => panic!("unexpected output: {other:?}"),
    }
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 1);
    assert_eq!(h.breakers.get("primary", "upstream-model").failure_count(), 1);

    let records = h.usage.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].provider, "secondary");
}

#[tokio::test]
async fn client_error_returns_immediately_without_failover() {
    // Seed scenario 6: a 400 is the caller's fault. Exactly one adapter is
    // called, no breaker movement, no second candidate.
    let primary = StubAdapter::new("primary", vec![Step::Status(400)]);
    let secondary = StubAdapter::new("secondary", vec![Step::Ok]);
    let h = harness(vec![primary.clone(), secondary.clone()], 2);

    let err = h.orchestrator.process(request(false)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::InvalidRequest);
    assert_eq!(primary.calls(), 1);
    assert_eq!(secondary.calls(), 0);
    assert_eq!(h.breakers.get("primary", "upstream-model").failure_count(), 0);

    let records = h.usage.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, 400);
    assert_eq!(records[0].error_kind.as_deref(), Some("invalid_request"));
}

#[tokio::test]
async fn open_breaker_candidate_is_skipped_entirely() {
    // Seed scenario 5: primary breaker open and not due; zero calls to it.
    let primary = StubAdapter::new("primary", vec![]);
    let secondary = StubAdapter::new("secondary", vec![Step::Ok]);
    let h = harness(vec![primary.clone(), secondary.clone()], 2);
    for _ in 0..3 {
        h.breakers.get("primary", "upstream-model").record_failure();
    }

    let out = h.orchestrator.process(request(false)).await.unwrap();
    match out {
        Dispatched::Response(response) => assert_eq!(response.content, "answer from secondary"),
        other => panic!("unexpected output: {other:?}"),
    }
    assert_eq!(primary.calls(), 0);
    assert_eq!(secondary.calls(), 1);
}

#[tokio::test]
async fn all_candidates_failing_surfaces_last_upstream_error() {
    let primary = StubAdapter::new("primary", vec![Step::Status(502)]);
    let secondary = StubAdapter::new("secondary", vec![Step::Status(503)]);
    let h = harness(vec![primary.clone(), secondary.clone()], 1);

    let err = h.orchestrator.process(request(false)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::UpstreamServerError);
    assert_eq!(err.http_status(), 502);

    let records = h.usage.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error_kind.as_deref(), Some("upstream_server_error"));
}

#[tokio::test]
async fn rate_limit_exhaustion_stays_429() {
    let only = StubAdapter::new("only", vec![Step::Status(429)]);
    let h = harness(vec![only.clone()], 0);

    let err = h.orchestrator.process(request(false)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::RateLimited);
    assert_eq!(err.http_status(), 429);
}

#[tokio::test]
async fn unknown_model_is_no_route() {
    let h = harness(vec![StubAdapter::new("primary", vec![])], 0);
    let mut req = request(false);
    req.model = "unrouted".to_string();

    let err = h.orchestrator.process(req).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::NoRouteAvailable);
    assert_eq!(err.http_status(), 404);
}

#[tokio::test]
async fn cross_retry_budget_bounds_candidates() {
    // Three candidates but max_cross_retries = 0 ⇒ only the first tried.
    let a = StubAdapter::new("a", vec![Step::Status(500)]);
    let b = StubAdapter::new("b", vec![Step::Ok]);
    let c = StubAdapter::new("c", vec![Step::Ok]);
    let h = harness(vec![a.clone(), b.clone(), c.clone()], 0);

    let err = h.orchestrator.process(request(false)).await.unwrap_err();
    assert_eq!(err.kind, ErrorKind::UpstreamServerError);
    assert_eq!(a.calls(), 1);
    assert_eq!(b.calls(), 0);
    assert_eq!(c.calls(), 0);
}

#[tokio::test]
async fn stream_usage_recorded_once_on_termination() {
    let events = vec![
        UnifiedStreamEvent::RoleStart {
            role: Role::Assistant,
        },
        UnifiedStreamEvent::ContentDelta { text: "he".into() },
        UnifiedStreamEvent::ContentDelta { text: "llo".into() },
        UnifiedStreamEvent::FinishReason {
            reason: FinishReason::Stop,
            usage: Some(Usage::from_tokens(5, 2)),
        },
        UnifiedStreamEvent::Done,
    ];
    let primary = StubAdapter::new("primary", vec![Step::OkStream(events)]);
    let h = harness(vec![primary.clone()], 0);

    let out = h.orchestrator.process(request(true)).await.unwrap();
    let mut stream = match out {
        Dispatched::Stream(stream) => stream,
        other => panic!("unexpected output: {other:?}"),
    };

    let mut content = String::new();
    let mut finish_count = 0;
    while let Some(event) = stream.next().await {
        match event {
            UnifiedStreamEvent::ContentDelta { text } => content.push_str(&text),
            UnifiedStreamEvent::FinishReason { .. } => finish_count += 1,
            _ => {}
        }
    }
    assert_eq!(content, "hello");
    assert_eq!(finish_count, 1);

    let records = h.usage.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, 200);
    assert_eq!(records[0].input_tokens, 5);
    assert_eq!(records[0].output_tokens, 2);
}

#[tokio::test]
async fn dropped_stream_emits_cancellation_record() {
    let events = vec![
        UnifiedStreamEvent::RoleStart {
            role: Role::Assistant,
        },
        UnifiedStreamEvent::ContentDelta { text: "x".into() },
    ];
    let primary = StubAdapter::new("primary", vec![Step::OkStream(events)]);
    let h = harness(vec![primary.clone()], 0);

    let out = h.orchestrator.process(request(true)).await.unwrap();
    let mut stream = match out {
        Dispatched::Stream(stream) => stream,
        other => panic!("unexpected output: {other:?}"),
    };
    let _ = stream.next().await;
    drop(stream);

    let records = h.usage.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].error_kind.as_deref(), Some("canceled_by_client"));
}

#[tokio::test]
async fn mid_stream_error_terminates_with_single_error_event() {
    let events = vec![
        UnifiedStreamEvent::ContentDelta { text: "par".into() },
        UnifiedStreamEvent::Error {
            kind: ErrorKind::UpstreamServerError,
            message: "connection reset".into(),
        },
    ];
    let primary = StubAdapter::new("primary", vec![Step::OkStream(events)]);
    let secondary = StubAdapter::new("secondary", vec![Step::Ok]);
    let h = harness(vec![primary.clone(), secondary.clone()], 2);

    let out = h.orchestrator.process(request(true)).await.unwrap();
    let mut stream = match out {
        Dispatched::Stream(stream) => stream,
        other => panic!("unexpected output: {other:?}"),
    };

    let mut events_seen = Vec::new();
    while let Some(event) = stream.next().await {
        events_seen.push(event);
    }
    // No failover once streaming: the secondary is never consulted.
    assert_eq!(secondary.calls(), 0);
    assert!(matches!(
        events_seen.last(),
        Some(UnifiedStreamEvent::Error { .. })
    ));

    let records = h.usage.records.lock().unwrap();
    assert_eq!(records.len(), 1);
    assert_eq!(records[0].status, 502);
}
