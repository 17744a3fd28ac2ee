use std::collections::HashMap;
use std::sync::Arc;
use std::time::Duration;

use anyhow::{Context, Result};
use tracing::info;

use rad_common::{GatewayConfig, GatewayConfigPatch, ProviderKind};
use rad_core::middleware::MiddlewareChain;
use rad_core::orchestrator::{Orchestrator, OrchestratorParts};
use rad_provider_core::{
    AdapterConfig, BreakerConfig, BreakerMap, ChannelUsageSink, EnvSecretsSource, ErrorWindows,
    InflightCounters, LoadBalancer, MemoryKeyStore, NoopTraceSink, PricingTable, ProviderHooks,
    RouterTable, SecretsSource, SharedAdapter,
};
use rad_provider_impl::{AnthropicAdapter, GeminiAdapter, OpenAIAdapter};
use rad_router::{GatewayState, gateway_router};

use crate::cli::Cli;

pub struct Bootstrap {
    pub router: axum::Router,
    pub bind: String,
}

/// Build the whole gateway from config: tables, adapters (credentials
/// resolved once, fatal on failure), orchestrator, HTTP surface.
pub fn bootstrap(cli: &Cli) -> Result<Bootstrap> {
    let raw = std::fs::read_to_string(&cli.config)
        .with_context(|| format!("reading config file {}", cli.config.display()))?;
    let mut config: GatewayConfig =
        serde_json::from_str(&raw).context("parsing config file")?;
    let patch = GatewayConfigPatch {
        host: cli.host.clone(),
        port: cli.port,
    };
    patch.apply(&mut config);
    config.validate().context("validating config")?;

    let router_table = Arc::new(RouterTable::new(&config.routes));
    let pricing = Arc::new(PricingTable::new(&config.pricing));
    let breakers = Arc::new(BreakerMap::new(BreakerConfig {
        failure_threshold: config.breaker.failure_threshold,
        cooldown: Duration::from_secs(config.breaker.cooldown_secs),
        half_open_success_threshold: config.breaker.half_open_success_threshold,
    }));
    let keys = Arc::new(MemoryKeyStore::new(&config.keys));
    let middleware = Arc::new(MiddlewareChain::default());
    let secrets = EnvSecretsSource;

    let stream_idle_timeout =
        Duration::from_secs(config.orchestrator.stream_idle_timeout_secs);
    let mut adapters: HashMap<String, SharedAdapter> = HashMap::new();
    for provider in &config.providers {
        let credential = secrets
            .resolve(&provider.api_key_env)
            .with_context(|| format!("resolving credential for provider {}", provider.name))?;
        let adapter_config = AdapterConfig {
            name: provider.name.clone(),
            base_url: provider.base_url.clone(),
            credential,
            timeout: Duration::from_secs(provider.timeout_secs),
            max_retries: provider.max_retries,
            retry_base_delay: Duration::from_millis(provider.retry_base_delay_ms),
            max_retry_delay: Duration::from_millis(provider.max_retry_delay_ms),
            stream_idle_timeout,
            hooks: Some(middleware.clone() as Arc<dyn ProviderHooks>),
            pricing: Some(pricing.clone()),
        };
        let adapter: SharedAdapter = match provider.kind {
            ProviderKind::OpenAI => Arc::new(OpenAIAdapter::new(adapter_config)?),
            ProviderKind::Anthropic => Arc::new(AnthropicAdapter::new(adapter_config)?),
            ProviderKind::Gemini => Arc::new(GeminiAdapter::new(adapter_config)?),
        };
        info!(
            provider = %provider.name,
            kind = ?provider.kind,
            base_url = %provider.base_url,
            "adapter registered"
        );
        adapters.insert(provider.name.clone(), adapter);
    }

    // Best-effort usage export: the request path enqueues, this task drains.
    let (usage_sink, mut usage_rx) = ChannelUsageSink::channel();
    tokio::spawn(async move {
        while let Some(record) = usage_rx.recv().await {
            info!(
                event = "usage_record",
                request_id = %record.request_id,
                trace_id = %record.trace_id,
                api_key = %record.api_key_name,
                provider = %record.provider,
                model = %record.model,
                input_tokens = record.input_tokens,
                output_tokens = record.output_tokens,
                cost = record.cost,
                status = record.status,
                duration_ms = record.duration_ms,
                error_kind = record.error_kind.as_deref().unwrap_or(""),
            );
        }
    });

    let orchestrator = Arc::new(Orchestrator::new(OrchestratorParts {
        adapters,
        router: router_table,
        balancer: LoadBalancer::standard(
            config.balancer.weighted_round_robin,
            config.balancer.connection_aware,
            config.balancer.error_aware,
        ),
        breakers,
        inflight: Arc::new(InflightCounters::new()),
        errors: Arc::new(ErrorWindows::new()),
        middleware,
        usage: Arc::new(usage_sink),
        trace: Arc::new(NoopTraceSink),
        max_cross_retries: config.orchestrator.max_cross_retries,
    }));

    let router = gateway_router(GatewayState {
        orchestrator,
        keys,
        request_timeout: Duration::from_secs(config.orchestrator.request_timeout_secs),
    });

    Ok(Bootstrap {
        router,
        bind: format!("{}:{}", config.host, config.port),
    })
}
