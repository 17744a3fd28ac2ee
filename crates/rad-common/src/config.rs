use serde::{Deserialize, Serialize};

#[derive(Debug, thiserror::Error)]
pub enum GatewayConfigError {
    #[error("missing required config field: {0}")]
    MissingField(&'static str),
    #[error("invalid config value for {field}: {reason}")]
    InvalidValue { field: &'static str, reason: String },
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ProviderKind {
    #[serde(rename = "openai")]
    OpenAI,
    #[serde(rename = "anthropic")]
    Anthropic,
    #[serde(rename = "gemini")]
    Gemini,
}

/// One inbound API key: `name` identifies the caller in usage records,
/// `secret` is the value matched against the extracted credential.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct KeyEntry {
    pub name: String,
    pub secret: String,
    #[serde(default = "default_true")]
    pub enabled: bool,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ProviderEntry {
    pub name: String,
    pub kind: ProviderKind,
    pub base_url: String,
    /// Environment variable holding the upstream credential; resolved once
    /// at adapter construction.
    pub api_key_env: String,
    #[serde(default = "default_timeout_secs")]
    pub timeout_secs: u64,
    #[serde(default = "default_max_retries")]
    pub max_retries: u32,
    #[serde(default = "default_retry_base_delay_ms")]
    pub retry_base_delay_ms: u64,
    #[serde(default = "default_max_retry_delay_ms")]
    pub max_retry_delay_ms: u64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteTarget {
    pub provider: String,
    pub provider_model: String,
    #[serde(default = "default_weight")]
    pub weight: u32,
    #[serde(default)]
    pub priority: i32,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct RouteEntry {
    pub model: String,
    pub targets: Vec<RouteTarget>,
}

/// Dollar cost per million tokens for one `(provider, model)` pair.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct PricingEntry {
    pub provider: String,
    pub model: String,
    pub input_per_mtok: f64,
    pub output_per_mtok: f64,
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BreakerSettings {
    #[serde(default = "default_failure_threshold")]
    pub failure_threshold: u32,
    #[serde(default = "default_cooldown_secs")]
    pub cooldown_secs: u64,
    #[serde(default = "default_half_open_successes")]
    pub half_open_success_threshold: u32,
}

impl Default for BreakerSettings {
    fn default() -> Self {
        Self {
            failure_threshold: default_failure_threshold(),
            cooldown_secs: default_cooldown_secs(),
            half_open_success_threshold: default_half_open_successes(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct BalancerSettings {
    #[serde(default = "default_strategy_weight")]
    pub weighted_round_robin: f64,
    #[serde(default = "default_strategy_weight")]
    pub connection_aware: f64,
    #[serde(default = "default_strategy_weight")]
    pub error_aware: f64,
}

impl Default for BalancerSettings {
    fn default() -> Self {
        Self {
            weighted_round_robin: default_strategy_weight(),
            connection_aware: default_strategy_weight(),
            error_aware: default_strategy_weight(),
        }
    }
}

#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct OrchestratorSettings {
    #[serde(default = "default_max_cross_retries")]
    pub max_cross_retries: u32,
    #[serde(default = "default_stream_idle_timeout_secs")]
    pub stream_idle_timeout_secs: u64,
    /// Overall deadline for the request phase; the tightest of this, the
    /// adapter timeout, and the stream idle timeout wins.
    #[serde(default = "default_request_timeout_secs")]
    pub request_timeout_secs: u64,
}

impl Default for OrchestratorSettings {
    fn default() -> Self {
        Self {
            max_cross_retries: default_max_cross_retries(),
            stream_idle_timeout_secs: default_stream_idle_timeout_secs(),
            request_timeout_secs: default_request_timeout_secs(),
        }
    }
}

/// Final merged process configuration. Merge order: CLI > ENV > file.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default = "default_host")]
    pub host: String,
    #[serde(default = "default_port")]
    pub port: u16,
    pub keys: Vec<KeyEntry>,
    pub providers: Vec<ProviderEntry>,
    pub routes: Vec<RouteEntry>,
    #[serde(default)]
    pub pricing: Vec<PricingEntry>,
    #[serde(default)]
    pub breaker: BreakerSettings,
    #[serde(default)]
    pub balancer: BalancerSettings,
    #[serde(default)]
    pub orchestrator: OrchestratorSettings,
}

impl GatewayConfig {
    pub fn validate(&self) -> Result<(), GatewayConfigError> {
        if self.providers.is_empty() {
            return Err(GatewayConfigError::MissingField("providers"));
        }
        if self.routes.is_empty() {
            return Err(GatewayConfigError::MissingField("routes"));
        }
        for route in &self.routes {
            for target in &route.targets {
                if !self.providers.iter().any(|p| p.name == target.provider) {
                    return Err(GatewayConfigError::InvalidValue {
                        field: "routes",
                        reason: format!(
                            "route {} references unknown provider {}",
                            route.model, target.provider
                        ),
                    });
                }
            }
        }
        Ok(())
    }
}

/// Optional layer used when merging CLI/env values over the file config.
#[derive(Debug, Clone, Default)]
pub struct GatewayConfigPatch {
    pub host: Option<String>,
    pub port: Option<u16>,
}

impl GatewayConfigPatch {
    pub fn overlay(&mut self, other: GatewayConfigPatch) {
        if other.host.is_some() {
            self.host = other.host;
        }
        if other.port.is_some() {
            self.port = other.port;
        }
    }

    pub fn apply(self, config: &mut GatewayConfig) {
        if let Some(host) = self.host {
            config.host = host;
        }
        if let Some(port) = self.port {
            config.port = port;
        }
    }
}

fn default_true() -> bool {
    true
}

fn default_host() -> String {
    "0.0.0.0".to_string()
}

fn default_port() -> u16 {
    8790
}

fn default_timeout_secs() -> u64 {
    300
}

fn default_max_retries() -> u32 {
    2
}

fn default_retry_base_delay_ms() -> u64 {
    200
}

fn default_max_retry_delay_ms() -> u64 {
    5_000
}

fn default_weight() -> u32 {
    1
}

fn default_failure_threshold() -> u32 {
    5
}

fn default_cooldown_secs() -> u64 {
    30
}

fn default_half_open_successes() -> u32 {
    2
}

fn default_strategy_weight() -> f64 {
    1.0
}

fn default_max_cross_retries() -> u32 {
    2
}

fn default_stream_idle_timeout_secs() -> u64 {
    30
}

fn default_request_timeout_secs() -> u64 {
    600
}
