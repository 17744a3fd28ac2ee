mod adapter;
mod balancer;
mod breaker;
mod errors;
mod health;
mod inflight;
mod keystore;
mod pricing;
mod routes;
mod secrets;
mod sinks;

pub use adapter::{
    AdapterConfig, AdapterOutput, EventStream, ProviderAdapter, ProviderHooks, SharedAdapter,
};
pub use balancer::{
    BreakerAware, ConnectionAware, ErrorAware, LoadBalancer, Observed, RandomTiebreak,
    ScoreStrategy, WeightedRoundRobin,
};
pub use breaker::{Admission, Availability, BreakerConfig, BreakerMap, BreakerState, CircuitBreaker};
pub use errors::AdapterError;
pub use health::ErrorWindows;
pub use inflight::{InflightCounters, InflightGuard};
pub use keystore::{KeyIdentity, KeyStore, MemoryKeyStore};
pub use pricing::PricingTable;
pub use routes::{CandidateRoute, RouterTable};
pub use secrets::{EnvSecretsSource, SecretsError, SecretsSource, StaticSecretsSource};
pub use sinks::{
    ChannelUsageSink, NoopTraceSink, NoopUsageSink, SharedTraceSink, SharedUsageSink, TraceEvent,
    TraceSink, UsageRecord, UsageSink,
};
