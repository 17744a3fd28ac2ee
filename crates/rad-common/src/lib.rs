mod config;
mod error;
mod ids;

pub use config::{
    BalancerSettings, BreakerSettings, GatewayConfig, GatewayConfigError, GatewayConfigPatch,
    KeyEntry, OrchestratorSettings, PricingEntry, ProviderEntry, ProviderKind, RouteEntry,
    RouteTarget,
};
pub use error::{ErrorKind, GatewayError};
pub use ids::{is_well_formed_id, new_id};
