use std::path::PathBuf;

use clap::Parser;

/// CLI and environment overrides. Merge order: CLI > ENV > config file.
#[derive(Debug, Parser)]
#[command(name = "rad-gateway", about = "Protocol-translating LLM gateway")]
pub struct Cli {
    /// Path to the JSON configuration file.
    #[arg(long, env = "RAD_GATEWAY_CONFIG", default_value = "rad-gateway.json")]
    pub config: PathBuf,

    /// Listen host override.
    #[arg(long, env = "RAD_GATEWAY_HOST")]
    pub host: Option<String>,

    /// Listen port override.
    #[arg(long, env = "RAD_GATEWAY_PORT")]
    pub port: Option<u16>,
}
