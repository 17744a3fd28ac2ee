use anyhow::Result;
use clap::Parser;
use tracing::info;

mod bootstrap;
mod cli;

#[tokio::main]
async fn main() -> Result<()> {
    tracing_subscriber::fmt()
        .with_env_filter(
            tracing_subscriber::EnvFilter::try_from_default_env()
                .unwrap_or_else(|_| tracing_subscriber::EnvFilter::new("info")),
        )
        .init();

    let cli = cli::Cli::parse();
    let boot = bootstrap::bootstrap(&cli)?;

    let listener = tokio::net::TcpListener::bind(&boot.bind).await?;
    info!(bind = %boot.bind, "rad-gateway listening");

    axum::serve(listener, boot.router)
        .with_graceful_shutdown(shutdown_signal())
        .await?;
    info!("shutdown complete");
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    info!("shutdown signal received");
}
