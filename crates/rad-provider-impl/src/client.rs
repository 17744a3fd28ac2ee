use std::time::Duration;

use rad_provider_core::{AdapterConfig, AdapterError};

const CONNECT_TIMEOUT: Duration = Duration::from_secs(5);

/// One connection pool per adapter; never shared across adapters. The read
/// timeout doubles as the transport-level idle guard for streams.
pub(crate) fn build_client(config: &AdapterConfig) -> Result<wreq::Client, AdapterError> {
    wreq::Client::builder()
        .connect_timeout(CONNECT_TIMEOUT)
        .timeout(config.timeout)
        .read_timeout(config.stream_idle_timeout)
        .build()
        .map_err(|err| {
            AdapterError::new(
                rad_common::ErrorKind::Internal,
                format!("failed to build http client: {err}"),
            )
        })
}

pub(crate) fn join_url(base_url: &str, path: &str) -> String {
    format!("{}{}", base_url.trim_end_matches('/'), path)
}
