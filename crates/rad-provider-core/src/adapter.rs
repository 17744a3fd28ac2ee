use std::sync::Arc;
use std::time::Duration;

use async_trait::async_trait;
use tokio::sync::mpsc;

use rad_transform::{ApiType, UnifiedRequest, UnifiedResponse, UnifiedStreamEvent};

use crate::errors::AdapterError;
use crate::pricing::PricingTable;

/// Construction-time configuration for one upstream adapter. The credential
/// is already resolved; the secrets source is not consulted again.
#[derive(Clone)]
pub struct AdapterConfig {
    pub name: String,
    pub base_url: String,
    pub credential: String,
    pub timeout: Duration,
    pub max_retries: u32,
    pub retry_base_delay: Duration,
    pub max_retry_delay: Duration,
    pub stream_idle_timeout: Duration,
    pub hooks: Option<Arc<dyn ProviderHooks>>,
    /// Cost attachment for successful calls; `None` records zero cost.
    pub pricing: Option<Arc<PricingTable>>,
}

impl std::fmt::Debug for AdapterConfig {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("AdapterConfig")
            .field("name", &self.name)
            .field("base_url", &self.base_url)
            .field("credential", &"<redacted>")
            .field("timeout", &self.timeout)
            .field("max_retries", &self.max_retries)
            .finish()
    }
}

/// Wire-level middleware callbacks, invoked by adapters on the serialized
/// provider request/response bodies. Errors are client-attributable.
pub trait ProviderHooks: Send + Sync {
    fn on_provider_request(&self, _provider: &str, _body: &mut Vec<u8>) -> Result<(), String> {
        Ok(())
    }

    fn on_provider_response(&self, _provider: &str, _body: &mut Vec<u8>) -> Result<(), String> {
        Ok(())
    }
}

/// A lazy, finite, cancelable unified event stream. Dropping the stream
/// closes the channel; the producer task notices on its next send and
/// releases the upstream connection.
#[derive(Debug)]
pub struct EventStream {
    rx: mpsc::Receiver<UnifiedStreamEvent>,
}

impl EventStream {
    /// Bounded channel so a stalled consumer back-pressures the producer
    /// (and through it, the upstream read).
    pub fn channel(capacity: usize) -> (mpsc::Sender<UnifiedStreamEvent>, Self) {
        let (tx, rx) = mpsc::channel(capacity);
        (tx, Self { rx })
    }

    pub async fn recv(&mut self) -> Option<UnifiedStreamEvent> {
        self.rx.recv().await
    }
}

#[derive(Debug)]
pub enum AdapterOutput {
    Response(UnifiedResponse),
    Stream(EventStream),
}

/// One upstream provider endpoint. Implementations own their HTTP client,
/// credentials, and local retry policy.
#[async_trait]
pub trait ProviderAdapter: Send + Sync {
    fn name(&self) -> &str;

    fn supports(&self, api_type: ApiType) -> bool;

    /// Perform the call against `provider_model` (already resolved by the
    /// router table; the unified request's `model` keeps the client alias).
    async fn execute(
        &self,
        request: &UnifiedRequest,
        provider_model: &str,
    ) -> Result<AdapterOutput, AdapterError>;
}

pub type SharedAdapter = Arc<dyn ProviderAdapter>;
