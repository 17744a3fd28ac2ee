use std::sync::Arc;

use rad_provider_core::ProviderHooks;
use rad_transform::{Metadata, UnifiedRequest, UnifiedResponse, UnifiedStreamEvent};

use rad_common::GatewayError;

/// A middleware rejection. Always surfaced to the caller as a
/// client-attributable failure; subsequent middleware do not run.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{middleware}: {message}")]
pub struct MiddlewareError {
    pub middleware: &'static str,
    pub message: String,
}

impl MiddlewareError {
    pub fn new(middleware: &'static str, message: impl Into<String>) -> Self {
        Self {
            middleware,
            message: message.into(),
        }
    }
}

impl From<MiddlewareError> for GatewayError {
    fn from(err: MiddlewareError) -> Self {
        GatewayError::invalid_request(err.to_string())
    }
}

/// Optional callbacks around each attempt. Request-phase callbacks compose
/// in registration order, response-phase callbacks in reverse order.
/// Callbacks may mutate the value they receive.
pub trait Middleware: Send + Sync {
    fn name(&self) -> &'static str;

    fn on_unified_request(&self, _request: &mut UnifiedRequest) -> Result<(), MiddlewareError> {
        Ok(())
    }

    fn on_provider_request(
        &self,
        _provider: &str,
        _body: &mut Vec<u8>,
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }

    fn on_provider_response(
        &self,
        _provider: &str,
        _body: &mut Vec<u8>,
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }

    fn on_unified_response(
        &self,
        _metadata: &Metadata,
        _response: &mut UnifiedResponse,
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }

    fn on_stream_event(
        &self,
        _metadata: &Metadata,
        _event: &mut UnifiedStreamEvent,
    ) -> Result<(), MiddlewareError> {
        Ok(())
    }

    fn on_error(&self, _metadata: &Metadata, _error: &GatewayError) {}
}

#[derive(Default)]
pub struct MiddlewareChain {
    items: Vec<Arc<dyn Middleware>>,
}

impl MiddlewareChain {
    pub fn new(items: Vec<Arc<dyn Middleware>>) -> Self {
        Self { items }
    }

    pub fn is_empty(&self) -> bool {
        self.items.is_empty()
    }

    pub fn apply_unified_request(
        &self,
        request: &mut UnifiedRequest,
    ) -> Result<(), MiddlewareError> {
        for item in &self.items {
            item.on_unified_request(request)?;
        }
        Ok(())
    }

    pub fn apply_unified_response(
        &self,
        metadata: &Metadata,
        response: &mut UnifiedResponse,
    ) -> Result<(), MiddlewareError> {
        for item in self.items.iter().rev() {
            item.on_unified_response(metadata, response)?;
        }
        Ok(())
    }

    pub fn apply_stream_event(
        &self,
        metadata: &Metadata,
        event: &mut UnifiedStreamEvent,
    ) -> Result<(), MiddlewareError> {
        for item in self.items.iter().rev() {
            item.on_stream_event(metadata, event)?;
        }
        Ok(())
    }

    pub fn apply_error(&self, metadata: &Metadata, error: &GatewayError) {
        for item in self.items.iter().rev() {
            item.on_error(metadata, error);
        }
    }
}

/// Wire-level callbacks are invoked from inside adapters via the
/// ProviderHooks seam.
impl ProviderHooks for MiddlewareChain {
    fn on_provider_request(&self, provider: &str, body: &mut Vec<u8>) -> Result<(), String> {
        for item in &self.items {
            Middleware::on_provider_request(item.as_ref(), provider, body)
                .map_err(|err| err.to_string())?;
        }
        Ok(())
    }

    fn on_provider_response(&self, provider: &str, body: &mut Vec<u8>) -> Result<(), String> {
        for item in self.items.iter().rev() {
            Middleware::on_provider_response(item.as_ref(), provider, body)
                .map_err(|err| err.to_string())?;
        }
        Ok(())
    }
}
