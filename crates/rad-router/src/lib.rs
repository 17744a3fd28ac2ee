mod claude;
mod context;
mod gemini;
mod health;
mod openai;
mod reply;
mod sse;

use std::sync::Arc;
use std::time::Duration;

use axum::Router;
use axum::middleware;
use axum::routing::{get, post};

use rad_common::{ErrorKind, GatewayError};
use rad_core::Orchestrator;
use rad_core::orchestrator::Dispatched;
use rad_provider_core::KeyStore;
use rad_transform::UnifiedRequest;

#[derive(Clone)]
pub struct GatewayState {
    pub orchestrator: Arc<Orchestrator>,
    pub keys: Arc<dyn KeyStore>,
    /// Overall deadline for the request phase (façade layer).
    pub request_timeout: Duration,
}

impl GatewayState {
    /// Dispatch under the façade deadline. Once a stream is established the
    /// idle timeout takes over; this bound covers the request phase.
    pub(crate) async fn dispatch(
        &self,
        request: UnifiedRequest,
    ) -> Result<Dispatched, GatewayError> {
        match tokio::time::timeout(self.request_timeout, self.orchestrator.process(request)).await
        {
            Ok(result) => result,
            Err(_) => Err(GatewayError::new(
                ErrorKind::UpstreamTimeout,
                "request deadline exceeded",
            )),
        }
    }
}

/// The inbound HTTP surface: one base path per supported client protocol,
/// plus unauthenticated health.
pub fn gateway_router(state: GatewayState) -> Router {
    let authed = Router::new()
        // OpenAI-compatible
        .route("/v1/chat/completions", post(openai::chat_completions))
        .route("/v1/embeddings", post(openai::embeddings))
        .route("/v1/audio/transcriptions", post(openai::audio_transcriptions))
        .route("/v1/audio/speech", post(openai::audio_speech))
        .route("/v1/models", get(openai::models_list))
        // Anthropic-compatible
        .route("/v1/messages", post(claude::messages))
        // Gemini-compatible ({model}:generateContent | {model}:streamGenerateContent)
        .route("/v1beta/models/{*model_action}", post(gemini::generate))
        .layer(middleware::from_fn_with_state(state.clone(), context::auth))
        .with_state(state);

    Router::new()
        .route("/health", get(health::health))
        .merge(authed)
        .layer(middleware::from_fn(context::request_ids))
}
