use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use rad_common::ErrorKind;
use rad_protocol::openai::chat::{ChatCompletionChunk, ChatCompletionResponse};
use rad_protocol::openai::embeddings::EmbeddingsResponse;
use rad_protocol::sse::SseDecoder;
use rad_provider_core::{
    AdapterConfig, AdapterError, AdapterOutput, EventStream, ProviderAdapter,
};
use rad_transform::openai::{request as openai_request, response as openai_response};
use rad_transform::{ApiType, TransformError, UnifiedRequest, UnifiedResponse, UnifiedStreamEvent};

use crate::client::{build_client, join_url};
use crate::retry::send_with_retries;

const CHAT_PATH: &str = "/v1/chat/completions";
const EMBEDDINGS_PATH: &str = "/v1/embeddings";
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Adapter for an OpenAI-compatible upstream. Bearer-token auth.
pub struct OpenAIAdapter {
    config: AdapterConfig,
    client: wreq::Client,
}

impl OpenAIAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    fn apply_request_hooks(&self, body: &mut Vec<u8>) -> Result<(), AdapterError> {
        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_provider_request(&self.config.name, body)
                .map_err(|message| AdapterError::new(ErrorKind::InvalidRequest, message))?;
        }
        Ok(())
    }

    fn apply_response_hooks(&self, body: &mut Vec<u8>) -> Result<(), AdapterError> {
        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_provider_response(&self.config.name, body)
                .map_err(|message| AdapterError::new(ErrorKind::InvalidRequest, message))?;
        }
        Ok(())
    }

    fn attach_cost(&self, response: &mut UnifiedResponse, provider_model: &str) {
        if let Some(pricing) = &self.config.pricing {
            response.usage.cost_total = pricing.cost(
                &self.config.name,
                provider_model,
                response.usage.prompt_tokens,
                response.usage.completion_tokens,
            );
        }
    }

    async fn execute_chat(
        &self,
        request: &UnifiedRequest,
        provider_model: &str,
    ) -> Result<AdapterOutput, AdapterError> {
        let wire = openai_request::encode_chat_request(request, provider_model)?;
        let mut body = serde_json::to_vec(&wire)
            .map_err(|err| AdapterError::new(ErrorKind::Internal, err.to_string()))?;
        self.apply_request_hooks(&mut body)?;

        let url = join_url(&self.config.base_url, CHAT_PATH);
        let response = send_with_retries(&self.config, "chat", || {
            self.client
                .post(&url)
                .header("authorization", format!("Bearer {}", self.config.credential))
                .header("content-type", "application/json")
                .body(body.clone())
                .send()
        })
        .await?;

        if request.parameters.stream {
            return Ok(AdapterOutput::Stream(
                self.spawn_stream(response, provider_model.to_string()),
            ));
        }

        let mut bytes = response
            .bytes()
            .await
            .map_err(|err| crate::retry::classify_transport(&err))?
            .to_vec();
        self.apply_response_hooks(&mut bytes)?;
        let decoded: ChatCompletionResponse = serde_json::from_slice(&bytes).map_err(|err| {
            AdapterError::new(
                ErrorKind::UpstreamServerError,
                format!("undecodable upstream response: {err}"),
            )
        })?;
        let mut unified = openai_response::decode_chat_response(decoded)
            .map_err(|err| AdapterError::new(ErrorKind::UpstreamServerError, err.to_string()))?;
        self.attach_cost(&mut unified, provider_model);
        Ok(AdapterOutput::Response(unified))
    }

    async fn execute_embeddings(
        &self,
        request: &UnifiedRequest,
        provider_model: &str,
    ) -> Result<AdapterOutput, AdapterError> {
        let wire = openai_request::encode_embeddings_request(request, provider_model)?;
        let mut body = serde_json::to_vec(&wire)
            .map_err(|err| AdapterError::new(ErrorKind::Internal, err.to_string()))?;
        self.apply_request_hooks(&mut body)?;

        let url = join_url(&self.config.base_url, EMBEDDINGS_PATH);
        let response = send_with_retries(&self.config, "embeddings", || {
            self.client
                .post(&url)
                .header("authorization", format!("Bearer {}", self.config.credential))
                .header("content-type", "application/json")
                .body(body.clone())
                .send()
        })
        .await?;

        let mut bytes = response
            .bytes()
            .await
            .map_err(|err| crate::retry::classify_transport(&err))?
            .to_vec();
        self.apply_response_hooks(&mut bytes)?;
        let decoded: EmbeddingsResponse = serde_json::from_slice(&bytes).map_err(|err| {
            AdapterError::new(
                ErrorKind::UpstreamServerError,
                format!("undecodable upstream response: {err}"),
            )
        })?;
        let mut unified = openai_response::decode_embeddings_response(decoded)
            .map_err(|err| AdapterError::new(ErrorKind::UpstreamServerError, err.to_string()))?;
        self.attach_cost(&mut unified, provider_model);
        Ok(AdapterOutput::Response(unified))
    }

    /// Single producer task owning the response body: SSE frames → chunk
    /// transformer → bounded channel. Consumer drop stops it on next send.
    fn spawn_stream(&self, response: wreq::Response, provider_model: String) -> EventStream {
        let (tx, stream) = EventStream::channel(STREAM_CHANNEL_CAPACITY);
        let idle = self.config.stream_idle_timeout;
        let provider = self.config.name.clone();
        let pricing = self.config.pricing.clone();

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut reader = rad_transform::openai::stream::ChunkReader::new();

            loop {
                let chunk = match tokio::time::timeout(idle, body.next()).await {
                    Err(_) => {
                        let _ = tx
                            .send(UnifiedStreamEvent::Error {
                                kind: ErrorKind::UpstreamTimeout,
                                message: "stream idle timeout".to_string(),
                            })
                            .await;
                        return;
                    }
                    Ok(None) => break,
                    Ok(Some(Err(err))) => {
                        let _ = tx
                            .send(UnifiedStreamEvent::Error {
                                kind: ErrorKind::UpstreamServerError,
                                message: err.to_string(),
                            })
                            .await;
                        return;
                    }
                    Ok(Some(Ok(chunk))) => chunk,
                };

                for frame in decoder.feed(&chunk) {
                    if frame.data == "[DONE]" {
                        for event in reader.done() {
                            let event = price_finish_event(event, pricing.as_deref(), &provider, &provider_model);
                            if tx.send(event).await.is_err() {
                                return;
                            }
                        }
                        return;
                    }
                    let parsed: ChatCompletionChunk = match serde_json::from_str(&frame.data) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            debug!(provider = %provider, error = %err, "skipping undecodable stream frame");
                            continue;
                        }
                    };
                    for event in reader.read(parsed) {
                        let event = price_finish_event(event, pricing.as_deref(), &provider, &provider_model);
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }

            // EOF without [DONE]: the upstream closed cleanly enough; flush
            // the terminal events.
            for event in reader.done() {
                let event = price_finish_event(event, pricing.as_deref(), &provider, &provider_model);
                if tx.send(event).await.is_err() {
                    return;
                }
            }
        });

        stream
    }
}

/// Cost is attached to the finish event's usage so stream accounting sees it.
fn price_finish_event(
    event: UnifiedStreamEvent,
    pricing: Option<&rad_provider_core::PricingTable>,
    provider: &str,
    model: &str,
) -> UnifiedStreamEvent {
    match (event, pricing) {
        (
            UnifiedStreamEvent::FinishReason {
                reason,
                usage: Some(mut usage),
            },
            Some(pricing),
        ) => {
            usage.cost_total =
                pricing.cost(provider, model, usage.prompt_tokens, usage.completion_tokens);
            UnifiedStreamEvent::FinishReason {
                reason,
                usage: Some(usage),
            }
        }
        (event, _) => event,
    }
}

#[async_trait]
impl ProviderAdapter for OpenAIAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports(&self, api_type: ApiType) -> bool {
        matches!(api_type, ApiType::Chat | ApiType::Embeddings)
    }

    async fn execute(
        &self,
        request: &UnifiedRequest,
        provider_model: &str,
    ) -> Result<AdapterOutput, AdapterError> {
        match request.api_type {
            ApiType::Chat => self.execute_chat(request, provider_model).await,
            ApiType::Embeddings => self.execute_embeddings(request, provider_model).await,
            other => Err(TransformError::unsupported("openai", other).into()),
        }
    }
}
