use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use rad_common::ErrorKind;
use rad_protocol::claude::messages::{DEFAULT_ANTHROPIC_VERSION, MessagesResponse};
use rad_protocol::claude::stream::StreamEvent;
use rad_protocol::sse::SseDecoder;
use rad_provider_core::{
    AdapterConfig, AdapterError, AdapterOutput, EventStream, PricingTable, ProviderAdapter,
};
use rad_transform::claude::{request as claude_request, response as claude_response};
use rad_transform::{ApiType, TransformError, UnifiedRequest, UnifiedStreamEvent};

use crate::client::{build_client, join_url};
use crate::retry::send_with_retries;

const MESSAGES_PATH: &str = "/v1/messages";
const HEADER_API_KEY: &str = "x-api-key";
const HEADER_VERSION: &str = "anthropic-version";
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Adapter for an Anthropic Messages upstream. `x-api-key` auth plus the
/// pinned `anthropic-version` header.
pub struct AnthropicAdapter {
    config: AdapterConfig,
    client: wreq::Client,
}

impl AnthropicAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    fn spawn_stream(&self, response: wreq::Response, provider_model: String) -> EventStream {
        let (tx, stream) = EventStream::channel(STREAM_CHANNEL_CAPACITY);
        let idle = self.config.stream_idle_timeout;
        let provider = self.config.name.clone();
        let pricing = self.config.pricing.clone();

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut reader = rad_transform::claude::stream::MessagesEventReader::new();
            let mut terminated = false;

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
                    if frame.data.is_empty() {
                        continue;
                    }
                    let parsed: StreamEvent = match serde_json::from_str(&frame.data) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            debug!(provider = %provider, error = %err, "skipping undecodable stream frame");
                            continue;
                        }
                    };
                    for event in reader.read(parsed) {
                        let terminal = event.is_terminal();
                        let event =
                            price_finish_event(event, pricing.as_deref(), &provider, &provider_model);
                        if tx.send(event).await.is_err() {
                            return;
                        }
                        if terminal {
                            terminated = true;
                        }
                    }
                    if terminated {
                        return;
                    }
                }
            }

            if !terminated {
                let _ = tx
                    .send(UnifiedStreamEvent::Error {
                        kind: ErrorKind::UpstreamServerError,
                        message: "stream ended before message_stop".to_string(),
                    })
                    .await;
            }
        });

        stream
    }
}

fn price_finish_event(
    event: UnifiedStreamEvent,
    pricing: Option<&PricingTable>,
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
impl ProviderAdapter for AnthropicAdapter {
    fn name(&self) -> &str {
        &self.config.name
    }

    fn supports(&self, api_type: ApiType) -> bool {
        matches!(api_type, ApiType::Chat)
    }

    async fn execute(
        &self,
        request: &UnifiedRequest,
        provider_model: &str,
    ) -> Result<AdapterOutput, AdapterError> {
        if request.api_type != ApiType::Chat {
            return Err(TransformError::unsupported("anthropic", request.api_type).into());
        }

        let wire = claude_request::encode_messages_request(request, provider_model)?;
        let mut body = serde_json::to_vec(&wire)
            .map_err(|err| AdapterError::new(ErrorKind::Internal, err.to_string()))?;
        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_provider_request(&self.config.name, &mut body)
                .map_err(|message| AdapterError::new(ErrorKind::InvalidRequest, message))?;
        }

        let url = join_url(&self.config.base_url, MESSAGES_PATH);
        let response = send_with_retries(&self.config, "messages", || {
            self.client
                .post(&url)
                .header(HEADER_API_KEY, self.config.credential.clone())
                .header(HEADER_VERSION, DEFAULT_ANTHROPIC_VERSION)
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
        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_provider_response(&self.config.name, &mut bytes)
                .map_err(|message| AdapterError::new(ErrorKind::InvalidRequest, message))?;
        }
        let decoded: MessagesResponse = serde_json::from_slice(&bytes).map_err(|err| {
            AdapterError::new(
                ErrorKind::UpstreamServerError,
                format!("undecodable upstream response: {err}"),
            )
        })?;
        let mut unified = claude_response::decode_messages_response(decoded)
            .map_err(|err| AdapterError::new(ErrorKind::UpstreamServerError, err.to_string()))?;
        if let Some(pricing) = &self.config.pricing {
            unified.usage.cost_total = pricing.cost(
                &self.config.name,
                provider_model,
                unified.usage.prompt_tokens,
                unified.usage.completion_tokens,
            );
        }
        Ok(AdapterOutput::Response(unified))
    }
}
