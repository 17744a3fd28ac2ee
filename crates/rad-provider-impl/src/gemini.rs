use async_trait::async_trait;
use futures_util::StreamExt;
use tracing::debug;

use rad_common::ErrorKind;
use rad_protocol::gemini::generate::GenerateContentResponse;
use rad_protocol::sse::SseDecoder;
use rad_provider_core::{
    AdapterConfig, AdapterError, AdapterOutput, EventStream, PricingTable, ProviderAdapter,
};
use rad_transform::gemini::{request as gemini_request, response as gemini_response};
use rad_transform::{ApiType, TransformError, UnifiedRequest, UnifiedStreamEvent};

use crate::client::{build_client, join_url};
use crate::retry::send_with_retries;

const HEADER_API_KEY: &str = "x-goog-api-key";
const STREAM_CHANNEL_CAPACITY: usize = 256;

/// Adapter for a Gemini GenerateContent upstream. `x-goog-api-key` auth;
/// streaming uses `:streamGenerateContent?alt=sse`.
pub struct GeminiAdapter {
    config: AdapterConfig,
    client: wreq::Client,
}

impl GeminiAdapter {
    pub fn new(config: AdapterConfig) -> Result<Self, AdapterError> {
        let client = build_client(&config)?;
        Ok(Self { config, client })
    }

    fn generate_url(&self, provider_model: &str, stream: bool) -> String {
        let action = if stream {
            "streamGenerateContent"
        } else {
            "generateContent"
        };
        let mut url = join_url(
            &self.config.base_url,
            &format!("/v1beta/models/{provider_model}:{action}"),
        );
        if stream {
            url.push_str("?alt=sse");
        }
        url
    }

    fn spawn_stream(&self, response: wreq::Response, provider_model: String) -> EventStream {
        let (tx, stream) = EventStream::channel(STREAM_CHANNEL_CAPACITY);
        let idle = self.config.stream_idle_timeout;
        let provider = self.config.name.clone();
        let pricing = self.config.pricing.clone();

        tokio::spawn(async move {
            let mut body = response.bytes_stream();
            let mut decoder = SseDecoder::new();
            let mut reader = rad_transform::gemini::stream::GenerateChunkReader::new();

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
                    let parsed: GenerateContentResponse = match serde_json::from_str(&frame.data) {
                        Ok(parsed) => parsed,
                        Err(err) => {
                            debug!(provider = %provider, error = %err, "skipping undecodable stream frame");
                            continue;
                        }
                    };
                    for event in reader.read(parsed) {
                        let event =
                            price_finish_event(event, pricing.as_deref(), &provider, &provider_model);
                        if tx.send(event).await.is_err() {
                            return;
                        }
                    }
                }
            }

            // The final chunk carries finishReason; EOF is the done marker.
            for event in reader.finish() {
                let event = price_finish_event(event, pricing.as_deref(), &provider, &provider_model);
                if tx.send(event).await.is_err() {
                    return;
                }
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
impl ProviderAdapter for GeminiAdapter {
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
            return Err(TransformError::unsupported("gemini", request.api_type).into());
        }

        let wire = gemini_request::encode_generate_request(request)?;
        let mut body = serde_json::to_vec(&wire)
            .map_err(|err| AdapterError::new(ErrorKind::Internal, err.to_string()))?;
        if let Some(hooks) = &self.config.hooks {
            hooks
                .on_provider_request(&self.config.name, &mut body)
                .map_err(|message| AdapterError::new(ErrorKind::InvalidRequest, message))?;
        }

        let url = self.generate_url(provider_model, request.parameters.stream);
        let response = send_with_retries(&self.config, "generate_content", || {
            self.client
                .post(&url)
                .header(HEADER_API_KEY, self.config.credential.clone())
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
        let decoded: GenerateContentResponse = serde_json::from_slice(&bytes).map_err(|err| {
            AdapterError::new(
                ErrorKind::UpstreamServerError,
                format!("undecodable upstream response: {err}"),
            )
        })?;
        let mut unified = gemini_response::decode_generate_response(decoded)
            .map_err(|err| AdapterError::new(ErrorKind::UpstreamServerError, err.to_string()))?;
        if unified.model.is_empty() {
            unified.model = provider_model.to_string();
        }
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

    // NOTE: the Gemini wire also accepts the key as `?key=` query; we always
    // send the header form, which every compatible upstream accepts.
}
