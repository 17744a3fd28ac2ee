use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::Response;
use bytes::Bytes;
use tokio::sync::mpsc;

use rad_common::{GatewayError, new_id};
use rad_core::orchestrator::{Dispatched, UnifiedStream};
use rad_protocol::openai::chat::ChatCompletionRequest;
use rad_protocol::openai::embeddings::EmbeddingsRequest;
use rad_protocol::openai::models::{ModelList, ModelListObject, ModelObject, ModelRow};
use rad_provider_core::KeyIdentity;
use rad_transform::openai::stream::ChunkWriter;
use rad_transform::openai::{request as openai_request, response as openai_response};
use rad_transform::{
    ApiType, Message, Metadata, Parameters, Role, UnifiedRequest, UnifiedStreamEvent,
};

use crate::GatewayState;
use crate::context::RequestIds;
use crate::reply::{bad_request, error_response, json_response};
use crate::sse::{FRAME_CHANNEL_CAPACITY, data_frame, sse_response};

pub(crate) async fn chat_completions(
    State(state): State<GatewayState>,
    Extension(ids): Extension<RequestIds>,
    Extension(identity): Extension<KeyIdentity>,
    body: Bytes,
) -> Response {
    let wire: ChatCompletionRequest = match serde_json::from_slice(&body) {
        Ok(wire) => wire,
        Err(err) => return bad_request(format!("invalid json: {err}")),
    };
    let mut unified = match openai_request::decode_chat_request(wire) {
        Ok(unified) => unified,
        Err(err) => return bad_request(err.to_string()),
    };
    unified.metadata = metadata(&ids, &identity);
    let model_alias = unified.model.clone();

    match state.dispatch(unified).await {
        Err(err) => error_response(&err),
        Ok(Dispatched::Response(mut unified)) => {
            if unified.id.is_empty() {
                unified.id = format!("chatcmpl-{}", new_id());
            }
            if unified.created_unix == 0 {
                unified.created_unix = now_unix();
            }
            // Clients address models by alias; echo it back.
            unified.model = model_alias;
            let wire = openai_response::encode_chat_response(&unified);
            match serde_json::to_vec(&wire) {
                Ok(body) => json_response(StatusCode::OK, body),
                Err(err) => error_response(&GatewayError::internal(err.to_string())),
            }
        }
        Ok(Dispatched::Stream(stream)) => stream_chat(stream, model_alias),
    }
}

/// Pump: unified events → chat chunks → SSE frames, closed by `[DONE]`.
fn stream_chat(mut stream: UnifiedStream, model: String) -> Response {
    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut writer = ChunkWriter::new(format!("chatcmpl-{}", new_id()), model, now_unix());
        while let Some(event) = stream.next().await {
            match &event {
                UnifiedStreamEvent::Done => {
                    let _ = tx.send(data_frame("[DONE]")).await;
                    return;
                }
                UnifiedStreamEvent::Error { kind, message } => {
                    let envelope = GatewayError::new(*kind, message.clone()).to_client_json();
                    let _ = tx.send(data_frame(&envelope)).await;
                    return;
                }
                _ => {
                    if let Some(chunk) = writer.write(&event)
                        && let Ok(json) = serde_json::to_string(&chunk)
                        && tx.send(data_frame(&json)).await.is_err()
                    {
                        return;
                    }
                }
            }
        }
    });
    sse_response(rx)
}

pub(crate) async fn embeddings(
    State(state): State<GatewayState>,
    Extension(ids): Extension<RequestIds>,
    Extension(identity): Extension<KeyIdentity>,
    body: Bytes,
) -> Response {
    let wire: EmbeddingsRequest = match serde_json::from_slice(&body) {
        Ok(wire) => wire,
        Err(err) => return bad_request(format!("invalid json: {err}")),
    };
    let mut unified = match openai_request::decode_embeddings_request(wire) {
        Ok(unified) => unified,
        Err(err) => return bad_request(err.to_string()),
    };
    unified.metadata = metadata(&ids, &identity);
    let model_alias = unified.model.clone();

    match state.dispatch(unified).await {
        Err(err) => error_response(&err),
        Ok(Dispatched::Response(mut unified)) => {
            unified.model = model_alias;
            match openai_response::encode_embeddings_response(&unified) {
                Ok(wire) => match serde_json::to_vec(&wire) {
                    Ok(body) => json_response(StatusCode::OK, body),
                    Err(err) => error_response(&GatewayError::internal(err.to_string())),
                },
                Err(err) => error_response(&GatewayError::internal(err.to_string())),
            }
        }
        Ok(Dispatched::Stream(_)) => {
            error_response(&GatewayError::internal("embeddings cannot stream"))
        }
    }
}

pub(crate) async fn audio_transcriptions(
    state: State<GatewayState>,
    ids: Extension<RequestIds>,
    identity: Extension<KeyIdentity>,
    body: Bytes,
) -> Response {
    audio(state, ids, identity, body, ApiType::AudioTranscription).await
}

pub(crate) async fn audio_speech(
    state: State<GatewayState>,
    ids: Extension<RequestIds>,
    identity: Extension<KeyIdentity>,
    body: Bytes,
) -> Response {
    audio(state, ids, identity, body, ApiType::AudioSpeech).await
}

/// Audio routes are part of the surface, but no configured adapter serves
/// these families; the capability check rejects with 400 downstream.
async fn audio(
    State(state): State<GatewayState>,
    Extension(ids): Extension<RequestIds>,
    Extension(identity): Extension<KeyIdentity>,
    body: Bytes,
    api_type: ApiType,
) -> Response {
    #[derive(serde::Deserialize)]
    struct AudioRequest {
        model: String,
        #[serde(default)]
        input: Option<String>,
    }

    let wire: AudioRequest = match serde_json::from_slice(&body) {
        Ok(wire) => wire,
        Err(err) => return bad_request(format!("invalid json: {err}")),
    };
    let unified = UnifiedRequest {
        api_type,
        model: wire.model,
        messages: wire
            .input
            .map(|input| vec![Message::text(Role::User, input)])
            .unwrap_or_default(),
        parameters: Parameters::default(),
        tools: Vec::new(),
        metadata: metadata(&ids, &identity),
    };

    match state.dispatch(unified).await {
        Err(err) => error_response(&err),
        Ok(Dispatched::Response(_)) | Ok(Dispatched::Stream(_)) => {
            error_response(&GatewayError::internal("unexpected audio result"))
        }
    }
}

pub(crate) async fn models_list(State(state): State<GatewayState>) -> Response {
    let created = now_unix();
    let list = ModelList {
        object: ModelListObject::List,
        data: state
            .orchestrator
            .models()
            .into_iter()
            .map(|id| ModelRow {
                id,
                object: ModelObject::Model,
                created,
                owned_by: "rad-gateway".to_string(),
            })
            .collect(),
    };
    match serde_json::to_vec(&list) {
        Ok(body) => json_response(StatusCode::OK, body),
        Err(err) => error_response(&GatewayError::internal(err.to_string())),
    }
}

fn metadata(ids: &RequestIds, identity: &KeyIdentity) -> Metadata {
    Metadata {
        request_id: ids.request_id.clone(),
        trace_id: ids.trace_id.clone(),
        api_key_name: identity.name.clone(),
    }
}

pub(crate) fn now_unix() -> i64 {
    time::OffsetDateTime::now_utc().unix_timestamp()
}
