use axum::extract::{Extension, Path, State};
use axum::http::StatusCode;
use axum::response::Response;
use bytes::Bytes;
use tokio::sync::mpsc;

use rad_common::{ErrorKind, GatewayError};
use rad_core::orchestrator::{Dispatched, UnifiedStream};
use rad_protocol::gemini::error::{ErrorBody, ErrorEnvelope};
use rad_protocol::gemini::generate::GenerateContentRequest;
use rad_provider_core::KeyIdentity;
use rad_transform::gemini::stream::GenerateChunkWriter;
use rad_transform::gemini::{request as gemini_request, response as gemini_response};
use rad_transform::{Metadata, UnifiedStreamEvent};

use crate::GatewayState;
use crate::context::RequestIds;
use crate::reply::{bad_request, error_response, json_response};
use crate::sse::{FRAME_CHANNEL_CAPACITY, data_frame, sse_response};

/// `POST /v1beta/models/{model}:generateContent` and `:streamGenerateContent`.
pub(crate) async fn generate(
    State(state): State<GatewayState>,
    Extension(ids): Extension<RequestIds>,
    Extension(identity): Extension<KeyIdentity>,
    Path(model_action): Path<String>,
    body: Bytes,
) -> Response {
    let Some((model, action)) = model_action.split_once(':') else {
        return error_response(&GatewayError::not_found("missing model action"));
    };
    let stream = match action {
        "generateContent" => false,
        "streamGenerateContent" => true,
        _ => return error_response(&GatewayError::not_found("unknown model action")),
    };

    let wire: GenerateContentRequest = match serde_json::from_slice(&body) {
        Ok(wire) => wire,
        Err(err) => return bad_request(format!("invalid json: {err}")),
    };
    let mut unified = match gemini_request::decode_generate_request(model.to_string(), wire, stream)
    {
        Ok(unified) => unified,
        Err(err) => return bad_request(err.to_string()),
    };
    unified.metadata = Metadata {
        request_id: ids.request_id.clone(),
        trace_id: ids.trace_id.clone(),
        api_key_name: identity.name.clone(),
    };
    let model_alias = unified.model.clone();

    match state.dispatch(unified).await {
        Err(err) => error_response(&err),
        Ok(Dispatched::Response(mut unified)) => {
            unified.model = model_alias;
            let wire = gemini_response::encode_generate_response(&unified);
            match serde_json::to_vec(&wire) {
                Ok(body) => json_response(StatusCode::OK, body),
                Err(err) => error_response(&GatewayError::internal(err.to_string())),
            }
        }
        Ok(Dispatched::Stream(stream)) => stream_generate(stream, model_alias),
    }
}

/// Pump: unified events → cumulative chunks → SSE data frames; the final
/// chunk carries `finishReason`, then the stream closes.
fn stream_generate(mut stream: UnifiedStream, model: String) -> Response {
    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut writer = GenerateChunkWriter::new(model);
        while let Some(event) = stream.next().await {
            match &event {
                UnifiedStreamEvent::Done => return,
                UnifiedStreamEvent::Error { kind, message } => {
                    let envelope = ErrorEnvelope {
                        error: ErrorBody {
                            code: kind.http_status(),
                            message: message.clone(),
                            status: Some(gemini_status(*kind).to_string()),
                        },
                    };
                    if let Ok(json) = serde_json::to_string(&envelope) {
                        let _ = tx.send(data_frame(&json)).await;
                    }
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

fn gemini_status(kind: ErrorKind) -> &'static str {
    match kind {
        ErrorKind::AuthenticationFailed | ErrorKind::AuthorizationDenied => "PERMISSION_DENIED",
        ErrorKind::InvalidRequest => "INVALID_ARGUMENT",
        ErrorKind::NotFound | ErrorKind::NoRouteAvailable => "NOT_FOUND",
        ErrorKind::RateLimited => "RESOURCE_EXHAUSTED",
        ErrorKind::UpstreamTimeout => "DEADLINE_EXCEEDED",
        ErrorKind::UpstreamServerError | ErrorKind::AllProvidersFailed | ErrorKind::Internal => {
            "UNAVAILABLE"
        }
        ErrorKind::CanceledByClient => "CANCELLED",
    }
}
