use axum::extract::{Extension, State};
use axum::http::StatusCode;
use axum::response::Response;
use bytes::Bytes;
use tokio::sync::mpsc;

use rad_common::{GatewayError, new_id};
use rad_core::orchestrator::{Dispatched, UnifiedStream};
use rad_protocol::claude::messages::MessagesRequest;
use rad_provider_core::KeyIdentity;
use rad_transform::claude::stream::MessagesEventWriter;
use rad_transform::claude::{request as claude_request, response as claude_response};
use rad_transform::Metadata;

use crate::GatewayState;
use crate::context::RequestIds;
use crate::reply::{bad_request, error_response, json_response};
use crate::sse::{FRAME_CHANNEL_CAPACITY, event_frame, sse_response};

pub(crate) async fn messages(
    State(state): State<GatewayState>,
    Extension(ids): Extension<RequestIds>,
    Extension(identity): Extension<KeyIdentity>,
    body: Bytes,
) -> Response {
    let wire: MessagesRequest = match serde_json::from_slice(&body) {
        Ok(wire) => wire,
        Err(err) => return bad_request(format!("invalid json: {err}")),
    };
    let mut unified = match claude_request::decode_messages_request(wire) {
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
            if unified.id.is_empty() {
                unified.id = format!("msg_{}", new_id());
            }
            unified.model = model_alias;
            let wire = claude_response::encode_messages_response(&unified);
            match serde_json::to_vec(&wire) {
                Ok(body) => json_response(StatusCode::OK, body),
                Err(err) => error_response(&GatewayError::internal(err.to_string())),
            }
        }
        Ok(Dispatched::Stream(stream)) => stream_messages(stream, model_alias),
    }
}

/// Pump: unified events → typed Messages events → named SSE frames, closed
/// by the `message_stop` frame.
fn stream_messages(mut stream: UnifiedStream, model: String) -> Response {
    let (tx, rx) = mpsc::channel(FRAME_CHANNEL_CAPACITY);
    tokio::spawn(async move {
        let mut writer = MessagesEventWriter::new(format!("msg_{}", new_id()), model);
        while let Some(event) = stream.next().await {
            let terminal = event.is_terminal();
            for wire_event in writer.write(&event) {
                let Ok(json) = serde_json::to_string(&wire_event) else {
                    continue;
                };
                if tx
                    .send(event_frame(wire_event.event_name(), &json))
                    .await
                    .is_err()
                {
                    return;
                }
            }
            if terminal {
                return;
            }
        }
    });
    sse_response(rx)
}
