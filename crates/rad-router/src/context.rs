use axum::body::Body;
use axum::extract::State;
use axum::http::{HeaderValue, Request};
use axum::middleware::Next;
use axum::response::Response;

use rad_common::{is_well_formed_id, new_id};
use rad_core::auth::authenticate;
use rad_provider_core::KeyIdentity;

use crate::GatewayState;
use crate::reply::error_response;

/// Request-scoped correlation ids, stable across retries.
#[derive(Debug, Clone)]
pub struct RequestIds {
    pub request_id: String,
    pub trace_id: String,
}

/// Echo well-formed inbound `X-Request-Id`/`X-Trace-Id`, generate 128-bit
/// hex otherwise; always set both on the response.
pub async fn request_ids(mut request: Request<Body>, next: Next) -> Response {
    let request_id = accepted_id(&request, "x-request-id");
    let trace_id = accepted_id(&request, "x-trace-id");
    let ids = RequestIds {
        request_id: request_id.clone(),
        trace_id: trace_id.clone(),
    };
    request.extensions_mut().insert(ids);

    let mut response = next.run(request).await;
    if let Ok(value) = HeaderValue::from_str(&request_id) {
        response.headers_mut().insert("x-request-id", value);
    }
    if let Ok(value) = HeaderValue::from_str(&trace_id) {
        response.headers_mut().insert("x-trace-id", value);
    }
    response
}

/// API-key authentication for all protocol routes. The resolved identity is
/// attached as an extension; failure short-circuits with the 401 envelope.
pub async fn auth(
    State(state): State<GatewayState>,
    mut request: Request<Body>,
    next: Next,
) -> Response {
    let query = request.uri().query().map(|query| query.to_string());
    let identity: KeyIdentity =
        match authenticate(state.keys.as_ref(), request.headers(), query.as_deref()) {
            Ok(identity) => identity,
            Err(err) => return error_response(&err),
        };
    request.extensions_mut().insert(identity);
    next.run(request).await
}

fn accepted_id(request: &Request<Body>, header: &str) -> String {
    request
        .headers()
        .get(header)
        .and_then(|value| value.to_str().ok())
        .filter(|value| is_well_formed_id(value))
        .map(|value| value.to_string())
        .unwrap_or_else(new_id)
}
