use axum::http::StatusCode;
use axum::response::Response;

use crate::reply::json_response;

/// Unauthenticated liveness probe.
pub(crate) async fn health() -> Response {
    let body = serde_json::json!({
        "status": "ok",
        "service": "rad-gateway",
    });
    json_response(StatusCode::OK, body.to_string().into_bytes())
}
