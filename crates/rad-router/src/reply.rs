use axum::body::Body;
use axum::http::{HeaderValue, StatusCode, header};
use axum::response::Response;

use rad_common::{ErrorKind, GatewayError};

/// The user-visible failure envelope: `{"error":{"message","code","type"}}`,
/// plus `Retry-After` for rate limits. Client cancellation gets no body.
pub fn error_response(err: &GatewayError) -> Response {
    if err.kind == ErrorKind::CanceledByClient {
        let mut response = Response::new(Body::empty());
        *response.status_mut() = StatusCode::from_u16(499).unwrap_or(StatusCode::BAD_REQUEST);
        return response;
    }

    let mut response = Response::new(Body::from(err.to_client_json()));
    *response.status_mut() =
        StatusCode::from_u16(err.http_status()).unwrap_or(StatusCode::INTERNAL_SERVER_ERROR);
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    if err.kind == ErrorKind::RateLimited
        && let Some(seconds) = err.retry_after
        && let Ok(value) = HeaderValue::from_str(&seconds.to_string())
    {
        response.headers_mut().insert(header::RETRY_AFTER, value);
    }
    response
}

pub fn json_response(status: StatusCode, body: Vec<u8>) -> Response {
    let mut response = Response::new(Body::from(body));
    *response.status_mut() = status;
    response.headers_mut().insert(
        header::CONTENT_TYPE,
        HeaderValue::from_static("application/json"),
    );
    response
}

pub fn bad_request(message: impl Into<String>) -> Response {
    error_response(&GatewayError::invalid_request(message))
}
