use serde::{Deserialize, Serialize};

/// Outcome classification for a request. Client-attributable kinds are
/// returned immediately and never trigger failover or breaker changes.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ErrorKind {
    AuthenticationFailed,
    AuthorizationDenied,
    InvalidRequest,
    NotFound,
    RateLimited,
    UpstreamTimeout,
    UpstreamServerError,
    AllProvidersFailed,
    NoRouteAvailable,
    CanceledByClient,
    Internal,
}

impl ErrorKind {
    pub fn http_status(&self) -> u16 {
        match self {
            ErrorKind::AuthenticationFailed => 401,
            ErrorKind::AuthorizationDenied => 403,
            ErrorKind::InvalidRequest => 400,
            ErrorKind::NotFound | ErrorKind::NoRouteAvailable => 404,
            ErrorKind::RateLimited => 429,
            ErrorKind::UpstreamTimeout => 504,
            ErrorKind::UpstreamServerError => 502,
            ErrorKind::AllProvidersFailed => 503,
            // No body is written for client cancellation; the status is
            // only used for records.
            ErrorKind::CanceledByClient => 499,
            ErrorKind::Internal => 500,
        }
    }

    pub fn as_str(&self) -> &'static str {
        match self {
            ErrorKind::AuthenticationFailed => "authentication_failed",
            ErrorKind::AuthorizationDenied => "authorization_denied",
            ErrorKind::InvalidRequest => "invalid_request",
            ErrorKind::NotFound => "not_found",
            ErrorKind::RateLimited => "rate_limited",
            ErrorKind::UpstreamTimeout => "upstream_timeout",
            ErrorKind::UpstreamServerError => "upstream_server_error",
            ErrorKind::AllProvidersFailed => "all_providers_failed",
            ErrorKind::NoRouteAvailable => "no_route_available",
            ErrorKind::CanceledByClient => "canceled_by_client",
            ErrorKind::Internal => "internal",
        }
    }

    /// Kinds caused by the caller. These must not trip breakers and must
    /// not be retried against another candidate.
    pub fn is_client_attributable(&self) -> bool {
        matches!(
            self,
            ErrorKind::AuthenticationFailed
                | ErrorKind::AuthorizationDenied
                | ErrorKind::InvalidRequest
                | ErrorKind::NotFound
                | ErrorKind::NoRouteAvailable
                | ErrorKind::CanceledByClient
        )
    }

    /// Kinds eligible for cross-candidate failover.
    pub fn is_upstream_attributable(&self) -> bool {
        matches!(
            self,
            ErrorKind::RateLimited | ErrorKind::UpstreamTimeout | ErrorKind::UpstreamServerError
        )
    }
}

#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct GatewayError {
    pub kind: ErrorKind,
    pub message: String,
    /// Seconds, surfaced as `Retry-After` when kind is RateLimited.
    pub retry_after: Option<u64>,
}

impl GatewayError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            retry_after: None,
        }
    }

    pub fn invalid_request(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::InvalidRequest, message)
    }

    pub fn not_found(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::NotFound, message)
    }

    pub fn internal(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::Internal, message)
    }

    pub fn rate_limited(message: impl Into<String>, retry_after: Option<u64>) -> Self {
        Self {
            kind: ErrorKind::RateLimited,
            message: message.into(),
            retry_after,
        }
    }

    pub fn http_status(&self) -> u16 {
        self.kind.http_status()
    }

    /// The user-visible JSON envelope: `{"error":{"message","code","type"}}`.
    pub fn to_client_json(&self) -> String {
        format!(
            r#"{{"error":{{"message":{},"code":{},"type":{}}}}}"#,
            json_string(&self.message),
            self.kind.http_status(),
            json_string(self.kind.as_str()),
        )
    }
}

fn json_string(value: &str) -> String {
    let mut out = String::with_capacity(value.len() + 2);
    out.push('"');
    for ch in value.chars() {
        match ch {
            '"' => out.push_str("\\\""),
            '\\' => out.push_str("\\\\"),
            '\n' => out.push_str("\\n"),
            '\r' => out.push_str("\\r"),
            '\t' => out.push_str("\\t"),
            c if (c as u32) < 0x20 => out.push_str(&format!("\\u{:04x}", c as u32)),
            c => out.push(c),
        }
    }
    out.push('"');
    out
}
