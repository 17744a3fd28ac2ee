use rad_common::{ErrorKind, GatewayError};
use rad_transform::TransformError;

/// A classified adapter failure. The kind drives retry, failover, and
/// breaker decisions; the optional HTTP status is kept for records.
#[derive(Debug, Clone, thiserror::Error)]
#[error("{kind:?}: {message}")]
pub struct AdapterError {
    pub kind: ErrorKind,
    pub message: String,
    pub status: Option<u16>,
    pub retry_after: Option<u64>,
}

impl AdapterError {
    pub fn new(kind: ErrorKind, message: impl Into<String>) -> Self {
        Self {
            kind,
            message: message.into(),
            status: None,
            retry_after: None,
        }
    }

    pub fn transport(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamServerError, message)
    }

    pub fn timeout(message: impl Into<String>) -> Self {
        Self::new(ErrorKind::UpstreamTimeout, message)
    }

    /// Classify a non-2xx upstream status per the propagation policy:
    /// 429 and 5xx are upstream-attributable, other 4xx are the caller's.
    pub fn from_status(status: u16, body_excerpt: &str, retry_after: Option<u64>) -> Self {
        let kind = match status {
            429 => ErrorKind::RateLimited,
            401 => ErrorKind::AuthenticationFailed,
            403 => ErrorKind::AuthorizationDenied,
            404 => ErrorKind::NotFound,
            400..=499 => ErrorKind::InvalidRequest,
            _ => ErrorKind::UpstreamServerError,
        };
        Self {
            kind,
            message: format!("upstream returned {status}: {body_excerpt}"),
            status: Some(status),
            retry_after,
        }
    }

    /// Whether the adapter's local retry loop may try again.
    pub fn is_retryable(&self) -> bool {
        matches!(
            self.kind,
            ErrorKind::RateLimited | ErrorKind::UpstreamTimeout | ErrorKind::UpstreamServerError
        )
    }

    /// Whether this outcome counts toward opening the breaker. Client
    /// errors are user-attributable and never trip it.
    pub fn counts_as_breaker_failure(&self) -> bool {
        self.is_retryable()
    }

    pub fn is_client_attributable(&self) -> bool {
        self.kind.is_client_attributable()
    }
}

impl From<TransformError> for AdapterError {
    fn from(err: TransformError) -> Self {
        Self::new(ErrorKind::InvalidRequest, err.to_string())
    }
}

impl From<AdapterError> for GatewayError {
    fn from(err: AdapterError) -> Self {
        GatewayError {
            kind: err.kind,
            message: err.message,
            retry_after: err.retry_after,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn status_classification() {
        assert_eq!(
            AdapterError::from_status(429, "", Some(3)).kind,
            ErrorKind::RateLimited
        );
        assert_eq!(
            AdapterError::from_status(500, "", None).kind,
            ErrorKind::UpstreamServerError
        );
        assert_eq!(
            AdapterError::from_status(400, "", None).kind,
            ErrorKind::InvalidRequest
        );
        assert_eq!(
            AdapterError::from_status(404, "", None).kind,
            ErrorKind::NotFound
        );
    }

    #[test]
    fn retry_and_breaker_follow_attribution() {
        assert!(AdapterError::from_status(503, "", None).is_retryable());
        assert!(AdapterError::from_status(429, "", None).counts_as_breaker_failure());
        assert!(!AdapterError::from_status(400, "", None).is_retryable());
        assert!(!AdapterError::from_status(401, "", None).counts_as_breaker_failure());
        assert!(AdapterError::timeout("idle").counts_as_breaker_failure());
    }
}
