use crate::types::ApiType;

/// Failures produced by pure request/response mapping. All of them are
/// client-attributable: the request cannot be expressed on the target wire.
#[derive(Debug, Clone, PartialEq, Eq, thiserror::Error)]
pub enum TransformError {
    #[error("{provider} does not support {api_type:?}")]
    Unsupported { provider: &'static str, api_type: ApiType },
    #[error("invalid request: {0}")]
    Invalid(String),
}

impl TransformError {
    pub fn unsupported(provider: &'static str, api_type: ApiType) -> Self {
        Self::Unsupported { provider, api_type }
    }
}
