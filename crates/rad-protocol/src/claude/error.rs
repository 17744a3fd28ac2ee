use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorDetail {
    #[serde(rename = "type")]
    pub r#type: String,
    pub message: String,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ErrorEnvelopeType {
    #[serde(rename = "error")]
    Error,
}

/// `{"type":"error","error":{"type":"...","message":"..."}}`
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ErrorEnvelope {
    #[serde(rename = "type")]
    pub r#type: ErrorEnvelopeType,
    pub error: ErrorDetail,
}

impl ErrorEnvelope {
    pub fn new(kind: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            r#type: ErrorEnvelopeType::Error,
            error: ErrorDetail {
                r#type: kind.into(),
                message: message.into(),
            },
        }
    }
}
