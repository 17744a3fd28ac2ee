use serde::{Deserialize, Serialize};
use serde_json::Value as JsonValue;

use rad_common::ErrorKind;

/// Operation family of a request. Routing and adapters treat this as a
/// capability: an adapter that cannot serve the family rejects the call.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
pub enum ApiType {
    #[serde(rename = "chat")]
    Chat,
    #[serde(rename = "embeddings")]
    Embeddings,
    #[serde(rename = "images")]
    Images,
    #[serde(rename = "audio.transcription")]
    AudioTranscription,
    #[serde(rename = "audio.speech")]
    AudioSpeech,
}

impl ApiType {
    pub fn as_str(&self) -> &'static str {
        match self {
            ApiType::Chat => "chat",
            ApiType::Embeddings => "embeddings",
            ApiType::Images => "images",
            ApiType::AudioTranscription => "audio.transcription",
            ApiType::AudioSpeech => "audio.speech",
        }
    }
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum Role {
    System,
    User,
    Assistant,
    Tool,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

impl MessageContent {
    /// Text rendering used when a target wire only carries plain text.
    pub fn flat_text(&self) -> String {
        match self {
            MessageContent::Text(text) => text.clone(),
            MessageContent::Parts(parts) => {
                let mut out = String::new();
                for part in parts {
                    if let ContentPart::Text { text } = part {
                        if !out.is_empty() {
                            out.push('\n');
                        }
                        out.push_str(text);
                    }
                }
                out
            }
        }
    }
}

/// One tagged case per part kind (spec'd polymorphic content).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum ContentPart {
    Text {
        text: String,
    },
    Image {
        url: String,
    },
    ToolCall {
        id: String,
        name: String,
        /// JSON-encoded argument object.
        arguments: String,
    },
    ToolResult {
        tool_call_id: String,
        content: String,
        #[serde(default)]
        is_error: bool,
    },
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct Message {
    pub role: Role,
    pub content: MessageContent,
}

impl Message {
    pub fn text(role: Role, text: impl Into<String>) -> Self {
        Self {
            role,
            content: MessageContent::Text(text.into()),
        }
    }
}

/// Recognized generation options. Anything the client sent beyond these was
/// dropped during façade decoding and is never forwarded.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Parameters {
    pub temperature: Option<f64>,
    pub top_p: Option<f64>,
    pub top_k: Option<u32>,
    pub max_tokens: Option<u32>,
    pub stop: Vec<String>,
    pub stream: bool,
    pub user: Option<String>,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolDecl {
    pub name: String,
    pub description: Option<String>,
    pub parameters: Option<JsonValue>,
}

/// Correlation identifiers, stable across retries of one logical request.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Metadata {
    pub request_id: String,
    pub trace_id: String,
    pub api_key_name: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedRequest {
    pub api_type: ApiType,
    pub model: String,
    pub messages: Vec<Message>,
    pub parameters: Parameters,
    pub tools: Vec<ToolDecl>,
    pub metadata: Metadata,
}

#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum FinishReason {
    Stop,
    Length,
    ContentFilter,
    ToolCall,
    Error,
}

impl FinishReason {
    pub fn as_str(&self) -> &'static str {
        match self {
            FinishReason::Stop => "stop",
            FinishReason::Length => "length",
            FinishReason::ContentFilter => "content_filter",
            FinishReason::ToolCall => "tool_call",
            FinishReason::Error => "error",
        }
    }
}

#[derive(Debug, Clone, Copy, Default, PartialEq, Serialize, Deserialize)]
pub struct Usage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
    pub cost_total: f64,
}

impl Usage {
    pub fn from_tokens(prompt_tokens: u64, completion_tokens: u64) -> Self {
        Self {
            prompt_tokens,
            completion_tokens,
            total_tokens: prompt_tokens + completion_tokens,
            cost_total: 0.0,
        }
    }
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ToolCall {
    pub id: String,
    pub name: String,
    /// JSON-encoded argument object.
    pub arguments: String,
}

#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct UnifiedResponse {
    pub id: String,
    pub model: String,
    pub created_unix: i64,
    pub finish_reason: FinishReason,
    pub content: String,
    pub tool_calls: Vec<ToolCall>,
    pub usage: Usage,
    /// Present only for `ApiType::Embeddings` results.
    pub embeddings: Option<Vec<Vec<f32>>>,
}

/// One element of a lazy unified stream. Streams are finite: at most one
/// `FinishReason`, then `Done`, or a single terminating `Error`.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum UnifiedStreamEvent {
    RoleStart {
        role: Role,
    },
    ContentDelta {
        text: String,
    },
    ToolCallDelta {
        index: u32,
        id: Option<String>,
        name: Option<String>,
        args_delta: Option<String>,
    },
    FinishReason {
        reason: FinishReason,
        usage: Option<Usage>,
    },
    Done,
    Error {
        kind: ErrorKind,
        message: String,
    },
}

impl UnifiedStreamEvent {
    pub fn is_terminal(&self) -> bool {
        matches!(self, UnifiedStreamEvent::Done | UnifiedStreamEvent::Error { .. })
    }
}
