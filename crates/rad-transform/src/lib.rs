pub mod claude;
mod error;
pub mod gemini;
pub mod openai;
mod types;

pub use error::TransformError;
pub use types::{
    ApiType, ContentPart, FinishReason, Message, MessageContent, Metadata, Parameters, Role,
    ToolCall, ToolDecl, UnifiedRequest, UnifiedResponse, UnifiedStreamEvent, Usage,
};
