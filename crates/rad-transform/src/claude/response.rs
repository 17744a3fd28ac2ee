use serde_json::{Map, Value as JsonValue};

use rad_protocol::claude::messages::{
    ContentBlock, MessageRole, MessageType, MessagesResponse, MessagesUsage, StopReason,
};

use crate::error::TransformError;
use crate::types::{FinishReason, ToolCall, UnifiedResponse, Usage};

/// Adapter decode: Messages response into the unified shape. Text blocks
/// join into `content`, tool_use blocks become tool calls.
pub fn decode_messages_response(
    response: MessagesResponse,
) -> Result<UnifiedResponse, TransformError> {
    let mut content = String::new();
    let mut tool_calls = Vec::new();
    for block in &response.content {
        match block {
            ContentBlock::Text { text } => content.push_str(text),
            ContentBlock::ToolUse { id, name, input } => tool_calls.push(ToolCall {
                id: id.clone(),
                name: name.clone(),
                arguments: JsonValue::Object(input.clone()).to_string(),
            }),
            ContentBlock::ToolResult { .. } => {}
        }
    }

    Ok(UnifiedResponse {
        id: response.id,
        model: response.model,
        created_unix: 0,
        finish_reason: response
            .stop_reason
            .map(decode_stop_reason)
            .unwrap_or(FinishReason::Stop),
        content,
        tool_calls,
        usage: Usage::from_tokens(response.usage.input_tokens, response.usage.output_tokens),
        embeddings: None,
    })
}

/// Façade encode: unified result in the Messages envelope.
pub fn encode_messages_response(unified: &UnifiedResponse) -> MessagesResponse {
    let mut blocks = Vec::new();
    if !unified.content.is_empty() {
        blocks.push(ContentBlock::Text {
            text: unified.content.clone(),
        });
    }
    for call in &unified.tool_calls {
        blocks.push(ContentBlock::ToolUse {
            id: call.id.clone(),
            name: call.name.clone(),
            input: parse_arguments(&call.arguments),
        });
    }

    MessagesResponse {
        id: unified.id.clone(),
        r#type: MessageType::Message,
        role: MessageRole::Assistant,
        model: unified.model.clone(),
        content: blocks,
        stop_reason: Some(encode_stop_reason(unified.finish_reason)),
        stop_sequence: None,
        usage: MessagesUsage {
            input_tokens: unified.usage.prompt_tokens,
            output_tokens: unified.usage.completion_tokens,
        },
    }
}

pub fn decode_stop_reason(reason: StopReason) -> FinishReason {
    match reason {
        StopReason::EndTurn | StopReason::StopSequence => FinishReason::Stop,
        StopReason::MaxTokens => FinishReason::Length,
        StopReason::ToolUse => FinishReason::ToolCall,
        StopReason::Refusal => FinishReason::ContentFilter,
    }
}

pub fn encode_stop_reason(reason: FinishReason) -> StopReason {
    match reason {
        FinishReason::Stop | FinishReason::Error => StopReason::EndTurn,
        FinishReason::Length => StopReason::MaxTokens,
        FinishReason::ToolCall => StopReason::ToolUse,
        FinishReason::ContentFilter => StopReason::Refusal,
    }
}

fn parse_arguments(arguments: &str) -> Map<String, JsonValue> {
    match serde_json::from_str(arguments) {
        Ok(JsonValue::Object(map)) => map,
        _ => Map::new(),
    }
}
