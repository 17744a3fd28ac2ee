use serde_json::{Map, Value as JsonValue};

use rad_protocol::claude::messages::{
    ContentBlock, MessageContent as WireContent, MessageParam, MessageRole, MessagesRequest,
    RequestMetadata, SystemParam, Tool, ToolResultContent,
};

use crate::claude::{DEFAULT_MAX_TOKENS, PROVIDER_NAME};
use crate::error::TransformError;
use crate::types::{
    ApiType, ContentPart, Message, MessageContent, Metadata, Parameters, Role, ToolDecl,
    UnifiedRequest,
};

/// Façade decode: Messages body into the unified shape. The top-level
/// `system` field becomes a leading system message.
pub fn decode_messages_request(body: MessagesRequest) -> Result<UnifiedRequest, TransformError> {
    if body.messages.is_empty() {
        return Err(TransformError::Invalid("messages must not be empty".into()));
    }

    let mut messages = Vec::with_capacity(body.messages.len() + 1);
    match body.system {
        Some(SystemParam::Text(text)) => messages.push(Message::text(Role::System, text)),
        Some(SystemParam::Blocks(blocks)) => {
            let text = blocks_flat_text(&blocks);
            if !text.is_empty() {
                messages.push(Message::text(Role::System, text));
            }
        }
        None => {}
    }
    for message in &body.messages {
        messages.push(decode_message(message));
    }

    let parameters = Parameters {
        temperature: body.temperature,
        top_p: body.top_p,
        top_k: body.top_k,
        max_tokens: Some(body.max_tokens),
        stop: body.stop_sequences.unwrap_or_default(),
        stream: body.stream.unwrap_or(false),
        user: body.metadata.and_then(|metadata| metadata.user_id),
    };
    let tools = body
        .tools
        .unwrap_or_default()
        .into_iter()
        .map(|tool| ToolDecl {
            name: tool.name,
            description: tool.description,
            parameters: Some(tool.input_schema),
        })
        .collect();

    Ok(UnifiedRequest {
        api_type: ApiType::Chat,
        model: body.model,
        messages,
        parameters,
        tools,
        metadata: Metadata::default(),
    })
}

/// Adapter encode: unified request onto the Messages wire. System messages
/// move to the top-level `system` field; consecutive same-role messages are
/// merged with a newline separator; `max_tokens` is defaulted when absent.
pub fn encode_messages_request(
    request: &UnifiedRequest,
    model: &str,
) -> Result<MessagesRequest, TransformError> {
    if request.api_type != ApiType::Chat {
        return Err(TransformError::unsupported(PROVIDER_NAME, request.api_type));
    }

    let mut system_texts = Vec::new();
    let mut merged: Vec<MessageParam> = Vec::new();
    for message in &request.messages {
        if message.role == Role::System {
            let text = message.content.flat_text();
            if !text.is_empty() {
                system_texts.push(text);
            }
            continue;
        }
        let encoded = encode_message(message);
        match merged.last_mut() {
            Some(last) if last.role == encoded.role => merge_into(last, encoded),
            _ => merged.push(encoded),
        }
    }

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|tool| Tool {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    input_schema: tool
                        .parameters
                        .clone()
                        .unwrap_or_else(|| JsonValue::Object(Map::new())),
                })
                .collect(),
        )
    };

    Ok(MessagesRequest {
        model: model.to_string(),
        max_tokens: request.parameters.max_tokens.unwrap_or(DEFAULT_MAX_TOKENS),
        messages: merged,
        system: if system_texts.is_empty() {
            None
        } else {
            Some(SystemParam::Text(system_texts.join("\n")))
        },
        temperature: request.parameters.temperature,
        top_p: request.parameters.top_p,
        top_k: request.parameters.top_k,
        stop_sequences: if request.parameters.stop.is_empty() {
            None
        } else {
            Some(request.parameters.stop.clone())
        },
        stream: request.parameters.stream.then_some(true),
        metadata: request.parameters.user.clone().map(|user_id| RequestMetadata {
            user_id: Some(user_id),
        }),
        tools,
    })
}

fn decode_message(message: &MessageParam) -> Message {
    let role = match message.role {
        MessageRole::User => Role::User,
        MessageRole::Assistant => Role::Assistant,
    };

    match &message.content {
        WireContent::Text(text) => Message::text(role, text.clone()),
        WireContent::Blocks(blocks) => {
            let parts: Vec<ContentPart> = blocks.iter().filter_map(decode_block).collect();
            match parts.as_slice() {
                [ContentPart::Text { text }] => Message::text(role, text.clone()),
                _ => Message {
                    role,
                    content: MessageContent::Parts(parts),
                },
            }
        }
    }
}

fn decode_block(block: &ContentBlock) -> Option<ContentPart> {
    match block {
        ContentBlock::Text { text } => Some(ContentPart::Text { text: text.clone() }),
        ContentBlock::ToolUse { id, name, input } => Some(ContentPart::ToolCall {
            id: id.clone(),
            name: name.clone(),
            arguments: JsonValue::Object(input.clone()).to_string(),
        }),
        ContentBlock::ToolResult {
            tool_use_id,
            content,
            is_error,
        } => Some(ContentPart::ToolResult {
            tool_call_id: tool_use_id.clone(),
            content: match content {
                Some(ToolResultContent::Text(text)) => text.clone(),
                Some(ToolResultContent::Blocks(blocks)) => blocks_flat_text(blocks),
                None => String::new(),
            },
            is_error: is_error.unwrap_or(false),
        }),
    }
}

fn encode_message(message: &Message) -> MessageParam {
    let role = match message.role {
        Role::Assistant => MessageRole::Assistant,
        // Tool results travel as user-role blocks on this wire.
        Role::User | Role::Tool | Role::System => MessageRole::User,
    };

    let content = match &message.content {
        MessageContent::Text(text) => WireContent::Text(text.clone()),
        MessageContent::Parts(parts) => {
            let blocks: Vec<ContentBlock> = parts.iter().filter_map(encode_part).collect();
            match blocks.as_slice() {
                [ContentBlock::Text { text }] => WireContent::Text(text.clone()),
                _ => WireContent::Blocks(blocks),
            }
        }
    };

    MessageParam { role, content }
}

fn encode_part(part: &ContentPart) -> Option<ContentBlock> {
    match part {
        ContentPart::Text { text } => Some(ContentBlock::Text { text: text.clone() }),
        // Image references cannot travel as URLs on this wire.
        ContentPart::Image { .. } => None,
        ContentPart::ToolCall {
            id,
            name,
            arguments,
        } => Some(ContentBlock::ToolUse {
            id: id.clone(),
            name: name.clone(),
            input: parse_arguments(arguments),
        }),
        ContentPart::ToolResult {
            tool_call_id,
            content,
            is_error,
        } => Some(ContentBlock::ToolResult {
            tool_use_id: tool_call_id.clone(),
            content: Some(ToolResultContent::Text(content.clone())),
            is_error: (*is_error).then_some(true),
        }),
    }
}

fn merge_into(target: &mut MessageParam, incoming: MessageParam) {
    let existing = std::mem::replace(&mut target.content, WireContent::Text(String::new()));
    target.content = match (existing, incoming.content) {
        (WireContent::Text(a), WireContent::Text(b)) => WireContent::Text(format!("{a}\n{b}")),
        (a, b) => {
            let mut blocks = into_blocks(a);
            blocks.extend(into_blocks(b));
            WireContent::Blocks(blocks)
        }
    };
}

fn into_blocks(content: WireContent) -> Vec<ContentBlock> {
    match content {
        WireContent::Text(text) => vec![ContentBlock::Text { text }],
        WireContent::Blocks(blocks) => blocks,
    }
}

fn parse_arguments(arguments: &str) -> Map<String, JsonValue> {
    match serde_json::from_str(arguments) {
        Ok(JsonValue::Object(map)) => map,
        _ => Map::new(),
    }
}

fn blocks_flat_text(blocks: &[ContentBlock]) -> String {
    let mut out = String::new();
    for block in blocks {
        if let ContentBlock::Text { text } = block {
            if !out.is_empty() {
                out.push('\n');
            }
            out.push_str(text);
        }
    }
    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::request::decode_chat_request;

    #[test]
    fn openai_request_crosses_to_messages_wire() {
        // Seed scenario: system message moves to the top-level field and
        // max_tokens is defaulted.
        let unified = decode_chat_request(
            serde_json::from_value(serde_json::json!({
                "model": "claude-3-5-sonnet",
                "messages": [
                    {"role": "system", "content": "You are helpful."},
                    {"role": "user", "content": "Hi"}
                ]
            }))
            .unwrap(),
        )
        .unwrap();

        let wire = encode_messages_request(&unified, "claude-3-5-sonnet-20241022").unwrap();
        assert_eq!(wire.model, "claude-3-5-sonnet-20241022");
        assert_eq!(wire.max_tokens, DEFAULT_MAX_TOKENS);
        assert_eq!(wire.system, Some(SystemParam::Text("You are helpful.".into())));
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(wire.messages[0].role, MessageRole::User);
        assert_eq!(wire.messages[0].content, WireContent::Text("Hi".into()));
    }

    #[test]
    fn consecutive_same_role_messages_merge_with_newline() {
        let unified = decode_chat_request(
            serde_json::from_value(serde_json::json!({
                "model": "claude-3-5-sonnet",
                "messages": [
                    {"role": "user", "content": "first"},
                    {"role": "user", "content": "second"}
                ]
            }))
            .unwrap(),
        )
        .unwrap();

        let wire = encode_messages_request(&unified, "claude-3-5-sonnet").unwrap();
        assert_eq!(wire.messages.len(), 1);
        assert_eq!(
            wire.messages[0].content,
            WireContent::Text("first\nsecond".into())
        );
    }

    #[test]
    fn decode_hoists_system_field() {
        let body: MessagesRequest = serde_json::from_value(serde_json::json!({
            "model": "claude-3-5-sonnet",
            "max_tokens": 1024,
            "system": "Be terse.",
            "messages": [{"role": "user", "content": "Hi"}],
            "stop_sequences": ["STOP"]
        }))
        .unwrap();
        let unified = decode_messages_request(body).unwrap();
        assert_eq!(unified.messages[0].role, Role::System);
        assert_eq!(unified.parameters.max_tokens, Some(1024));
        assert_eq!(unified.parameters.stop, vec!["STOP".to_string()]);
    }

    #[test]
    fn tool_use_blocks_round_trip() {
        let body: MessagesRequest = serde_json::from_value(serde_json::json!({
            "model": "claude-3-5-sonnet",
            "max_tokens": 100,
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": [
                    {"type": "tool_use", "id": "tu_1", "name": "get_weather", "input": {"city": "SF"}}
                ]},
                {"role": "user", "content": [
                    {"type": "tool_result", "tool_use_id": "tu_1", "content": "sunny"}
                ]}
            ]
        }))
        .unwrap();
        let unified = decode_messages_request(body).unwrap();
        let wire = encode_messages_request(&unified, "claude-3-5-sonnet").unwrap();

        assert_eq!(wire.messages.len(), 3);
        match &wire.messages[1].content {
            WireContent::Blocks(blocks) => match &blocks[0] {
                ContentBlock::ToolUse { id, name, input } => {
                    assert_eq!(id, "tu_1");
                    assert_eq!(name, "get_weather");
                    assert_eq!(input.get("city"), Some(&JsonValue::String("SF".into())));
                }
                other => panic!("unexpected block: {other:?}"),
            },
            other => panic!("unexpected content: {other:?}"),
        }
    }

    #[test]
    fn embeddings_are_unsupported() {
        let unified = crate::openai::request::decode_embeddings_request(
            serde_json::from_value(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": "x"
            }))
            .unwrap(),
        )
        .unwrap();
        let err = encode_messages_request(&unified, "claude-3-5-sonnet").unwrap_err();
        assert!(matches!(err, TransformError::Unsupported { .. }));
    }
}
