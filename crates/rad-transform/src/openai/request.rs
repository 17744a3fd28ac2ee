use rad_protocol::openai::chat::{
    ChatCompletionRequest, ChatContent, ChatContentPart, ChatMessage, ChatRole, FunctionCall,
    FunctionDefinition, ImageUrl, StopSequences, StreamOptions, ToolCall as WireToolCall,
    ToolCallType, ToolDefinition,
};
use rad_protocol::openai::embeddings::{EmbeddingsInput, EmbeddingsRequest};

use crate::error::TransformError;
use crate::openai::PROVIDER_NAME;
use crate::types::{
    ApiType, ContentPart, Message, MessageContent, Metadata, Parameters, Role, ToolDecl,
    UnifiedRequest,
};

/// Façade decode: OpenAI chat-completions body into the unified shape.
/// Metadata is filled in by the caller.
pub fn decode_chat_request(body: ChatCompletionRequest) -> Result<UnifiedRequest, TransformError> {
    if body.messages.is_empty() {
        return Err(TransformError::Invalid("messages must not be empty".into()));
    }

    let messages = body.messages.iter().map(decode_message).collect();
    let parameters = Parameters {
        temperature: body.temperature,
        top_p: body.top_p,
        top_k: None,
        // max_completion_tokens supersedes max_tokens on this wire.
        max_tokens: body.max_completion_tokens.or(body.max_tokens),
        stop: decode_stop(body.stop),
        stream: body.stream.unwrap_or(false),
        user: body.user,
    };
    let tools = body
        .tools
        .unwrap_or_default()
        .into_iter()
        .map(|tool| ToolDecl {
            name: tool.function.name,
            description: tool.function.description,
            parameters: tool.function.parameters,
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

/// Adapter encode: unified request onto the chat-completions wire.
pub fn encode_chat_request(
    request: &UnifiedRequest,
    model: &str,
) -> Result<ChatCompletionRequest, TransformError> {
    if request.api_type != ApiType::Chat {
        return Err(TransformError::unsupported(PROVIDER_NAME, request.api_type));
    }

    let messages = request.messages.iter().flat_map(encode_message).collect();
    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(
            request
                .tools
                .iter()
                .map(|tool| ToolDefinition {
                    r#type: ToolCallType::Function,
                    function: FunctionDefinition {
                        name: tool.name.clone(),
                        description: tool.description.clone(),
                        parameters: tool.parameters.clone(),
                    },
                })
                .collect(),
        )
    };

    Ok(ChatCompletionRequest {
        model: model.to_string(),
        messages,
        temperature: request.parameters.temperature,
        top_p: request.parameters.top_p,
        max_tokens: request.parameters.max_tokens,
        max_completion_tokens: None,
        stop: encode_stop(&request.parameters.stop),
        stream: request.parameters.stream.then_some(true),
        // Usage on the final chunk is required for stream accounting.
        stream_options: request.parameters.stream.then_some(StreamOptions {
            include_usage: Some(true),
        }),
        user: request.parameters.user.clone(),
        tools,
        tool_choice: None,
    })
}

/// Façade decode for `POST /v1/embeddings`: each input string becomes one
/// user message, reassembled into the input array at the adapter.
pub fn decode_embeddings_request(body: EmbeddingsRequest) -> Result<UnifiedRequest, TransformError> {
    let inputs = body.input.into_vec();
    if inputs.is_empty() {
        return Err(TransformError::Invalid("input must not be empty".into()));
    }
    let messages = inputs
        .into_iter()
        .map(|text| Message::text(Role::User, text))
        .collect();

    Ok(UnifiedRequest {
        api_type: ApiType::Embeddings,
        model: body.model,
        messages,
        parameters: Parameters {
            user: body.user,
            ..Parameters::default()
        },
        tools: Vec::new(),
        metadata: Metadata::default(),
    })
}

pub fn encode_embeddings_request(
    request: &UnifiedRequest,
    model: &str,
) -> Result<EmbeddingsRequest, TransformError> {
    if request.api_type != ApiType::Embeddings {
        return Err(TransformError::unsupported(PROVIDER_NAME, request.api_type));
    }
    let inputs: Vec<String> = request
        .messages
        .iter()
        .map(|message| message.content.flat_text())
        .collect();

    Ok(EmbeddingsRequest {
        model: model.to_string(),
        input: EmbeddingsInput::Many(inputs),
        encoding_format: None,
        user: request.parameters.user.clone(),
    })
}

fn decode_message(message: &ChatMessage) -> Message {
    let role = match message.role {
        ChatRole::System | ChatRole::Developer => Role::System,
        ChatRole::User => Role::User,
        ChatRole::Assistant => Role::Assistant,
        ChatRole::Tool => Role::Tool,
    };

    let mut parts = Vec::new();
    match &message.content {
        Some(ChatContent::Text(text)) => {
            if message.role == ChatRole::Tool {
                parts.push(ContentPart::ToolResult {
                    tool_call_id: message.tool_call_id.clone().unwrap_or_default(),
                    content: text.clone(),
                    is_error: false,
                });
            } else {
                parts.push(ContentPart::Text { text: text.clone() });
            }
        }
        Some(ChatContent::Parts(wire_parts)) => {
            for part in wire_parts {
                match part {
                    ChatContentPart::Text { text } => {
                        parts.push(ContentPart::Text { text: text.clone() })
                    }
                    ChatContentPart::ImageUrl { image_url } => parts.push(ContentPart::Image {
                        url: image_url.url.clone(),
                    }),
                }
            }
        }
        None => {}
    }

    for call in message.tool_calls.iter().flatten() {
        parts.push(ContentPart::ToolCall {
            id: call.id.clone(),
            name: call.function.name.clone(),
            arguments: call.function.arguments.clone(),
        });
    }

    let content = match parts.as_slice() {
        [ContentPart::Text { text }] => MessageContent::Text(text.clone()),
        _ => MessageContent::Parts(parts),
    };

    Message { role, content }
}

fn encode_message(message: &Message) -> Vec<ChatMessage> {
    let role = match message.role {
        Role::System => ChatRole::System,
        Role::User => ChatRole::User,
        Role::Assistant => ChatRole::Assistant,
        Role::Tool => ChatRole::Tool,
    };

    match &message.content {
        MessageContent::Text(text) => vec![ChatMessage {
            role,
            content: Some(ChatContent::Text(text.clone())),
            name: None,
            tool_calls: None,
            tool_call_id: None,
        }],
        MessageContent::Parts(parts) => {
            let mut content_parts = Vec::new();
            let mut tool_calls = Vec::new();
            let mut tool_results = Vec::new();
            for part in parts {
                match part {
                    ContentPart::Text { text } => {
                        content_parts.push(ChatContentPart::Text { text: text.clone() })
                    }
                    ContentPart::Image { url } => content_parts.push(ChatContentPart::ImageUrl {
                        image_url: ImageUrl {
                            url: url.clone(),
                            detail: None,
                        },
                    }),
                    ContentPart::ToolCall {
                        id,
                        name,
                        arguments,
                    } => tool_calls.push(WireToolCall {
                        id: id.clone(),
                        r#type: ToolCallType::Function,
                        function: FunctionCall {
                            name: name.clone(),
                            arguments: arguments.clone(),
                        },
                    }),
                    ContentPart::ToolResult {
                        tool_call_id,
                        content,
                        ..
                    } => tool_results.push(ChatMessage {
                        role: ChatRole::Tool,
                        content: Some(ChatContent::Text(content.clone())),
                        name: None,
                        tool_calls: None,
                        tool_call_id: Some(tool_call_id.clone()),
                    }),
                }
            }

            let mut out = Vec::new();
            if !content_parts.is_empty() || !tool_calls.is_empty() {
                out.push(ChatMessage {
                    role,
                    content: if content_parts.is_empty() {
                        None
                    } else {
                        Some(ChatContent::Parts(content_parts))
                    },
                    name: None,
                    tool_calls: if tool_calls.is_empty() {
                        None
                    } else {
                        Some(tool_calls)
                    },
                    tool_call_id: None,
                });
            }
            out.extend(tool_results);
            out
        }
    }
}

fn decode_stop(stop: Option<StopSequences>) -> Vec<String> {
    match stop {
        Some(StopSequences::One(one)) => vec![one],
        Some(StopSequences::Many(many)) => many,
        None => Vec::new(),
    }
}

fn encode_stop(stop: &[String]) -> Option<StopSequences> {
    match stop {
        [] => None,
        [one] => Some(StopSequences::One(one.clone())),
        many => Some(StopSequences::Many(many.to_vec())),
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chat_body(json: serde_json::Value) -> ChatCompletionRequest {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn decode_basic_chat() {
        let unified = decode_chat_request(chat_body(serde_json::json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "system", "content": "You are helpful."},
                {"role": "user", "content": "Hi"}
            ],
            "temperature": 0.5,
            "stream": true,
            "stop": "END",
            "unknown_option": {"ignored": true}
        })))
        .unwrap();

        assert_eq!(unified.api_type, ApiType::Chat);
        assert_eq!(unified.model, "gpt-4o");
        assert_eq!(unified.messages.len(), 2);
        assert_eq!(unified.messages[0].role, Role::System);
        assert!(unified.parameters.stream);
        assert_eq!(unified.parameters.stop, vec!["END".to_string()]);
        assert_eq!(unified.parameters.temperature, Some(0.5));
    }

    #[test]
    fn decode_rejects_empty_messages() {
        let err = decode_chat_request(chat_body(serde_json::json!({
            "model": "gpt-4o",
            "messages": []
        })))
        .unwrap_err();
        assert!(matches!(err, TransformError::Invalid(_)));
    }

    #[test]
    fn encode_substitutes_provider_model_and_stream_usage() {
        let unified = decode_chat_request(chat_body(serde_json::json!({
            "model": "my-alias",
            "messages": [{"role": "user", "content": "Hi"}],
            "stream": true
        })))
        .unwrap();
        let wire = encode_chat_request(&unified, "gpt-4o-2024-08-06").unwrap();
        assert_eq!(wire.model, "gpt-4o-2024-08-06");
        assert_eq!(wire.stream, Some(true));
        assert_eq!(
            wire.stream_options.and_then(|o| o.include_usage),
            Some(true)
        );
    }

    #[test]
    fn encode_rejects_non_chat() {
        let unified = decode_embeddings_request(
            serde_json::from_value(serde_json::json!({
                "model": "text-embedding-3-small",
                "input": ["a", "b"]
            }))
            .unwrap(),
        )
        .unwrap();
        let err = encode_chat_request(&unified, "gpt-4o").unwrap_err();
        assert!(matches!(err, TransformError::Unsupported { .. }));
    }

    #[test]
    fn tool_round_trip_preserves_calls_and_results() {
        let unified = decode_chat_request(chat_body(serde_json::json!({
            "model": "gpt-4o",
            "messages": [
                {"role": "user", "content": "weather?"},
                {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_1", "type": "function",
                     "function": {"name": "get_weather", "arguments": "{\"city\":\"SF\"}"}}
                ]},
                {"role": "tool", "tool_call_id": "call_1", "content": "sunny"}
            ],
            "tools": [{"type": "function", "function": {"name": "get_weather", "parameters": {"type": "object"}}}]
        })))
        .unwrap();

        assert_eq!(unified.tools.len(), 1);
        let wire = encode_chat_request(&unified, "gpt-4o").unwrap();
        assert_eq!(wire.messages.len(), 3);
        let assistant = &wire.messages[1];
        assert_eq!(
            assistant.tool_calls.as_ref().unwrap()[0].function.name,
            "get_weather"
        );
        let tool = &wire.messages[2];
        assert_eq!(tool.role, ChatRole::Tool);
        assert_eq!(tool.tool_call_id.as_deref(), Some("call_1"));
    }
}
