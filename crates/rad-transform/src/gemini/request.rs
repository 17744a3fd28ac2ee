use serde_json::Value as JsonValue;

use rad_protocol::gemini::generate::{
    Content, FunctionCallPart, FunctionDeclaration, FunctionResponsePart, GenerateContentRequest,
    GenerationConfig, Part, ROLE_MODEL, ROLE_USER, ToolSpec,
};

use crate::error::TransformError;
use crate::gemini::PROVIDER_NAME;
use crate::types::{
    ApiType, ContentPart, Message, MessageContent, Metadata, Parameters, Role, ToolDecl,
    UnifiedRequest,
};

/// Façade decode: generateContent body into the unified shape. `model` comes
/// from the URL path, not the body. `systemInstruction` becomes a leading
/// system message.
pub fn decode_generate_request(
    model: String,
    body: GenerateContentRequest,
    stream: bool,
) -> Result<UnifiedRequest, TransformError> {
    if body.contents.is_empty() {
        return Err(TransformError::Invalid("contents must not be empty".into()));
    }

    let mut messages = Vec::with_capacity(body.contents.len() + 1);
    if let Some(system) = &body.system_instruction {
        let text = system.joined_text();
        if !text.is_empty() {
            messages.push(Message::text(Role::System, text));
        }
    }
    for content in &body.contents {
        messages.push(decode_content(content));
    }

    let config = body.generation_config.unwrap_or_default();
    let parameters = Parameters {
        temperature: config.temperature,
        top_p: config.top_p,
        top_k: config.top_k,
        max_tokens: config.max_output_tokens,
        stop: config.stop_sequences.unwrap_or_default(),
        stream,
        user: None,
    };

    let tools = body
        .tools
        .unwrap_or_default()
        .into_iter()
        .flat_map(|spec| spec.function_declarations)
        .map(|declaration| ToolDecl {
            name: declaration.name,
            description: declaration.description,
            parameters: declaration.parameters,
        })
        .collect();

    Ok(UnifiedRequest {
        api_type: ApiType::Chat,
        model,
        messages,
        parameters,
        tools,
        metadata: Metadata::default(),
    })
}

/// Adapter encode: unified request onto the generateContent wire. System
/// text is prepended to the first user part; roles map to user/model.
pub fn encode_generate_request(
    request: &UnifiedRequest,
) -> Result<GenerateContentRequest, TransformError> {
    if request.api_type != ApiType::Chat {
        return Err(TransformError::unsupported(PROVIDER_NAME, request.api_type));
    }

    let mut system_texts = Vec::new();
    let mut contents = Vec::new();
    for message in &request.messages {
        if message.role == Role::System {
            let text = message.content.flat_text();
            if !text.is_empty() {
                system_texts.push(text);
            }
            continue;
        }
        contents.push(encode_content(message));
    }

    if !system_texts.is_empty() {
        let system = system_texts.join("\n");
        match contents
            .iter_mut()
            .find(|content| content.role.as_deref() == Some(ROLE_USER))
        {
            Some(first_user) => match first_user.parts.first_mut() {
                Some(Part::Text { text }) => *text = format!("{system}\n\n{text}"),
                _ => first_user.parts.insert(0, Part::Text { text: system }),
            },
            None => contents.insert(
                0,
                Content {
                    role: Some(ROLE_USER.to_string()),
                    parts: vec![Part::Text { text: system }],
                },
            ),
        }
    }

    let config = GenerationConfig {
        temperature: request.parameters.temperature,
        top_p: request.parameters.top_p,
        top_k: request.parameters.top_k,
        max_output_tokens: request.parameters.max_tokens,
        stop_sequences: if request.parameters.stop.is_empty() {
            None
        } else {
            Some(request.parameters.stop.clone())
        },
        candidate_count: None,
    };
    let has_config = config != GenerationConfig::default();

    let tools = if request.tools.is_empty() {
        None
    } else {
        Some(vec![ToolSpec {
            function_declarations: request
                .tools
                .iter()
                .map(|tool| FunctionDeclaration {
                    name: tool.name.clone(),
                    description: tool.description.clone(),
                    parameters: tool.parameters.clone(),
                })
                .collect(),
        }])
    };

    Ok(GenerateContentRequest {
        contents,
        system_instruction: None,
        generation_config: has_config.then_some(config),
        tools,
    })
}

fn decode_content(content: &Content) -> Message {
    let role = match content.role.as_deref() {
        Some(ROLE_MODEL) => Role::Assistant,
        _ => Role::User,
    };

    let parts: Vec<ContentPart> = content
        .parts
        .iter()
        .filter_map(|part| match part {
            Part::Text { text } => Some(ContentPart::Text { text: text.clone() }),
            Part::FunctionCall { function_call } => Some(ContentPart::ToolCall {
                id: function_call.name.clone(),
                name: function_call.name.clone(),
                arguments: function_call
                    .args
                    .clone()
                    .unwrap_or(JsonValue::Object(serde_json::Map::new()))
                    .to_string(),
            }),
            Part::FunctionResponse { function_response } => Some(ContentPart::ToolResult {
                tool_call_id: function_response.name.clone(),
                content: function_response.response.to_string(),
                is_error: false,
            }),
            Part::InlineData { .. } => None,
        })
        .collect();

    match parts.as_slice() {
        [ContentPart::Text { text }] => Message::text(role, text.clone()),
        _ => Message {
            role,
            content: MessageContent::Parts(parts),
        },
    }
}

fn encode_content(message: &Message) -> Content {
    let role = match message.role {
        Role::Assistant => ROLE_MODEL,
        Role::User | Role::Tool | Role::System => ROLE_USER,
    };

    let parts = match &message.content {
        MessageContent::Text(text) => vec![Part::Text { text: text.clone() }],
        MessageContent::Parts(unified_parts) => unified_parts
            .iter()
            .filter_map(|part| match part {
                ContentPart::Text { text } => Some(Part::Text { text: text.clone() }),
                ContentPart::Image { .. } => None,
                ContentPart::ToolCall { name, arguments, .. } => Some(Part::FunctionCall {
                    function_call: FunctionCallPart {
                        name: name.clone(),
                        args: serde_json::from_str(arguments).ok(),
                    },
                }),
                ContentPart::ToolResult {
                    tool_call_id,
                    content,
                    ..
                } => Some(Part::FunctionResponse {
                    function_response: FunctionResponsePart {
                        name: tool_call_id.clone(),
                        response: serde_json::from_str(content)
                            .unwrap_or(JsonValue::String(content.clone())),
                    },
                }),
            })
            .collect(),
    };

    Content {
        role: Some(role.to_string()),
        parts,
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::openai::request::decode_chat_request;

    #[test]
    fn system_text_prepends_to_first_user_part() {
        let unified = decode_chat_request(
            serde_json::from_value(serde_json::json!({
                "model": "gemini-1.5-pro",
                "messages": [
                    {"role": "system", "content": "Be terse."},
                    {"role": "user", "content": "Hi"}
                ],
                "max_tokens": 256
            }))
            .unwrap(),
        )
        .unwrap();

        let wire = encode_generate_request(&unified).unwrap();
        assert_eq!(wire.contents.len(), 1);
        assert_eq!(wire.contents[0].role.as_deref(), Some(ROLE_USER));
        match &wire.contents[0].parts[0] {
            Part::Text { text } => assert_eq!(text, "Be terse.\n\nHi"),
            other => panic!("unexpected part: {other:?}"),
        }
        assert_eq!(
            wire.generation_config.as_ref().unwrap().max_output_tokens,
            Some(256)
        );
    }

    #[test]
    fn assistant_role_maps_to_model() {
        let unified = decode_chat_request(
            serde_json::from_value(serde_json::json!({
                "model": "gemini-1.5-pro",
                "messages": [
                    {"role": "user", "content": "q"},
                    {"role": "assistant", "content": "a"},
                    {"role": "user", "content": "q2"}
                ]
            }))
            .unwrap(),
        )
        .unwrap();
        let wire = encode_generate_request(&unified).unwrap();
        let roles: Vec<_> = wire
            .contents
            .iter()
            .map(|content| content.role.clone().unwrap())
            .collect();
        assert_eq!(roles, vec!["user", "model", "user"]);
    }

    #[test]
    fn decode_reads_path_model_and_config() {
        let body: GenerateContentRequest = serde_json::from_value(serde_json::json!({
            "contents": [
                {"role": "user", "parts": [{"text": "Hi"}]}
            ],
            "systemInstruction": {"parts": [{"text": "Careful now."}]},
            "generationConfig": {"temperature": 0.2, "maxOutputTokens": 99, "stopSequences": ["X"]}
        }))
        .unwrap();
        let unified = decode_generate_request("gemini-1.5-flash".into(), body, false).unwrap();
        assert_eq!(unified.model, "gemini-1.5-flash");
        assert_eq!(unified.messages[0].role, Role::System);
        assert_eq!(unified.parameters.max_tokens, Some(99));
        assert_eq!(unified.parameters.stop, vec!["X".to_string()]);
    }

    #[test]
    fn function_parts_round_trip() {
        let body: GenerateContentRequest = serde_json::from_value(serde_json::json!({
            "contents": [
                {"role": "user", "parts": [{"text": "weather?"}]},
                {"role": "model", "parts": [{"functionCall": {"name": "get_weather", "args": {"city": "SF"}}}]},
                {"role": "user", "parts": [{"functionResponse": {"name": "get_weather", "response": {"sky": "sunny"}}}]}
            ]
        }))
        .unwrap();
        let unified = decode_generate_request("gemini-1.5-pro".into(), body, false).unwrap();
        let wire = encode_generate_request(&unified).unwrap();
        match &wire.contents[1].parts[0] {
            Part::FunctionCall { function_call } => {
                assert_eq!(function_call.name, "get_weather");
                assert_eq!(function_call.args.as_ref().unwrap()["city"], "SF");
            }
            other => panic!("unexpected part: {other:?}"),
        }
        match &wire.contents[2].parts[0] {
            Part::FunctionResponse { function_response } => {
                assert_eq!(function_response.response["sky"], "sunny");
            }
            other => panic!("unexpected part: {other:?}"),
        }
    }
}
