use rad_protocol::openai::chat::{
    AssistantMessage, ChatChoice, ChatCompletionObject, ChatCompletionResponse, ChatRole,
    FinishReason as WireFinishReason, FunctionCall, ToolCall as WireToolCall, ToolCallType,
    Usage as WireUsage,
};
use rad_protocol::openai::embeddings::{
    EmbeddingObject, EmbeddingRow, EmbeddingsResponse, EmbeddingsUsage, ListObject,
};

use crate::error::TransformError;
use crate::types::{FinishReason, ToolCall, UnifiedResponse, Usage};

/// Adapter decode: provider chat-completions response into the unified shape.
pub fn decode_chat_response(
    response: ChatCompletionResponse,
) -> Result<UnifiedResponse, TransformError> {
    let choice = response
        .choices
        .into_iter()
        .next()
        .ok_or_else(|| TransformError::Invalid("response carried no choices".into()))?;

    let tool_calls = choice
        .message
        .tool_calls
        .unwrap_or_default()
        .into_iter()
        .map(|call| ToolCall {
            id: call.id,
            name: call.function.name,
            arguments: call.function.arguments,
        })
        .collect::<Vec<_>>();

    let finish_reason = match choice.finish_reason {
        Some(WireFinishReason::Stop) => FinishReason::Stop,
        Some(WireFinishReason::Length) => FinishReason::Length,
        Some(WireFinishReason::ContentFilter) => FinishReason::ContentFilter,
        Some(WireFinishReason::ToolCalls) => FinishReason::ToolCall,
        None if !tool_calls.is_empty() => FinishReason::ToolCall,
        None => FinishReason::Stop,
    };

    let usage = response
        .usage
        .map(|usage| Usage::from_tokens(usage.prompt_tokens, usage.completion_tokens))
        .unwrap_or_default();

    Ok(UnifiedResponse {
        id: response.id,
        model: response.model,
        created_unix: response.created,
        finish_reason,
        content: choice.message.content.unwrap_or_default(),
        tool_calls,
        usage,
        embeddings: None,
    })
}

/// Façade encode: unified result in the chat-completions envelope.
pub fn encode_chat_response(unified: &UnifiedResponse) -> ChatCompletionResponse {
    ChatCompletionResponse {
        id: unified.id.clone(),
        object: ChatCompletionObject::ChatCompletion,
        created: unified.created_unix,
        model: unified.model.clone(),
        choices: vec![ChatChoice {
            index: 0,
            message: AssistantMessage {
                role: ChatRole::Assistant,
                content: if unified.content.is_empty() && !unified.tool_calls.is_empty() {
                    None
                } else {
                    Some(unified.content.clone())
                },
                tool_calls: if unified.tool_calls.is_empty() {
                    None
                } else {
                    Some(
                        unified
                            .tool_calls
                            .iter()
                            .map(|call| WireToolCall {
                                id: call.id.clone(),
                                r#type: ToolCallType::Function,
                                function: FunctionCall {
                                    name: call.name.clone(),
                                    arguments: call.arguments.clone(),
                                },
                            })
                            .collect(),
                    )
                },
            },
            finish_reason: Some(encode_finish_reason(unified.finish_reason)),
        }],
        usage: Some(WireUsage {
            prompt_tokens: unified.usage.prompt_tokens,
            completion_tokens: unified.usage.completion_tokens,
            total_tokens: unified.usage.total_tokens,
        }),
    }
}

pub fn encode_finish_reason(reason: FinishReason) -> WireFinishReason {
    match reason {
        FinishReason::Stop | FinishReason::Error => WireFinishReason::Stop,
        FinishReason::Length => WireFinishReason::Length,
        FinishReason::ContentFilter => WireFinishReason::ContentFilter,
        FinishReason::ToolCall => WireFinishReason::ToolCalls,
    }
}

/// Adapter decode for embeddings.
pub fn decode_embeddings_response(
    response: EmbeddingsResponse,
) -> Result<UnifiedResponse, TransformError> {
    let mut rows = response.data;
    rows.sort_by_key(|row| row.index);
    let embeddings: Vec<Vec<f32>> = rows.into_iter().map(|row| row.embedding).collect();

    Ok(UnifiedResponse {
        id: String::new(),
        model: response.model,
        created_unix: 0,
        finish_reason: FinishReason::Stop,
        content: String::new(),
        tool_calls: Vec::new(),
        usage: Usage::from_tokens(response.usage.prompt_tokens, 0),
        embeddings: Some(embeddings),
    })
}

/// Façade encode for embeddings.
pub fn encode_embeddings_response(
    unified: &UnifiedResponse,
) -> Result<EmbeddingsResponse, TransformError> {
    let embeddings = unified
        .embeddings
        .as_ref()
        .ok_or_else(|| TransformError::Invalid("result carried no embeddings".into()))?;

    Ok(EmbeddingsResponse {
        object: ListObject::List,
        data: embeddings
            .iter()
            .enumerate()
            .map(|(index, embedding)| EmbeddingRow {
                object: EmbeddingObject::Embedding,
                index: index as u32,
                embedding: embedding.clone(),
            })
            .collect(),
        model: unified.model.clone(),
        usage: EmbeddingsUsage {
            prompt_tokens: unified.usage.prompt_tokens,
            total_tokens: unified.usage.total_tokens,
        },
    })
}

#[cfg(test)]
mod tests {
    use super::*;

    fn wire_response(json: serde_json::Value) -> ChatCompletionResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn decode_maps_content_and_usage() {
        let unified = decode_chat_response(wire_response(serde_json::json!({
            "id": "chatcmpl-1",
            "object": "chat.completion",
            "created": 1700000000,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "hello"},
                "finish_reason": "stop"
            }],
            "usage": {"prompt_tokens": 7, "completion_tokens": 3, "total_tokens": 10}
        })))
        .unwrap();

        assert_eq!(unified.content, "hello");
        assert_eq!(unified.finish_reason, FinishReason::Stop);
        assert_eq!(unified.usage.prompt_tokens, 7);
        assert_eq!(unified.usage.total_tokens, 10);
    }

    #[test]
    fn decode_infers_tool_call_finish() {
        let unified = decode_chat_response(wire_response(serde_json::json!({
            "id": "chatcmpl-2",
            "object": "chat.completion",
            "created": 0,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": null, "tool_calls": [
                    {"id": "call_9", "type": "function",
                     "function": {"name": "f", "arguments": "{}"}}
                ]},
                "finish_reason": null
            }]
        })))
        .unwrap();
        assert_eq!(unified.finish_reason, FinishReason::ToolCall);
        assert_eq!(unified.tool_calls[0].id, "call_9");
    }

    #[test]
    fn round_trip_preserves_core_fields() {
        let unified = decode_chat_response(wire_response(serde_json::json!({
            "id": "chatcmpl-3",
            "object": "chat.completion",
            "created": 42,
            "model": "gpt-4o",
            "choices": [{
                "index": 0,
                "message": {"role": "assistant", "content": "body"},
                "finish_reason": "length"
            }],
            "usage": {"prompt_tokens": 1, "completion_tokens": 2, "total_tokens": 3}
        })))
        .unwrap();
        let encoded = encode_chat_response(&unified);
        let again = decode_chat_response(encoded).unwrap();
        assert_eq!(again.content, unified.content);
        assert_eq!(again.finish_reason, unified.finish_reason);
        assert_eq!(again.usage.total_tokens, unified.usage.total_tokens);
    }

    #[test]
    fn embeddings_rows_sorted_by_index() {
        let response: EmbeddingsResponse = serde_json::from_value(serde_json::json!({
            "object": "list",
            "model": "text-embedding-3-small",
            "data": [
                {"object": "embedding", "index": 1, "embedding": [0.2]},
                {"object": "embedding", "index": 0, "embedding": [0.1]}
            ],
            "usage": {"prompt_tokens": 4, "total_tokens": 4}
        }))
        .unwrap();
        let unified = decode_embeddings_response(response).unwrap();
        assert_eq!(unified.embeddings.as_ref().unwrap()[0], vec![0.1_f32]);
    }
}
