use serde_json::Value as JsonValue;

use rad_protocol::gemini::generate::{
    Candidate, Content, FinishReason as WireFinishReason, FunctionCallPart, GenerateContentResponse,
    Part, ROLE_MODEL, UsageMetadata,
};

use crate::error::TransformError;
use crate::types::{FinishReason, ToolCall, UnifiedResponse, Usage};

/// Adapter decode: generateContent response into the unified shape. Only the
/// first candidate is consulted.
pub fn decode_generate_response(
    response: GenerateContentResponse,
) -> Result<UnifiedResponse, TransformError> {
    let candidate = response
        .candidates
        .into_iter()
        .next()
        .ok_or_else(|| TransformError::Invalid("response carried no candidates".into()))?;

    let mut content = String::new();
    let mut tool_calls = Vec::new();
    if let Some(body) = &candidate.content {
        for part in &body.parts {
            match part {
                Part::Text { text } => content.push_str(text),
                Part::FunctionCall { function_call } => tool_calls.push(ToolCall {
                    id: function_call.name.clone(),
                    name: function_call.name.clone(),
                    arguments: function_call
                        .args
                        .clone()
                        .unwrap_or(JsonValue::Object(serde_json::Map::new()))
                        .to_string(),
                }),
                Part::FunctionResponse { .. } | Part::InlineData { .. } => {}
            }
        }
    }

    let finish_reason = match candidate.finish_reason {
        Some(reason) => decode_finish_reason(reason),
        None if !tool_calls.is_empty() => FinishReason::ToolCall,
        None => FinishReason::Stop,
    };

    let usage = response
        .usage_metadata
        .map(|metadata| {
            Usage::from_tokens(
                metadata.prompt_token_count.unwrap_or(0),
                metadata.candidates_token_count.unwrap_or(0),
            )
        })
        .unwrap_or_default();

    Ok(UnifiedResponse {
        id: response.response_id.unwrap_or_default(),
        model: response.model_version.unwrap_or_default(),
        created_unix: 0,
        finish_reason,
        content,
        tool_calls,
        usage,
        embeddings: None,
    })
}

/// Façade encode: unified result in the generateContent envelope.
pub fn encode_generate_response(unified: &UnifiedResponse) -> GenerateContentResponse {
    let mut parts = Vec::new();
    if !unified.content.is_empty() {
        parts.push(Part::Text {
            text: unified.content.clone(),
        });
    }
    for call in &unified.tool_calls {
        parts.push(Part::FunctionCall {
            function_call: FunctionCallPart {
                name: call.name.clone(),
                args: serde_json::from_str(&call.arguments).ok(),
            },
        });
    }

    GenerateContentResponse {
        candidates: vec![Candidate {
            content: Some(Content {
                role: Some(ROLE_MODEL.to_string()),
                parts,
            }),
            finish_reason: Some(encode_finish_reason(unified.finish_reason)),
            index: Some(0),
        }],
        usage_metadata: Some(UsageMetadata {
            prompt_token_count: Some(unified.usage.prompt_tokens),
            candidates_token_count: Some(unified.usage.completion_tokens),
            total_token_count: Some(unified.usage.total_tokens),
        }),
        prompt_feedback: None,
        model_version: Some(unified.model.clone()),
        response_id: if unified.id.is_empty() {
            None
        } else {
            Some(unified.id.clone())
        },
    }
}

/// Safety and recitation stops always surface as content_filter.
pub fn decode_finish_reason(reason: WireFinishReason) -> FinishReason {
    match reason {
        WireFinishReason::Stop | WireFinishReason::Unspecified => FinishReason::Stop,
        WireFinishReason::MaxTokens => FinishReason::Length,
        WireFinishReason::Safety | WireFinishReason::Recitation => FinishReason::ContentFilter,
        WireFinishReason::Other => FinishReason::Error,
    }
}

pub fn encode_finish_reason(reason: FinishReason) -> WireFinishReason {
    match reason {
        FinishReason::Stop | FinishReason::ToolCall => WireFinishReason::Stop,
        FinishReason::Length => WireFinishReason::MaxTokens,
        FinishReason::ContentFilter => WireFinishReason::Safety,
        FinishReason::Error => WireFinishReason::Other,
    }
}
