use rad_protocol::openai::chat::{
    ChatChunkObject, ChatCompletionChunk, ChatRole, ChunkChoice, ChunkDelta,
    FinishReason as WireFinishReason, FunctionCallChunk, ToolCallChunk, ToolCallType,
    Usage as WireUsage,
};

use crate::openai::response::encode_finish_reason;
use crate::types::{FinishReason, Role, UnifiedStreamEvent, Usage};

/// Adapter-side state: provider delta chunks → unified events. The wire
/// already carries deltas, so this mostly tracks role/finish emission and
/// folds the trailing usage-only chunk into the finish event.
#[derive(Debug, Default)]
pub struct ChunkReader {
    role_emitted: bool,
    finish_seen: Option<FinishReason>,
    finish_emitted: bool,
}

impl ChunkReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&mut self, chunk: ChatCompletionChunk) -> Vec<UnifiedStreamEvent> {
        let mut events = Vec::new();
        let usage = chunk
            .usage
            .map(|usage| Usage::from_tokens(usage.prompt_tokens, usage.completion_tokens));

        if let Some(choice) = chunk.choices.into_iter().next() {
            if choice.delta.role.is_some() && !self.role_emitted {
                self.role_emitted = true;
                events.push(UnifiedStreamEvent::RoleStart {
                    role: Role::Assistant,
                });
            }
            if let Some(text) = choice.delta.content
                && !text.is_empty()
            {
                if !self.role_emitted {
                    self.role_emitted = true;
                    events.insert(
                        0,
                        UnifiedStreamEvent::RoleStart {
                            role: Role::Assistant,
                        },
                    );
                }
                events.push(UnifiedStreamEvent::ContentDelta { text });
            }
            for call in choice.delta.tool_calls.unwrap_or_default() {
                events.push(UnifiedStreamEvent::ToolCallDelta {
                    index: call.index,
                    id: call.id,
                    name: call.function.as_ref().and_then(|f| f.name.clone()),
                    args_delta: call.function.and_then(|f| f.arguments),
                });
            }
            if let Some(reason) = choice.finish_reason {
                self.finish_seen = Some(decode_finish_reason(reason));
            }
        }

        // Usage may arrive on the finish chunk or on a trailing chunk with
        // no choices; emit the finish event once either way.
        if let Some(usage) = usage {
            if let Some(reason) = self.finish_seen.take() {
                self.finish_emitted = true;
                events.push(UnifiedStreamEvent::FinishReason {
                    reason,
                    usage: Some(usage),
                });
            } else if !self.finish_emitted {
                self.finish_emitted = true;
                events.push(UnifiedStreamEvent::FinishReason {
                    reason: FinishReason::Stop,
                    usage: Some(usage),
                });
            }
        }

        events
    }

    /// Called on the `[DONE]` marker. Flushes a pending finish reason when
    /// the upstream never sent a usage chunk.
    pub fn done(&mut self) -> Vec<UnifiedStreamEvent> {
        let mut events = Vec::new();
        if !self.finish_emitted {
            self.finish_emitted = true;
            events.push(UnifiedStreamEvent::FinishReason {
                reason: self.finish_seen.take().unwrap_or(FinishReason::Stop),
                usage: None,
            });
        }
        events.push(UnifiedStreamEvent::Done);
        events
    }
}

fn decode_finish_reason(reason: WireFinishReason) -> FinishReason {
    match reason {
        WireFinishReason::Stop => FinishReason::Stop,
        WireFinishReason::Length => FinishReason::Length,
        WireFinishReason::ContentFilter => FinishReason::ContentFilter,
        WireFinishReason::ToolCalls => FinishReason::ToolCall,
    }
}

/// Façade-side state: unified events → chat-completion chunks for clients
/// that spoke the OpenAI protocol. The caller appends `data: [DONE]`.
#[derive(Debug)]
pub struct ChunkWriter {
    id: String,
    model: String,
    created: i64,
}

impl ChunkWriter {
    pub fn new(id: String, model: String, created: i64) -> Self {
        Self { id, model, created }
    }

    pub fn write(&mut self, event: &UnifiedStreamEvent) -> Option<ChatCompletionChunk> {
        match event {
            UnifiedStreamEvent::RoleStart { .. } => Some(self.chunk(
                ChunkDelta {
                    role: Some(ChatRole::Assistant),
                    ..ChunkDelta::default()
                },
                None,
                None,
            )),
            UnifiedStreamEvent::ContentDelta { text } => Some(self.chunk(
                ChunkDelta {
                    content: Some(text.clone()),
                    ..ChunkDelta::default()
                },
                None,
                None,
            )),
            UnifiedStreamEvent::ToolCallDelta {
                index,
                id,
                name,
                args_delta,
            } => Some(self.chunk(
                ChunkDelta {
                    tool_calls: Some(vec![ToolCallChunk {
                        index: *index,
                        id: id.clone(),
                        r#type: Some(ToolCallType::Function),
                        function: Some(FunctionCallChunk {
                            name: name.clone(),
                            arguments: args_delta.clone(),
                        }),
                    }]),
                    ..ChunkDelta::default()
                },
                None,
                None,
            )),
            UnifiedStreamEvent::FinishReason { reason, usage } => Some(self.chunk(
                ChunkDelta::default(),
                Some(encode_finish_reason(*reason)),
                usage.map(|usage| WireUsage {
                    prompt_tokens: usage.prompt_tokens,
                    completion_tokens: usage.completion_tokens,
                    total_tokens: usage.total_tokens,
                }),
            )),
            // `[DONE]` is a wire marker, not a chunk; errors use the error
            // envelope, handled by the façade.
            UnifiedStreamEvent::Done | UnifiedStreamEvent::Error { .. } => None,
        }
    }

    fn chunk(
        &self,
        delta: ChunkDelta,
        finish_reason: Option<WireFinishReason>,
        usage: Option<WireUsage>,
    ) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: ChatChunkObject::ChatCompletionChunk,
            created: self.created,
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
            usage,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(json: serde_json::Value) -> ChatCompletionChunk {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn reader_maps_deltas_and_finish() {
        let mut reader = ChunkReader::new();

        let events = reader.read(chunk(serde_json::json!({
            "id": "c", "object": "chat.completion.chunk", "created": 0, "model": "m",
            "choices": [{"index": 0, "delta": {"role": "assistant", "content": "He"}}]
        })));
        assert_eq!(events.len(), 2);
        assert!(matches!(events[0], UnifiedStreamEvent::RoleStart { .. }));
        assert!(matches!(&events[1], UnifiedStreamEvent::ContentDelta { text } if text == "He"));

        let events = reader.read(chunk(serde_json::json!({
            "id": "c", "object": "chat.completion.chunk", "created": 0, "model": "m",
            "choices": [{"index": 0, "delta": {}, "finish_reason": "stop"}],
            "usage": {"prompt_tokens": 2, "completion_tokens": 1, "total_tokens": 3}
        })));
        assert_eq!(events.len(), 1);
        match &events[0] {
            UnifiedStreamEvent::FinishReason { reason, usage } => {
                assert_eq!(*reason, FinishReason::Stop);
                assert_eq!(usage.unwrap().total_tokens, 3);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let events = reader.done();
        assert_eq!(events, vec![UnifiedStreamEvent::Done]);
    }

    #[test]
    fn reader_flushes_finish_on_done_without_usage() {
        let mut reader = ChunkReader::new();
        reader.read(chunk(serde_json::json!({
            "id": "c", "object": "chat.completion.chunk", "created": 0, "model": "m",
            "choices": [{"index": 0, "delta": {"content": "x"}, "finish_reason": "length"}]
        })));
        let events = reader.done();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            UnifiedStreamEvent::FinishReason {
                reason: FinishReason::Length,
                usage: None
            }
        ));
        assert_eq!(events[1], UnifiedStreamEvent::Done);
    }

    #[test]
    fn writer_emits_protocol_chunks() {
        let mut writer = ChunkWriter::new("id-1".into(), "gpt-x".into(), 7);

        let role = writer
            .write(&UnifiedStreamEvent::RoleStart {
                role: Role::Assistant,
            })
            .unwrap();
        assert_eq!(role.choices[0].delta.role, Some(ChatRole::Assistant));

        let delta = writer
            .write(&UnifiedStreamEvent::ContentDelta { text: "hi".into() })
            .unwrap();
        assert_eq!(delta.choices[0].delta.content.as_deref(), Some("hi"));

        let finish = writer
            .write(&UnifiedStreamEvent::FinishReason {
                reason: FinishReason::Stop,
                usage: Some(Usage::from_tokens(1, 2)),
            })
            .unwrap();
        assert_eq!(
            finish.choices[0].finish_reason,
            Some(WireFinishReason::Stop)
        );
        assert_eq!(finish.usage.unwrap().total_tokens, 3);

        assert!(writer.write(&UnifiedStreamEvent::Done).is_none());
    }

    #[test]
    fn stream_concatenation_matches_full_content() {
        let mut reader = ChunkReader::new();
        let mut collected = String::new();
        for piece in ["Hel", "lo ", "world"] {
            for event in reader.read(chunk(serde_json::json!({
                "id": "c", "object": "chat.completion.chunk", "created": 0, "model": "m",
                "choices": [{"index": 0, "delta": {"content": piece}}]
            }))) {
                if let UnifiedStreamEvent::ContentDelta { text } = event {
                    collected.push_str(&text);
                }
            }
        }
        assert_eq!(collected, "Hello world");
    }
}
