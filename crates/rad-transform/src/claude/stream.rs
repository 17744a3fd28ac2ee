use std::collections::BTreeMap;

use rad_protocol::claude::error::ErrorDetail;
use rad_protocol::claude::messages::{MessageRole, MessageType};
use rad_protocol::claude::stream::{
    ContentDelta, MessageDeltaBody, StreamContentBlock, StreamEvent, StreamMessage, StreamUsage,
};

use rad_common::ErrorKind;

use crate::claude::response::{decode_stop_reason, encode_stop_reason};
use crate::types::{FinishReason, Role, UnifiedStreamEvent, Usage};

/// Adapter-side state: collapses the typed Messages event taxonomy into the
/// unified sequence. Tracks prompt tokens from `message_start` so the final
/// finish event carries complete usage.
#[derive(Debug, Default)]
pub struct MessagesEventReader {
    input_tokens: u64,
    tool_indexes: BTreeMap<u32, u32>,
    next_tool_index: u32,
    finish_emitted: bool,
}

impl MessagesEventReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&mut self, event: StreamEvent) -> Vec<UnifiedStreamEvent> {
        match event {
            StreamEvent::MessageStart { message } => {
                self.input_tokens = message.usage.input_tokens.unwrap_or(0);
                vec![UnifiedStreamEvent::RoleStart {
                    role: Role::Assistant,
                }]
            }
            StreamEvent::ContentBlockStart {
                index,
                content_block,
            } => match content_block {
                StreamContentBlock::Text { text } if !text.is_empty() => {
                    vec![UnifiedStreamEvent::ContentDelta { text }]
                }
                StreamContentBlock::Text { .. } => Vec::new(),
                StreamContentBlock::ToolUse { id, name, .. } => {
                    let tool_index = self.tool_index(index);
                    vec![UnifiedStreamEvent::ToolCallDelta {
                        index: tool_index,
                        id: Some(id),
                        name: Some(name),
                        args_delta: None,
                    }]
                }
            },
            StreamEvent::ContentBlockDelta { index, delta } => match delta {
                ContentDelta::TextDelta { text } if !text.is_empty() => {
                    vec![UnifiedStreamEvent::ContentDelta { text }]
                }
                ContentDelta::TextDelta { .. } => Vec::new(),
                ContentDelta::InputJsonDelta { partial_json } => {
                    let tool_index = self.tool_index(index);
                    vec![UnifiedStreamEvent::ToolCallDelta {
                        index: tool_index,
                        id: None,
                        name: None,
                        args_delta: Some(partial_json),
                    }]
                }
            },
            StreamEvent::ContentBlockStop { .. } | StreamEvent::Ping => Vec::new(),
            StreamEvent::MessageDelta { delta, usage } => {
                let Some(stop_reason) = delta.stop_reason else {
                    return Vec::new();
                };
                self.finish_emitted = true;
                let usage = usage.map(|usage| {
                    Usage::from_tokens(
                        usage.input_tokens.unwrap_or(self.input_tokens),
                        usage.output_tokens.unwrap_or(0),
                    )
                });
                vec![UnifiedStreamEvent::FinishReason {
                    reason: decode_stop_reason(stop_reason),
                    usage,
                }]
            }
            StreamEvent::MessageStop => {
                let mut events = Vec::new();
                if !self.finish_emitted {
                    self.finish_emitted = true;
                    events.push(UnifiedStreamEvent::FinishReason {
                        reason: FinishReason::Stop,
                        usage: None,
                    });
                }
                events.push(UnifiedStreamEvent::Done);
                events
            }
            StreamEvent::Error { error } => vec![UnifiedStreamEvent::Error {
                kind: ErrorKind::UpstreamServerError,
                message: error.message,
            }],
        }
    }

    /// Claude indexes content blocks; tool calls get their own dense
    /// numbering in the unified stream.
    fn tool_index(&mut self, block_index: u32) -> u32 {
        if let Some(existing) = self.tool_indexes.get(&block_index) {
            return *existing;
        }
        let assigned = self.next_tool_index;
        self.next_tool_index += 1;
        self.tool_indexes.insert(block_index, assigned);
        assigned
    }
}

/// Façade-side state: unified events → typed Messages events for clients
/// that spoke the Anthropic protocol. Content blocks are synthesized: text
/// occupies block 0, each tool call opens the next block.
#[derive(Debug)]
pub struct MessagesEventWriter {
    id: String,
    model: String,
    text_block: Option<u32>,
    open_tool_block: Option<u32>,
    next_block_index: u32,
}

impl MessagesEventWriter {
    pub fn new(id: String, model: String) -> Self {
        Self {
            id,
            model,
            text_block: None,
            open_tool_block: None,
            next_block_index: 0,
        }
    }

    pub fn write(&mut self, event: &UnifiedStreamEvent) -> Vec<StreamEvent> {
        match event {
            UnifiedStreamEvent::RoleStart { .. } => vec![StreamEvent::MessageStart {
                message: StreamMessage {
                    id: self.id.clone(),
                    r#type: MessageType::Message,
                    role: MessageRole::Assistant,
                    model: self.model.clone(),
                    content: Vec::new(),
                    stop_reason: None,
                    stop_sequence: None,
                    usage: StreamUsage::default(),
                },
            }],
            UnifiedStreamEvent::ContentDelta { text } => {
                let mut events = Vec::new();
                let index = match self.text_block {
                    Some(index) => index,
                    None => {
                        let index = self.claim_block();
                        self.text_block = Some(index);
                        events.push(StreamEvent::ContentBlockStart {
                            index,
                            content_block: StreamContentBlock::Text {
                                text: String::new(),
                            },
                        });
                        index
                    }
                };
                events.push(StreamEvent::ContentBlockDelta {
                    index,
                    delta: ContentDelta::TextDelta { text: text.clone() },
                });
                events
            }
            UnifiedStreamEvent::ToolCallDelta {
                id,
                name,
                args_delta,
                ..
            } => {
                let mut events = Vec::new();
                if let (Some(id), Some(name)) = (id, name) {
                    if let Some(open) = self.open_tool_block.take() {
                        events.push(StreamEvent::ContentBlockStop { index: open });
                    }
                    let index = self.claim_block();
                    self.open_tool_block = Some(index);
                    events.push(StreamEvent::ContentBlockStart {
                        index,
                        content_block: StreamContentBlock::ToolUse {
                            id: id.clone(),
                            name: name.clone(),
                            input: serde_json::Map::new(),
                        },
                    });
                }
                if let Some(args) = args_delta
                    && let Some(index) = self.open_tool_block
                {
                    events.push(StreamEvent::ContentBlockDelta {
                        index,
                        delta: ContentDelta::InputJsonDelta {
                            partial_json: args.clone(),
                        },
                    });
                }
                events
            }
            UnifiedStreamEvent::FinishReason { reason, usage } => {
                let mut events = Vec::new();
                if let Some(open) = self.open_tool_block.take() {
                    events.push(StreamEvent::ContentBlockStop { index: open });
                }
                if let Some(index) = self.text_block.take() {
                    events.push(StreamEvent::ContentBlockStop { index });
                }
                events.push(StreamEvent::MessageDelta {
                    delta: MessageDeltaBody {
                        stop_reason: Some(encode_stop_reason(*reason)),
                        stop_sequence: None,
                    },
                    usage: usage.map(|usage| StreamUsage {
                        input_tokens: Some(usage.prompt_tokens),
                        output_tokens: Some(usage.completion_tokens),
                    }),
                });
                events
            }
            UnifiedStreamEvent::Done => vec![StreamEvent::MessageStop],
            UnifiedStreamEvent::Error { kind, message } => vec![StreamEvent::Error {
                error: ErrorDetail {
                    r#type: kind.as_str().to_string(),
                    message: message.clone(),
                },
            }],
        }
    }

    fn claim_block(&mut self) -> u32 {
        let index = self.next_block_index;
        self.next_block_index += 1;
        index
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn event(json: serde_json::Value) -> StreamEvent {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn reader_collapses_typed_events() {
        let mut reader = MessagesEventReader::new();

        let events = reader.read(event(serde_json::json!({
            "type": "message_start",
            "message": {
                "id": "msg_1", "type": "message", "role": "assistant",
                "model": "claude-3-5-sonnet", "content": [],
                "usage": {"input_tokens": 10}
            }
        })));
        assert_eq!(
            events,
            vec![UnifiedStreamEvent::RoleStart {
                role: Role::Assistant
            }]
        );

        let events = reader.read(event(serde_json::json!({
            "type": "content_block_delta", "index": 0,
            "delta": {"type": "text_delta", "text": "Hi"}
        })));
        assert_eq!(
            events,
            vec![UnifiedStreamEvent::ContentDelta { text: "Hi".into() }]
        );

        let events = reader.read(event(serde_json::json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn"},
            "usage": {"output_tokens": 5}
        })));
        match &events[0] {
            UnifiedStreamEvent::FinishReason { reason, usage } => {
                assert_eq!(*reason, FinishReason::Stop);
                // input tokens learned from message_start
                assert_eq!(usage.unwrap().prompt_tokens, 10);
                assert_eq!(usage.unwrap().completion_tokens, 5);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let events = reader.read(event(serde_json::json!({"type": "message_stop"})));
        assert_eq!(events, vec![UnifiedStreamEvent::Done]);
    }

    #[test]
    fn reader_emits_at_most_one_finish() {
        let mut reader = MessagesEventReader::new();
        reader.read(event(serde_json::json!({
            "type": "message_delta",
            "delta": {"stop_reason": "end_turn"}
        })));
        let events = reader.read(event(serde_json::json!({"type": "message_stop"})));
        // message_stop must not synthesize a second FinishReason.
        assert_eq!(events, vec![UnifiedStreamEvent::Done]);
    }

    #[test]
    fn reader_maps_tool_blocks_to_dense_indexes() {
        let mut reader = MessagesEventReader::new();
        let events = reader.read(event(serde_json::json!({
            "type": "content_block_start", "index": 3,
            "content_block": {"type": "tool_use", "id": "tu_1", "name": "f", "input": {}}
        })));
        match &events[0] {
            UnifiedStreamEvent::ToolCallDelta { index, id, name, .. } => {
                assert_eq!(*index, 0);
                assert_eq!(id.as_deref(), Some("tu_1"));
                assert_eq!(name.as_deref(), Some("f"));
            }
            other => panic!("unexpected event: {other:?}"),
        }
        let events = reader.read(event(serde_json::json!({
            "type": "content_block_delta", "index": 3,
            "delta": {"type": "input_json_delta", "partial_json": "{\"a\":"}
        })));
        assert!(matches!(
            &events[0],
            UnifiedStreamEvent::ToolCallDelta { index: 0, args_delta: Some(_), .. }
        ));
    }

    #[test]
    fn writer_produces_protocol_event_sequence() {
        let mut writer = MessagesEventWriter::new("msg_9".into(), "claude-3-5-sonnet".into());

        let start = writer.write(&UnifiedStreamEvent::RoleStart {
            role: Role::Assistant,
        });
        assert!(matches!(start[0], StreamEvent::MessageStart { .. }));

        let first_text = writer.write(&UnifiedStreamEvent::ContentDelta { text: "He".into() });
        assert_eq!(first_text.len(), 2);
        assert!(matches!(first_text[0], StreamEvent::ContentBlockStart { index: 0, .. }));
        assert!(matches!(first_text[1], StreamEvent::ContentBlockDelta { index: 0, .. }));

        let more = writer.write(&UnifiedStreamEvent::ContentDelta { text: "y".into() });
        assert_eq!(more.len(), 1);

        let finish = writer.write(&UnifiedStreamEvent::FinishReason {
            reason: FinishReason::Stop,
            usage: Some(Usage::from_tokens(2, 3)),
        });
        assert!(matches!(finish[0], StreamEvent::ContentBlockStop { index: 0 }));
        match &finish[1] {
            StreamEvent::MessageDelta { delta, usage } => {
                assert_eq!(
                    delta.stop_reason,
                    Some(rad_protocol::claude::messages::StopReason::EndTurn)
                );
                assert_eq!(usage.unwrap().output_tokens, Some(3));
            }
            other => panic!("unexpected event: {other:?}"),
        }

        let done = writer.write(&UnifiedStreamEvent::Done);
        assert_eq!(done, vec![StreamEvent::MessageStop]);
    }
}
