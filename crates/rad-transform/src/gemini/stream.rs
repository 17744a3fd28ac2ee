use serde_json::Value as JsonValue;

use rad_protocol::gemini::generate::{
    Candidate, Content, FunctionCallPart, GenerateContentResponse, Part, ROLE_MODEL, UsageMetadata,
};

use crate::gemini::response::{decode_finish_reason, encode_finish_reason};
use crate::types::{FinishReason, Role, UnifiedStreamEvent, Usage};

/// Adapter-side state: cumulative generateContent chunks → unified deltas.
/// The wire repeats the full candidate text in every chunk; `emitted` is the
/// byte offset of text already forwarded, and only the suffix past it is
/// emitted (monotonic, never rewinds).
#[derive(Debug, Default)]
pub struct GenerateChunkReader {
    emitted: usize,
    role_emitted: bool,
    finish_emitted: bool,
    tool_calls_seen: u32,
}

impl GenerateChunkReader {
    pub fn new() -> Self {
        Self::default()
    }

    pub fn read(&mut self, chunk: GenerateContentResponse) -> Vec<UnifiedStreamEvent> {
        let mut events = Vec::new();
        let Some(candidate) = chunk.candidates.into_iter().next() else {
            return events;
        };

        if !self.role_emitted {
            self.role_emitted = true;
            events.push(UnifiedStreamEvent::RoleStart {
                role: Role::Assistant,
            });
        }

        if let Some(content) = &candidate.content {
            let cumulative = content.joined_text();
            if cumulative.len() > self.emitted {
                let text = cumulative[self.emitted..].to_string();
                self.emitted = cumulative.len();
                events.push(UnifiedStreamEvent::ContentDelta { text });
            }

            for part in &content.parts {
                if let Part::FunctionCall { function_call } = part {
                    let index = self.tool_calls_seen;
                    self.tool_calls_seen += 1;
                    events.push(UnifiedStreamEvent::ToolCallDelta {
                        index,
                        id: Some(function_call.name.clone()),
                        name: Some(function_call.name.clone()),
                        args_delta: Some(
                            function_call
                                .args
                                .clone()
                                .unwrap_or(JsonValue::Object(serde_json::Map::new()))
                                .to_string(),
                        ),
                    });
                }
            }
        }

        if let Some(reason) = candidate.finish_reason
            && !self.finish_emitted
        {
            self.finish_emitted = true;
            let usage = chunk.usage_metadata.map(|metadata| {
                Usage::from_tokens(
                    metadata.prompt_token_count.unwrap_or(0),
                    metadata.candidates_token_count.unwrap_or(0),
                )
            });
            events.push(UnifiedStreamEvent::FinishReason {
                reason: decode_finish_reason(reason),
                usage,
            });
        }

        events
    }

    /// Upstream EOF. The final chunk carries the finish reason on this wire,
    /// so normally only `Done` remains to be emitted.
    pub fn finish(&mut self) -> Vec<UnifiedStreamEvent> {
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
}

/// Façade-side state: unified events → cumulative generateContent chunks for
/// clients that spoke the Gemini protocol. Mirrors the wire's cumulative
/// model: each chunk carries the full text so far; the final chunk carries
/// the finish reason and usage.
#[derive(Debug)]
pub struct GenerateChunkWriter {
    model: String,
    accumulated: String,
    pending_calls: Vec<FunctionCallPart>,
}

impl GenerateChunkWriter {
    pub fn new(model: String) -> Self {
        Self {
            model,
            accumulated: String::new(),
            pending_calls: Vec::new(),
        }
    }

    pub fn write(&mut self, event: &UnifiedStreamEvent) -> Option<GenerateContentResponse> {
        match event {
            UnifiedStreamEvent::RoleStart { .. } => None,
            UnifiedStreamEvent::ContentDelta { text } => {
                self.accumulated.push_str(text);
                Some(self.chunk(None, None))
            }
            UnifiedStreamEvent::ToolCallDelta {
                name, args_delta, ..
            } => {
                // Tool arguments arrive whole on this wire; partial deltas
                // accumulate onto the last opened call.
                if let Some(name) = name {
                    self.pending_calls.push(FunctionCallPart {
                        name: name.clone(),
                        args: args_delta
                            .as_deref()
                            .and_then(|args| serde_json::from_str(args).ok()),
                    });
                } else if let (Some(last), Some(args)) =
                    (self.pending_calls.last_mut(), args_delta.as_deref())
                    && last.args.is_none()
                {
                    last.args = serde_json::from_str(args).ok();
                }
                None
            }
            UnifiedStreamEvent::FinishReason { reason, usage } => {
                Some(self.chunk(Some(*reason), *usage))
            }
            UnifiedStreamEvent::Done | UnifiedStreamEvent::Error { .. } => None,
        }
    }

    fn chunk(
        &mut self,
        finish: Option<FinishReason>,
        usage: Option<Usage>,
    ) -> GenerateContentResponse {
        let mut parts = Vec::new();
        if !self.accumulated.is_empty() {
            parts.push(Part::Text {
                text: self.accumulated.clone(),
            });
        }
        if finish.is_some() {
            for call in self.pending_calls.drain(..) {
                parts.push(Part::FunctionCall {
                    function_call: call,
                });
            }
        }

        GenerateContentResponse {
            candidates: vec![Candidate {
                content: Some(Content {
                    role: Some(ROLE_MODEL.to_string()),
                    parts,
                }),
                finish_reason: finish.map(encode_finish_reason),
                index: Some(0),
            }],
            usage_metadata: usage.map(|usage| UsageMetadata {
                prompt_token_count: Some(usage.prompt_tokens),
                candidates_token_count: Some(usage.completion_tokens),
                total_token_count: Some(usage.total_tokens),
            }),
            prompt_feedback: None,
            model_version: Some(self.model.clone()),
            response_id: None,
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    fn chunk(json: serde_json::Value) -> GenerateContentResponse {
        serde_json::from_value(json).unwrap()
    }

    #[test]
    fn cumulative_chunks_become_deltas() {
        let mut reader = GenerateChunkReader::new();

        let events = reader.read(chunk(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hel"}]}}]
        })));
        assert!(matches!(events[0], UnifiedStreamEvent::RoleStart { .. }));
        assert!(matches!(&events[1], UnifiedStreamEvent::ContentDelta { text } if text == "Hel"));

        let events = reader.read(chunk(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello wor"}]}}]
        })));
        assert_eq!(events.len(), 1);
        assert!(matches!(&events[0], UnifiedStreamEvent::ContentDelta { text } if text == "lo wor"));

        // A repeated cumulative prefix must not re-emit.
        let events = reader.read(chunk(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "Hello wor"}]}}]
        })));
        assert!(events.is_empty());

        let events = reader.read(chunk(serde_json::json!({
            "candidates": [{
                "content": {"role": "model", "parts": [{"text": "Hello world"}]},
                "finishReason": "STOP"
            }],
            "usageMetadata": {"promptTokenCount": 4, "candidatesTokenCount": 3}
        })));
        assert_eq!(events.len(), 2);
        assert!(matches!(&events[0], UnifiedStreamEvent::ContentDelta { text } if text == "ld"));
        match &events[1] {
            UnifiedStreamEvent::FinishReason { reason, usage } => {
                assert_eq!(*reason, FinishReason::Stop);
                assert_eq!(usage.unwrap().total_tokens, 7);
            }
            other => panic!("unexpected event: {other:?}"),
        }

        assert_eq!(reader.finish(), vec![UnifiedStreamEvent::Done]);
    }

    #[test]
    fn finish_synthesized_on_eof_without_reason() {
        let mut reader = GenerateChunkReader::new();
        reader.read(chunk(serde_json::json!({
            "candidates": [{"content": {"role": "model", "parts": [{"text": "x"}]}}]
        })));
        let events = reader.finish();
        assert_eq!(events.len(), 2);
        assert!(matches!(
            events[0],
            UnifiedStreamEvent::FinishReason {
                reason: FinishReason::Stop,
                usage: None
            }
        ));
    }

    #[test]
    fn writer_emits_cumulative_text() {
        let mut writer = GenerateChunkWriter::new("gemini-1.5-pro".into());

        assert!(writer
            .write(&UnifiedStreamEvent::RoleStart {
                role: Role::Assistant
            })
            .is_none());

        let first = writer
            .write(&UnifiedStreamEvent::ContentDelta { text: "Hel".into() })
            .unwrap();
        assert_eq!(first.candidates[0].content.as_ref().unwrap().joined_text(), "Hel");

        let second = writer
            .write(&UnifiedStreamEvent::ContentDelta { text: "lo".into() })
            .unwrap();
        assert_eq!(
            second.candidates[0].content.as_ref().unwrap().joined_text(),
            "Hello"
        );

        let last = writer
            .write(&UnifiedStreamEvent::FinishReason {
                reason: FinishReason::Stop,
                usage: Some(Usage::from_tokens(1, 2)),
            })
            .unwrap();
        assert!(last.candidates[0].finish_reason.is_some());
        assert_eq!(
            last.usage_metadata.unwrap().total_token_count,
            Some(3)
        );
    }

    #[test]
    fn writer_reader_round_trip_recovers_deltas() {
        let mut writer = GenerateChunkWriter::new("m".into());
        let mut reader = GenerateChunkReader::new();
        let mut collected = String::new();

        for text in ["a", "bc", "def"] {
            let chunk = writer
                .write(&UnifiedStreamEvent::ContentDelta { text: text.into() })
                .unwrap();
            for event in reader.read(chunk) {
                if let UnifiedStreamEvent::ContentDelta { text } = event {
                    collected.push_str(&text);
                }
            }
        }
        assert_eq!(collected, "abcdef");
    }
}
