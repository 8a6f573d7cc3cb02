// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! OpenAI `/chat/completions` wire format, and translation to and from the
//! harness protocol's [`HarnessCommand`]/[`HarnessEvent`].
//!
//! Grounded on the OpenAI-compatible shim pattern seen elsewhere in the
//! retrieval pack: the same request/response/chunk shapes, the same
//! non-streaming-accumulate vs. streaming-forward split, adapted here to
//! translate against a single harness turn instead of a local LLM call.

pub mod wire;

use agcluster_protocol::{HarnessCommand, HarnessEvent};
use chrono::Utc;
use uuid::Uuid;

pub use wire::{
    ChatCompletionChunk, ChatCompletionRequest, ChatCompletionResponse, Choice, ChunkChoice,
    ChunkDelta, MessageContent, OaiMessage, OaiResponseMessage, OaiUsage,
};

/// Generate an OpenAI-shaped completion id, e.g. `chatcmpl-<uuid>`.
pub fn completion_id() -> String {
    format!("chatcmpl-{}", Uuid::new_v4().simple())
}

/// Unix seconds for the `created` field.
pub fn unix_timestamp() -> i64 {
    Utc::now().timestamp()
}

/// Extract the text to send to the harness for this turn: the last `user`
/// message's content. Earlier turns are assumed already reflected in the
/// harness's own conversation state (the harness, not this gateway, owns
/// multi-turn context) — this gateway is a relay, not a history store.
///
/// `None` only when no `user` message is present at all; a `user` message
/// with empty or absent content still yields `Some(String::new())` so the
/// turn still runs.
pub fn extract_user_turn(req: &ChatCompletionRequest) -> Option<String> {
    req.messages
        .iter()
        .rev()
        .find(|m| m.role == "user")
        .map(|m| m.content.as_ref().map(MessageContent::as_text).unwrap_or_default())
}

/// Build the harness command for one chat-completions turn.
pub fn to_harness_command(req: &ChatCompletionRequest) -> Result<HarnessCommand, TranslateError> {
    let text = extract_user_turn(req).ok_or(TranslateError::NoUserMessage)?;
    Ok(HarnessCommand::UserMessage { text })
}

#[derive(Debug, thiserror::Error)]
pub enum TranslateError {
    #[error("no user message found in the request")]
    NoUserMessage,
    #[error("turn ended without a final content event")]
    TurnEndedWithoutContent,
}

/// Accumulates one non-streaming turn's events into a [`ChatCompletionResponse`].
///
/// Content events are concatenated as they arrive; the turn closes on the
/// `metadata` event carrying `final_content` (`HarnessEvent::is_end_of_turn`).
/// If the harness's `final_content` differs from the concatenated stream
/// (e.g. the harness re-synthesizes a cleaned-up final answer), the
/// `final_content` wins — it is the harness's authoritative statement of
/// what this turn produced.
#[derive(Debug, Default)]
pub struct NonStreamAccumulator {
    content: String,
    model: String,
    id: String,
}

impl NonStreamAccumulator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            content: String::new(),
            model: model.into(),
            id: completion_id(),
        }
    }

    /// Feed one harness event. Returns `Some(response)` once the turn ends.
    pub fn push(&mut self, event: &HarnessEvent) -> Option<ChatCompletionResponse> {
        match event {
            HarnessEvent::Content { text, .. } => {
                self.content.push_str(text);
                None
            }
            HarnessEvent::Metadata { final_content, usage, .. } if event.is_end_of_turn() => {
                let content = final_content.clone().unwrap_or_else(|| self.content.clone());
                let usage = usage.as_ref().map(|u| OaiUsage {
                    prompt_tokens: u.input_tokens,
                    completion_tokens: u.output_tokens,
                    total_tokens: u.input_tokens + u.output_tokens,
                });
                Some(ChatCompletionResponse {
                    id: self.id.clone(),
                    object: "chat.completion",
                    created: unix_timestamp(),
                    model: self.model.clone(),
                    choices: vec![Choice {
                        index: 0,
                        message: OaiResponseMessage {
                            role: "assistant".to_string(),
                            content: Some(content),
                        },
                        finish_reason: Some("stop".to_string()),
                    }],
                    usage: Some(usage.unwrap_or(OaiUsage {
                        prompt_tokens: 0,
                        completion_tokens: 0,
                        total_tokens: 0,
                    })),
                })
            }
            _ => None,
        }
    }
}

/// Turns one harness event into zero or more streaming chunks. The first
/// `content` event of a turn is preceded by a role-announcing chunk (OpenAI
/// streaming clients expect `delta.role` once, up front); the closing
/// `metadata` event emits an empty-delta chunk with `finish_reason="stop"`.
pub struct StreamTranslator {
    id: String,
    model: String,
    sent_role: bool,
}

impl StreamTranslator {
    pub fn new(model: impl Into<String>) -> Self {
        Self {
            id: completion_id(),
            model: model.into(),
            sent_role: false,
        }
    }

    pub fn id(&self) -> &str {
        &self.id
    }

    /// Translate one harness event into the chunks it produces, in order.
    /// `Content`/`Thinking` map to content deltas; the end-of-turn
    /// `Metadata` event maps to the closing chunk. Everything else
    /// (`tool_start`, `tool_complete`, `todo_update`, `system`, `Unknown`)
    /// has no OpenAI chat-completions representation and produces nothing —
    /// callers that want that detail subscribe to the tool event stream
    /// instead.
    pub fn translate(&mut self, event: &HarnessEvent) -> Vec<ChatCompletionChunk> {
        let mut chunks = Vec::new();
        match event {
            HarnessEvent::Content { text, .. } | HarnessEvent::Thinking { text, .. } => {
                if !self.sent_role {
                    chunks.push(self.chunk(ChunkDelta {
                        role: Some("assistant".to_string()),
                        content: None,
                    }, None));
                    self.sent_role = true;
                }
                chunks.push(self.chunk(
                    ChunkDelta {
                        role: None,
                        content: Some(text.clone()),
                    },
                    None,
                ));
            }
            _ if event.is_end_of_turn() => {
                chunks.push(self.chunk(ChunkDelta::default(), Some("stop".to_string())));
            }
            _ => {}
        }
        chunks
    }

    fn chunk(&self, delta: ChunkDelta, finish_reason: Option<String>) -> ChatCompletionChunk {
        ChatCompletionChunk {
            id: self.id.clone(),
            object: "chat.completion.chunk",
            created: unix_timestamp(),
            model: self.model.clone(),
            choices: vec![ChunkChoice {
                index: 0,
                delta,
                finish_reason,
            }],
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use agcluster_protocol::{HarnessUsage, SystemPhase};

    fn req(messages: Vec<(&str, &str)>) -> ChatCompletionRequest {
        ChatCompletionRequest {
            model: "agent-1".to_string(),
            messages: messages
                .into_iter()
                .map(|(role, content)| OaiMessage {
                    role: role.to_string(),
                    content: Some(MessageContent::Text(content.to_string())),
                })
                .collect(),
            stream: false,
        }
    }

    #[test]
    fn extracts_last_user_message() {
        let r = req(vec![
            ("system", "be terse"),
            ("user", "first"),
            ("assistant", "ok"),
            ("user", "second"),
        ]);
        assert_eq!(extract_user_turn(&r), Some("second".to_string()));
    }

    #[test]
    fn empty_content_still_produces_a_completed_turn() {
        let r = req(vec![("user", "")]);
        let cmd = to_harness_command(&r).unwrap();
        assert_eq!(cmd, HarnessCommand::UserMessage { text: String::new() });
    }

    #[test]
    fn no_user_message_is_an_error() {
        let r = req(vec![("system", "be terse")]);
        assert!(matches!(
            to_harness_command(&r),
            Err(TranslateError::NoUserMessage)
        ));
    }

    #[test]
    fn to_harness_command_builds_user_message() {
        let r = req(vec![("user", "hello")]);
        let cmd = to_harness_command(&r).unwrap();
        assert_eq!(cmd, HarnessCommand::UserMessage { text: "hello".into() });
    }

    #[test]
    fn non_stream_accumulator_concatenates_and_closes_on_metadata() {
        let mut acc = NonStreamAccumulator::new("agent-1");
        assert!(acc
            .push(&HarnessEvent::System {
                phase: SystemPhase::Ready,
                timestamp: "t".into()
            })
            .is_none());
        assert!(acc
            .push(&HarnessEvent::Content {
                text: "Hello, ".into(),
                timestamp: "t".into()
            })
            .is_none());
        assert!(acc
            .push(&HarnessEvent::Content {
                text: "world!".into(),
                timestamp: "t".into()
            })
            .is_none());
        let resp = acc
            .push(&HarnessEvent::Metadata {
                final_content: Some("Hello, world!".into()),
                cost: Some(0.001),
                duration_ms: Some(42),
                usage: Some(HarnessUsage {
                    input_tokens: 5,
                    output_tokens: 7,
                    cache_read_tokens: 0,
                    cache_write_tokens: 0,
                }),
                timestamp: "t".into(),
            })
            .expect("metadata carrying final_content ends the turn");
        assert_eq!(
            resp.choices[0].message.content.as_deref(),
            Some("Hello, world!")
        );
        assert_eq!(resp.choices[0].finish_reason.as_deref(), Some("stop"));
        assert_eq!(resp.usage.unwrap().total_tokens, 12);
    }

    #[test]
    fn harness_final_content_overrides_concatenated_stream() {
        let mut acc = NonStreamAccumulator::new("agent-1");
        acc.push(&HarnessEvent::Content {
            text: "draft".into(),
            timestamp: "t".into(),
        });
        let resp = acc
            .push(&HarnessEvent::Metadata {
                final_content: Some("polished answer".into()),
                cost: None,
                duration_ms: None,
                usage: None,
                timestamp: "t".into(),
            })
            .unwrap();
        assert_eq!(
            resp.choices[0].message.content.as_deref(),
            Some("polished answer")
        );
    }

    #[test]
    fn stream_translator_sends_role_once_then_content_then_stop() {
        let mut t = StreamTranslator::new("agent-1");
        let chunks = t.translate(&HarnessEvent::Content {
            text: "hi".into(),
            timestamp: "t".into(),
        });
        assert_eq!(chunks.len(), 2);
        assert_eq!(chunks[0].choices[0].delta.role.as_deref(), Some("assistant"));
        assert_eq!(chunks[1].choices[0].delta.content.as_deref(), Some("hi"));

        let chunks2 = t.translate(&HarnessEvent::Content {
            text: " there".into(),
            timestamp: "t".into(),
        });
        assert_eq!(chunks2.len(), 1, "role is only sent once per stream");

        let closing = t.translate(&HarnessEvent::Metadata {
            final_content: Some("hi there".into()),
            cost: None,
            duration_ms: None,
            usage: None,
            timestamp: "t".into(),
        });
        assert_eq!(closing.len(), 1);
        assert_eq!(closing[0].choices[0].finish_reason.as_deref(), Some("stop"));
    }

    #[test]
    fn tool_events_produce_no_chat_completion_chunks() {
        let mut t = StreamTranslator::new("agent-1");
        let chunks = t.translate(&HarnessEvent::ToolStart {
            name: "bash".into(),
            use_id: "call-1".into(),
            input: serde_json::json!({"cmd": "ls"}),
            timestamp: "t".into(),
        });
        assert!(chunks.is_empty());
    }
}
