// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! The OpenAI `/chat/completions` request/response/chunk wire types this
//! gateway speaks. Deliberately a narrower subset than the upstream API:
//! no function-calling/tool_choice fields, since tool use here is mediated
//! entirely by the harness and surfaced separately via the tool event
//! stream, not echoed back through the chat-completions wire shape.

use serde::{Deserialize, Serialize};

#[derive(Debug, Clone, Deserialize)]
pub struct ChatCompletionRequest {
    pub model: String,
    pub messages: Vec<OaiMessage>,
    #[serde(default)]
    pub stream: bool,
}

#[derive(Debug, Clone, Deserialize)]
pub struct OaiMessage {
    pub role: String,
    pub content: Option<MessageContent>,
}

/// A message's `content`, either the common plain-string shape or the
/// array-of-parts shape (vision/multi-part messages use the latter even
/// when every part is text).
#[derive(Debug, Clone, Deserialize)]
#[serde(untagged)]
pub enum MessageContent {
    Text(String),
    Parts(Vec<ContentPart>),
}

#[derive(Debug, Clone, Deserialize)]
pub struct ContentPart {
    #[serde(rename = "type")]
    pub kind: String,
    #[serde(default)]
    pub text: Option<String>,
}

impl MessageContent {
    /// Flatten to plain text: the string form as-is, or every `text` part
    /// joined with newlines in order, dropping non-text parts (e.g.
    /// `image_url`) entirely.
    pub fn as_text(&self) -> String {
        match self {
            MessageContent::Text(s) => s.clone(),
            MessageContent::Parts(parts) => parts
                .iter()
                .filter(|p| p.kind == "text")
                .filter_map(|p| p.text.as_deref())
                .collect::<Vec<_>>()
                .join("\n"),
        }
    }
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionResponse {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<Choice>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub usage: Option<OaiUsage>,
}

#[derive(Debug, Serialize)]
pub struct Choice {
    pub index: usize,
    pub message: OaiResponseMessage,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize)]
pub struct OaiResponseMessage {
    pub role: String,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[derive(Debug, Serialize, Clone, Copy)]
pub struct OaiUsage {
    pub prompt_tokens: u64,
    pub completion_tokens: u64,
    pub total_tokens: u64,
}

#[derive(Debug, Serialize)]
pub struct ChatCompletionChunk {
    pub id: String,
    pub object: &'static str,
    pub created: i64,
    pub model: String,
    pub choices: Vec<ChunkChoice>,
}

#[derive(Debug, Serialize)]
pub struct ChunkChoice {
    pub index: usize,
    pub delta: ChunkDelta,
    pub finish_reason: Option<String>,
}

#[derive(Debug, Serialize, Default)]
pub struct ChunkDelta {
    #[serde(skip_serializing_if = "Option::is_none")]
    pub role: Option<String>,
    #[serde(skip_serializing_if = "Option::is_none")]
    pub content: Option<String>,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn request_deserializes_minimal_shape() {
        let json = r#"{"model":"agent-1","messages":[{"role":"user","content":"hi"}]}"#;
        let req: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        assert_eq!(req.model, "agent-1");
        assert!(!req.stream);
    }

    #[test]
    fn request_deserializes_array_content_joining_text_parts() {
        let json = r#"{"model":"agent-1","messages":[{"role":"user","content":[
            {"type":"text","text":"first"},
            {"type":"image_url","image_url":{"url":"http://example.com/x.png"}},
            {"type":"text","text":"second"}
        ]}]}"#;
        let req: ChatCompletionRequest = serde_json::from_str(json).unwrap();
        let content = req.messages[0].content.as_ref().unwrap();
        assert_eq!(content.as_text(), "first\nsecond");
    }

    #[test]
    fn response_omits_usage_when_none() {
        let resp = ChatCompletionResponse {
            id: "chatcmpl-1".into(),
            object: "chat.completion",
            created: 0,
            model: "agent-1".into(),
            choices: vec![],
            usage: None,
        };
        let json = serde_json::to_string(&resp).unwrap();
        assert!(!json.contains("usage"));
    }
}
