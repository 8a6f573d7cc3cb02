// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use serde::{Deserialize, Serialize};

/// Commands the gateway sends down the harness WebSocket.
///
/// Only the last user message of a turn is ever sent — the harness keeps
/// its own conversation state in container memory, so prior turns are
/// never resent.
#[derive(Debug, Clone, Serialize, Deserialize, PartialEq, Eq)]
#[serde(tag = "type", rename_all = "snake_case")]
pub enum HarnessCommand {
    /// A single user turn, already flattened to plain text by the
    /// translator (text parts of a multi-part OpenAI message concatenated).
    UserMessage { text: String },
    /// Cooperative cancellation request for the turn in flight. The harness
    /// is expected to stop generating and emit a terminal event, but the
    /// gateway does not force the container to respond by any deadline.
    Interrupt,
    /// Best-effort graceful shutdown request, sent before the gateway closes
    /// the socket and tears the container down.
    Shutdown,
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn interrupt_serializes_to_bare_type_tag() {
        let json = serde_json::to_string(&HarnessCommand::Interrupt).unwrap();
        assert_eq!(json, r#"{"type":"interrupt"}"#);
    }

    #[test]
    fn user_message_round_trips() {
        let cmd = HarnessCommand::UserMessage {
            text: "hi there".into(),
        };
        let json = serde_json::to_string(&cmd).unwrap();
        let back: HarnessCommand = serde_json::from_str(&json).unwrap();
        assert_eq!(cmd, back);
    }
}
