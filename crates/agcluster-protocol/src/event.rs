// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Events emitted up the harness WebSocket, and the [`ToolEvent`] derived
//! from them for the [`crate`]-external `ToolEventHub`.
//!
//! Every event carries an ISO-8601 `timestamp`. Event kinds this gateway
//! does not recognize are preserved (not dropped) as [`HarnessEvent::Unknown`]
//! so a newer harness can add event kinds without breaking older gateways —
//! callers that only care about `content`/`metadata` can ignore the rest.

use serde::{Deserialize, Serialize};
use serde_json::Value;

/// `system` event sub-kind.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SystemPhase {
    Init,
    Ready,
    Shutdown,
}

/// Token usage reported in a turn's closing `metadata` event.
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct HarnessUsage {
    #[serde(default)]
    pub input_tokens: u64,
    #[serde(default)]
    pub output_tokens: u64,
    #[serde(default)]
    pub cache_read_tokens: u64,
    #[serde(default)]
    pub cache_write_tokens: u64,
}

/// One item of the harness's todo list, as forwarded verbatim in
/// `todo_update` events.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct TodoItem {
    pub id: String,
    pub text: String,
    #[serde(default)]
    pub completed: bool,
}

/// Events emitted by the agent harness over its WebSocket connection.
///
/// Legacy note: the harness's `tool_complete` frame historically overloaded
/// its `tool_name` field to actually carry the tool-call id (`use_id`), not
/// the tool's name. This type normalizes that away — [`ToolComplete`]'s
/// `tool_use_id` field is always the call id; nothing downstream of this
/// module ever sees the legacy encoding.
///
/// [`ToolComplete`]: HarnessEvent::ToolComplete
#[derive(Debug, Clone, PartialEq)]
pub enum HarnessEvent {
    System {
        phase: SystemPhase,
        timestamp: String,
    },
    Content {
        text: String,
        timestamp: String,
    },
    Thinking {
        text: String,
        timestamp: String,
    },
    ToolStart {
        name: String,
        use_id: String,
        input: Value,
        timestamp: String,
    },
    ToolComplete {
        tool_use_id: String,
        output: String,
        is_error: bool,
        timestamp: String,
    },
    TodoUpdate {
        items: Vec<TodoItem>,
        timestamp: String,
    },
    Metadata {
        final_content: Option<String>,
        cost: Option<f64>,
        duration_ms: Option<u64>,
        usage: Option<HarnessUsage>,
        timestamp: String,
    },
    /// An event kind this gateway version doesn't recognize, preserved raw.
    Unknown {
        kind: String,
        raw: Value,
        timestamp: String,
    },
}

impl HarnessEvent {
    pub fn timestamp(&self) -> &str {
        match self {
            HarnessEvent::System { timestamp, .. }
            | HarnessEvent::Content { timestamp, .. }
            | HarnessEvent::Thinking { timestamp, .. }
            | HarnessEvent::ToolStart { timestamp, .. }
            | HarnessEvent::ToolComplete { timestamp, .. }
            | HarnessEvent::TodoUpdate { timestamp, .. }
            | HarnessEvent::Metadata { timestamp, .. }
            | HarnessEvent::Unknown { timestamp, .. } => timestamp,
        }
    }

    /// Whether this event marks the end of the current turn (OpenAI's
    /// `finish_reason="stop"` point and the non-streaming accumulation
    /// boundary both hinge on this).
    pub fn is_end_of_turn(&self) -> bool {
        matches!(
            self,
            HarnessEvent::Metadata {
                final_content: Some(_),
                ..
            }
        )
    }
}

impl Serialize for HarnessEvent {
    fn serialize<S>(&self, serializer: S) -> Result<S::Ok, S::Error>
    where
        S: serde::Serializer,
    {
        use serde::ser::SerializeMap;
        let mut map = serializer.serialize_map(None)?;
        match self {
            HarnessEvent::System { phase, timestamp } => {
                map.serialize_entry("type", "system")?;
                map.serialize_entry("phase", phase)?;
                map.serialize_entry("timestamp", timestamp)?;
            }
            HarnessEvent::Content { text, timestamp } => {
                map.serialize_entry("type", "content")?;
                map.serialize_entry("text", text)?;
                map.serialize_entry("timestamp", timestamp)?;
            }
            HarnessEvent::Thinking { text, timestamp } => {
                map.serialize_entry("type", "thinking")?;
                map.serialize_entry("text", text)?;
                map.serialize_entry("timestamp", timestamp)?;
            }
            HarnessEvent::ToolStart {
                name,
                use_id,
                input,
                timestamp,
            } => {
                map.serialize_entry("type", "tool_start")?;
                map.serialize_entry("name", name)?;
                map.serialize_entry("use_id", use_id)?;
                map.serialize_entry("input", input)?;
                map.serialize_entry("timestamp", timestamp)?;
            }
            HarnessEvent::ToolComplete {
                tool_use_id,
                output,
                is_error,
                timestamp,
            } => {
                map.serialize_entry("type", "tool_complete")?;
                // Wire-compatible with the legacy harness encoding: emitted
                // under `tool_name` on the wire, normalized on decode.
                map.serialize_entry("tool_name", tool_use_id)?;
                map.serialize_entry("output", output)?;
                map.serialize_entry("is_error", is_error)?;
                map.serialize_entry("timestamp", timestamp)?;
            }
            HarnessEvent::TodoUpdate { items, timestamp } => {
                map.serialize_entry("type", "todo_update")?;
                map.serialize_entry("items", items)?;
                map.serialize_entry("timestamp", timestamp)?;
            }
            HarnessEvent::Metadata {
                final_content,
                cost,
                duration_ms,
                usage,
                timestamp,
            } => {
                map.serialize_entry("type", "metadata")?;
                map.serialize_entry("final_content", final_content)?;
                map.serialize_entry("cost", cost)?;
                map.serialize_entry("duration_ms", duration_ms)?;
                map.serialize_entry("usage", usage)?;
                map.serialize_entry("timestamp", timestamp)?;
            }
            HarnessEvent::Unknown {
                kind,
                raw,
                timestamp,
            } => {
                map.serialize_entry("type", kind)?;
                if let Value::Object(obj) = raw {
                    for (k, v) in obj {
                        if k == "type" || k == "timestamp" {
                            continue;
                        }
                        map.serialize_entry(k, v)?;
                    }
                }
                map.serialize_entry("timestamp", timestamp)?;
            }
        }
        map.end()
    }
}

impl<'de> Deserialize<'de> for HarnessEvent {
    fn deserialize<D>(deserializer: D) -> Result<Self, D::Error>
    where
        D: serde::Deserializer<'de>,
    {
        use serde::de::Error as _;

        let mut value = Value::deserialize(deserializer)?;
        let obj = value
            .as_object_mut()
            .ok_or_else(|| D::Error::custom("harness event must be a JSON object"))?;

        let kind = obj
            .get("type")
            .and_then(Value::as_str)
            .ok_or_else(|| D::Error::custom("harness event missing `type`"))?
            .to_string();
        let timestamp = obj
            .remove("timestamp")
            .and_then(|v| v.as_str().map(str::to_string))
            .unwrap_or_default();

        let event = match kind.as_str() {
            "system" => {
                let phase: SystemPhase = obj
                    .get("phase")
                    .cloned()
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(D::Error::custom)?
                    .ok_or_else(|| D::Error::custom("system event missing `phase`"))?;
                HarnessEvent::System { phase, timestamp }
            }
            "content" => HarnessEvent::Content {
                text: field_string(obj, "text")?,
                timestamp,
            },
            "thinking" => HarnessEvent::Thinking {
                text: field_string(obj, "text")?,
                timestamp,
            },
            "tool_start" => HarnessEvent::ToolStart {
                name: field_string(obj, "name")?,
                use_id: field_string(obj, "use_id")?,
                input: obj.remove("input").unwrap_or(Value::Null),
                timestamp,
            },
            "tool_complete" => {
                // Legacy harnesses overload `tool_name` with the call id.
                // A migrated harness may instead send `tool_use_id` directly.
                let tool_use_id = obj
                    .remove("tool_use_id")
                    .and_then(|v| v.as_str().map(str::to_string))
                    .or_else(|| {
                        obj.remove("tool_name")
                            .and_then(|v| v.as_str().map(str::to_string))
                    })
                    .ok_or_else(|| {
                        D::Error::custom("tool_complete missing tool_use_id/tool_name")
                    })?;
                HarnessEvent::ToolComplete {
                    tool_use_id,
                    output: field_string(obj, "output")?,
                    is_error: obj
                        .remove("is_error")
                        .and_then(|v| v.as_bool())
                        .unwrap_or(false),
                    timestamp,
                }
            }
            "todo_update" => {
                let items: Vec<TodoItem> = obj
                    .remove("items")
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(D::Error::custom)?
                    .unwrap_or_default();
                HarnessEvent::TodoUpdate { items, timestamp }
            }
            "metadata" => HarnessEvent::Metadata {
                final_content: obj
                    .remove("final_content")
                    .and_then(|v| v.as_str().map(str::to_string)),
                cost: obj.remove("cost").and_then(|v| v.as_f64()),
                duration_ms: obj.remove("duration_ms").and_then(|v| v.as_u64()),
                usage: obj
                    .remove("usage")
                    .map(serde_json::from_value)
                    .transpose()
                    .map_err(D::Error::custom)?,
                timestamp,
            },
            other => HarnessEvent::Unknown {
                kind: other.to_string(),
                raw: value,
                timestamp,
            },
        };
        Ok(event)
    }
}

fn field_string<E: serde::de::Error>(
    obj: &mut serde_json::Map<String, Value>,
    key: &str,
) -> Result<String, E> {
    obj.remove(key)
        .and_then(|v| v.as_str().map(str::to_string))
        .ok_or_else(|| E::custom(format!("missing field `{key}`")))
}

/// A [`HarnessEvent`] canonicalized for the `ToolEventHub`: scoped to a
/// session and stamped with the time it was *observed* by the gateway
/// (`observed_at`), which is also the session's refreshed `last_active`.
#[derive(Debug, Clone, Serialize, Deserialize)]
pub struct ToolEvent {
    pub session_id: String,
    pub event: HarnessEvent,
    pub observed_at: String,
}

impl ToolEvent {
    pub fn new(session_id: impl Into<String>, event: HarnessEvent) -> Self {
        Self {
            session_id: session_id.into(),
            event,
            observed_at: crate::now_iso8601(),
        }
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn system_event_round_trips() {
        let ev = HarnessEvent::System {
            phase: SystemPhase::Ready,
            timestamp: "2026-01-01T00:00:00Z".into(),
        };
        let json = serde_json::to_string(&ev).unwrap();
        let back: HarnessEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }

    #[test]
    fn legacy_tool_complete_tool_name_is_normalized() {
        let json = r#"{"type":"tool_complete","tool_name":"call-42","output":"ok","is_error":false,"timestamp":"2026-01-01T00:00:00Z"}"#;
        let ev: HarnessEvent = serde_json::from_str(json).unwrap();
        match ev {
            HarnessEvent::ToolComplete { tool_use_id, .. } => assert_eq!(tool_use_id, "call-42"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn explicit_tool_use_id_is_preferred_over_legacy_field() {
        let json = r#"{"type":"tool_complete","tool_use_id":"call-1","tool_name":"call-stale","output":"ok","is_error":false,"timestamp":"t"}"#;
        let ev: HarnessEvent = serde_json::from_str(json).unwrap();
        match ev {
            HarnessEvent::ToolComplete { tool_use_id, .. } => assert_eq!(tool_use_id, "call-1"),
            other => panic!("unexpected {other:?}"),
        }
    }

    #[test]
    fn unknown_kind_round_trips_raw() {
        let json = r#"{"type":"future_kind","foo":"bar","timestamp":"t"}"#;
        let ev: HarnessEvent = serde_json::from_str(json).unwrap();
        assert!(matches!(ev, HarnessEvent::Unknown { ref kind, .. } if kind == "future_kind"));
        let back = serde_json::to_string(&ev).unwrap();
        let parsed: Value = serde_json::from_str(&back).unwrap();
        assert_eq!(parsed["foo"], "bar");
    }

    #[test]
    fn metadata_event_with_usage_round_trips() {
        let ev = HarnessEvent::Metadata {
            final_content: Some("done".into()),
            cost: Some(0.01),
            duration_ms: Some(1200),
            usage: Some(HarnessUsage {
                input_tokens: 10,
                output_tokens: 20,
                cache_read_tokens: 0,
                cache_write_tokens: 0,
            }),
            timestamp: "t".into(),
        };
        assert!(ev.is_end_of_turn());
        let json = serde_json::to_string(&ev).unwrap();
        let back: HarnessEvent = serde_json::from_str(&json).unwrap();
        assert_eq!(ev, back);
    }

    #[test]
    fn tool_event_stamps_observed_at() {
        let ev = ToolEvent::new(
            "sess-1",
            HarnessEvent::Content {
                text: "hi".into(),
                timestamp: "t".into(),
            },
        );
        assert_eq!(ev.session_id, "sess-1");
        assert!(!ev.observed_at.is_empty());
    }
}
