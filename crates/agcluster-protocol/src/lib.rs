// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Wire protocol spoken over the WebSocket connection between the gateway
//! and an agent harness container (port 8765 inside the container).
//!
//! # Flow
//!
//! ```text
//! gateway                                   harness (in container)
//!    |--- connect ws://<container>:8765/ -------->|
//!    |<-- system(init) ----------------------------|
//!    |<-- system(ready) ----------------------------|
//!    |--- user_message { text } -------------------->|
//!    |<-- content(text) x N -------------------------|
//!    |<-- tool_start{name,use_id,input} -------------|
//!    |<-- tool_complete{use_id,output,is_error} -----|
//!    |<-- metadata{final_content,usage,...} ---------|
//!    |--- shutdown ----------------------------------->|
//!    |<-- system(shutdown) ---------------------------|
//! ```
//!
//! Commands and events are both tagged-union JSON (`{"type": "...", ...}`),
//! matching how this gateway's own HTTP layer encodes things. A CBOR codec
//! is kept alongside JSON for callers that want a denser encoding (e.g. the
//! [`ToolEventHub`] persistence path, should one ever be added).

use chrono::{DateTime, Utc};
use serde::{Deserialize, Serialize};
use thiserror::Error;

pub mod event;
pub mod command;

pub use command::HarnessCommand;
pub use event::{HarnessEvent, SystemPhase, ToolEvent};

#[derive(Debug, Error)]
pub enum CodecError {
    #[error("json encode/decode error: {0}")]
    Json(#[from] serde_json::Error),
    #[error("cbor encode error: {0}")]
    CborEncode(#[from] ciborium::ser::Error<std::io::Error>),
    #[error("cbor decode error: {0}")]
    CborDecode(#[from] ciborium::de::Error<std::io::Error>),
}

/// Encode a value as a JSON text frame.
pub fn encode_json<T: Serialize>(value: &T) -> Result<String, CodecError> {
    Ok(serde_json::to_string(value)?)
}

/// Decode a value from a JSON text frame.
pub fn decode_json<T: for<'de> Deserialize<'de>>(text: &str) -> Result<T, CodecError> {
    Ok(serde_json::from_str(text)?)
}

/// Encode a value as a CBOR binary frame.
pub fn encode_cbor<T: Serialize>(value: &T) -> Result<Vec<u8>, CodecError> {
    let mut buf = Vec::new();
    ciborium::into_writer(value, &mut buf)?;
    Ok(buf)
}

/// Decode a value from a CBOR binary frame.
pub fn decode_cbor<T: for<'de> Deserialize<'de>>(bytes: &[u8]) -> Result<T, CodecError> {
    Ok(ciborium::from_reader(bytes)?)
}

/// Current time as an RFC3339 (ISO-8601) string, used for every
/// [`HarnessEvent`] timestamp.
pub fn now_iso8601() -> String {
    Utc::now().to_rfc3339()
}

pub fn parse_iso8601(s: &str) -> Option<DateTime<Utc>> {
    DateTime::parse_from_rfc3339(s).ok().map(|dt| dt.with_timezone(&Utc))
}
