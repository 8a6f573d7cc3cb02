// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `GET /api/tools/:id/stream` — Server-Sent Events view of a session's raw
//! tool/content event stream, for clients that want the full harness
//! detail (tool_start/tool_complete/todo_update) that the OpenAI chat
//! completions shape can't carry.
//!
//! Each event is sent as a `tool` SSE event carrying the JSON-encoded
//! [`agcluster_protocol::ToolEvent`]. A subscriber too slow to keep up with
//! the broadcast channel is disconnected: it receives one `error` event
//! with `fatal: true` and the stream ends, since the events it missed can
//! never be recovered.

use axum::{
    extract::{Path, State},
    response::sse::{Event, KeepAlive, Sse},
};
use futures_util::stream::Stream;
use tokio_stream::wrappers::errors::BroadcastStreamRecvError;
use tokio_stream::StreamExt;

use crate::state::AppState;

pub async fn stream(
    State(state): State<AppState>,
    Path(session_id): Path<String>,
) -> Sse<impl Stream<Item = Result<Event, std::convert::Infallible>>> {
    let rx = state.sessions.tool_event_hub().subscribe(&session_id).await;
    let stream = async_stream::stream! {
        let mut inner = tokio_stream::wrappers::BroadcastStream::new(rx);
        while let Some(item) = inner.next().await {
            match item {
                Ok(event) => {
                    if let Ok(json) = serde_json::to_string(&event) {
                        yield Ok(Event::default().event("tool").data(json));
                    }
                }
                Err(BroadcastStreamRecvError::Lagged(n)) => {
                    let body = serde_json::json!({ "fatal": true, "lagged": n }).to_string();
                    yield Ok(Event::default().event("error").data(body));
                    return;
                }
            }
        }
    };

    Sse::new(stream).keep_alive(
        KeepAlive::new()
            .interval(std::time::Duration::from_secs(15))
            .text(""),
    )
}
