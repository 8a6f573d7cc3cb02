// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `Connection` — the live WebSocket link to one container's harness.
//!
//! Valid only while the container is running, 1:1 with the session that
//! owns it, never shared between sessions. `Connection` does not reference
//! back to its owning `Session` — the relationship is one-way, tracked by
//! the session manager, not embedded in this type.

use agcluster_protocol::{decode_json, encode_json, HarnessCommand, HarnessEvent};
use futures_util::{SinkExt, StreamExt};
use tokio::sync::Mutex;
use tokio_tungstenite::{tungstenite::Message, MaybeTlsStream, WebSocketStream};

use crate::error::ContainerError;

type WsStream = WebSocketStream<MaybeTlsStream<tokio::net::TcpStream>>;

/// A live connection to one harness container's WebSocket server.
pub struct Connection {
    container_id: String,
    write: Mutex<futures_util::stream::SplitSink<WsStream, Message>>,
    read: Mutex<futures_util::stream::SplitStream<WsStream>>,
}

impl Connection {
    pub(crate) fn new(container_id: String, stream: WsStream) -> Self {
        let (write, read) = stream.split();
        Self {
            container_id,
            write: Mutex::new(write),
            read: Mutex::new(read),
        }
    }

    pub fn container_id(&self) -> &str {
        &self.container_id
    }

    /// Send one command frame. Callers (the session manager) are
    /// responsible for serializing calls per session — this method does
    /// not itself guard against concurrent writers racing each other's
    /// frames, matching the per-session mutex the gateway already holds
    /// above this layer.
    pub async fn send_command(&self, cmd: &HarnessCommand) -> Result<(), ContainerError> {
        let text = encode_json(cmd)?;
        let mut write = self.write.lock().await;
        write.send(Message::Text(text)).await?;
        Ok(())
    }

    /// Receive the next event, or `Ok(None)` if the harness closed the
    /// socket cleanly.
    pub async fn recv_event(&self) -> Result<Option<HarnessEvent>, ContainerError> {
        let mut read = self.read.lock().await;
        loop {
            match read.next().await {
                None => return Ok(None),
                Some(Ok(Message::Text(text))) => {
                    return Ok(Some(decode_json(&text)?));
                }
                Some(Ok(Message::Close(_))) => return Ok(None),
                Some(Ok(Message::Ping(_))) | Some(Ok(Message::Pong(_))) => continue,
                Some(Ok(_)) => continue, // binary frames not used by the harness protocol
                Some(Err(e)) => return Err(ContainerError::ConnectionLost(e.to_string())),
            }
        }
    }

    /// Best-effort shutdown: send the `shutdown` frame and close the
    /// socket. Never fails the caller's teardown sequence — errors here
    /// are swallowed by the caller after logging, since the container is
    /// about to be force-stopped regardless.
    pub async fn send_shutdown(&self) -> Result<(), ContainerError> {
        self.send_command(&HarnessCommand::Shutdown).await
    }

    pub async fn close(&self) {
        let mut write = self.write.lock().await;
        let _ = write.close().await;
    }
}
