// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `ToolEventHub` — per-session pub/sub for structured tool events.
//!
//! Each session gets its own bounded broadcast channel. A slow subscriber
//! that falls more than [`QUEUE_HIGH_WATER_MARK`] events behind never
//! blocks the publisher — `tokio::sync::broadcast` drops the oldest
//! buffered events for that subscriber and its next `recv()` returns
//! `Lagged(n)` instead, matching the disconnect-not-block requirement.
//! `publish` itself never awaits a subscriber.

use std::{collections::HashMap, sync::Arc};

use agcluster_protocol::ToolEvent;
use tokio::sync::{broadcast, Mutex};

/// Subscriber queue depth before a lagging subscriber starts dropping
/// events rather than slowing down the publisher.
pub const QUEUE_HIGH_WATER_MARK: usize = 256;

#[derive(Default)]
pub struct ToolEventHub {
    channels: Mutex<HashMap<String, broadcast::Sender<ToolEvent>>>,
}

impl ToolEventHub {
    pub fn new() -> Self {
        Self {
            channels: Mutex::new(HashMap::new()),
        }
    }

    async fn channel_for(&self, session_id: &str) -> broadcast::Sender<ToolEvent> {
        let mut channels = self.channels.lock().await;
        channels
            .entry(session_id.to_string())
            .or_insert_with(|| broadcast::channel(QUEUE_HIGH_WATER_MARK).0)
            .clone()
    }

    /// Subscribe to a session's event stream. Creates the channel if this
    /// is the first subscriber (or the first publish) for the session.
    pub async fn subscribe(&self, session_id: &str) -> broadcast::Receiver<ToolEvent> {
        self.channel_for(session_id).await.subscribe()
    }

    /// Publish an event. A no-op (not an error) if nobody is subscribed —
    /// `broadcast::Sender::send` only errors when there are zero
    /// receivers, which simply means no one is watching this session's
    /// tool stream right now.
    pub async fn publish(&self, event: ToolEvent) {
        let sender = self.channel_for(&event.session_id).await;
        let _ = sender.send(event);
    }

    /// Drop a session's channel entirely, e.g. on release. Any subscriber
    /// still holding a `Receiver` simply observes the stream end
    /// (`RecvError::Closed`) on its next `recv()`.
    pub async fn remove(&self, session_id: &str) {
        self.channels.lock().await.remove(session_id);
    }
}

pub use std::sync::Arc as HubHandle;
pub type SharedToolEventHub = Arc<ToolEventHub>;
