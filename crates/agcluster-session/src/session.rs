// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::{atomic::AtomicI64, Arc};

use chrono::{DateTime, Utc};
use tokio::sync::Mutex;

/// Lifecycle state of a [`Session`].
#[derive(Debug, Clone, Copy, PartialEq, Eq, serde::Serialize, serde::Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum SessionStatus {
    Starting,
    Running,
    Stopping,
    Stopped,
    Error,
}

/// What the caller supplied to find or create a session: the gateway
/// accepts either an explicit session id or a conversation id, and both
/// remain valid lookups for the resulting [`Session`] afterward.
#[derive(Debug, Clone)]
pub enum SessionKey {
    SessionId(String),
    ConversationId(String),
}

impl SessionKey {
    pub(crate) fn canonical(&self) -> String {
        match self {
            SessionKey::SessionId(id) => format!("sid:{id}"),
            SessionKey::ConversationId(id) => format!("cid:{id}"),
        }
    }
}

/// A caller-facing snapshot of one session. The session manager exclusively
/// owns the authoritative record this is cloned from; callers never mutate
/// a `Session` directly.
#[derive(Debug, Clone, serde::Serialize)]
pub struct Session {
    pub session_id: String,
    pub conversation_id: Option<String>,
    pub config_id: String,
    pub agent_id: String,
    pub created_at: DateTime<Utc>,
    pub last_active: DateTime<Utc>,
    pub status: SessionStatus,
}

/// Internal bookkeeping record. Never references the [`Connection`] that
/// backs it — the session manager tracks connections in a separate index,
/// one-way, so a `Session` can be inspected (e.g. for `GET .../sessions`)
/// without touching the live socket.
///
/// [`Connection`]: agcluster_container::Connection
pub(crate) struct SessionRecord {
    pub session_id: String,
    pub conversation_id: Option<String>,
    pub config_id: String,
    pub agent_id: String,
    pub container_id: String,
    pub created_at: DateTime<Utc>,
    /// Unix millis, updated without taking the outer sessions lock so a
    /// hot streaming turn doesn't contend with `list()`/the idle reaper.
    pub last_active_millis: AtomicI64,
    pub status: Mutex<SessionStatus>,
    /// Serializes reads/writes for one session's harness connection so a
    /// second concurrent request against the same session waits rather
    /// than interleaving frames with the first (spec's per-session
    /// concurrency guarantee).
    pub turn_lock: Arc<Mutex<()>>,
}

impl SessionRecord {
    pub fn touch(&self) {
        self.last_active_millis
            .store(Utc::now().timestamp_millis(), std::sync::atomic::Ordering::Relaxed);
    }

    pub fn last_active(&self) -> DateTime<Utc> {
        let millis = self.last_active_millis.load(std::sync::atomic::Ordering::Relaxed);
        DateTime::from_timestamp_millis(millis).unwrap_or(self.created_at)
    }

    pub async fn snapshot(&self) -> Session {
        Session {
            session_id: self.session_id.clone(),
            conversation_id: self.conversation_id.clone(),
            config_id: self.config_id.clone(),
            agent_id: self.agent_id.clone(),
            created_at: self.created_at,
            last_active: self.last_active(),
            status: *self.status.lock().await,
        }
    }
}
