// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `SessionManager` — owns every [`Session`] and the container/connection
//! behind it.
//!
//! # At-most-one container per key
//!
//! `acquire` is safe to call concurrently for the same key: the first
//! caller installs a reservation cell (a [`tokio::sync::OnceCell`]) and
//! provisions the container; every other concurrent caller for that key
//! awaits the same cell and gets the same resolved session, or the same
//! error if provisioning failed. A failed reservation is removed from the
//! map once its error has been observed, so the next call (not a
//! concurrent racer, but a later one) gets to try again from scratch —
//! this is the "resolved -> promoted to Session, or removed on failure"
//! strategy named in the design notes.
//!
//! # Idle reaping
//!
//! A background task wakes every `cleanup_interval` and releases every
//! session whose `last_active` is older than `idle_timeout`. No session
//! survives more than one extra `cleanup_interval` past its deadline.

use std::{
    collections::HashMap,
    future::Future,
    sync::Arc,
    time::Duration,
};

use agcluster_config::AgentConfig;
use agcluster_container::{Connection, ContainerRuntime};
use chrono::Utc;
use tokio::sync::{Mutex, OnceCell};
use tracing::info;
use uuid::Uuid;

use crate::{
    error::SessionError,
    hub::ToolEventHub,
    session::{Session, SessionKey, SessionRecord, SessionStatus},
};

/// What the caller of `acquire` provides to create a brand new session, if
/// one doesn't already exist for the key.
pub struct LaunchRequest {
    pub config: AgentConfig,
    /// Environment the container is launched with: the BYOK API key plus
    /// any resolved MCP server env bindings.
    pub env: HashMap<String, String>,
}

type ReservationCell = Arc<OnceCell<Result<String, SessionError>>>;

pub struct SessionManagerConfig {
    pub cleanup_interval: Duration,
    pub idle_timeout: Duration,
}

impl Default for SessionManagerConfig {
    fn default() -> Self {
        Self {
            cleanup_interval: Duration::from_secs(300),
            idle_timeout: Duration::from_secs(1800),
        }
    }
}

pub struct SessionManager {
    container_manager: Arc<dyn ContainerRuntime>,
    hub: Arc<ToolEventHub>,
    sessions: Mutex<HashMap<String, Arc<SessionRecord>>>,
    connections: Mutex<HashMap<String, Arc<Connection>>>,
    key_index: Mutex<HashMap<String, String>>,
    reservations: Mutex<HashMap<String, ReservationCell>>,
    config: SessionManagerConfig,
}

impl SessionManager {
    pub fn new(
        container_manager: Arc<dyn ContainerRuntime>,
        hub: Arc<ToolEventHub>,
        config: SessionManagerConfig,
    ) -> Arc<Self> {
        let manager = Arc::new(Self {
            container_manager,
            hub,
            sessions: Mutex::new(HashMap::new()),
            connections: Mutex::new(HashMap::new()),
            key_index: Mutex::new(HashMap::new()),
            reservations: Mutex::new(HashMap::new()),
            config,
        });
        manager.clone().spawn_idle_reaper();
        manager
    }

    fn spawn_idle_reaper(self: Arc<Self>) {
        let interval = self.config.cleanup_interval;
        tokio::spawn(async move {
            let mut ticker = tokio::time::interval(interval);
            loop {
                ticker.tick().await;
                self.reap_idle().await;
            }
        });
    }

    async fn reap_idle(&self) {
        let idle_timeout = self.config.idle_timeout;
        let now = Utc::now();
        let stale: Vec<String> = {
            let sessions = self.sessions.lock().await;
            sessions
                .values()
                .filter(|s| {
                    now.signed_duration_since(s.last_active())
                        .to_std()
                        .map(|d| d >= idle_timeout)
                        .unwrap_or(false)
                })
                .map(|s| s.session_id.clone())
                .collect()
        };

        for session_id in stale {
            info!(session_id, "reaping idle session");
            self.release(&session_id).await;
        }
    }

    /// Find or create the session for `key`. Concurrent callers for the
    /// same key converge on one spawn.
    pub async fn acquire<F, Fut>(
        self: &Arc<Self>,
        key: SessionKey,
        make_launch: F,
    ) -> Result<Session, SessionError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<LaunchRequest, SessionError>> + Send + 'static,
    {
        let key_str = key.canonical();

        if let Some(id) = self.key_index.lock().await.get(&key_str).cloned() {
            let record = self.sessions.lock().await.get(&id).cloned();
            if let Some(record) = record {
                let status = *record.status.lock().await;
                if matches!(status, SessionStatus::Starting | SessionStatus::Running) {
                    record.touch();
                    return Ok(record.snapshot().await);
                }
                // Stale: the session stopped or errored out from under this
                // key. Tear it down and fall through to provision a fresh one.
                self.release(&id).await;
            }
        }

        let cell = {
            let mut reservations = self.reservations.lock().await;
            reservations
                .entry(key_str.clone())
                .or_insert_with(|| Arc::new(OnceCell::new()))
                .clone()
        };

        let this = self.clone();
        let key_for_provision = key.clone();
        let result = cell
            .get_or_init(|| async move { this.provision(key_for_provision, make_launch).await })
            .await
            .clone();

        // The reservation has resolved one way or another; remove it so a
        // later (non-concurrent) caller can retry from scratch on failure,
        // or so the map doesn't grow unboundedly on success (the permanent
        // lookup now lives in `key_index`).
        self.reservations.lock().await.remove(&key_str);

        match result {
            Ok(session_id) => {
                self.key_index.lock().await.insert(key_str, session_id.clone());
                let record = self
                    .sessions
                    .lock()
                    .await
                    .get(&session_id)
                    .cloned()
                    .ok_or_else(|| SessionError::Internal("session vanished after provisioning".into()))?;
                record.touch();
                Ok(record.snapshot().await)
            }
            Err(e) => Err(e),
        }
    }

    async fn provision<F, Fut>(
        self: Arc<Self>,
        key: SessionKey,
        make_launch: F,
    ) -> Result<String, SessionError>
    where
        F: FnOnce() -> Fut + Send + 'static,
        Fut: Future<Output = Result<LaunchRequest, SessionError>> + Send + 'static,
    {
        let launch = make_launch().await?;

        let session_id = match &key {
            SessionKey::SessionId(id) => id.clone(),
            SessionKey::ConversationId(_) => Uuid::new_v4().to_string(),
        };
        let conversation_id = match &key {
            SessionKey::ConversationId(id) => Some(id.clone()),
            SessionKey::SessionId(_) => None,
        };
        let agent_id = Uuid::new_v4().to_string();

        let record = Arc::new(SessionRecord {
            session_id: session_id.clone(),
            conversation_id,
            config_id: launch.config.id.clone(),
            agent_id,
            container_id: String::new(),
            created_at: Utc::now(),
            last_active_millis: std::sync::atomic::AtomicI64::new(Utc::now().timestamp_millis()),
            status: Mutex::new(SessionStatus::Starting),
            turn_lock: Arc::new(Mutex::new(())),
        });
        self.sessions
            .lock()
            .await
            .insert(session_id.clone(), record.clone());

        let provisioned = match self
            .container_manager
            .spawn(&session_id, &launch.config, &launch.env)
            .await
        {
            Ok(p) => p,
            Err(e) => {
                self.sessions.lock().await.remove(&session_id);
                return Err(e.into());
            }
        };

        self.connections
            .lock()
            .await
            .insert(session_id.clone(), Arc::new(provisioned.connection));
        *record.status.lock().await = SessionStatus::Running;

        Ok(session_id)
    }

    pub async fn get(&self, session_id: &str) -> Option<Session> {
        let record = self.sessions.lock().await.get(session_id).cloned()?;
        Some(record.snapshot().await)
    }

    pub async fn connection(&self, session_id: &str) -> Option<Arc<Connection>> {
        self.connections.lock().await.get(session_id).cloned()
    }

    pub async fn turn_lock(&self, session_id: &str) -> Option<Arc<Mutex<()>>> {
        self.sessions
            .lock()
            .await
            .get(session_id)
            .map(|r| r.turn_lock.clone())
    }

    pub fn tool_event_hub(&self) -> Arc<ToolEventHub> {
        self.hub.clone()
    }

    pub async fn touch(&self, session_id: &str) {
        if let Some(record) = self.sessions.lock().await.get(session_id) {
            record.touch();
        }
    }

    /// Mark a session errored and release it immediately: the next
    /// `acquire` for its key finds nothing and provisions a fresh session
    /// rather than handing back a connection that's already dead.
    pub async fn mark_error(&self, session_id: &str) {
        if let Some(record) = self.sessions.lock().await.get(session_id) {
            *record.status.lock().await = SessionStatus::Error;
        }
        self.release(session_id).await;
    }

    pub async fn list(&self) -> Vec<Session> {
        let records: Vec<_> = self.sessions.lock().await.values().cloned().collect();
        let mut out = Vec::with_capacity(records.len());
        for r in records {
            out.push(r.snapshot().await);
        }
        out
    }

    /// Release a session: idempotent. Releasing an unknown or already
    /// released session id is a no-op, not an error — callers (the idle
    /// reaper, the HTTP DELETE handler, a failed-mid-turn cleanup) should
    /// never have to check existence first.
    pub async fn release(&self, session_id: &str) {
        let record = self.sessions.lock().await.remove(session_id);
        let Some(record) = record else { return };

        {
            let mut key_index = self.key_index.lock().await;
            key_index.retain(|_, v| v != session_id);
        }

        *record.status.lock().await = SessionStatus::Stopping;

        let connection = self.connections.lock().await.remove(session_id);
        let container_id = if record.container_id.is_empty() {
            session_id.to_string()
        } else {
            record.container_id.clone()
        };
        self.container_manager
            .teardown(&container_id, connection.as_deref())
            .await;
        self.hub.remove(session_id).await;

        info!(session_id, "session released");
    }

    /// Release every live session. Called on graceful shutdown.
    pub async fn shutdown(&self) {
        let ids: Vec<String> = self.sessions.lock().await.keys().cloned().collect();
        for id in ids {
            self.release(&id).await;
        }
    }
}
