// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `/api/agents/*` — direct session lifecycle management, for callers that
//! want an explicit session handle rather than relying on the implicit
//! per-conversation multiplexing in `/chat/completions`.

use std::collections::HashMap;

use axum::{
    extract::{Path, State},
    Json,
};
use serde::{Deserialize, Serialize};

use agcluster_config::AgentConfig;
use agcluster_session::{LaunchRequest, Session, SessionError, SessionKey};

use crate::{error::ApiError, state::AppState};

#[derive(Debug, Deserialize)]
pub struct LaunchBody {
    /// Id of a preset/custom config to launch, mutually exclusive with `config`.
    pub config_id: Option<String>,
    /// An inline config, validated the same way a persisted one would be.
    pub config: Option<AgentConfig>,
    pub session_id: Option<String>,
    pub conversation_id: Option<String>,
    #[serde(default)]
    pub env: HashMap<String, String>,
}

pub async fn launch(
    State(state): State<AppState>,
    Json(body): Json<LaunchBody>,
) -> Result<Json<Session>, ApiError> {
    let key = match (&body.session_id, &body.conversation_id) {
        (Some(id), _) => SessionKey::SessionId(id.clone()),
        (None, Some(id)) => SessionKey::ConversationId(id.clone()),
        (None, None) => SessionKey::SessionId(uuid::Uuid::new_v4().to_string()),
    };

    let configs = state.configs.clone();
    let config_id = body.config_id.clone();
    let inline_config = body.config.clone();
    let env = body.env.clone();

    let session = state
        .sessions
        .acquire(key, move || async move {
            let cfg = if let Some(cfg) = inline_config {
                agcluster_config::validate(&cfg).map_err(SessionError::InvalidConfig)?;
                cfg
            } else {
                let id = config_id.ok_or_else(|| {
                    SessionError::Internal("one of config_id or config is required".to_string())
                })?;
                configs
                    .read()
                    .await
                    .get(&id)
                    .cloned()
                    .ok_or(SessionError::UnknownConfig(id))?
            };
            Ok(LaunchRequest { config: cfg, env })
        })
        .await?;

    Ok(Json(session))
}

pub async fn list_sessions(State(state): State<AppState>) -> Json<Vec<Session>> {
    Json(state.sessions.list().await)
}

pub async fn get_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<Session>, ApiError> {
    state
        .sessions
        .get(&id)
        .await
        .map(Json)
        .ok_or(ApiError::UnknownSession(id))
}

pub async fn delete_session(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Json<serde_json::Value> {
    state.sessions.release(&id).await;
    Json(serde_json::json!({ "released": id }))
}

#[derive(Debug, Serialize)]
pub struct InterruptResponse {
    pub interrupted: bool,
}

pub async fn interrupt(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<InterruptResponse>, ApiError> {
    let connection = state
        .sessions
        .connection(&id)
        .await
        .ok_or_else(|| ApiError::UnknownSession(id.clone()))?;
    connection
        .send_command(&agcluster_protocol::HarnessCommand::Interrupt)
        .await
        .map_err(|e| ApiError::Session(SessionError::ContainerStartFailed(e.to_string())))?;
    Ok(Json(InterruptResponse { interrupted: true }))
}
