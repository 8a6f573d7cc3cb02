// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `POST /chat/completions` — the OpenAI-compatible front door. `model`
//! selects the agent config. `X-Session-Id` resolves to a session created
//! ahead of time via `/api/agents/launch`; failing that, an optional
//! `X-Conversation-Id` header multiplexes repeated turns onto the same
//! implicitly-created session; otherwise each request gets a fresh
//! one-shot session.

use axum::{
    extract::State,
    http::HeaderMap,
    response::{
        sse::{Event, Sse},
        IntoResponse, Response,
    },
    Json,
};
use futures_util::stream::Stream;
use tracing::warn;

use agcluster_session::{LaunchRequest, SessionError, SessionKey};
use agcluster_translate::{
    wire::ChatCompletionRequest, NonStreamAccumulator, StreamTranslator,
};

use crate::{auth::extract_bearer, error::ApiError, state::AppState};

const SESSION_ID_HEADER: &str = "x-session-id";
const CONVERSATION_ID_HEADER: &str = "x-conversation-id";

fn session_key(headers: &HeaderMap) -> SessionKey {
    if let Some(id) = headers
        .get(SESSION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
        .filter(|id| !id.is_empty())
    {
        return SessionKey::SessionId(id.to_string());
    }
    match headers
        .get(CONVERSATION_ID_HEADER)
        .and_then(|v| v.to_str().ok())
    {
        Some(id) if !id.is_empty() => SessionKey::ConversationId(id.to_string()),
        _ => SessionKey::SessionId(uuid::Uuid::new_v4().to_string()),
    }
}

pub async fn chat_completions(
    State(state): State<AppState>,
    headers: HeaderMap,
    Json(req): Json<ChatCompletionRequest>,
) -> Result<Response, ApiError> {
    let model = req.model.clone();
    let key = session_key(&headers);
    let env = env_from_headers(&headers);

    let configs = state.configs.clone();
    let model_for_launch = model.clone();
    let session = state
        .sessions
        .acquire(key, move || async move {
            let registry = configs.read().await;
            let cfg = registry
                .get(&model_for_launch)
                .cloned()
                .ok_or_else(|| SessionError::UnknownConfig(model_for_launch.clone()))?;
            Ok(LaunchRequest { config: cfg, env })
        })
        .await?;

    let connection = state
        .sessions
        .connection(&session.session_id)
        .await
        .ok_or_else(|| SessionError::SessionNotFound(session.session_id.clone()))?;
    let turn_lock = state
        .sessions
        .turn_lock(&session.session_id)
        .await
        .ok_or_else(|| SessionError::SessionNotFound(session.session_id.clone()))?;

    let command = agcluster_translate::to_harness_command(&req)?;

    if req.stream {
        let stream = stream_turn(state.clone(), session.session_id.clone(), model, command);
        Ok(Sse::new(stream)
            .keep_alive(
                axum::response::sse::KeepAlive::new()
                    .interval(std::time::Duration::from_secs(15))
                    .text(""),
            )
            .into_response())
    } else {
        let _guard = turn_lock.clone().lock_owned().await;
        connection.send_command(&command).await.map_err(|e| {
            ApiError::Session(SessionError::ContainerStartFailed(e.to_string()))
        })?;

        let mut acc = NonStreamAccumulator::new(model);
        loop {
            let event = match connection.recv_event().await {
                Ok(Some(ev)) => ev,
                Ok(None) | Err(_) => {
                    state.sessions.mark_error(&session.session_id).await;
                    return Err(ApiError::Session(SessionError::ConnectionLost));
                }
            };
            state.sessions.touch(&session.session_id).await;
            state
                .sessions
                .tool_event_hub()
                .publish(agcluster_protocol::ToolEvent::new(
                    session.session_id.clone(),
                    event.clone(),
                ))
                .await;
            if let Some(resp) = acc.push(&event) {
                return Ok(Json(resp).into_response());
            }
        }
    }
}

fn stream_turn(
    state: AppState,
    session_id: String,
    model: String,
    command: agcluster_protocol::HarnessCommand,
) -> impl Stream<Item = Result<Event, std::convert::Infallible>> {
    async_stream::stream! {
        let Some(connection) = state.sessions.connection(&session_id).await else {
            yield Ok(Event::default().data("[DONE]"));
            return;
        };
        let Some(turn_lock) = state.sessions.turn_lock(&session_id).await else {
            yield Ok(Event::default().data("[DONE]"));
            return;
        };
        let _guard = turn_lock.clone().lock_owned().await;

        if let Err(e) = connection.send_command(&command).await {
            warn!(%session_id, error = %e, "failed to send command to harness");
            yield Ok(Event::default().data("[DONE]"));
            return;
        }

        let mut translator = StreamTranslator::new(model);
        loop {
            let event = match connection.recv_event().await {
                Ok(Some(ev)) => ev,
                Ok(None) | Err(_) => {
                    state.sessions.mark_error(&session_id).await;
                    break;
                }
            };
            state.sessions.touch(&session_id).await;
            state
                .sessions
                .tool_event_hub()
                .publish(agcluster_protocol::ToolEvent::new(session_id.clone(), event.clone()))
                .await;

            let is_end = event.is_end_of_turn();
            for chunk in translator.translate(&event) {
                yield Ok(Event::default().json_data(chunk).unwrap());
            }
            if is_end {
                break;
            }
        }
        yield Ok(Event::default().data("[DONE]"));
    }
}

/// Forward the caller's bring-your-own-key bearer token into the launched
/// container's environment, so the harness can authenticate outbound with
/// the same key the auth middleware already required to be present.
fn env_from_headers(headers: &HeaderMap) -> std::collections::HashMap<String, String> {
    let mut env = std::collections::HashMap::new();
    if let Some(key) = extract_bearer(headers).filter(|v| !v.is_empty()) {
        env.insert("API_KEY".to_string(), key.to_string());
    }
    env
}
