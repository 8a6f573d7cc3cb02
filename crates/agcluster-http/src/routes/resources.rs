// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `GET /api/resources/:id` — a session's resource-relevant snapshot
//! (status, config, timestamps). Live container CPU/memory telemetry is
//! intentionally out of scope here — it would need a streaming stats API
//! against the container runtime, which `ContainerRuntime` doesn't expose;
//! an operator who needs that watches `docker stats` directly.

use axum::{
    extract::{Path, State},
    Json,
};

use agcluster_session::Session;

use crate::{error::ApiError, state::AppState};

pub async fn get(
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
