// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `/api/configs/*` — read the preset/custom catalog, and create or
//! overwrite a custom agent config.

use axum::{
    extract::{Path, State},
    Json,
};

use agcluster_config::AgentConfig;

use crate::{error::ApiError, state::AppState};

pub async fn list(State(state): State<AppState>) -> Json<Vec<AgentConfig>> {
    let registry = state.configs.read().await;
    Json(registry.list().into_iter().cloned().collect())
}

pub async fn get(
    State(state): State<AppState>,
    Path(id): Path<String>,
) -> Result<Json<AgentConfig>, ApiError> {
    state
        .configs
        .read()
        .await
        .get(&id)
        .cloned()
        .map(Json)
        .ok_or(ApiError::UnknownConfig(id))
}

pub async fn put(
    State(state): State<AppState>,
    Json(cfg): Json<AgentConfig>,
) -> Result<Json<AgentConfig>, ApiError> {
    let mut registry = state.configs.write().await;
    registry
        .put_custom(cfg.clone())
        .map_err(|e| match e {
            agcluster_config::RegistryError::Invalid(errs) => ApiError::InvalidConfig(errs),
            agcluster_config::RegistryError::Conflict(id) => ApiError::Conflict(id),
            other => ApiError::BadRequest(other.to_string()),
        })?;
    Ok(Json(cfg))
}
