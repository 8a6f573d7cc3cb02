// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

/// Errors raised acquiring, using, or releasing a session. Cheap to clone
/// so every concurrent caller racing the same reservation can receive an
/// identical copy of the failure.
#[derive(Debug, Clone, Error)]
pub enum SessionError {
    #[error("unknown agent config: {0}")]
    UnknownConfig(String),

    #[error("invalid config: {0:?}")]
    InvalidConfig(Vec<agcluster_config::ValidationError>),

    #[error("container failed to start: {0}")]
    ContainerStartFailed(String),

    #[error("container readiness timed out")]
    ContainerReadinessTimeout,

    #[error("session not found: {0}")]
    SessionNotFound(String),

    #[error("connection to the harness was lost")]
    ConnectionLost,

    #[error("resource limits exceeded provisioning the container")]
    ResourceExhausted,

    #[error("internal session manager error: {0}")]
    Internal(String),
}

impl From<agcluster_container::ContainerError> for SessionError {
    fn from(e: agcluster_container::ContainerError) -> Self {
        match e {
            agcluster_container::ContainerError::ReadinessTimeout => {
                SessionError::ContainerReadinessTimeout
            }
            agcluster_container::ContainerError::ResourceExhausted(_) => {
                SessionError::ResourceExhausted
            }
            other => SessionError::ContainerStartFailed(other.to_string()),
        }
    }
}
