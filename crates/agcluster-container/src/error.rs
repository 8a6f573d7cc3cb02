// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use thiserror::Error;

#[derive(Debug, Error)]
pub enum ContainerError {
    #[error("container failed to start: {0}")]
    StartFailed(String),

    #[error("container did not become ready within the readiness deadline")]
    ReadinessTimeout,

    #[error("connection to the harness was lost: {0}")]
    ConnectionLost(String),

    #[error("container runtime error: {0}")]
    Runtime(#[from] bollard::errors::Error),

    #[error("harness websocket error: {0}")]
    WebSocket(#[from] tokio_tungstenite::tungstenite::Error),

    #[error("protocol codec error: {0}")]
    Codec(#[from] agcluster_protocol::CodecError),

    #[error("io error: {0}")]
    Io(#[from] std::io::Error),

    #[error("invalid resource limit: {0}")]
    InvalidResourceLimit(String),

    #[error("resource quota exceeded provisioning the container: {0}")]
    ResourceExhausted(String),
}
