// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! The [`ContainerRuntime`] trait abstracts container provisioning behind
//! an interface `agcluster-session` can depend on without pulling in a
//! live Docker daemon — tests substitute a fake implementation in-process,
//! the same way this gateway fakes the harness WebSocket rather than
//! shipping a mock container runtime crate.

use std::collections::HashMap;

use agcluster_config::AgentConfig;
use async_trait::async_trait;

use crate::{connection::Connection, error::ContainerError, manager::Provisioned};

#[async_trait]
pub trait ContainerRuntime: Send + Sync {
    async fn spawn(
        &self,
        session_id: &str,
        cfg: &AgentConfig,
        env: &HashMap<String, String>,
    ) -> Result<Provisioned, ContainerError>;

    async fn teardown(&self, container_id: &str, connection: Option<&Connection>);

    async fn reap_orphans(&self, live_session_ids: &[String]) -> Result<usize, ContainerError>;
}

#[async_trait]
impl ContainerRuntime for crate::manager::ContainerManager {
    async fn spawn(
        &self,
        session_id: &str,
        cfg: &AgentConfig,
        env: &HashMap<String, String>,
    ) -> Result<Provisioned, ContainerError> {
        crate::manager::ContainerManager::spawn(self, session_id, cfg, env).await
    }

    async fn teardown(&self, container_id: &str, connection: Option<&Connection>) {
        crate::manager::ContainerManager::teardown(self, container_id, connection).await
    }

    async fn reap_orphans(&self, live_session_ids: &[String]) -> Result<usize, ContainerError> {
        crate::manager::ContainerManager::reap_orphans(self, live_session_ids).await
    }
}
