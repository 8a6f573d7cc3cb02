// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
/// End-to-end test of the gateway stack assembled the same way `agcluster
/// serve` assembles it, with a fake container runtime standing in for
/// Docker.
use std::{collections::HashMap, sync::Arc};

use agcluster_config::{AgentConfig, ConfigRegistry, PermissionMode, ResourceLimits, SystemPrompt};
use agcluster_container::{Connection, ContainerError, ContainerRuntime, Provisioned};
use agcluster_http::AppState;
use agcluster_session::{SessionManager, SessionManagerConfig, ToolEventHub};
use async_trait::async_trait;
use axum::{
    body::Body,
    http::{Request, StatusCode},
};
use tokio::sync::RwLock;
use tower::ServiceExt;

struct RefusingRuntime;

#[async_trait]
impl ContainerRuntime for RefusingRuntime {
    async fn spawn(
        &self,
        _session_id: &str,
        _cfg: &AgentConfig,
        _env: &HashMap<String, String>,
    ) -> Result<Provisioned, ContainerError> {
        Err(ContainerError::StartFailed("no docker daemon in tests".into()))
    }
    async fn teardown(&self, _container_id: &str, _connection: Option<&Connection>) {}
    async fn reap_orphans(&self, _live: &[String]) -> Result<usize, ContainerError> {
        Ok(0)
    }
}

fn sample_config(id: &str) -> AgentConfig {
    AgentConfig {
        id: id.into(),
        name: "Test Agent".into(),
        description: "used by integration tests".into(),
        version: "1.0.0".into(),
        allowed_tools: vec![],
        system_prompt: SystemPrompt::Text("You are a test agent.".into()),
        permission_mode: PermissionMode::default(),
        max_turns: 50,
        sub_agents: None,
        mcp_servers: None,
        resources: ResourceLimits::default(),
        env: None,
        cwd: None,
    }
}

fn test_app() -> axum::Router {
    let dir = tempfile::tempdir().unwrap();
    let mut registry = ConfigRegistry::empty(dir.path().to_path_buf());
    std::fs::create_dir_all(dir.path()).unwrap();
    registry.put_custom(sample_config("test-agent")).unwrap();

    let sessions = SessionManager::new(
        Arc::new(RefusingRuntime),
        Arc::new(ToolEventHub::new()),
        SessionManagerConfig::default(),
    );
    let state = AppState::new(Arc::new(RwLock::new(registry)), sessions);
    agcluster_http::router(state)
}

#[tokio::test]
async fn healthz_is_reachable_without_a_bearer_key() {
    let resp = test_app()
        .oneshot(Request::builder().uri("/healthz").body(Body::empty()).unwrap())
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn every_other_route_rejects_a_missing_bearer_key() {
    let resp = test_app()
        .oneshot(
            Request::builder()
                .uri("/api/configs/test-agent")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}

#[tokio::test]
async fn seeded_config_is_visible_through_the_api() {
    let resp = test_app()
        .oneshot(
            Request::builder()
                .uri("/api/configs/test-agent")
                .header("authorization", "Bearer sk-caller-owned-key")
                .body(Body::empty())
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::OK);
}

#[tokio::test]
async fn chat_completions_surfaces_container_start_failure_as_bad_gateway() {
    let body = serde_json::json!({
        "model": "test-agent",
        "messages": [{"role": "user", "content": "hello"}],
        "stream": false,
    });
    let resp = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat/completions")
                .header("authorization", "Bearer sk-caller-owned-key")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::BAD_GATEWAY);
}

#[tokio::test]
async fn unknown_model_is_a_bad_request() {
    let body = serde_json::json!({
        "model": "does-not-exist",
        "messages": [{"role": "user", "content": "hello"}],
        "stream": false,
    });
    let resp = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat/completions")
                .header("authorization", "Bearer sk-caller-owned-key")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::NOT_FOUND);
}

#[tokio::test]
async fn chat_completions_without_a_bearer_key_is_unauthorized() {
    let body = serde_json::json!({
        "model": "test-agent",
        "messages": [{"role": "user", "content": "hello"}],
        "stream": false,
    });
    let resp = test_app()
        .oneshot(
            Request::builder()
                .method("POST")
                .uri("/chat/completions")
                .header("content-type", "application/json")
                .body(Body::from(body.to_string()))
                .unwrap(),
        )
        .await
        .unwrap();
    assert_eq!(resp.status(), StatusCode::UNAUTHORIZED);
}
