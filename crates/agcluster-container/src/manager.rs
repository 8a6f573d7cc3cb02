// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `ContainerManager` — spawns, watches, and tears down sandboxed agent
//! harness containers.
//!
//! # Spawn protocol
//!
//! Every container is created with:
//! - read-only root filesystem, all capabilities dropped, no privilege
//!   escalation (`no-new-privileges`)
//! - no host networking — attached only to the dedicated bridge network
//!   named [`AGCLUSTER_NETWORK`]
//! - `cpu_quota_micros`/`cpu_period_micros`, memory, and storage limits taken
//!   from the launching [`AgentConfig`]
//! - labels `agcluster=true`, `session_id=<id>`, `config_id=<cfg.id>` so
//!   orphaned containers can be found and reaped after a gateway restart
//! - the harness entrypoint started in WebSocket-server mode on port 8765
//!
//! # Readiness
//!
//! Polling starts at a 100ms interval, doubles after each miss up to a 1s
//! ceiling, and gives up after a 15s hard deadline. A container only counts
//! as ready once the WebSocket handshake succeeds **and** its first event
//! arrives within 2s and is `system(init)` or `system(ready)`. Any other
//! first event, or no event within 2s, is a readiness failure — the
//! half-started container is torn down before the error is returned to the
//! caller.
//!
//! # Teardown
//!
//! Best-effort: send a `shutdown` frame, close the socket, ask the runtime
//! to stop the container with a 5s grace period, force-kill past that, then
//! remove the container and its volumes. Idempotent — tearing down a
//! container that is already gone is not an error.

use std::{collections::HashMap, time::Duration};

use agcluster_config::AgentConfig;
use bollard::{
    container::{
        Config, CreateContainerOptions, RemoveContainerOptions, StopContainerOptions,
    },
    models::{HostConfig, Ipam, IpamConfig},
    network::{CreateNetworkOptions, InspectNetworkOptions},
    Docker,
};
use tokio::time::{timeout, Instant};
use tracing::{info, warn};

use crate::{connection::Connection, error::ContainerError};

/// The dedicated bridge network every agent container is attached to.
pub const AGCLUSTER_NETWORK: &str = "agcluster-network";

/// Harness WebSocket server port inside every container.
pub const HARNESS_PORT: u16 = 8765;

const READINESS_DEADLINE: Duration = Duration::from_secs(15);
const FIRST_EVENT_DEADLINE: Duration = Duration::from_secs(2);
const STOP_GRACE: i64 = 5;

/// A freshly spawned container and its live harness connection.
pub struct Provisioned {
    pub container_id: String,
    pub connection: Connection,
}

pub struct ContainerManager {
    docker: Docker,
    /// Container image reference running the agent harness.
    image: String,
}

impl ContainerManager {
    pub fn new(docker: Docker, image: impl Into<String>) -> Self {
        Self {
            docker,
            image: image.into(),
        }
    }

    /// Connect to the local Docker daemon using the default socket/pipe,
    /// matching `bollard::Docker::connect_with_local_defaults`'s usual
    /// development setup.
    pub fn connect_local(image: impl Into<String>) -> Result<Self, ContainerError> {
        let docker = Docker::connect_with_local_defaults()?;
        Ok(Self::new(docker, image))
    }

    async fn ensure_network(&self) -> Result<(), ContainerError> {
        let exists = self
            .docker
            .inspect_network(
                AGCLUSTER_NETWORK,
                Some(InspectNetworkOptions::<String> {
                    ..Default::default()
                }),
            )
            .await
            .is_ok();

        if exists {
            return Ok(());
        }

        info!(network = AGCLUSTER_NETWORK, "creating agent bridge network");
        self.docker
            .create_network(CreateNetworkOptions {
                name: AGCLUSTER_NETWORK,
                driver: "bridge",
                internal: true,
                ipam: Ipam {
                    config: Some(vec![IpamConfig {
                        ..Default::default()
                    }]),
                    ..Default::default()
                },
                ..Default::default()
            })
            .await?;
        Ok(())
    }

    /// Spawn a container for `session_id` running `cfg`, wait for it to
    /// become ready, and return the live connection. On any failure after
    /// the container was created, the partial container is removed before
    /// the error propagates.
    pub async fn spawn(
        &self,
        session_id: &str,
        cfg: &AgentConfig,
        env: &HashMap<String, String>,
    ) -> Result<Provisioned, ContainerError> {
        self.ensure_network().await?;

        let memory_bytes = parse_size(&cfg.resources.memory_limit)?;
        let storage_bytes = parse_size(&cfg.resources.storage_limit)?;

        let mut env_vars: Vec<String> = env.iter().map(|(k, v)| format!("{k}={v}")).collect();
        if let Some(custom_env) = &cfg.env {
            env_vars.extend(custom_env.iter().map(|(k, v)| format!("{k}={v}")));
        }

        let labels: HashMap<String, String> = [
            ("agcluster".to_string(), "true".to_string()),
            ("session_id".to_string(), session_id.to_string()),
            ("config_id".to_string(), cfg.id.clone()),
        ]
        .into_iter()
        .collect();

        let host_config = HostConfig {
            network_mode: Some(AGCLUSTER_NETWORK.to_string()),
            readonly_rootfs: Some(true),
            cap_drop: Some(vec!["ALL".to_string()]),
            security_opt: Some(vec!["no-new-privileges:true".to_string()]),
            cpu_quota: Some(cfg.resources.cpu_quota_micros as i64),
            cpu_period: Some(cfg.resources.cpu_period_micros as i64),
            memory: Some(memory_bytes),
            storage_opt: Some(
                [("size".to_string(), format!("{storage_bytes}"))]
                    .into_iter()
                    .collect(),
            ),
            ..Default::default()
        };

        let container_name = format!("agcluster-{session_id}");
        let config = Config {
            image: Some(self.image.clone()),
            cmd: Some(vec![
                "--mode".to_string(),
                "ws-server".to_string(),
                "--port".to_string(),
                HARNESS_PORT.to_string(),
            ]),
            env: Some(env_vars),
            working_dir: cfg.cwd.clone(),
            labels: Some(labels),
            host_config: Some(host_config),
            ..Default::default()
        };

        let created = self
            .docker
            .create_container(
                Some(CreateContainerOptions {
                    name: container_name.as_str(),
                    platform: None,
                }),
                config,
            )
            .await
            .map_err(classify_create_error)?;
        let container_id = created.id;

        if let Err(e) = self.docker.start_container::<String>(&container_id, None).await {
            self.force_remove(&container_id).await;
            return Err(ContainerError::StartFailed(e.to_string()));
        }

        match self.wait_ready(&container_id).await {
            Ok(connection) => Ok(Provisioned {
                container_id,
                connection,
            }),
            Err(e) => {
                warn!(container_id = %container_id, error = %e, "container failed readiness, tearing down");
                self.force_remove(&container_id).await;
                Err(e)
            }
        }
    }

    async fn wait_ready(&self, container_id: &str) -> Result<Connection, ContainerError> {
        let addr = self.container_address(container_id).await?;
        let url = format!("ws://{addr}:{HARNESS_PORT}/");

        let deadline = Instant::now() + READINESS_DEADLINE;
        let mut interval = Duration::from_millis(100);

        loop {
            if Instant::now() >= deadline {
                return Err(ContainerError::ReadinessTimeout);
            }

            match tokio_tungstenite::connect_async(&url).await {
                Ok((stream, _response)) => {
                    let connection = Connection::new(container_id.to_string(), stream);
                    match timeout(FIRST_EVENT_DEADLINE, connection.recv_event()).await {
                        Ok(Ok(Some(agcluster_protocol::HarnessEvent::System { phase, .. })))
                            if matches!(
                                phase,
                                agcluster_protocol::SystemPhase::Init
                                    | agcluster_protocol::SystemPhase::Ready
                            ) =>
                        {
                            return Ok(connection);
                        }
                        _ => {
                            connection.close().await;
                        }
                    }
                }
                Err(_) => {}
            }

            tokio::time::sleep(interval.min(deadline.saturating_duration_since(Instant::now())))
                .await;
            interval = (interval * 2).min(Duration::from_secs(1));
        }
    }

    async fn container_address(&self, container_id: &str) -> Result<String, ContainerError> {
        let inspect = self.docker.inspect_container(container_id, None).await?;
        let ip = inspect
            .network_settings
            .as_ref()
            .and_then(|ns| ns.networks.as_ref())
            .and_then(|nets| nets.get(AGCLUSTER_NETWORK))
            .and_then(|net| net.ip_address.clone())
            .filter(|ip| !ip.is_empty())
            .ok_or_else(|| {
                ContainerError::StartFailed("container has no address on agcluster-network".into())
            })?;
        Ok(ip)
    }

    /// Tear down a container: best-effort shutdown frame, stop with grace,
    /// force-remove including volumes. Idempotent — a missing container is
    /// treated as already torn down.
    pub async fn teardown(&self, container_id: &str, connection: Option<&Connection>) {
        if let Some(conn) = connection {
            let _ = conn.send_shutdown().await;
            conn.close().await;
        }

        let stop_result = self
            .docker
            .stop_container(
                container_id,
                Some(StopContainerOptions { t: STOP_GRACE }),
            )
            .await;
        if let Err(e) = stop_result {
            if !is_not_found(&e) {
                warn!(container_id, error = %e, "error stopping container, forcing removal");
            }
        }

        self.force_remove(container_id).await;
    }

    async fn force_remove(&self, container_id: &str) {
        let result = self
            .docker
            .remove_container(
                container_id,
                Some(RemoveContainerOptions {
                    force: true,
                    v: true,
                    ..Default::default()
                }),
            )
            .await;
        if let Err(e) = result {
            if !is_not_found(&e) {
                warn!(container_id, error = %e, "failed to remove container");
            }
        }
    }

    /// List and remove every container labeled `agcluster=true` whose
    /// session id is not in `live_session_ids`. Called once at gateway
    /// startup, before the session index has any entries, so in practice
    /// every labeled container found is an orphan from a previous run.
    pub async fn reap_orphans(
        &self,
        live_session_ids: &[String],
    ) -> Result<usize, ContainerError> {
        use bollard::container::ListContainersOptions;

        let mut filters = HashMap::new();
        filters.insert("label".to_string(), vec!["agcluster=true".to_string()]);

        let containers = self
            .docker
            .list_containers(Some(ListContainersOptions {
                all: true,
                filters,
                ..Default::default()
            }))
            .await?;

        let mut reaped = 0;
        for c in containers {
            let Some(id) = c.id else { continue };
            let session_id = c
                .labels
                .as_ref()
                .and_then(|l| l.get("session_id"))
                .cloned()
                .unwrap_or_default();
            if !live_session_ids.iter().any(|s| s == &session_id) {
                info!(container_id = %id, session_id, "reaping orphaned agent container");
                self.teardown(&id, None).await;
                reaped += 1;
            }
        }
        Ok(reaped)
    }
}

fn is_not_found(err: &bollard::errors::Error) -> bool {
    matches!(err, bollard::errors::Error::DockerResponseServerError { status_code, .. } if *status_code == 404)
}

/// Create-container failures where the daemon rejected the request for
/// being over a quota (host out of capacity, account/resource limit) get
/// their own variant so callers can tell "try again later/elsewhere" apart
/// from a generic start failure.
fn classify_create_error(e: bollard::errors::Error) -> ContainerError {
    if let bollard::errors::Error::DockerResponseServerError { status_code, message } = &e {
        if *status_code == 403 || *status_code == 507 {
            return ContainerError::ResourceExhausted(message.clone());
        }
    }
    ContainerError::StartFailed(e.to_string())
}

/// Parse a Docker-style size string (`"4g"`, `"512m"`, `"10240k"`, plain
/// bytes) into a byte count.
fn parse_size(raw: &str) -> Result<i64, ContainerError> {
    let raw = raw.trim();
    if raw.is_empty() {
        return Err(ContainerError::InvalidResourceLimit(
            "empty size string".into(),
        ));
    }
    let (digits, mult) = match raw.chars().last().unwrap().to_ascii_lowercase() {
        'g' => (&raw[..raw.len() - 1], 1024 * 1024 * 1024),
        'm' => (&raw[..raw.len() - 1], 1024 * 1024),
        'k' => (&raw[..raw.len() - 1], 1024),
        _ => (raw, 1),
    };
    digits
        .trim()
        .parse::<i64>()
        .map(|n| n * mult)
        .map_err(|_| ContainerError::InvalidResourceLimit(format!("cannot parse {raw:?}")))
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn parse_size_handles_gigabyte_suffix() {
        assert_eq!(parse_size("4g").unwrap(), 4 * 1024 * 1024 * 1024);
    }

    #[test]
    fn parse_size_handles_megabyte_suffix() {
        assert_eq!(parse_size("512m").unwrap(), 512 * 1024 * 1024);
    }

    #[test]
    fn parse_size_handles_plain_bytes() {
        assert_eq!(parse_size("2048").unwrap(), 2048);
    }

    #[test]
    fn parse_size_rejects_empty_string() {
        assert!(parse_size("").is_err());
    }

    #[test]
    fn parse_size_rejects_garbage() {
        assert!(parse_size("not-a-size").is_err());
    }
}
