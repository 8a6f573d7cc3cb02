// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
mod cli;

use std::{io::Write as _, net::TcpStream, path::PathBuf, sync::Arc, time::Duration};

use anyhow::Context;
use clap::Parser;
use tracing_subscriber::{filter::EnvFilter, fmt, prelude::*};

use agcluster_config::ConfigRegistry;
use agcluster_container::{ContainerManager, ContainerRuntime};
use agcluster_session::{SessionManager, SessionManagerConfig, ToolEventHub};
use cli::{Cli, Commands, ConfigsCommands, SessionsCommands};
use tokio::sync::RwLock;

fn init_logging(verbosity: u8) {
    let level = match verbosity {
        0 => "info",
        1 => "debug",
        _ => "trace",
    };
    let filter = EnvFilter::try_from_default_env().unwrap_or_else(|_| EnvFilter::new(level));

    let _ = tracing_subscriber::registry()
        .with(fmt::layer().with_target(false).with_writer(std::io::stderr))
        .with(filter)
        .try_init();
}

fn main() -> anyhow::Result<()> {
    let cli = Cli::parse();
    init_logging(cli.verbose);

    let rt = tokio::runtime::Runtime::new().context("building tokio runtime")?;
    rt.block_on(run(cli))
}

async fn run(cli: Cli) -> anyhow::Result<()> {
    match cli.command {
        Commands::Serve {
            config,
            bind,
            preset_dir,
            custom_dir,
            harness_image,
            cleanup_interval_secs,
            idle_timeout_secs,
        } => {
            let layered = agcluster_config::load_layered(config.as_deref());
            serve(
                bind.or(layered.bind).unwrap_or_else(|| "127.0.0.1:8080".to_string()),
                preset_dir
                    .or(layered.preset_dir)
                    .unwrap_or_else(cli::default_preset_dir),
                custom_dir
                    .or(layered.custom_dir)
                    .unwrap_or_else(cli::default_custom_dir),
                harness_image
                    .or(layered.harness_image)
                    .unwrap_or_else(|| "agcluster-harness:latest".to_string()),
                cleanup_interval_secs.or(layered.cleanup_interval_secs).unwrap_or(300),
                idle_timeout_secs.or(layered.idle_timeout_secs).unwrap_or(1800),
            )
            .await
        }
        Commands::Configs { command } => configs(command),
        Commands::Sessions { command } => sessions(command),
    }
}

async fn serve(
    bind: String,
    preset_dir: PathBuf,
    custom_dir: PathBuf,
    harness_image: String,
    cleanup_interval_secs: u64,
    idle_timeout_secs: u64,
) -> anyhow::Result<()> {
    let registry = ConfigRegistry::load(&preset_dir, &custom_dir)
        .context("loading agent config registry")?;
    tracing::info!(
        preset_dir = %preset_dir.display(),
        custom_dir = %custom_dir.display(),
        configs = registry.list().len(),
        "config registry loaded"
    );

    let container_manager = ContainerManager::connect_local(harness_image)
        .context("connecting to the local container runtime")?;
    let container_manager: Arc<dyn ContainerRuntime> = Arc::new(container_manager);

    if let Ok(reaped) = container_manager.reap_orphans(&[]).await {
        if reaped > 0 {
            tracing::info!(reaped, "removed orphaned agent containers from a previous run");
        }
    }

    let sessions = SessionManager::new(
        container_manager,
        Arc::new(ToolEventHub::new()),
        SessionManagerConfig {
            cleanup_interval: Duration::from_secs(cleanup_interval_secs),
            idle_timeout: Duration::from_secs(idle_timeout_secs),
        },
    );

    let state = agcluster_http::AppState::new(Arc::new(RwLock::new(registry)), sessions.clone());
    let app = agcluster_http::router(state);

    let listener = tokio::net::TcpListener::bind(&bind)
        .await
        .with_context(|| format!("binding {bind}"))?;
    tracing::info!(%bind, "agcluster gateway listening");

    axum::serve(listener, app)
        .with_graceful_shutdown(shutdown_signal())
        .await
        .context("serving http")?;

    tracing::info!("shutting down, releasing all live sessions");
    sessions.shutdown().await;
    Ok(())
}

async fn shutdown_signal() {
    let _ = tokio::signal::ctrl_c().await;
    tracing::info!("received ctrl-c, draining");
}

fn configs(command: ConfigsCommands) -> anyhow::Result<()> {
    match command {
        ConfigsCommands::List {
            preset_dir,
            custom_dir,
        } => {
            let preset_dir = preset_dir.unwrap_or_else(cli::default_preset_dir);
            let custom_dir = custom_dir.unwrap_or_else(cli::default_custom_dir);
            let registry = ConfigRegistry::load(&preset_dir, &custom_dir)
                .context("loading agent config registry")?;
            for cfg in registry.list() {
                println!("{:<24} {:<8} {}", cfg.id, cfg.version, cfg.name);
            }
            Ok(())
        }
        ConfigsCommands::Show {
            id,
            preset_dir,
            custom_dir,
        } => {
            let preset_dir = preset_dir.unwrap_or_else(cli::default_preset_dir);
            let custom_dir = custom_dir.unwrap_or_else(cli::default_custom_dir);
            let registry = ConfigRegistry::load(&preset_dir, &custom_dir)
                .context("loading agent config registry")?;
            let cfg = registry
                .get(&id)
                .with_context(|| format!("no config named {id:?}"))?;
            print!("{}", serde_yaml::to_string(cfg)?);
            Ok(())
        }
        ConfigsCommands::Validate { file } => {
            let text = std::fs::read_to_string(&file)
                .with_context(|| format!("reading {}", file.display()))?;
            let cfg: agcluster_config::AgentConfig =
                serde_yaml::from_str(&text).with_context(|| format!("parsing {}", file.display()))?;
            match agcluster_config::validate(&cfg) {
                Ok(()) => {
                    println!("{} is valid", file.display());
                    Ok(())
                }
                Err(errors) => {
                    for e in &errors {
                        eprintln!("  {e}");
                    }
                    anyhow::bail!("{} failed validation ({} error(s))", file.display(), errors.len());
                }
            }
        }
    }
}

fn sessions(command: SessionsCommands) -> anyhow::Result<()> {
    match command {
        SessionsCommands::List { bind, token } => {
            let body = http_get(&bind, "/api/agents/sessions", token.as_deref())
                .context("querying gateway for active sessions")?;
            println!("{body}");
            Ok(())
        }
    }
}

/// A deliberately minimal blocking HTTP/1.1 GET, just enough for the CLI to
/// ask a running gateway about itself without pulling in an HTTP client
/// crate the server side doesn't already depend on.
fn http_get(bind: &str, path: &str, token: Option<&str>) -> anyhow::Result<String> {
    let mut stream = TcpStream::connect(bind).with_context(|| format!("connecting to {bind}"))?;
    stream.set_read_timeout(Some(Duration::from_secs(10))).ok();

    let mut request = format!("GET {path} HTTP/1.1\r\nHost: {bind}\r\nConnection: close\r\n");
    if let Some(token) = token {
        request.push_str(&format!("Authorization: Bearer {token}\r\n"));
    }
    request.push_str("\r\n");
    stream.write_all(request.as_bytes())?;

    let mut raw = Vec::new();
    std::io::Read::read_to_end(&mut stream, &mut raw)?;
    let raw = String::from_utf8_lossy(&raw);
    let body = raw.split_once("\r\n\r\n").map(|(_, b)| b).unwrap_or(&raw);
    Ok(body.to_string())
}
