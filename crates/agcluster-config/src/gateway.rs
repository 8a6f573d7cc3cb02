// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `GatewayConfig` — the top-level `agcluster serve` settings, loadable from
//! a stack of optional YAML files rather than only CLI flags/env vars.
//!
//! Layers are read in order and deep-merged field by field, each later
//! layer overriding only the fields it actually sets: `/etc/agcluster/
//! gateway.yaml`, then `~/.config/agcluster/gateway.yaml`, then
//! `.agcluster/gateway.yaml` in the current directory, then an explicit
//! `--config` path if one was given. Every layer is optional; a missing file
//! is silently skipped, a malformed one is logged and skipped — the same
//! "one bad file never blocks the rest" rule `ConfigRegistry::load` applies
//! to preset files.

use std::path::{Path, PathBuf};

use serde::{Deserialize, Serialize};
use tracing::warn;

#[derive(Debug, Clone, Default, Serialize, Deserialize)]
pub struct GatewayConfig {
    #[serde(default)]
    pub bind: Option<String>,
    #[serde(default)]
    pub preset_dir: Option<PathBuf>,
    #[serde(default)]
    pub custom_dir: Option<PathBuf>,
    #[serde(default)]
    pub harness_image: Option<String>,
    #[serde(default)]
    pub cleanup_interval_secs: Option<u64>,
    #[serde(default)]
    pub idle_timeout_secs: Option<u64>,
}

impl GatewayConfig {
    /// Overlay `later` on top of `self`: any field `later` sets wins, any
    /// field it leaves unset keeps `self`'s value.
    fn merge(self, later: GatewayConfig) -> Self {
        Self {
            bind: later.bind.or(self.bind),
            preset_dir: later.preset_dir.or(self.preset_dir),
            custom_dir: later.custom_dir.or(self.custom_dir),
            harness_image: later.harness_image.or(self.harness_image),
            cleanup_interval_secs: later.cleanup_interval_secs.or(self.cleanup_interval_secs),
            idle_timeout_secs: later.idle_timeout_secs.or(self.idle_timeout_secs),
        }
    }
}

/// The ordered list of files `load_layered` reads, lowest precedence first.
pub fn config_search_paths(explicit: Option<&Path>) -> Vec<PathBuf> {
    let mut paths = vec![PathBuf::from("/etc/agcluster/gateway.yaml")];
    if let Some(home) = dirs::home_dir() {
        paths.push(home.join(".config/agcluster/gateway.yaml"));
    }
    paths.push(PathBuf::from(".agcluster/gateway.yaml"));
    if let Some(explicit) = explicit {
        paths.push(explicit.to_path_buf());
    }
    paths
}

/// Load and merge every layer in [`config_search_paths`]. CLI flags and
/// environment variables (handled by `clap` in `src/cli.rs`) take
/// precedence over everything this returns.
pub fn load_layered(explicit: Option<&Path>) -> GatewayConfig {
    let mut merged = GatewayConfig::default();
    for path in config_search_paths(explicit) {
        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(_) => continue,
        };
        match serde_yaml::from_str::<GatewayConfig>(&text) {
            Ok(layer) => merged = merged.merge(layer),
            Err(e) => warn!(path = %path.display(), error = %e, "skipping malformed gateway config layer"),
        }
    }
    merged
}

#[cfg(test)]
mod tests {
    use super::*;
    use tempfile::tempdir;

    #[test]
    fn later_layer_overrides_earlier_one() {
        let base = GatewayConfig {
            bind: Some("0.0.0.0:9000".into()),
            idle_timeout_secs: Some(900),
            ..Default::default()
        };
        let overlay = GatewayConfig {
            idle_timeout_secs: Some(60),
            ..Default::default()
        };
        let merged = base.merge(overlay);
        assert_eq!(merged.bind.as_deref(), Some("0.0.0.0:9000"));
        assert_eq!(merged.idle_timeout_secs, Some(60));
    }

    #[test]
    fn missing_files_yield_an_empty_config() {
        let merged = load_layered(Some(Path::new("/nonexistent/gateway.yaml")));
        assert!(merged.bind.is_none());
    }

    #[test]
    fn explicit_path_is_read_and_applied() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(&path, "bind: 127.0.0.1:9100\nidle_timeout_secs: 60\n").unwrap();

        let merged = load_layered(Some(&path));
        assert_eq!(merged.bind.as_deref(), Some("127.0.0.1:9100"));
        assert_eq!(merged.idle_timeout_secs, Some(60));
    }

    #[test]
    fn malformed_layer_is_skipped_not_fatal() {
        let dir = tempdir().unwrap();
        let path = dir.path().join("gateway.yaml");
        std::fs::write(&path, "not: valid: yaml: [").unwrap();

        let merged = load_layered(Some(&path));
        assert!(merged.bind.is_none());
    }
}
