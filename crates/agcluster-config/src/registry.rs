// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! `ConfigRegistry` — the typed, validated catalog of agent presets.
//!
//! Loaded once at startup from two directories: a preset directory (shipped
//! with the gateway, read-only in spirit though not enforced on disk) and a
//! custom directory (operator-authored or API-created presets). On ID
//! collision the preset wins; the shadowed custom is kept on disk but not
//! served, and a warning is logged. A malformed file in either directory is
//! skipped and logged — one bad YAML file must never prevent the rest of
//! the catalog from loading.

use std::{
    collections::HashMap,
    path::{Path, PathBuf},
};

use thiserror::Error;
use tracing::warn;

use crate::schema::{self, AgentConfig, ValidationError};

#[derive(Debug, Error)]
pub enum RegistryError {
    #[error("unknown config id: {0}")]
    NotFound(String),
    #[error("config validation failed: {0:?}")]
    Invalid(Vec<ValidationError>),
    #[error("config id {0:?} collides with an existing preset")]
    Conflict(String),
    #[error("io error writing custom config: {0}")]
    Io(#[from] std::io::Error),
    #[error("yaml error: {0}")]
    Yaml(#[from] serde_yaml::Error),
}

/// In-memory catalog of agent presets plus where custom configs get
/// persisted.
pub struct ConfigRegistry {
    presets: HashMap<String, AgentConfig>,
    customs: HashMap<String, AgentConfig>,
    custom_dir: PathBuf,
}

impl ConfigRegistry {
    /// Load the registry from a preset directory and a custom directory.
    /// Neither directory needs to exist — a missing directory is treated as
    /// empty, not an error (a fresh install has no presets shipped yet).
    pub fn load(preset_dir: &Path, custom_dir: &Path) -> Result<Self, RegistryError> {
        let presets = load_dir(preset_dir);
        let mut customs = load_dir(custom_dir);

        for id in presets.keys() {
            if customs.remove(id).is_some() {
                warn!(
                    config_id = %id,
                    "custom config shadowed by a preset of the same id"
                );
            }
        }

        std::fs::create_dir_all(custom_dir)?;

        Ok(Self {
            presets,
            customs,
            custom_dir: custom_dir.to_path_buf(),
        })
    }

    /// An empty registry backed by `custom_dir` for persistence, useful in
    /// tests and for an in-process registry with no shipped presets.
    pub fn empty(custom_dir: impl Into<PathBuf>) -> Self {
        Self {
            presets: HashMap::new(),
            customs: HashMap::new(),
            custom_dir: custom_dir.into(),
        }
    }

    /// List every visible config: presets first, then non-shadowed customs.
    pub fn list(&self) -> Vec<&AgentConfig> {
        let mut all: Vec<&AgentConfig> = self.presets.values().collect();
        all.extend(self.customs.values());
        all.sort_by(|a, b| a.id.cmp(&b.id));
        all
    }

    pub fn get(&self, id: &str) -> Option<&AgentConfig> {
        self.presets.get(id).or_else(|| self.customs.get(id))
    }

    pub fn contains(&self, id: &str) -> bool {
        self.get(id).is_some()
    }

    /// Validate and persist a custom config, making it immediately visible
    /// via [`get`]/[`list`]. Rejected with [`RegistryError::Conflict`] if
    /// `cfg.id` collides with an existing preset — presets are not
    /// overridable through this API.
    ///
    /// [`get`]: ConfigRegistry::get
    /// [`list`]: ConfigRegistry::list
    pub fn put_custom(&mut self, cfg: AgentConfig) -> Result<(), RegistryError> {
        schema::validate(&cfg).map_err(RegistryError::Invalid)?;

        if self.presets.contains_key(&cfg.id) {
            return Err(RegistryError::Conflict(cfg.id));
        }

        let path = self.custom_dir.join(format!("{}.yaml", cfg.id));
        let yaml = serde_yaml::to_string(&cfg)?;
        std::fs::write(&path, yaml)?;

        self.customs.insert(cfg.id.clone(), cfg);
        Ok(())
    }

    pub fn validate(&self, cfg: &AgentConfig) -> Result<(), Vec<ValidationError>> {
        schema::validate(cfg)
    }
}

/// Load every `*.yaml`/`*.yml` file in `dir` as an [`AgentConfig`].
/// Malformed files are logged and skipped, never fatal.
fn load_dir(dir: &Path) -> HashMap<String, AgentConfig> {
    let mut out = HashMap::new();
    let entries = match std::fs::read_dir(dir) {
        Ok(entries) => entries,
        Err(_) => return out,
    };

    for entry in entries.flatten() {
        let path = entry.path();
        let is_yaml = path
            .extension()
            .and_then(|e| e.to_str())
            .map(|e| e.eq_ignore_ascii_case("yaml") || e.eq_ignore_ascii_case("yml"))
            .unwrap_or(false);
        if !is_yaml {
            continue;
        }

        let text = match std::fs::read_to_string(&path) {
            Ok(t) => t,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping unreadable config file");
                continue;
            }
        };

        let cfg: AgentConfig = match serde_yaml::from_str(&text) {
            Ok(c) => c,
            Err(e) => {
                warn!(path = %path.display(), error = %e, "skipping malformed config file");
                continue;
            }
        };

        if let Err(errs) = schema::validate(&cfg) {
            warn!(path = %path.display(), errors = ?errs, "skipping invalid config file");
            continue;
        }

        out.insert(cfg.id.clone(), cfg);
    }

    out
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::schema::SystemPrompt;
    use tempfile::tempdir;

    fn write_config(dir: &Path, id: &str) {
        let cfg = AgentConfig {
            id: id.to_string(),
            name: id.to_string(),
            description: String::new(),
            version: "1.0.0".into(),
            allowed_tools: vec![],
            system_prompt: SystemPrompt::Text("hi".into()),
            permission_mode: Default::default(),
            max_turns: 100,
            sub_agents: None,
            mcp_servers: None,
            resources: Default::default(),
            env: None,
            cwd: None,
        };
        let yaml = serde_yaml::to_string(&cfg).unwrap();
        std::fs::write(dir.join(format!("{id}.yaml")), yaml).unwrap();
    }

    #[test]
    fn loads_presets_and_customs() {
        let presets = tempdir().unwrap();
        let customs = tempdir().unwrap();
        write_config(presets.path(), "preset-a");
        write_config(customs.path(), "custom-b");

        let reg = ConfigRegistry::load(presets.path(), customs.path()).unwrap();
        assert!(reg.get("preset-a").is_some());
        assert!(reg.get("custom-b").is_some());
        assert_eq!(reg.list().len(), 2);
    }

    #[test]
    fn preset_shadows_custom_of_same_id() {
        let presets = tempdir().unwrap();
        let customs = tempdir().unwrap();
        write_config(presets.path(), "shared-id");
        write_config(customs.path(), "shared-id");

        let reg = ConfigRegistry::load(presets.path(), customs.path()).unwrap();
        assert_eq!(reg.list().len(), 1);
        assert!(reg.get("shared-id").is_some());
    }

    #[test]
    fn malformed_file_is_skipped_not_fatal() {
        let presets = tempdir().unwrap();
        write_config(presets.path(), "good-one");
        std::fs::write(presets.path().join("broken.yaml"), "not: valid: yaml: [").unwrap();

        let customs = tempdir().unwrap();
        let reg = ConfigRegistry::load(presets.path(), customs.path()).unwrap();
        assert_eq!(reg.list().len(), 1);
        assert!(reg.get("good-one").is_some());
    }

    #[test]
    fn missing_directories_yield_empty_registry() {
        let customs = tempdir().unwrap();
        let reg = ConfigRegistry::load(Path::new("/nonexistent/presets"), customs.path()).unwrap();
        assert!(reg.list().is_empty());
    }

    #[test]
    fn put_custom_persists_and_is_immediately_visible() {
        let customs = tempdir().unwrap();
        let mut reg = ConfigRegistry::empty(customs.path().to_path_buf());
        std::fs::create_dir_all(customs.path()).unwrap();

        let cfg = AgentConfig {
            id: "new-agent".into(),
            name: "New Agent".into(),
            description: String::new(),
            version: "1.0.0".into(),
            allowed_tools: vec![],
            system_prompt: SystemPrompt::Text("hi".into()),
            permission_mode: Default::default(),
            max_turns: 100,
            sub_agents: None,
            mcp_servers: None,
            resources: Default::default(),
            env: None,
            cwd: None,
        };
        reg.put_custom(cfg).unwrap();
        assert!(reg.get("new-agent").is_some());
        assert!(customs.path().join("new-agent.yaml").exists());
    }

    #[test]
    fn put_custom_rejects_invalid_config() {
        let customs = tempdir().unwrap();
        let mut reg = ConfigRegistry::empty(customs.path().to_path_buf());
        std::fs::create_dir_all(customs.path()).unwrap();

        let cfg = AgentConfig {
            id: "BAD ID".into(),
            name: "x".into(),
            description: String::new(),
            version: "1.0.0".into(),
            allowed_tools: vec![],
            system_prompt: SystemPrompt::Text("hi".into()),
            permission_mode: Default::default(),
            max_turns: 100,
            sub_agents: None,
            mcp_servers: None,
            resources: Default::default(),
            env: None,
            cwd: None,
        };
        assert!(matches!(
            reg.put_custom(cfg),
            Err(RegistryError::Invalid(_))
        ));
    }

    #[test]
    fn put_custom_rejects_id_colliding_with_a_preset() {
        let presets = tempdir().unwrap();
        let customs = tempdir().unwrap();
        write_config(presets.path(), "shared-id");

        let mut reg = ConfigRegistry::load(presets.path(), customs.path()).unwrap();
        let cfg = AgentConfig {
            id: "shared-id".into(),
            name: "x".into(),
            description: String::new(),
            version: "1.0.0".into(),
            allowed_tools: vec![],
            system_prompt: SystemPrompt::Text("hi".into()),
            permission_mode: Default::default(),
            max_turns: 100,
            sub_agents: None,
            mcp_servers: None,
            resources: Default::default(),
            env: None,
            cwd: None,
        };
        assert!(matches!(
            reg.put_custom(cfg),
            Err(RegistryError::Conflict(id)) if id == "shared-id"
        ));
        assert!(!customs.path().join("shared-id.yaml").exists());
    }
}
