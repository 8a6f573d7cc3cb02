// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! The agent preset schema (`AgentConfig`) and its validation rules.
//!
//! Partial-override-friendly: every optional field has a serde default, so a
//! preset YAML file only needs to state what it overrides.

use std::collections::HashMap;

use regex::Regex;
use serde::{Deserialize, Serialize};
use std::sync::OnceLock;

/// Closed vocabulary of tool names an `AgentConfig.allowed_tools` entry may
/// reference. Sorted for deterministic validation-error ordering.
pub const ALLOWED_TOOL_NAMES: &[&str] = &[
    "bash",
    "delete_file",
    "edit_file",
    "find_file",
    "glob",
    "grep",
    "list_dir",
    "read_file",
    "read_image",
    "read_lints",
    "run_terminal_command",
    "search_codebase",
    "shell",
    "todo_write",
    "web_fetch",
    "web_search",
    "write_file",
];

fn id_pattern() -> &'static Regex {
    static RE: OnceLock<Regex> = OnceLock::new();
    RE.get_or_init(|| Regex::new(r"^[a-z0-9_-]+$").expect("static pattern is valid"))
}

fn default_true() -> bool {
    true
}
fn default_max_turns() -> u32 {
    100
}
fn default_cpu_quota_micros() -> u64 {
    200_000
}
fn default_memory_limit() -> String {
    "4g".to_string()
}
fn default_storage_limit() -> String {
    "10g".to_string()
}
fn default_cpu_period_micros() -> u64 {
    100_000
}

/// A model alias a sub-agent may be pinned to, or `inherit` to use the
/// parent agent's model.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "lowercase")]
pub enum ModelAlias {
    Sonnet,
    Opus,
    Haiku,
    Inherit,
}

/// Permission gate applied to tool invocations inside the container.
#[derive(Debug, Clone, Copy, PartialEq, Eq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub enum PermissionMode {
    Default,
    AcceptEdits,
    Plan,
    BypassPermissions,
}

impl Default for PermissionMode {
    fn default() -> Self {
        PermissionMode::Default
    }
}

/// `system_prompt` is either a literal string, or a tagged reference to a
/// named built-in preset with an optional appended suffix.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(untagged)]
pub enum SystemPrompt {
    Text(String),
    Preset {
        preset: String,
        #[serde(default)]
        append: Option<String>,
    },
}

/// A named sub-agent the top-level agent may delegate sub-tasks to.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct SubAgentConfig {
    pub description: String,
    pub prompt: String,
    #[serde(default)]
    pub tools: Option<Vec<String>>,
    #[serde(default)]
    pub model: Option<ModelAlias>,
}

/// MCP server transport configuration. `env` values may contain `${VAR}`
/// placeholders, resolved against the launch-time environment — unresolved
/// placeholders are an `InvalidConfig` error raised at launch, not at load
/// or validate time (the reference to the variable is perfectly valid
/// config on disk; only using it without a binding is an error).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
#[serde(tag = "kind", rename_all = "snake_case")]
pub enum McpServerConfig {
    Stdio {
        command: String,
        #[serde(default)]
        args: Vec<String>,
        #[serde(default)]
        env: HashMap<String, String>,
    },
    Sse {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
    Http {
        url: String,
        #[serde(default)]
        headers: HashMap<String, String>,
    },
}

/// Container resource caps. `cpu_quota_micros` may be smaller than
/// `cpu_period_micros` (sub-core allocations are valid, e.g. 50000/100000
/// for half a core).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ResourceLimits {
    #[serde(default = "default_cpu_quota_micros")]
    pub cpu_quota_micros: u64,
    #[serde(default = "default_cpu_period_micros")]
    pub cpu_period_micros: u64,
    #[serde(default = "default_memory_limit")]
    pub memory_limit: String,
    #[serde(default = "default_storage_limit")]
    pub storage_limit: String,
}

impl Default for ResourceLimits {
    fn default() -> Self {
        Self {
            cpu_quota_micros: default_cpu_quota_micros(),
            cpu_period_micros: default_cpu_period_micros(),
            memory_limit: default_memory_limit(),
            storage_limit: default_storage_limit(),
        }
    }
}

/// A full agent preset: what tools it may use, what its system prompt is,
/// what sub-agents and MCP servers it can reach, and what resources its
/// container gets.
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct AgentConfig {
    pub id: String,
    pub name: String,
    #[serde(default)]
    pub description: String,
    #[serde(default = "default_version")]
    pub version: String,
    #[serde(default)]
    pub allowed_tools: Vec<String>,
    pub system_prompt: SystemPrompt,
    #[serde(default)]
    pub permission_mode: PermissionMode,
    #[serde(default = "default_max_turns")]
    pub max_turns: u32,
    #[serde(default)]
    pub sub_agents: Option<HashMap<String, SubAgentConfig>>,
    #[serde(default)]
    pub mcp_servers: Option<HashMap<String, McpServerConfig>>,
    #[serde(default)]
    pub resources: ResourceLimits,
    #[serde(default)]
    pub env: Option<HashMap<String, String>>,
    #[serde(default)]
    pub cwd: Option<String>,
}

fn default_version() -> String {
    "1.0.0".to_string()
}

/// One validation failure, field-scoped so an inline `/api/agents/launch`
/// with an embedded config can report per-field errors (spec §7,
/// `InvalidConfig`).
#[derive(Debug, Clone, PartialEq, Serialize, Deserialize)]
pub struct ValidationError {
    pub field: String,
    pub message: String,
}

impl ValidationError {
    fn new(field: impl Into<String>, message: impl Into<String>) -> Self {
        Self {
            field: field.into(),
            message: message.into(),
        }
    }
}

/// Validate an [`AgentConfig`] in full. Total: never panics, always returns
/// `Ok(())` or a non-empty, finite list of [`ValidationError`]s — never an
/// unbounded or infinite iteration regardless of input shape.
pub fn validate(cfg: &AgentConfig) -> Result<(), Vec<ValidationError>> {
    let mut errors = Vec::new();

    if cfg.id.is_empty() || !id_pattern().is_match(&cfg.id) {
        errors.push(ValidationError::new(
            "id",
            "must match [a-z0-9_-]+ and be non-empty",
        ));
    }

    if cfg.name.trim().is_empty() {
        errors.push(ValidationError::new("name", "must not be empty"));
    }

    for (i, tool) in cfg.allowed_tools.iter().enumerate() {
        if !ALLOWED_TOOL_NAMES.contains(&tool.as_str()) {
            errors.push(ValidationError::new(
                format!("allowed_tools[{i}]"),
                format!("unknown tool {tool:?}, must be one of {ALLOWED_TOOL_NAMES:?}"),
            ));
        }
    }

    if cfg.max_turns == 0 {
        errors.push(ValidationError::new("max_turns", "must be at least 1"));
    }

    if let SystemPrompt::Preset { preset, .. } = &cfg.system_prompt {
        if preset.trim().is_empty() {
            errors.push(ValidationError::new(
                "system_prompt.preset",
                "preset name must not be empty",
            ));
        }
    }

    if let Some(subs) = &cfg.sub_agents {
        for (name, sub) in subs {
            if sub.description.trim().is_empty() {
                errors.push(ValidationError::new(
                    format!("sub_agents.{name}.description"),
                    "must not be empty",
                ));
            }
            if let Some(tools) = &sub.tools {
                for tool in tools {
                    if !ALLOWED_TOOL_NAMES.contains(&tool.as_str()) {
                        errors.push(ValidationError::new(
                            format!("sub_agents.{name}.tools"),
                            format!("unknown tool {tool:?}"),
                        ));
                    }
                }
            }
        }
    }

    if let Some(servers) = &cfg.mcp_servers {
        for (name, server) in servers {
            match server {
                McpServerConfig::Stdio { command, .. } if command.trim().is_empty() => {
                    errors.push(ValidationError::new(
                        format!("mcp_servers.{name}.command"),
                        "must not be empty",
                    ));
                }
                McpServerConfig::Sse { url, .. } | McpServerConfig::Http { url, .. }
                    if url.trim().is_empty() =>
                {
                    errors.push(ValidationError::new(
                        format!("mcp_servers.{name}.url"),
                        "must not be empty",
                    ));
                }
                _ => {}
            }
        }
    }

    if cfg.resources.cpu_quota_micros == 0 {
        errors.push(ValidationError::new(
            "resources.cpu_quota_micros",
            "must be greater than 0",
        ));
    }

    if errors.is_empty() {
        Ok(())
    } else {
        Err(errors)
    }
}

/// Resolve `${VAR}` placeholders in an MCP server's `env` map against a
/// concrete environment. Called at launch time, never at load/validate
/// time. An unresolved placeholder is the caller's `InvalidConfig` error.
pub fn resolve_mcp_env(
    env: &HashMap<String, String>,
    bindings: &HashMap<String, String>,
) -> Result<HashMap<String, String>, String> {
    let placeholder = Regex::new(r"\$\{([A-Za-z_][A-Za-z0-9_]*)\}").expect("valid pattern");
    let mut resolved = HashMap::with_capacity(env.len());
    for (k, v) in env {
        let mut missing = None;
        let out = placeholder.replace_all(v, |caps: &regex::Captures| {
            let var = &caps[1];
            match bindings.get(var) {
                Some(value) => value.clone(),
                None => {
                    missing = Some(var.to_string());
                    String::new()
                }
            }
        });
        if let Some(var) = missing {
            return Err(format!("unresolved placeholder ${{{var}}} in env.{k}"));
        }
        resolved.insert(k.clone(), out.into_owned());
    }
    Ok(resolved)
}

#[cfg(test)]
mod tests {
    use super::*;

    fn minimal_config(id: &str) -> AgentConfig {
        AgentConfig {
            id: id.to_string(),
            name: "Test Agent".into(),
            description: String::new(),
            version: "1.0.0".into(),
            allowed_tools: vec![],
            system_prompt: SystemPrompt::Text("be helpful".into()),
            permission_mode: PermissionMode::Default,
            max_turns: 100,
            sub_agents: None,
            mcp_servers: None,
            resources: ResourceLimits::default(),
            env: None,
            cwd: None,
        }
    }

    #[test]
    fn valid_minimal_config_passes() {
        assert!(validate(&minimal_config("my-agent")).is_ok());
    }

    #[test]
    fn empty_allowed_tools_is_valid() {
        let cfg = minimal_config("agent-1");
        assert!(cfg.allowed_tools.is_empty());
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn invalid_id_characters_rejected() {
        let cfg = minimal_config("Not Valid!");
        let errs = validate(&cfg).unwrap_err();
        assert!(errs.iter().any(|e| e.field == "id"));
    }

    #[test]
    fn unknown_tool_name_rejected() {
        let mut cfg = minimal_config("agent-1");
        cfg.allowed_tools.push("nonexistent_tool".into());
        let errs = validate(&cfg).unwrap_err();
        assert!(errs.iter().any(|e| e.field == "allowed_tools[0]"));
    }

    #[test]
    fn sub_core_cpu_quota_is_accepted() {
        let mut cfg = minimal_config("agent-1");
        cfg.resources.cpu_quota_micros = 50_000;
        cfg.resources.cpu_period_micros = 100_000;
        assert!(validate(&cfg).is_ok());
    }

    #[test]
    fn zero_max_turns_rejected() {
        let mut cfg = minimal_config("agent-1");
        cfg.max_turns = 0;
        let errs = validate(&cfg).unwrap_err();
        assert!(errs.iter().any(|e| e.field == "max_turns"));
    }

    #[test]
    fn validate_never_panics_on_many_bad_fields() {
        let mut cfg = minimal_config("BAD ID!!");
        cfg.name = "  ".into();
        cfg.max_turns = 0;
        cfg.allowed_tools = vec!["nope".into(), "also_nope".into()];
        cfg.resources.cpu_quota_micros = 0;
        let errs = validate(&cfg).unwrap_err();
        assert!(errs.len() >= 4);
    }

    #[test]
    fn system_prompt_text_variant_round_trips() {
        let json = r#""just a string""#;
        let sp: SystemPrompt = serde_json::from_str(json).unwrap();
        assert_eq!(sp, SystemPrompt::Text("just a string".into()));
    }

    #[test]
    fn system_prompt_preset_variant_round_trips() {
        let json = r#"{"preset":"default","append":"be terse"}"#;
        let sp: SystemPrompt = serde_json::from_str(json).unwrap();
        assert_eq!(
            sp,
            SystemPrompt::Preset {
                preset: "default".into(),
                append: Some("be terse".into())
            }
        );
    }

    #[test]
    fn resolve_mcp_env_substitutes_bindings() {
        let mut env = HashMap::new();
        env.insert("TOKEN".to_string(), "${API_KEY}".to_string());
        let mut bindings = HashMap::new();
        bindings.insert("API_KEY".to_string(), "secret123".to_string());
        let resolved = resolve_mcp_env(&env, &bindings).unwrap();
        assert_eq!(resolved["TOKEN"], "secret123");
    }

    #[test]
    fn resolve_mcp_env_reports_unresolved_placeholder() {
        let mut env = HashMap::new();
        env.insert("TOKEN".to_string(), "${MISSING}".to_string());
        let err = resolve_mcp_env(&env, &HashMap::new()).unwrap_err();
        assert!(err.contains("MISSING"));
    }

    #[test]
    fn permission_mode_serializes_camel_case() {
        assert_eq!(
            serde_json::to_string(&PermissionMode::AcceptEdits).unwrap(),
            r#""acceptEdits""#
        );
        assert_eq!(
            serde_json::to_string(&PermissionMode::BypassPermissions).unwrap(),
            r#""bypassPermissions""#
        );
    }
}
