// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Agent preset schema and the config registry that serves it.

pub mod gateway;
pub mod registry;
pub mod schema;

pub use gateway::{config_search_paths, load_layered, GatewayConfig};
pub use registry::{ConfigRegistry, RegistryError};
pub use schema::{
    resolve_mcp_env, validate, AgentConfig, McpServerConfig, ModelAlias, PermissionMode,
    ResourceLimits, SubAgentConfig, SystemPrompt, ValidationError, ALLOWED_TOOL_NAMES,
};
