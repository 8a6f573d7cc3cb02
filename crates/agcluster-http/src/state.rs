// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
use std::sync::Arc;

use agcluster_config::ConfigRegistry;
use agcluster_session::SessionManager;
use tokio::sync::RwLock;

/// Shared state threaded through every route. No module-level singletons —
/// everything a handler needs is reached through this.
#[derive(Clone)]
pub struct AppState {
    pub configs: Arc<RwLock<ConfigRegistry>>,
    pub sessions: Arc<SessionManager>,
}

impl AppState {
    pub fn new(configs: Arc<RwLock<ConfigRegistry>>, sessions: Arc<SessionManager>) -> Self {
        Self { configs, sessions }
    }
}
