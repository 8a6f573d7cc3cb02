// Copyright (c) 2024-2026 Martin Schröder <info@swedishembedded.com>
//
// SPDX-License-Identifier: MIT
//!
//! Session lifecycle management: at-most-one container per logical
//! session, idle reaping, and the per-session tool event hub.

pub mod error;
pub mod hub;
pub mod manager;
pub mod session;

pub use error::SessionError;
pub use hub::{SharedToolEventHub, ToolEventHub, QUEUE_HIGH_WATER_MARK};
pub use manager::{LaunchRequest, SessionManager, SessionManagerConfig};
pub use session::{Session, SessionKey, SessionStatus};
