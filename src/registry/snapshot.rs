//! Read-only source snapshots
//!
//! Snapshots feed an inspection endpoint, so upstream URIs are redacted
//! before they leave the registry.

use serde::Serialize;

use crate::supervisor::{SupervisorState, SupervisorStats};

/// Per-source view exposed to the inspection interface
#[derive(Debug, Clone, PartialEq, Eq, Serialize)]
pub struct SourceSnapshot {
    /// Display name
    pub name: String,
    /// Attached clients
    pub clients: usize,
    /// Whether a transcoder process is up
    pub running: bool,
    /// Supervisor state name
    pub state: &'static str,
    /// Restarts since the last stop or clean exit
    pub restarts: u32,
    /// Upstream URI with credentials masked
    pub url: String,
}

impl SourceSnapshot {
    pub(crate) fn new(name: &str, stats: SupervisorStats, url: String) -> Self {
        Self {
            name: name.to_string(),
            clients: stats.client_count,
            running: stats.state.is_running(),
            state: stats.state.as_str(),
            restarts: stats.restart_count,
            url,
        }
    }

    /// Whether the source gave up after exhausting restarts
    pub fn is_failed(&self) -> bool {
        self.state == SupervisorState::Failed.as_str()
    }
}
