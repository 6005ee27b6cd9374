//! Supervisor state machine types
//!
//! ```text
//!   Idle ──► Starting ──► Running ──► Stopping ──► Idle
//!                            │
//!                            ▼ (non-zero exit, clients attached)
//!                     RestartPending ──► Starting
//!                            │
//!                            ▼ (restart budget exhausted)
//!                          Failed ──► Idle (on new demand)
//! ```

use std::fmt;
use std::time::Duration;

use crate::fanout::ClientId;
use crate::process::ProcessExit;

/// Lifecycle state of a supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum SupervisorState {
    /// No process, waiting for demand
    Idle,
    /// Process is being spawned
    Starting,
    /// Process is running and streaming
    Running,
    /// Process is being torn down
    Stopping,
    /// Process crashed, restart scheduled after backoff
    RestartPending,
    /// Restart budget exhausted; cleared by new demand
    Failed,
}

impl SupervisorState {
    /// Whether a transcoder process exists in this state
    pub fn is_running(&self) -> bool {
        matches!(self, SupervisorState::Starting | SupervisorState::Running)
    }

    /// Lowercase name, used in logs and snapshots
    pub fn as_str(&self) -> &'static str {
        match self {
            SupervisorState::Idle => "idle",
            SupervisorState::Starting => "starting",
            SupervisorState::Running => "running",
            SupervisorState::Stopping => "stopping",
            SupervisorState::RestartPending => "restart_pending",
            SupervisorState::Failed => "failed",
        }
    }
}

impl fmt::Display for SupervisorState {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        f.write_str(self.as_str())
    }
}

/// Notable supervisor events, for observability only
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SupervisorEvent {
    /// A transcoder process was spawned
    Started {
        /// OS process id
        pid: Option<u32>,
    },
    /// The transcoder could not be spawned
    SpawnFailed {
        /// Error message
        message: String,
    },
    /// The transcoder exited on its own
    Exited {
        /// Exit status
        exit: ProcessExit,
    },
    /// A restart will be attempted after `delay`
    RestartScheduled {
        /// 1-based restart attempt
        attempt: u32,
        /// Backoff before the attempt
        delay: Duration,
    },
    /// Restart budget exhausted
    Failed {
        /// Restarts attempted before giving up
        restarts: u32,
    },
    /// The supervisor returned to idle
    Stopped,
    /// A client was dropped after a failed send
    ClientEvicted {
        /// Dropped client
        client: ClientId,
    },
}
