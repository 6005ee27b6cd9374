//! Supervisor error types

use std::io;

use crate::source::SourceId;

/// Error type for supervisor and registry operations
#[derive(Debug, Clone)]
pub enum SupervisorError {
    /// Source already serves its maximum number of clients
    CapacityExceeded {
        /// Source that rejected the client
        id: SourceId,
        /// Configured limit
        max_clients: usize,
    },
    /// Transcoder could not be started
    SpawnFailed {
        /// Source whose transcoder failed
        id: SourceId,
        /// Program that was executed
        program: String,
        /// Kind of the underlying I/O error
        kind: io::ErrorKind,
        /// Underlying error message
        message: String,
    },
    /// No source with this id is configured
    SourceNotFound(SourceId),
}

impl SupervisorError {
    /// WebSocket-style close code a transport should use when rejecting
    pub fn close_code(&self) -> u16 {
        use crate::fanout::close_code;

        match self {
            SupervisorError::CapacityExceeded { .. } => close_code::POLICY_VIOLATION,
            SupervisorError::SpawnFailed { .. } => close_code::INTERNAL_ERROR,
            SupervisorError::SourceNotFound(_) => close_code::POLICY_VIOLATION,
        }
    }
}

impl std::fmt::Display for SupervisorError {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        match self {
            SupervisorError::CapacityExceeded { id, max_clients } => {
                write!(f, "Too many clients for {} (max {})", id, max_clients)
            }
            SupervisorError::SpawnFailed {
                id,
                program,
                message,
                ..
            } => write!(f, "Failed to start {} for {}: {}", program, id, message),
            SupervisorError::SourceNotFound(id) => write!(f, "Source not found: {}", id),
        }
    }
}

impl std::error::Error for SupervisorError {}
