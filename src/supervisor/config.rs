//! Supervisor configuration

use std::time::Duration;

use crate::redact::Redactor;

/// Per-source supervisor settings
#[derive(Debug, Clone)]
pub struct SupervisorConfig {
    /// Maximum attached clients
    pub max_clients: usize,

    /// Restarts allowed after unexpected exits before giving up
    pub max_restarts: u32,

    /// Delay before restarting a crashed transcoder
    pub restart_backoff: Duration,

    /// How long a terminated transcoder may take to exit before it is killed
    pub shutdown_grace: Duration,

    /// Read size for the transcoder's output
    pub chunk_size: usize,

    /// Upper bound for a single sink send
    pub send_timeout: Duration,

    /// Timeout for one diagnostic line read
    pub diagnostic_read_timeout: Duration,

    /// Number of diagnostic lines kept for crash reports
    pub diagnostic_tail: usize,

    /// Capacity of the supervisor event channel
    pub event_capacity: usize,

    /// Longest diagnostic line kept; longer lines are split
    pub diagnostic_max_line: usize,

    /// Masks credentials in logged diagnostics
    pub redactor: Redactor,
}

impl Default for SupervisorConfig {
    fn default() -> Self {
        Self {
            max_clients: 3,
            max_restarts: 3,
            restart_backoff: Duration::from_secs(3),
            shutdown_grace: Duration::from_secs(3),
            chunk_size: 8 * 1024, // 8KB
            send_timeout: Duration::from_secs(5),
            diagnostic_read_timeout: Duration::from_secs(1),
            diagnostic_tail: 20,
            event_capacity: 64,
            diagnostic_max_line: 64 * 1024, // 64KB
            redactor: Redactor::default(),
        }
    }
}

impl SupervisorConfig {
    /// Set maximum clients
    pub fn max_clients(mut self, max: usize) -> Self {
        self.max_clients = max;
        self
    }

    /// Set maximum restarts
    pub fn max_restarts(mut self, max: u32) -> Self {
        self.max_restarts = max;
        self
    }

    /// Set restart backoff
    pub fn restart_backoff(mut self, delay: Duration) -> Self {
        self.restart_backoff = delay;
        self
    }

    /// Set shutdown grace period
    pub fn shutdown_grace(mut self, grace: Duration) -> Self {
        self.shutdown_grace = grace;
        self
    }

    /// Set output chunk size (at least one byte)
    pub fn chunk_size(mut self, size: usize) -> Self {
        self.chunk_size = size.max(1);
        self
    }

    /// Set per-sink send timeout
    pub fn send_timeout(mut self, timeout: Duration) -> Self {
        self.send_timeout = timeout;
        self
    }

    /// Set diagnostic read timeout
    pub fn diagnostic_read_timeout(mut self, timeout: Duration) -> Self {
        self.diagnostic_read_timeout = timeout;
        self
    }

    /// Set number of retained diagnostic lines
    pub fn diagnostic_tail(mut self, lines: usize) -> Self {
        self.diagnostic_tail = lines;
        self
    }

    /// Set the diagnostic line length cap (at least one byte)
    pub fn diagnostic_max_line(mut self, bytes: usize) -> Self {
        self.diagnostic_max_line = bytes.max(1);
        self
    }

    /// Set the redactor applied to diagnostics
    pub fn redactor(mut self, redactor: Redactor) -> Self {
        self.redactor = redactor;
        self
    }
}

#[cfg(test)]
mod tests {
    use super::*;

    #[test]
    fn test_default_config() {
        let config = SupervisorConfig::default();

        assert_eq!(config.max_clients, 3);
        assert_eq!(config.max_restarts, 3);
        assert_eq!(config.restart_backoff, Duration::from_secs(3));
        assert_eq!(config.shutdown_grace, Duration::from_secs(3));
        assert_eq!(config.chunk_size, 8192);
        assert_eq!(config.diagnostic_read_timeout, Duration::from_secs(1));
        assert_eq!(config.diagnostic_max_line, 65536);
        assert_eq!(config.redactor.secret_count(), 0);
    }

    #[test]
    fn test_builder_chunk_size_floor() {
        let config = SupervisorConfig::default().chunk_size(0);

        assert_eq!(config.chunk_size, 1);
    }

    #[test]
    fn test_builder_chaining() {
        let config = SupervisorConfig::default()
            .max_clients(10)
            .max_restarts(5)
            .restart_backoff(Duration::from_millis(250))
            .shutdown_grace(Duration::from_secs(1))
            .send_timeout(Duration::from_secs(2))
            .diagnostic_read_timeout(Duration::from_millis(100))
            .diagnostic_tail(5);

        assert_eq!(config.max_clients, 10);
        assert_eq!(config.max_restarts, 5);
        assert_eq!(config.restart_backoff, Duration::from_millis(250));
        assert_eq!(config.shutdown_grace, Duration::from_secs(1));
        assert_eq!(config.send_timeout, Duration::from_secs(2));
        assert_eq!(config.diagnostic_read_timeout, Duration::from_millis(100));
        assert_eq!(config.diagnostic_tail, 5);
    }
}
