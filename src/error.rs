//! Error types for camrelay

use std::fmt;
use std::io;

use crate::config::ConfigError;
use crate::supervisor::SupervisorError;

/// Result type alias using camrelay's Error
pub type Result<T> = std::result::Result<T, Error>;

/// Main error type
#[derive(Debug)]
pub enum Error {
    /// I/O error
    Io(io::Error),
    /// Configuration could not be loaded or is invalid
    Config(ConfigError),
    /// Supervisor rejected an operation
    Supervisor(SupervisorError),
}

impl fmt::Display for Error {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        match self {
            Error::Io(e) => write!(f, "I/O error: {}", e),
            Error::Config(e) => write!(f, "Configuration error: {}", e),
            Error::Supervisor(e) => write!(f, "Supervisor error: {}", e),
        }
    }
}

impl std::error::Error for Error {
    fn source(&self) -> Option<&(dyn std::error::Error + 'static)> {
        match self {
            Error::Io(e) => Some(e),
            Error::Config(e) => Some(e),
            Error::Supervisor(e) => Some(e),
        }
    }
}

impl From<io::Error> for Error {
    fn from(e: io::Error) -> Self {
        Error::Io(e)
    }
}

impl From<ConfigError> for Error {
    fn from(e: ConfigError) -> Self {
        Error::Config(e)
    }
}

impl From<SupervisorError> for Error {
    fn from(e: SupervisorError) -> Self {
        Error::Supervisor(e)
    }
}
