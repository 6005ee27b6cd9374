//! Demand-gated transcoder supervision
//!
//! One [`StreamSupervisor`] exists per source. It starts the transcoder when
//! the first client attaches, restarts it after crashes (up to
//! `max_restarts`, with a fixed backoff) and stops it when the last client
//! leaves.

pub mod config;
pub mod error;
pub mod pump;
pub mod state;
pub mod stream;

#[cfg(all(test, unix))]
mod tests;

pub use config::SupervisorConfig;
pub use error::SupervisorError;
pub use pump::{Pump, PumpEnd, PumpSummary};
pub use state::{SupervisorEvent, SupervisorState};
pub use stream::{StreamSupervisor, SupervisorStats};
