//! Demand-gated, self-healing fan-out of transcoder output
//!
//! camrelay runs one external transcoder per configured source, but only
//! while someone is watching. Every byte the transcoder writes to stdout is
//! broadcast to all attached clients in order; a slow or broken client is
//! dropped without affecting the others.
//!
//! # Overview
//!
//! ```text
//!  client ──add_client──► SourceRegistry ──► StreamSupervisor (per source)
//!                                               │  Idle ⇄ Starting → Running
//!                                               │        ↑           │ crash
//!                                               │  RestartPending ◄──┘
//!                                               ▼
//!                         ProcessHandle (ffmpeg) ─stdout─► Pump ─► Broadcaster ─► sinks
//!                                               └─stderr─► DiagnosticReader ─► tracing
//! ```
//!
//! # Example
//!
//! ```no_run
//! use std::sync::Arc;
//! use camrelay::{ChannelSink, RelayConfig, SourceId, SourceRegistry};
//!
//! # async fn run() -> camrelay::Result<()> {
//! let config = RelayConfig::load("relay.yaml")?;
//! let registry = SourceRegistry::from_config(&config)?;
//!
//! let (sink, mut rx) = ChannelSink::new(64);
//! let (supervisor, client) = registry
//!     .add_client(&SourceId::new("cam1"), Arc::new(sink))
//!     .await?;
//!
//! while let Some(message) = rx.recv().await {
//!     // forward to the consumer
//! #   let _ = message;
//! }
//!
//! supervisor.remove_client(client).await;
//! registry.shutdown().await;
//! # Ok(())
//! # }
//! ```

pub mod config;
pub mod error;
pub mod fanout;
pub mod process;
pub mod redact;
pub mod registry;
pub mod source;
pub mod supervisor;

pub use config::{ConfigError, RelayConfig, SourceConfig};
pub use error::{Error, Result};
pub use fanout::{close_code, Broadcaster, ChannelSink, ClientId, ClientSink, SinkMessage};
pub use process::{FfmpegLauncher, LaunchSpec, Launcher, ProcessExit, ProcessHandle};
pub use redact::Redactor;
pub use registry::{SourceRegistry, SourceSnapshot};
pub use source::{Source, SourceId, TranscodeParams};
pub use supervisor::{
    StreamSupervisor, SupervisorConfig, SupervisorError, SupervisorEvent, SupervisorState,
    SupervisorStats,
};
