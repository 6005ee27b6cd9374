//! Source registry
//!
//! The registry maps source ids to their supervisors and produces the
//! read-only snapshots used for inspection.
//!
//! # Architecture
//!
//! ```text
//!                       SourceRegistry
//!                 ┌──────────────────────────┐
//!                 │ supervisors: HashMap<Id, │
//!                 │   Arc<StreamSupervisor>> │
//!                 └────────────┬─────────────┘
//!                              │
//!          ┌───────────────────┼───────────────────┐
//!          ▼                   ▼                   ▼
//!     [cam1 supervisor]   [cam2 supervisor]   [cam3 supervisor]
//!      ffmpeg ─► pump      (idle, no demand)    ffmpeg ─► pump
//!          │                                        │
//!     Broadcaster ─► sinks                     Broadcaster ─► sinks
//! ```
//!
//! Supervisors are independent: each has its own transition lock, so a slow
//! shutdown on one source never delays another.

pub mod snapshot;
pub mod store;

pub use crate::redact::Redactor;
pub use snapshot::SourceSnapshot;
pub use store::SourceRegistry;
