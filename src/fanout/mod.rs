//! Fan-out of transcoder output to consumers
//!
//! ```text
//!   pump ──► Broadcaster::publish(chunk)
//!                 │
//!      ┌──────────┼──────────┐
//!      ▼          ▼          ▼
//!   [send A]   [send B]   [send C]     one task per sink, bounded by send_timeout
//!      │          ✗          │
//!      └──────────┴──────────┘
//!           round complete ──► evict B, close it with 1011
//! ```
//!
//! `bytes::Bytes` is reference counted, so every sink shares the chunk's
//! allocation.

pub mod broadcaster;
pub mod sink;

pub use broadcaster::Broadcaster;
pub use sink::{close_code, ChannelSink, ClientId, ClientSink, SinkMessage};
