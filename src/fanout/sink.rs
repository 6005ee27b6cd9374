//! Consumer sink interface
//!
//! Sinks are owned by the transport layer (a WebSocket, a TCP connection, ...).
//! The supervisor only holds a reference for as long as the sink is attached.

use std::fmt;
use std::io;

use async_trait::async_trait;
use bytes::Bytes;
use tokio::sync::mpsc;

/// Close codes passed to [`ClientSink::close`] (WebSocket numbering)
pub mod close_code {
    /// Stream ended normally
    pub const NORMAL: u16 = 1000;
    /// Source is shutting down
    pub const GOING_AWAY: u16 = 1001;
    /// Client rejected, e.g. too many clients
    pub const POLICY_VIOLATION: u16 = 1008;
    /// Client dropped after a failed or stalled send
    pub const INTERNAL_ERROR: u16 = 1011;
}

/// Identity of an attached sink, unique per supervisor
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, PartialOrd, Ord)]
pub struct ClientId(pub(crate) u64);

impl ClientId {
    /// Raw numeric id
    pub fn as_u64(&self) -> u64 {
        self.0
    }
}

impl fmt::Display for ClientId {
    fn fmt(&self, f: &mut fmt::Formatter<'_>) -> fmt::Result {
        write!(f, "#{}", self.0)
    }
}

/// A consumer of stream bytes
#[async_trait]
pub trait ClientSink: Send + Sync + 'static {
    /// Deliver one chunk; an error detaches the sink
    async fn send(&self, chunk: Bytes) -> io::Result<()>;

    /// Tell the consumer it is being disconnected
    async fn close(&self, code: u16, reason: &str);
}

/// Message delivered through a [`ChannelSink`]
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SinkMessage {
    /// Stream bytes
    Chunk(Bytes),
    /// The supervisor detached this sink
    Close {
        /// Close code, see [`close_code`]
        code: u16,
        /// Human readable reason
        reason: String,
    },
}

/// Sink backed by a bounded mpsc channel
///
/// For transports that run their own writer task: the transport keeps the
/// receiver and forwards chunks to its socket. Once the receiver is dropped,
/// sends fail and the sink is detached on the next broadcast round.
#[derive(Debug, Clone)]
pub struct ChannelSink {
    tx: mpsc::Sender<SinkMessage>,
}

impl ChannelSink {
    /// Create a sink and the receiver the transport reads from
    pub fn new(capacity: usize) -> (Self, mpsc::Receiver<SinkMessage>) {
        let (tx, rx) = mpsc::channel(capacity.max(1));
        (Self { tx }, rx)
    }
}

#[async_trait]
impl ClientSink for ChannelSink {
    async fn send(&self, chunk: Bytes) -> io::Result<()> {
        self.tx
            .send(SinkMessage::Chunk(chunk))
            .await
            .map_err(|_| io::Error::new(io::ErrorKind::BrokenPipe, "sink receiver dropped"))
    }

    async fn close(&self, code: u16, reason: &str) {
        // Never wait on a full queue here; the channel closing is signal enough
        let _ = self.tx.try_send(SinkMessage::Close {
            code,
            reason: reason.to_string(),
        });
    }
}
