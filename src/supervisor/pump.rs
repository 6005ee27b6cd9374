//! Output pump
//!
//! Reads the transcoder's stdout in fixed-size chunks and publishes each one
//! before reading the next, so every sink sees chunks in production order.

use bytes::BytesMut;
use tokio::io::{AsyncRead, AsyncReadExt};
use tokio_util::sync::CancellationToken;

use crate::fanout::{Broadcaster, ClientId};
use crate::source::SourceId;

/// Why the pump stopped
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum PumpEnd {
    /// Zero-length read
    EndOfStream,
    /// The run was cancelled
    Cancelled,
    /// Reading the output failed
    ReadError(String),
}

/// Totals for one pump run
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct PumpSummary {
    /// Chunks published
    pub chunks: u64,
    /// Bytes published
    pub bytes: u64,
    /// Reason the loop ended
    pub end: PumpEnd,
}

/// Copies transcoder output into a [`Broadcaster`]
pub struct Pump {
    source: SourceId,
    chunk_size: usize,
}

impl Pump {
    /// Create a pump reading `chunk_size` bytes at a time
    pub fn new(source: SourceId, chunk_size: usize) -> Self {
        Self {
            source,
            chunk_size: chunk_size.max(1),
        }
    }

    /// Run until end-of-stream, a read error or cancellation
    ///
    /// `on_evicted` is called after every round that dropped sinks.
    pub async fn run<R, F>(
        &self,
        mut reader: R,
        broadcaster: &Broadcaster,
        cancel: &CancellationToken,
        mut on_evicted: F,
    ) -> PumpSummary
    where
        R: AsyncRead + Unpin,
        F: FnMut(&[ClientId]),
    {
        let mut buf = BytesMut::with_capacity(self.chunk_size);
        let mut chunks = 0u64;
        let mut bytes = 0u64;

        let end = loop {
            buf.resize(self.chunk_size, 0);

            let read = tokio::select! {
                biased;
                _ = cancel.cancelled() => break PumpEnd::Cancelled,
                read = reader.read(&mut buf[..]) => read,
            };

            let n = match read {
                Ok(0) => break PumpEnd::EndOfStream,
                Ok(n) => n,
                Err(e) => break PumpEnd::ReadError(e.to_string()),
            };

            buf.truncate(n);
            let chunk = buf.split().freeze();
            chunks += 1;
            bytes += n as u64;

            let evicted = tokio::select! {
                biased;
                _ = cancel.cancelled() => break PumpEnd::Cancelled,
                evicted = broadcaster.publish(chunk) => evicted,
            };

            if !evicted.is_empty() {
                on_evicted(&evicted);
            }
        };

        tracing::debug!(
            source = %self.source,
            chunks = chunks,
            bytes = bytes,
            end = ?end,
            "Output pump finished"
        );

        PumpSummary { chunks, bytes, end }
    }
}
