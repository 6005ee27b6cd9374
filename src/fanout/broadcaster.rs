//! Chunk fan-out to attached sinks
//!
//! Every publish round sends the chunk to each sink on its own task, bounded
//! by a send timeout, so a stalled consumer cannot hold back the others for
//! longer than that timeout. Sinks whose send failed or timed out are removed
//! once the whole round has finished. There is no per-sink queue: a sink that
//! cannot keep up is dropped.

use std::collections::HashMap;
use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Mutex, MutexGuard, PoisonError};
use std::time::Duration;

use bytes::Bytes;
use tokio::task::JoinSet;

use crate::source::SourceId;

use super::sink::{close_code, ClientId, ClientSink};

type SinkMap = HashMap<ClientId, Arc<dyn ClientSink>>;

/// Set of attached sinks plus the publish operation
pub struct Broadcaster {
    source: SourceId,
    clients: Mutex<SinkMap>,
    next_id: AtomicU64,
    send_timeout: Duration,
}

impl Broadcaster {
    /// Create an empty broadcaster
    pub fn new(source: SourceId, send_timeout: Duration) -> Self {
        Self {
            source,
            clients: Mutex::new(HashMap::new()),
            next_id: AtomicU64::new(1),
            send_timeout,
        }
    }

    fn clients(&self) -> MutexGuard<'_, SinkMap> {
        self.clients.lock().unwrap_or_else(PoisonError::into_inner)
    }

    /// Attach a sink unless `limit` sinks are already attached
    ///
    /// Returns the new id and the resulting client count.
    pub fn attach(&self, sink: Arc<dyn ClientSink>, limit: usize) -> Option<(ClientId, usize)> {
        let mut clients = self.clients();
        if clients.len() >= limit {
            return None;
        }

        let id = ClientId(self.next_id.fetch_add(1, Ordering::Relaxed));
        clients.insert(id, sink);
        Some((id, clients.len()))
    }

    /// Detach a sink; returns it if it was attached
    pub fn detach(&self, id: ClientId) -> Option<Arc<dyn ClientSink>> {
        self.clients().remove(&id)
    }

    /// Check whether a sink is attached
    pub fn contains(&self, id: ClientId) -> bool {
        self.clients().contains_key(&id)
    }

    /// Number of attached sinks
    pub fn len(&self) -> usize {
        self.clients().len()
    }

    /// Whether no sinks are attached
    pub fn is_empty(&self) -> bool {
        self.clients().is_empty()
    }

    /// Detach every sink and close each with `code`
    ///
    /// Returns the number of sinks that were attached.
    pub async fn close_all(&self, code: u16, reason: &str) -> usize {
        let drained: Vec<_> = self.clients().drain().collect();
        let count = drained.len();

        let mut closing = JoinSet::new();
        for (_, sink) in drained {
            let reason = reason.to_string();
            let limit = self.send_timeout;
            closing.spawn(async move {
                let _ = tokio::time::timeout(limit, sink.close(code, &reason)).await;
            });
        }
        while closing.join_next().await.is_some() {}

        count
    }

    /// Deliver `chunk` to every attached sink
    ///
    /// Returns the ids of sinks that were evicted during this round.
    pub async fn publish(&self, chunk: Bytes) -> Vec<ClientId> {
        let targets: Vec<(ClientId, Arc<dyn ClientSink>)> = self
            .clients()
            .iter()
            .map(|(id, sink)| (*id, Arc::clone(sink)))
            .collect();

        if targets.is_empty() {
            return Vec::new();
        }

        let mut round = JoinSet::new();
        let mut task_owner = HashMap::with_capacity(targets.len());

        for (id, sink) in targets {
            let chunk = chunk.clone();
            let limit = self.send_timeout;
            let handle = round.spawn(async move {
                match tokio::time::timeout(limit, sink.send(chunk)).await {
                    Ok(Ok(())) => Ok(()),
                    Ok(Err(e)) => Err(e.to_string()),
                    Err(_) => Err(format!("send timed out after {}ms", limit.as_millis())),
                }
            });
            task_owner.insert(handle.id(), id);
        }

        let mut failed = Vec::new();
        while let Some(joined) = round.join_next_with_id().await {
            match joined {
                Ok((_, Ok(()))) => {}
                Ok((task, Err(reason))) => {
                    if let Some(id) = task_owner.get(&task) {
                        failed.push((*id, reason));
                    }
                }
                Err(e) => {
                    if let Some(id) = task_owner.get(&e.id()) {
                        failed.push((*id, "sink panicked".to_string()));
                    }
                }
            }
        }

        self.evict(failed)
    }

    fn evict(&self, failed: Vec<(ClientId, String)>) -> Vec<ClientId> {
        if failed.is_empty() {
            return Vec::new();
        }

        let mut evicted = Vec::with_capacity(failed.len());
        let mut removed = Vec::with_capacity(failed.len());
        {
            let mut clients = self.clients();
            for (id, reason) in failed {
                // May already be gone if the transport detached it mid-round
                if let Some(sink) = clients.remove(&id) {
                    tracing::warn!(
                        source = %self.source,
                        client = %id,
                        reason = %reason,
                        remaining = clients.len(),
                        "Client dropped after failed send"
                    );
                    evicted.push(id);
                    removed.push(sink);
                }
            }
        }

        if !removed.is_empty() {
            let limit = self.send_timeout;
            tokio::spawn(async move {
                for sink in removed {
                    let _ = tokio::time::timeout(
                        limit,
                        sink.close(close_code::INTERNAL_ERROR, "send failed"),
                    )
                    .await;
                }
            });
        }

        evicted
    }
}
