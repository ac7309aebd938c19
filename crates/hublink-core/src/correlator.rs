//! Request/response correlation over the duplex channel.
//!
//! Every correlated request gets a fresh id from a monotonic counter and a
//! slot in the pending table. The slot is removed exactly once: by the
//! matching `result` frame, by the caller's deadline, or by a connection
//! teardown. Whoever removes it owns the right to complete the request, so
//! a request can never be resolved twice. A caller that stops waiting
//! early releases its slot when its [`PendingReply`] is dropped.

use std::sync::atomic::{AtomicU64, Ordering};
use std::sync::{Arc, Weak};
use std::time::Duration;

use dashmap::DashMap;
use hublink_api::wire::HubError;
use serde_json::Value;
use tokio::sync::oneshot;
use tokio::time::Instant;
use tracing::{debug, trace, warn};

use crate::error::CoreError;

/// Outcome delivered to a waiting caller.
pub type Reply = Result<Value, CoreError>;

struct PendingRequest {
    reply_tx: oneshot::Sender<Reply>,
    created_at: Instant,
}

type PendingTable = DashMap<u64, PendingRequest>;

/// Id allocator plus the table of requests awaiting a reply.
pub struct RequestCorrelator {
    next_id: AtomicU64,
    pending: Arc<PendingTable>,
}

impl Default for RequestCorrelator {
    fn default() -> Self {
        Self::new()
    }
}

impl RequestCorrelator {
    pub fn new() -> Self {
        Self {
            next_id: AtomicU64::new(1),
            pending: Arc::new(DashMap::new()),
        }
    }

    /// Allocate an id without registering a waiter (heartbeat probes).
    pub fn next_id(&self) -> u64 {
        self.next_id.fetch_add(1, Ordering::Relaxed)
    }

    /// Allocate an id and register a waiter for it.
    pub fn register(&self, timeout: Duration) -> PendingReply {
        let id = self.next_id();
        let (reply_tx, reply_rx) = oneshot::channel();
        self.pending.insert(
            id,
            PendingRequest {
                reply_tx,
                created_at: Instant::now(),
            },
        );
        PendingReply {
            id,
            timeout,
            reply_rx,
            table: Arc::downgrade(&self.pending),
        }
    }

    /// Complete request `id`. Returns `false` for unknown or already
    /// completed ids, whose replies are dropped.
    pub fn resolve(&self, id: u64, reply: Reply) -> bool {
        let Some((_, pending)) = self.pending.remove(&id) else {
            trace!(id, "discarding reply for unknown request");
            return false;
        };
        trace!(
            id,
            elapsed_ms = pending.created_at.elapsed().as_millis(),
            ok = reply.is_ok(),
            "request resolved"
        );
        let _ = pending.reply_tx.send(reply);
        true
    }

    /// Complete request `id` from the fields of a `result` frame.
    pub fn resolve_frame(
        &self,
        id: u64,
        success: bool,
        result: Option<Value>,
        error: Option<HubError>,
    ) -> bool {
        let reply = if success {
            Ok(result.unwrap_or(Value::Null))
        } else {
            let error = error.unwrap_or_else(|| HubError {
                code: "unknown_error".into(),
                message: "request failed without an error object".into(),
            });
            Err(CoreError::Rejected {
                code: error.code,
                message: error.message,
            })
        };
        self.resolve(id, reply)
    }

    /// Drop request `id` without notifying its waiter. Returns `true` if
    /// it was still pending.
    pub fn forget(&self, id: u64) -> bool {
        self.pending.remove(&id).is_some()
    }

    /// Fail every pending request with `err`. Returns how many there were.
    pub fn reject_all(&self, err: &CoreError) -> usize {
        let ids: Vec<u64> = self.pending.iter().map(|entry| *entry.key()).collect();
        let mut rejected = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                let _ = pending.reply_tx.send(Err(err.clone()));
                rejected += 1;
            }
        }
        if rejected > 0 {
            warn!(rejected, error = %err, "rejected pending requests");
        }
        rejected
    }

    pub fn is_pending(&self, id: u64) -> bool {
        self.pending.contains_key(&id)
    }

    pub fn len(&self) -> usize {
        self.pending.len()
    }

    pub fn is_empty(&self) -> bool {
        self.pending.is_empty()
    }
}

/// The caller's half of a registered request.
///
/// Dropping it before the reply arrives removes the request from the
/// table; a reply that shows up afterwards is discarded as unknown.
#[derive(Debug)]
pub struct PendingReply {
    id: u64,
    timeout: Duration,
    reply_rx: oneshot::Receiver<Reply>,
    table: Weak<PendingTable>,
}

impl PendingReply {
    pub fn id(&self) -> u64 {
        self.id
    }

    /// Wait for the reply or the deadline, whichever comes first.
    pub async fn wait(mut self) -> Reply {
        match tokio::time::timeout(self.timeout, &mut self.reply_rx).await {
            Ok(Ok(reply)) => reply,
            Ok(Err(_)) => Err(CoreError::ConnectionClosed),
            Err(_) => {
                if self.release() {
                    let timeout_ms = u64::try_from(self.timeout.as_millis()).unwrap_or(u64::MAX);
                    warn!(id = self.id, timeout_ms, "request timed out");
                    Err(CoreError::RequestTimeout {
                        id: self.id,
                        timeout_ms,
                    })
                } else {
                    // Someone else took the slot just as the deadline hit;
                    // their reply is already on its way.
                    (&mut self.reply_rx)
                        .await
                        .unwrap_or(Err(CoreError::ConnectionClosed))
                }
            }
        }
    }

    /// Remove this request's slot. Returns `true` if it was still there.
    fn release(&self) -> bool {
        self.table
            .upgrade()
            .is_some_and(|table| table.remove(&self.id).is_some())
    }
}

impl Drop for PendingReply {
    fn drop(&mut self) {
        if self.release() {
            debug!(id = self.id, "request abandoned before its reply");
        }
    }
}
