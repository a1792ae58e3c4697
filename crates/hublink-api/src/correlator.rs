// ── Request/response correlation ──
//
// Each physical connection gets a fresh `Correlator`. Ids are allocated
// monotonically from 1 and never reused on that connection; replies are
// matched by id regardless of arrival order.

use std::collections::HashMap;

use serde_json::Value;
use tokio::sync::oneshot;
use tracing::{debug, trace};

use crate::error::Error;
use crate::protocol::ResultMessage;

/// Reply channel for one outstanding request.
pub type Reply = oneshot::Sender<Result<Value, Error>>;

struct PendingRequest {
    kind: &'static str,
    reply: Reply,
}

/// Owns the id counter and the table of requests awaiting a result.
pub struct Correlator {
    next_id: u64,
    pending: HashMap<u64, PendingRequest>,
}

impl Default for Correlator {
    fn default() -> Self {
        Self::new()
    }
}

impl Correlator {
    pub fn new() -> Self {
        Self {
            next_id: 1,
            pending: HashMap::new(),
        }
    }

    /// Reserve the next id without tracking a reply (fire-and-forget sends).
    pub fn allocate(&mut self) -> u64 {
        let id = self.next_id;
        self.next_id += 1;
        id
    }

    /// Reserve an id and remember who is waiting on it.
    ///
    /// Entries whose caller already gave up (timed out, dropped) are swept
    /// here so the table cannot grow without bound.
    pub fn register(&mut self, kind: &'static str, reply: Reply) -> u64 {
        self.pending.retain(|_, p| !p.reply.is_closed());
        let id = self.allocate();
        self.pending.insert(id, PendingRequest { kind, reply });
        id
    }

    /// Deliver a result frame. Returns `false` for unknown or already
    /// resolved ids, which are ignored.
    pub fn resolve(&mut self, msg: ResultMessage) -> bool {
        let Some(pending) = self.pending.remove(&msg.id) else {
            trace!(id = msg.id, "result for unknown request id, ignoring");
            return false;
        };
        trace!(id = msg.id, kind = pending.kind, success = msg.success, "request resolved");
        let _ = pending.reply.send(msg.into_outcome());
        true
    }

    /// Fail one request, e.g. when its frame could not be written.
    pub fn reject(&mut self, id: u64, err: Error) {
        if let Some(pending) = self.pending.remove(&id) {
            let _ = pending.reply.send(Err(err));
        }
    }

    /// Fail every outstanding request with `ConnectionClosed`.
    pub fn reject_all(&mut self) -> usize {
        let count = self.pending.len();
        for (_, pending) in self.pending.drain() {
            let _ = pending.reply.send(Err(Error::ConnectionClosed));
        }
        if count > 0 {
            debug!(count, "rejected pending requests on connection loss");
        }
        count
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }
}
