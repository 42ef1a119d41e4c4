//! # RPC Correlation
//!
//! Client-local table mapping a correlation id to the pending callback and its
//! timeout timer. An entry is removed by whichever comes first: the matching
//! reply, the timeout, or a client disconnect. The callback therefore runs
//! exactly once, and anything arriving for a removed id is dropped.

use crate::constants::status_codes::{RPC_CANCELLED, RPC_TIMEOUT};
use crate::logging::log_rpc_operation;
use crate::messaging::task::ActionStatus;
use dashmap::DashMap;
use parking_lot::Mutex;
use serde::{Deserialize, Serialize};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::task::JoinHandle;
use tracing::{debug, warn};

/// What an RPC caller receives
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct RpcReply {
    /// Status left by the last action; empty on plain completion
    pub status: ActionStatus,
    pub result: Value,
}

impl RpcReply {
    pub fn new(status: ActionStatus, result: Value) -> Self {
        Self { status, result }
    }

    pub(crate) fn timed_out(timeout: Duration) -> Self {
        Self::new(
            ActionStatus::new(
                RPC_TIMEOUT,
                format!("No reply received within {}ms", timeout.as_millis()),
            ),
            Value::Null,
        )
    }

    pub(crate) fn cancelled() -> Self {
        Self::new(
            ActionStatus::new(RPC_CANCELLED, "Client disconnected before a reply arrived"),
            Value::Null,
        )
    }

    /// True when the status carries no failure code
    pub fn is_success(&self) -> bool {
        self.status.code.is_none()
    }
}

/// Callback invoked with the outcome of an RPC
pub type RpcCallback = Box<dyn FnOnce(RpcReply) + Send + 'static>;

/// Callbacks are only `Send`; the mutex keeps the table `Sync`.
struct PendingRpc {
    callback: Mutex<RpcCallback>,
    timer: Option<JoinHandle<()>>,
}

impl PendingRpc {
    fn new(callback: RpcCallback) -> Self {
        Self {
            callback: Mutex::new(callback),
            timer: None,
        }
    }

    fn invoke(self, reply: RpcReply) {
        (self.callback.into_inner())(reply);
    }

    fn settle(mut self, reply: RpcReply) {
        if let Some(timer) = self.timer.take() {
            timer.abort();
        }
        self.invoke(reply);
    }
}

#[derive(Default)]
pub struct RpcCorrelator {
    pending: DashMap<String, PendingRpc>,
}

impl std::fmt::Debug for RpcCorrelator {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("RpcCorrelator")
            .field("pending", &self.pending.len())
            .finish()
    }
}

impl RpcCorrelator {
    pub fn new() -> Self {
        Self::default()
    }

    /// Track `correlation_id` and arm its timeout
    pub fn register(self: &Arc<Self>, correlation_id: &str, callback: RpcCallback, timeout: Duration) {
        self.pending
            .insert(correlation_id.to_string(), PendingRpc::new(callback));

        let correlator = Arc::clone(self);
        let id = correlation_id.to_string();
        let timer = tokio::spawn(async move {
            tokio::time::sleep(timeout).await;
            if let Some((_, pending)) = correlator.pending.remove(&id) {
                warn!(correlation_id = %id, timeout_ms = timeout.as_millis() as u64, "⏰ RPC timed out");
                log_rpc_operation("timeout", Some(&id), "timed_out", None);
                pending.invoke(RpcReply::timed_out(timeout));
            }
        });

        // the timer may already have fired for very short timeouts
        match self.pending.get_mut(correlation_id) {
            Some(mut pending) => pending.timer = Some(timer),
            None => timer.abort(),
        }
        debug!(correlation_id = %correlation_id, "📞 RPC registered");
    }

    /// Deliver `reply` to the caller waiting on `correlation_id`. Returns
    /// `false` when nobody is waiting any more.
    pub fn settle(&self, correlation_id: &str, reply: RpcReply) -> bool {
        match self.pending.remove(correlation_id) {
            Some((_, pending)) => {
                log_rpc_operation("settle", Some(correlation_id), "completed", None);
                pending.settle(reply);
                true
            }
            None => {
                warn!(correlation_id = %correlation_id, "⚠️ Dropping reply for unknown or expired RPC");
                false
            }
        }
    }

    /// Drop the entry without invoking its callback
    pub fn forget(&self, correlation_id: &str) {
        if let Some((_, pending)) = self.pending.remove(correlation_id) {
            if let Some(timer) = pending.timer {
                timer.abort();
            }
        }
    }

    /// Settle every pending RPC with `RPC_CANCELLED`
    pub fn cancel_all(&self) -> usize {
        let ids: Vec<String> = self.pending.iter().map(|entry| entry.key().clone()).collect();
        let mut cancelled = 0;
        for id in ids {
            if let Some((_, pending)) = self.pending.remove(&id) {
                log_rpc_operation("cancel", Some(&id), "cancelled", None);
                pending.settle(RpcReply::cancelled());
                cancelled += 1;
            }
        }
        cancelled
    }

    pub fn pending_count(&self) -> usize {
        self.pending.len()
    }

    pub fn is_pending(&self, correlation_id: &str) -> bool {
        self.pending.contains_key(correlation_id)
    }
}
