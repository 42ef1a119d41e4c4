//! # Client
//!
//! The stack producer. [`Client::run`] enqueues an action with an optional
//! continuation and returns; [`Client::rpc`] puts a results-collector frame
//! (`<clientId>.results`) beneath the call and listens on its own
//! auto-deleting results queue for the final completion.
//!
//! ## Usage
//!
//! ```rust,no_run
//! use orch_core::client::Client;
//! use orch_core::messaging::{clients::InMemorySourceAdapter, QueueSource};
//! use orch_core::OrchConfig;
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> orch_core::Result<()> {
//! let source = Arc::new(QueueSource::new(Arc::new(InMemorySourceAdapter::new())));
//! let client = Client::new(OrchConfig::default().with_rpc(true)).with_source(source);
//! client.connect().await?;
//!
//! // fire and forget: `print` receives the formatted message
//! client
//!     .run("format_string", json!({"format": "Hello %s", "replacement": "World"}), Some("print"))
//!     .await?;
//!
//! // request/response over the queue
//! let reply = client.call("format_string", json!({"format": "Hi %s"}), None).await?;
//! println!("{:?} {}", reply.status, reply.result);
//! # Ok(())
//! # }
//! ```

pub mod rpc;

pub use rpc::{RpcCallback, RpcCorrelator, RpcReply};

use crate::config::OrchConfig;
use crate::constants::{results_queue_name, CORRELATION_ID_VAR};
use crate::error::{OrchError, Result};
use crate::logging::log_task_operation;
use crate::messaging::errors::MessagingError;
use crate::messaging::source::QueueSource;
use crate::messaging::task::{Entry, Task};
use parking_lot::Mutex;
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{mpsc, oneshot};
use tokio::task::JoinHandle;
use tracing::{debug, error, info, warn};
use uuid::Uuid;

#[derive(Debug)]
pub struct Client {
    config: OrchConfig,
    client_id: String,
    source: Option<Arc<QueueSource>>,
    correlator: Arc<RpcCorrelator>,
    results_loop: Mutex<Option<JoinHandle<()>>>,
}

impl Client {
    /// Client using `config.client_id`, or a generated UUID
    pub fn new(config: OrchConfig) -> Self {
        let client_id = config
            .client_id
            .clone()
            .unwrap_or_else(|| Uuid::new_v4().to_string());
        Self {
            config,
            client_id,
            source: None,
            correlator: Arc::new(RpcCorrelator::new()),
            results_loop: Mutex::new(None),
        }
    }

    pub fn with_source(mut self, source: Arc<QueueSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn set_source(&mut self, source: Arc<QueueSource>) {
        self.source = Some(source);
    }

    pub fn client_id(&self) -> &str {
        &self.client_id
    }

    /// Queue the final completion of an RPC is routed to
    pub fn results_queue(&self) -> String {
        results_queue_name(&self.client_id)
    }

    pub fn config(&self) -> &OrchConfig {
        &self.config
    }

    pub fn pending_rpcs(&self) -> usize {
        self.correlator.pending_count()
    }

    /// Connect the source. With RPC enabled this also declares and listens
    /// on the client's auto-deleting results queue.
    pub async fn connect(&self) -> Result<()> {
        let source = self.source()?;
        source.connect().await?;

        if !self.config.enable_rpc || self.results_loop.lock().is_some() {
            return Ok(());
        }

        let results_queue = self.results_queue();
        let (deliveries, mut receiver) = mpsc::unbounded_channel::<Task>();
        source
            .listen_queue(&results_queue, deliveries, true, true)
            .await?;

        let correlator = Arc::clone(&self.correlator);
        let loop_source = Arc::clone(source);
        let queue = results_queue.clone();
        let handle = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                settle_results(&correlator, task);
                if let Err(err) = loop_source.next(&queue).await {
                    error!(queue = %queue, error = %err, "❌ Failed to request next result");
                }
            }
        });

        if let Some(previous) = self.results_loop.lock().replace(handle) {
            previous.abort();
        }
        info!(client_id = %self.client_id, queue = %results_queue, "📬 Listening for RPC results");
        Ok(())
    }

    /// Enqueue `action` with `input`. When `continuation` is given, it receives
    /// the result once `action` completes.
    pub async fn run(&self, action: &str, input: Value, continuation: Option<&str>) -> Result<()> {
        let source = self.source()?;
        if action.is_empty() {
            return Err(OrchError::MissingActionName);
        }

        let mut task = Task::new(self.config.protocol_version.clone());
        if let Some(continuation) = continuation.filter(|name| !name.is_empty()) {
            task.stack.push(Entry::continuation(continuation));
        }
        task.stack.push(Entry::call(action, input));

        log_task_operation("run", Some(action), Some(task.depth()), "enqueued", continuation);
        source.enqueue(task).await?;
        Ok(())
    }

    /// Call `action` and invoke `callback` exactly once with the reply, a
    /// timeout, or a cancellation. Returns the correlation id.
    pub async fn rpc<F>(
        &self,
        action: &str,
        input: Value,
        callback: F,
        timeout: Option<Duration>,
    ) -> Result<String>
    where
        F: FnOnce(RpcReply) + Send + 'static,
    {
        if !self.config.enable_rpc {
            return Err(OrchError::RpcDisabled);
        }
        let source = self.source()?;
        if action.is_empty() {
            return Err(OrchError::MissingActionName);
        }

        let correlation_id = Uuid::new_v4().to_string();
        let mut vars = Map::new();
        vars.insert(
            CORRELATION_ID_VAR.to_string(),
            Value::String(correlation_id.clone()),
        );

        let task = Task::new(self.config.protocol_version.clone())
            .with_entry(Entry::continuation(self.results_queue()).with_vars(vars))
            .with_entry(Entry::call(action, input));

        let timeout = timeout.unwrap_or_else(|| self.config.rpc_timeout());
        self.correlator
            .register(&correlation_id, Box::new(callback), timeout);

        if let Err(err) = source.enqueue(task).await {
            self.correlator.forget(&correlation_id);
            return Err(err.into());
        }

        debug!(action = %action, correlation_id = %correlation_id, "📞 RPC enqueued");
        Ok(correlation_id)
    }

    /// [`rpc`](Client::rpc) as a future resolving to the reply
    pub async fn call(&self, action: &str, input: Value, timeout: Option<Duration>) -> Result<RpcReply> {
        let (sender, receiver) = oneshot::channel();
        self.rpc(
            action,
            input,
            move |reply| {
                let _ = sender.send(reply);
            },
            timeout,
        )
        .await?;

        receiver
            .await
            .map_err(|_| OrchError::from(MessagingError::internal("rpc reply channel closed")))
    }

    /// Cancel pending RPCs, stop listening for results and disconnect the source
    pub async fn disconnect(&self) -> Result<()> {
        let cancelled = self.correlator.cancel_all();
        if let Some(handle) = self.results_loop.lock().take() {
            handle.abort();
        }
        if let Some(source) = &self.source {
            source.disconnect().await?;
        }
        info!(client_id = %self.client_id, cancelled = cancelled, "🔌 Client disconnected");
        Ok(())
    }

    fn source(&self) -> Result<&Arc<QueueSource>> {
        self.source.as_ref().ok_or(OrchError::MissingSource)
    }
}

impl Drop for Client {
    fn drop(&mut self) {
        if let Some(handle) = self.results_loop.get_mut().take() {
            handle.abort();
        }
    }
}

/// Settle the RPC named by the collector frame on top of `task`
fn settle_results(correlator: &RpcCorrelator, task: Task) {
    let Some(entry) = task.current() else {
        warn!("⚠️ Dropping empty result task");
        return;
    };
    let Some(correlation_id) = entry.vars.get(CORRELATION_ID_VAR).and_then(Value::as_str) else {
        warn!(action = %entry.action, "⚠️ Result task without a correlation id");
        return;
    };

    let reply = RpcReply::new(
        entry.status_or_default(),
        entry.input.clone().unwrap_or_default(),
    );
    correlator.settle(correlation_id, reply);
}
