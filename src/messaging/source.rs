//! # Queue Source
//!
//! The transport contract workers and clients both depend on. A concrete broker
//! plugs in by implementing [`SourceAdapter`] (connection and queue issuing) and
//! [`QueueAdapter`] (per-queue enqueue / acknowledge / subscribe). [`QueueSource`]
//! wraps an adapter with the connection bookkeeping every broker needs:
//!
//! - `connect` is idempotent; concurrent callers await the same in-flight attempt
//! - everything that touches the broker fails fast with
//!   [`MessagingError::NotConnected`] before `connect` completes
//! - tasks are routed to the queue named by their tail entry's action
//! - transport failures are returned *and* published as [`SourceEvent::Error`]

use crate::events::{EventPublisher, PublishedEvent, SourceEvent};
use crate::messaging::errors::{MessagingError, MessagingResult};
use crate::messaging::task::Task;
use async_trait::async_trait;
use futures::future::{BoxFuture, FutureExt, Shared};
use parking_lot::Mutex;
use std::sync::atomic::{AtomicBool, Ordering};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tracing::{debug, error, info};

/// Sink through which a listened queue delivers tasks
pub type TaskSender = mpsc::UnboundedSender<Task>;

/// Receiving half of a delivery sink
pub type TaskReceiver = mpsc::UnboundedReceiver<Task>;

/// One broker queue bound to an action name
#[async_trait]
pub trait QueueAdapter: Send + Sync {
    /// Put `task` on this queue
    async fn on_enqueue(&self, action: &str, task: Task) -> MessagingResult<()>;

    /// Acknowledge the in-flight delivery and allow the next one
    async fn on_next(&self) -> MessagingResult<()>;

    /// Start delivering tasks from this queue into `deliveries`
    async fn on_listen(&self, deliveries: TaskSender) -> MessagingResult<()>;
}

/// Broker connection and queue factory
#[async_trait]
pub trait SourceAdapter: Send + Sync {
    /// Open the broker connection
    async fn on_connect(&self) -> MessagingResult<()>;

    /// Get or create the queue bound to `action`
    async fn on_issue_queue(
        &self,
        action: &str,
        requires_declaration: bool,
        auto_delete: bool,
    ) -> MessagingResult<Arc<dyn QueueAdapter>>;

    /// Close the broker connection. Auto-deleting queues go away here.
    async fn on_disconnect(&self) -> MessagingResult<()> {
        Ok(())
    }

    /// Adapter type for debugging/observability
    fn adapter_type(&self) -> &'static str;
}

type ConnectAttempt = Shared<BoxFuture<'static, MessagingResult<()>>>;

/// Connection-aware front for a [`SourceAdapter`]
pub struct QueueSource {
    adapter: Arc<dyn SourceAdapter>,
    connected: AtomicBool,
    connecting: Mutex<Option<ConnectAttempt>>,
    events: EventPublisher<SourceEvent>,
}

impl std::fmt::Debug for QueueSource {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("QueueSource")
            .field("adapter", &self.adapter.adapter_type())
            .field("connected", &self.is_connected())
            .field("connecting", &self.is_connecting())
            .finish()
    }
}

impl QueueSource {
    pub fn new(adapter: Arc<dyn SourceAdapter>) -> Self {
        Self::with_event_capacity(adapter, 1000)
    }

    pub fn with_event_capacity(adapter: Arc<dyn SourceAdapter>, capacity: usize) -> Self {
        Self {
            adapter,
            connected: AtomicBool::new(false),
            connecting: Mutex::new(None),
            events: EventPublisher::new(capacity),
        }
    }

    pub fn is_connected(&self) -> bool {
        self.connected.load(Ordering::Acquire)
    }

    pub fn is_connecting(&self) -> bool {
        self.connecting.lock().is_some()
    }

    pub fn adapter_type(&self) -> &'static str {
        self.adapter.adapter_type()
    }

    /// Subscribe to transport lifecycle events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent<SourceEvent>> {
        self.events.subscribe()
    }

    /// Connect to the broker. Callers arriving while an attempt is in flight
    /// wait for that attempt instead of starting another.
    pub async fn connect(&self) -> MessagingResult<()> {
        if self.is_connected() {
            return Ok(());
        }

        let attempt = {
            let mut connecting = self.connecting.lock();
            match connecting.as_ref() {
                Some(in_flight) => in_flight.clone(),
                None => {
                    info!(adapter = self.adapter.adapter_type(), "🔗 Connecting queue source");
                    let adapter = Arc::clone(&self.adapter);
                    let attempt = async move { adapter.on_connect().await }.boxed().shared();
                    *connecting = Some(attempt.clone());
                    attempt
                }
            }
        };

        let result = attempt.clone().await;

        {
            let mut connecting = self.connecting.lock();
            if connecting
                .as_ref()
                .is_some_and(|current| current.ptr_eq(&attempt))
            {
                *connecting = None;
            }
        }

        match result {
            Ok(()) => {
                if !self.connected.swap(true, Ordering::AcqRel) {
                    info!(adapter = self.adapter.adapter_type(), "✅ Queue source connected");
                    self.events.publish(SourceEvent::Connected);
                }
                Ok(())
            }
            Err(err) => {
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Close the broker connection
    pub async fn disconnect(&self) -> MessagingResult<()> {
        if !self.is_connected() {
            return Ok(());
        }

        if let Err(err) = self.adapter.on_disconnect().await {
            self.report(&err);
            return Err(err);
        }

        self.connected.store(false, Ordering::Release);
        info!(adapter = self.adapter.adapter_type(), "🔌 Queue source disconnected");
        self.events.publish(SourceEvent::Disconnected);
        Ok(())
    }

    /// Get or create the queue bound to `action`
    pub async fn issue_queue(
        &self,
        action: &str,
        requires_declaration: bool,
        auto_delete: bool,
    ) -> MessagingResult<Arc<dyn QueueAdapter>> {
        self.ensure_connected()?;

        match self
            .adapter
            .on_issue_queue(action, requires_declaration, auto_delete)
            .await
        {
            Ok(queue) => {
                self.events.publish(SourceEvent::QueueIssued {
                    action: action.to_string(),
                });
                Ok(queue)
            }
            Err(err) => {
                self.report(&err);
                Err(err)
            }
        }
    }

    /// Issue the queue for `action` and start delivering its tasks into `deliveries`
    pub async fn listen_queue(
        &self,
        action: &str,
        deliveries: TaskSender,
        requires_declaration: bool,
        auto_delete: bool,
    ) -> MessagingResult<()> {
        let queue = self
            .issue_queue(action, requires_declaration, auto_delete)
            .await?;

        if let Err(err) = queue.on_listen(deliveries).await {
            self.report(&err);
            return Err(err);
        }

        debug!(action = %action, "📥 Listening on queue");
        self.events.publish(SourceEvent::QueueListening {
            action: action.to_string(),
        });
        Ok(())
    }

    /// Route `task` to the queue of its tail action
    pub async fn enqueue(&self, task: Task) -> MessagingResult<()> {
        self.ensure_connected()?;

        let action = match task.next_action() {
            Some(action) => action.to_string(),
            None => {
                let err = MessagingError::EmptyStack;
                self.report(&err);
                return Err(err);
            }
        };
        let depth = task.depth();

        let queue = self.issue_queue(&action, false, false).await?;
        if let Err(err) = queue.on_enqueue(&action, task).await {
            self.report(&err);
            return Err(err);
        }

        debug!(action = %action, depth = depth, "📤 Task enqueued");
        self.events.publish(SourceEvent::Enqueued { action, depth });
        Ok(())
    }

    /// Acknowledge the last delivery for `action` and request the next one
    pub async fn next(&self, action: &str) -> MessagingResult<()> {
        self.ensure_connected()?;

        if action.is_empty() {
            let err = MessagingError::queue_operation("", "next", "action name is required");
            self.report(&err);
            return Err(err);
        }

        let queue = self.issue_queue(action, false, false).await?;
        if let Err(err) = queue.on_next().await {
            self.report(&err);
            return Err(err);
        }
        Ok(())
    }

    fn ensure_connected(&self) -> MessagingResult<()> {
        if self.is_connected() {
            Ok(())
        } else {
            Err(MessagingError::NotConnected)
        }
    }

    fn report(&self, err: &MessagingError) {
        error!(adapter = self.adapter.adapter_type(), error = %err, "❌ Queue source error");
        self.events.publish(SourceEvent::Error {
            message: err.to_string(),
        });
    }
}
