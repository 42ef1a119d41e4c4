//! # Worker Execution Engine
//!
//! Listens on a queue for every registered action, builds a [`WorkerContext`]
//! per delivery and dispatches it to the matching handler.
//!
//! ## Dispatch rules
//!
//! - a task stamped with another protocol version is rejected, never executed
//! - an unknown tail action is failed with `ACTION_NOT_FOUND`, so stale or
//!   malformed actions never hang a stack
//! - a handler returning `Err` is logged and published as
//!   [`WorkerEvent::HandlerError`]; nothing is placed on the wire
//! - under automatic flow the delivery is acknowledged once the handler
//!   returns, whatever the outcome, so one bad task never stalls its queue
//!
//! ## Usage
//!
//! ```rust,no_run
//! use orch_core::messaging::{clients::InMemorySourceAdapter, QueueSource};
//! use orch_core::worker::{Worker, WorkerContext};
//! use orch_core::OrchConfig;
//! use std::sync::Arc;
//!
//! # async fn example() -> orch_core::Result<()> {
//! let source = Arc::new(QueueSource::new(Arc::new(InMemorySourceAdapter::new())));
//! let mut worker = Worker::new(OrchConfig::default()).with_source(source);
//! worker.register("print", |ctx: WorkerContext| async move {
//!     println!("{}", ctx.input());
//!     ctx.complete(serde_json::Value::Null).await
//! })?;
//! let handle = worker.start().await?;
//! // ...
//! handle.shutdown();
//! # Ok(())
//! # }
//! ```

use crate::config::OrchConfig;
use crate::constants::status_codes::ACTION_NOT_FOUND;
use crate::error::{OrchError, Result};
use crate::events::{EventPublisher, PublishedEvent, WorkerEvent};
use crate::messaging::source::QueueSource;
use crate::messaging::task::Task;
use crate::registry::{ActionRegistry, RootRegistration};
use crate::worker::context::WorkerContext;
use crate::worker::handler::{ActionFailure, ActionHandler};
use std::sync::Arc;
use tokio::sync::{broadcast, mpsc};
use tokio::task::JoinHandle;
use tracing::{error, info, warn};

/// State shared by the dispatch loop and every context it creates
#[derive(Debug)]
pub(crate) struct WorkerRuntime {
    pub(crate) config: OrchConfig,
    pub(crate) source: Arc<QueueSource>,
    pub(crate) registry: Arc<ActionRegistry>,
    pub(crate) events: EventPublisher<WorkerEvent>,
}

impl WorkerRuntime {
    /// Process one delivery
    pub(crate) async fn dispatch(self: Arc<Self>, task: Task) {
        let Some(action) = task.next_action().map(str::to_string) else {
            warn!("⚠️ Rejected task with an empty stack");
            self.events.publish(WorkerEvent::TaskRejected {
                action: String::new(),
                reason: "empty stack".to_string(),
            });
            return;
        };

        if task.version != self.config.protocol_version {
            let mismatch = OrchError::ProtocolVersionMismatch {
                expected: self.config.protocol_version.clone(),
                found: task.version.clone(),
            };
            warn!(action = %action, error = %mismatch, "⚠️ Rejected task");
            self.events.publish(WorkerEvent::TaskRejected {
                action: action.clone(),
                reason: mismatch.to_string(),
            });
            self.request_next(&action).await;
            return;
        }

        let handler = self.registry.get(&action).map(|metadata| metadata.handler());
        let ctx = WorkerContext::new(Arc::clone(&self), task);

        let outcome = match handler {
            Some(handler) => handler.handle(ctx).await,
            None => {
                warn!(action = %action, "⚠️ Action not found");
                ctx.fail(
                    ActionFailure::new(format!("The action '{action}' was not found"))
                        .with_code(ACTION_NOT_FOUND),
                )
                .await
            }
        };

        if let Err(err) = outcome {
            error!(action = %action, error = %err, "❌ Handler error");
            self.events.publish(WorkerEvent::HandlerError {
                action: action.clone(),
                message: err.to_string(),
            });
        }

        self.request_next(&action).await;
    }

    /// Acknowledge the delivery for `action` when automatic flow is on
    async fn request_next(&self, action: &str) {
        if !self.config.automatic_flow {
            return;
        }
        if let Err(err) = self.source.next(action).await {
            error!(action = %action, error = %err, "❌ Failed to request next delivery");
        }
    }
}

/// Worker under construction: configure the source and register actions,
/// then [`start`](Worker::start) it.
#[derive(Debug)]
pub struct Worker {
    config: OrchConfig,
    source: Option<Arc<QueueSource>>,
    registry: ActionRegistry,
    events: EventPublisher<WorkerEvent>,
}

impl Worker {
    pub fn new(config: OrchConfig) -> Self {
        let events = EventPublisher::new(config.event_channel_capacity);
        Self {
            config,
            source: None,
            registry: ActionRegistry::new(),
            events,
        }
    }

    pub fn with_source(mut self, source: Arc<QueueSource>) -> Self {
        self.source = Some(source);
        self
    }

    pub fn set_source(&mut self, source: Arc<QueueSource>) {
        self.source = Some(source);
    }

    pub fn config(&self) -> &OrchConfig {
        &self.config
    }

    /// Register a root action. The returned builder attaches callbacks and
    /// retry policies.
    pub fn register<H: ActionHandler>(&mut self, name: &str, handler: H) -> Result<RootRegistration<'_>> {
        self.registry.register_root(name, Arc::new(handler))?;
        Ok(RootRegistration::new(&mut self.registry, name.to_string()))
    }

    pub fn registry(&self) -> &ActionRegistry {
        &self.registry
    }

    /// Subscribe to worker events
    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent<WorkerEvent>> {
        self.events.subscribe()
    }

    /// Connect the source, listen on every registered action in name order
    /// and start dispatching deliveries.
    pub async fn start(self) -> Result<WorkerHandle> {
        let source = self.source.ok_or(OrchError::MissingSource)?;
        source.connect().await?;

        let runtime = Arc::new(WorkerRuntime {
            config: self.config,
            source: Arc::clone(&source),
            registry: Arc::new(self.registry),
            events: self.events,
        });

        let (deliveries, mut receiver) = mpsc::unbounded_channel::<Task>();
        let actions = runtime.registry.action_names();
        for action in &actions {
            source.listen_queue(action, deliveries.clone(), true, false).await?;
        }
        info!(actions = actions.len(), "🚀 Worker started");

        let loop_runtime = Arc::clone(&runtime);
        let dispatch_loop = tokio::spawn(async move {
            while let Some(task) = receiver.recv().await {
                tokio::spawn(Arc::clone(&loop_runtime).dispatch(task));
            }
        });

        Ok(WorkerHandle {
            runtime,
            dispatch_loop,
        })
    }
}

/// Running worker
#[derive(Debug)]
pub struct WorkerHandle {
    runtime: Arc<WorkerRuntime>,
    dispatch_loop: JoinHandle<()>,
}

impl WorkerHandle {
    /// Every dispatchable action, in name order
    pub fn registered_actions(&self) -> Vec<String> {
        self.runtime.registry.action_names()
    }

    pub fn subscribe(&self) -> broadcast::Receiver<PublishedEvent<WorkerEvent>> {
        self.runtime.events.subscribe()
    }

    pub fn source(&self) -> &Arc<QueueSource> {
        &self.runtime.source
    }

    /// Process `task` as if the source had delivered it
    pub async fn process(&self, task: Task) {
        Arc::clone(&self.runtime).dispatch(task).await;
    }

    pub fn is_running(&self) -> bool {
        !self.dispatch_loop.is_finished()
    }

    /// Stop dispatching. Handlers already running finish their turn.
    pub fn shutdown(&self) {
        self.dispatch_loop.abort();
        info!("🛑 Worker stopped");
    }
}
