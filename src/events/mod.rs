//! # Lifecycle Events
//!
//! Worker-local notifications. None of these travel on the wire; they exist so
//! tests, operators and embedding applications can observe the engine and the
//! transport without hooking into either.

pub mod publisher;

pub use publisher::{EventPublisher, PublishedEvent};

use crate::constants::events as names;
use serde::{Deserialize, Serialize};

/// How a handler turn ended
#[derive(Debug, Clone, Copy, PartialEq, Eq, Hash, Serialize, Deserialize)]
#[serde(rename_all = "snake_case")]
pub enum ActionOutcome {
    /// `complete` / `success`
    Completed,
    /// `fail`, or `retry` with an exhausted ceiling
    Failed,
    /// `retry` that re-enqueued the same frame
    Retried,
    /// `defer` pushed a callback and a call frame
    Deferred,
}

/// Events published by a [`Worker`](crate::worker::Worker)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum WorkerEvent {
    /// Fired after the stack mutation and its re-enqueue (or termination) committed
    ActionCompleted {
        action: String,
        outcome: ActionOutcome,
        /// Stack depth after the transition; zero means the task terminated
        depth: usize,
    },
    /// A delivery the engine refused to execute
    TaskRejected { action: String, reason: String },
    /// A handler returned a programming error instead of finishing its turn
    HandlerError { action: String, message: String },
}

/// Events published by a [`QueueSource`](crate::messaging::QueueSource)
#[derive(Debug, Clone, PartialEq, Eq)]
pub enum SourceEvent {
    Connected,
    Disconnected,
    QueueIssued { action: String },
    QueueListening { action: String },
    Enqueued { action: String, depth: usize },
    Error { message: String },
}

impl WorkerEvent {
    /// Stable event name for logs and metrics
    pub fn name(&self) -> &'static str {
        match self {
            WorkerEvent::ActionCompleted { .. } => names::ACTION_COMPLETED,
            WorkerEvent::TaskRejected { .. } => names::TASK_REJECTED,
            WorkerEvent::HandlerError { .. } => names::HANDLER_ERROR,
        }
    }
}

impl SourceEvent {
    pub fn name(&self) -> &'static str {
        match self {
            SourceEvent::Connected => names::SOURCE_CONNECTED,
            SourceEvent::Disconnected => names::SOURCE_DISCONNECTED,
            SourceEvent::QueueIssued { .. } => names::SOURCE_QUEUE_ISSUED,
            SourceEvent::QueueListening { .. } => names::SOURCE_QUEUE_LISTENING,
            SourceEvent::Enqueued { .. } => names::SOURCE_ENQUEUED,
            SourceEvent::Error { .. } => names::SOURCE_ERROR,
        }
    }
}
