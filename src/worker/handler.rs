//! # Action Handlers
//!
//! A handler receives the [`WorkerContext`] for one delivery and ends its turn
//! by calling exactly one terminal operation on it. Plain async closures work
//! as handlers:
//!
//! ```rust
//! use orch_core::worker::{ActionHandler, WorkerContext};
//!
//! fn print_handler() -> impl ActionHandler {
//!     |ctx: WorkerContext| async move {
//!         println!("{}", ctx.input());
//!         ctx.complete(serde_json::Value::Null).await
//!     }
//! }
//! # let _ = print_handler();
//! ```

use crate::error::Result;
use crate::worker::context::WorkerContext;
use async_trait::async_trait;
use std::future::Future;

/// Handler registered for an action or a callback
#[async_trait]
pub trait ActionHandler: Send + Sync + 'static {
    /// Run one turn. Returning `Err` signals a programming error; task-level
    /// failures go through [`WorkerContext::fail`] or [`WorkerContext::retry`].
    async fn handle(&self, ctx: WorkerContext) -> Result<()>;
}

#[async_trait]
impl<F, Fut> ActionHandler for F
where
    F: Fn(WorkerContext) -> Fut + Send + Sync + 'static,
    Fut: Future<Output = Result<()>> + Send + 'static,
{
    async fn handle(&self, ctx: WorkerContext) -> Result<()> {
        (self)(ctx).await
    }
}

/// Failure reported by a handler through `fail` or `retry`
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct ActionFailure {
    /// Error code; `UNHANDLED_EXCEPTION` when absent
    pub code: Option<String>,
    pub message: String,
    /// Diagnostic trace carried in the status `stack` field
    pub trace: Option<String>,
    /// Attempt count reported in the status; `1` when absent
    pub count: Option<u32>,
}

impl ActionFailure {
    pub fn new(message: impl Into<String>) -> Self {
        Self {
            code: None,
            message: message.into(),
            trace: None,
            count: None,
        }
    }

    pub fn with_code(mut self, code: impl Into<String>) -> Self {
        self.code = Some(code.into());
        self
    }

    pub fn with_trace(mut self, trace: impl Into<String>) -> Self {
        self.trace = Some(trace.into());
        self
    }

    pub fn with_count(mut self, count: u32) -> Self {
        self.count = Some(count);
        self
    }
}

impl From<&str> for ActionFailure {
    fn from(message: &str) -> Self {
        Self::new(message)
    }
}

impl From<String> for ActionFailure {
    fn from(message: String) -> Self {
        Self::new(message)
    }
}

impl From<anyhow::Error> for ActionFailure {
    fn from(err: anyhow::Error) -> Self {
        Self::new(err.to_string()).with_trace(format!("{err:?}"))
    }
}
