//! # Worker
//!
//! The execution engine interpreting the task-stack protocol: handlers,
//! per-delivery contexts, the pure stack transitions they apply and the
//! dispatch loop.

pub mod context;
pub mod engine;
pub mod handler;
pub mod transitions;

pub use context::WorkerContext;
pub use engine::{Worker, WorkerHandle};
pub use handler::{ActionFailure, ActionHandler};
pub use transitions::StackOutcome;
