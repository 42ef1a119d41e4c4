#![allow(clippy::missing_errors_doc)] // Allow public functions without # Errors sections
#![allow(clippy::must_use_candidate)] // Allow methods without must_use when context is clear

//! # Orch Core
//!
//! Task-stack continuation protocol and worker execution engine over a
//! message-queue transport.
//!
//! ## Overview
//!
//! A *client* enqueues an **action** together with an optional continuation.
//! Workers pull actions off queues, run the registered handler and route the
//! result forward: to a continuation, back to a waiting client (RPC), or
//! through a chain of deferred sub-calls that resume in named callbacks. All
//! routing state lives in the task itself, so any worker may process any frame.
//!
//! ## Architecture
//!
//! ```text
//! Client ──run/rpc──▶ QueueSource ──deliver──▶ Worker ──dispatch──▶ handler
//!    ▲                    ▲                                          │
//!    │                    └──────────── re-enqueue (pop/push) ◀──────┘
//!    └── <clientId>.results
//! ```
//!
//! ## Module Organization
//!
//! - [`messaging`] - Task stack wire types and the queue source contract
//! - [`registry`] - Root/callback action registry with retry policies
//! - [`worker`] - Execution engine, contexts and stack transitions
//! - [`client`] - `run` and correlated `rpc`
//! - [`events`] - Worker and source lifecycle events
//! - [`config`] - Layered configuration
//! - [`logging`] - Structured logging setup
//! - [`error`] - Programming-error taxonomy
//!
//! ## Quick Start
//!
//! ```rust,no_run
//! use orch_core::messaging::{clients::InMemorySourceAdapter, QueueSource};
//! use orch_core::{Client, OrchConfig, Worker, WorkerContext};
//! use serde_json::json;
//! use std::sync::Arc;
//!
//! # async fn example() -> orch_core::Result<()> {
//! let source = Arc::new(QueueSource::new(Arc::new(InMemorySourceAdapter::new())));
//!
//! let mut worker = Worker::new(OrchConfig::default()).with_source(source.clone());
//! worker.register("hello", |ctx: WorkerContext| async move {
//!     let name = ctx.input().as_str().unwrap_or("world").to_string();
//!     ctx.complete(json!(format!("Hello {name}"))).await
//! })?;
//! let _handle = worker.start().await?;
//!
//! let client = Client::new(OrchConfig::default().with_rpc(true)).with_source(source);
//! client.connect().await?;
//! let reply = client.call("hello", json!("Orch"), None).await?;
//! assert_eq!(reply.result, json!("Hello Orch"));
//! # Ok(())
//! # }
//! ```

pub mod client;
pub mod config;
pub mod constants;
pub mod error;
pub mod events;
pub mod logging;
pub mod messaging;
pub mod registry;
pub mod worker;

pub use client::{Client, RpcReply};
pub use config::OrchConfig;
pub use error::{OrchError, Result};
pub use events::{ActionOutcome, SourceEvent, WorkerEvent};
pub use messaging::{ActionStatus, Entry, MessagingError, QueueSource, Task};
pub use registry::{ActionRegistry, RetryPolicy};
pub use worker::{ActionFailure, ActionHandler, Worker, WorkerContext, WorkerHandle};
