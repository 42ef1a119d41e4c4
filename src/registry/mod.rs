//! # Action Registry
//!
//! Per-worker mapping from action name to handler and metadata.
//!
//! ## Overview
//!
//! Actions are either **roots**, directly invocable by clients, or
//! **callbacks** of a root. A callback is addressed on the wire as
//! `root#local` and is dispatchable on its own, since the transport delivers
//! to it directly once a deferred sub-call completes.
//!
//! ```text
//! ActionRegistry
//! ├── reverse_format_string                     (root)
//! │   ├── reverse_format_string#reverse_completed (callback)
//! │   └── reverse_format_string#format_completed  (callback)
//! └── print                                     (root)
//! ```
//!
//! The registry is populated before a worker starts and is read-only while
//! tasks are processed.

pub mod action_registry;

pub use action_registry::{ActionKind, ActionMetadata, ActionRegistry, RetryPolicy, RootRegistration};
