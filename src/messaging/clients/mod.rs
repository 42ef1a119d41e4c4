//! # Source Adapter Implementations
//!
//! Concrete [`SourceAdapter`](super::SourceAdapter) implementations. Broker
//! adapters (AMQP and the like) live outside this crate and implement the same
//! traits; the in-memory adapter ships here for tests and local runs.

pub mod in_memory_client;

pub use in_memory_client::{InMemoryQueue, InMemoryQueueStats, InMemorySourceAdapter};
