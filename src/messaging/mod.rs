//! # Messaging Module
//!
//! The task-stack wire format and the queue transport contract shared by
//! workers and clients.

pub mod clients;
pub mod errors;
pub mod source;
pub mod task;

pub use errors::{MessagingError, MessagingResult};
pub use source::{QueueAdapter, QueueSource, SourceAdapter, TaskReceiver, TaskSender};
pub use task::{ActionStatus, Entry, RetryCounter, Task};
