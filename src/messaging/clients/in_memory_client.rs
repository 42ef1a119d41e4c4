//! # In-Memory Source Adapter
//!
//! In-process broker implementing [`SourceAdapter`] / [`QueueAdapter`]. Used by the
//! test suite and the demo binary; it models the delivery semantics a real
//! broker adapter is expected to provide:
//!
//! - **FIFO per queue**: tasks are delivered in enqueue order
//! - **One delivery in flight per listened queue**: the next task is only pushed
//!   after `next` acknowledges the previous one (back-pressure)
//! - **At-least-once**: an unacknowledged delivery goes back to the head of its
//!   queue on disconnect
//! - **Auto-delete**: queues issued with `auto_delete` disappear on disconnect
//!
//! ## Usage
//!
//! ```rust
//! use orch_core::messaging::{clients::InMemorySourceAdapter, QueueSource};
//! use std::sync::Arc;
//!
//! let adapter = Arc::new(InMemorySourceAdapter::new());
//! let source = Arc::new(QueueSource::new(adapter.clone()));
//! assert_eq!(source.adapter_type(), "in_memory");
//! ```

use async_trait::async_trait;
use parking_lot::Mutex;
use std::collections::{HashMap, VecDeque};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tracing::debug;

use crate::messaging::errors::MessagingResult;
use crate::messaging::source::{QueueAdapter, SourceAdapter, TaskSender};
use crate::messaging::task::Task;

/// Mutable state of one in-memory queue
#[derive(Debug, Default)]
struct QueueState {
    messages: VecDeque<Task>,
    listener: Option<TaskSender>,
    unacked: Option<Task>,
    enqueued_total: u64,
    delivered_total: u64,
}

impl QueueState {
    fn try_deliver(&mut self, queue_name: &str) {
        if self.unacked.is_some() {
            return;
        }
        let Some(listener) = self.listener.as_ref() else {
            return;
        };
        let Some(task) = self.messages.pop_front() else {
            return;
        };

        match listener.send(task.clone()) {
            Ok(()) => {
                self.unacked = Some(task);
                self.delivered_total += 1;
                debug!(queue = %queue_name, "📨 Delivered task");
            }
            Err(_) => {
                // receiver is gone; keep the task for the next listener
                self.messages.push_front(task);
                self.listener = None;
            }
        }
    }
}

/// In-memory queue bound to one action name
#[derive(Debug)]
pub struct InMemoryQueue {
    name: String,
    auto_delete: bool,
    state: Mutex<QueueState>,
}

impl InMemoryQueue {
    fn new(name: &str, auto_delete: bool) -> Self {
        Self {
            name: name.to_string(),
            auto_delete,
            state: Mutex::new(QueueState::default()),
        }
    }

    pub fn name(&self) -> &str {
        &self.name
    }

    pub fn is_auto_delete(&self) -> bool {
        self.auto_delete
    }

    fn push(&self, task: Task) {
        let mut state = self.state.lock();
        state.messages.push_back(task);
        state.enqueued_total += 1;
        state.try_deliver(&self.name);
    }

    fn snapshot(&self) -> Vec<Task> {
        self.state.lock().messages.iter().cloned().collect()
    }

    fn requeue_unacked(&self) {
        let mut state = self.state.lock();
        if let Some(task) = state.unacked.take() {
            state.messages.push_front(task);
        }
        state.listener = None;
    }
}

#[async_trait]
impl QueueAdapter for InMemoryQueue {
    async fn on_enqueue(&self, _action: &str, task: Task) -> MessagingResult<()> {
        self.push(task);
        Ok(())
    }

    async fn on_next(&self) -> MessagingResult<()> {
        let mut state = self.state.lock();
        state.unacked = None;
        state.try_deliver(&self.name);
        Ok(())
    }

    async fn on_listen(&self, deliveries: TaskSender) -> MessagingResult<()> {
        let mut state = self.state.lock();
        state.listener = Some(deliveries);
        state.try_deliver(&self.name);
        Ok(())
    }
}

/// Queue statistics for tests and the demo
#[derive(Debug, Clone, PartialEq, Eq)]
pub struct InMemoryQueueStats {
    pub queue_name: String,
    pub pending: usize,
    pub in_flight: bool,
    pub enqueued_total: u64,
    pub delivered_total: u64,
}

/// In-process broker
#[derive(Debug, Default)]
pub struct InMemorySourceAdapter {
    queues: Mutex<HashMap<String, Arc<InMemoryQueue>>>,
    connect_latency: Option<Duration>,
    connect_count: AtomicUsize,
}

impl InMemorySourceAdapter {
    pub fn new() -> Self {
        Self::default()
    }

    /// Adapter whose `connect` takes `latency` to complete
    pub fn with_connect_latency(latency: Duration) -> Self {
        Self {
            connect_latency: Some(latency),
            ..Self::default()
        }
    }

    /// Number of connection attempts the adapter has served
    pub fn connect_count(&self) -> usize {
        self.connect_count.load(Ordering::Acquire)
    }

    fn queue(&self, name: &str, auto_delete: bool) -> Arc<InMemoryQueue> {
        let mut queues = self.queues.lock();
        queues
            .entry(name.to_string())
            .or_insert_with(|| Arc::new(InMemoryQueue::new(name, auto_delete)))
            .clone()
    }

    /// Seed a task directly onto the queue of its tail action, bypassing the
    /// connection. Tasks with an empty stack are ignored.
    pub fn push_task(&self, task: Task) {
        if let Some(action) = task.next_action().map(str::to_string) {
            self.queue(&action, false).push(task);
        }
    }

    /// Tasks waiting on `queue_name` (excluding an in-flight delivery)
    pub fn queued_tasks(&self, queue_name: &str) -> Vec<Task> {
        self.queues
            .lock()
            .get(queue_name)
            .map(|queue| queue.snapshot())
            .unwrap_or_default()
    }

    pub fn queue_len(&self, queue_name: &str) -> usize {
        self.queues
            .lock()
            .get(queue_name)
            .map(|queue| queue.state.lock().messages.len())
            .unwrap_or(0)
    }

    pub fn has_queue(&self, queue_name: &str) -> bool {
        self.queues.lock().contains_key(queue_name)
    }

    pub fn queue_stats(&self, queue_name: &str) -> Option<InMemoryQueueStats> {
        self.queues.lock().get(queue_name).map(|queue| {
            let state = queue.state.lock();
            InMemoryQueueStats {
                queue_name: queue.name.clone(),
                pending: state.messages.len(),
                in_flight: state.unacked.is_some(),
                enqueued_total: state.enqueued_total,
                delivered_total: state.delivered_total,
            }
        })
    }
}

#[async_trait]
impl SourceAdapter for InMemorySourceAdapter {
    async fn on_connect(&self) -> MessagingResult<()> {
        if let Some(latency) = self.connect_latency {
            tokio::time::sleep(latency).await;
        }
        self.connect_count.fetch_add(1, Ordering::AcqRel);
        Ok(())
    }

    async fn on_issue_queue(
        &self,
        action: &str,
        _requires_declaration: bool,
        auto_delete: bool,
    ) -> MessagingResult<Arc<dyn QueueAdapter>> {
        let queue: Arc<dyn QueueAdapter> = self.queue(action, auto_delete);
        Ok(queue)
    }

    async fn on_disconnect(&self) -> MessagingResult<()> {
        let mut queues = self.queues.lock();
        queues.retain(|_, queue| !queue.auto_delete);
        for queue in queues.values() {
            queue.requeue_unacked();
        }
        Ok(())
    }

    fn adapter_type(&self) -> &'static str {
        "in_memory"
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::task::Entry;
    use serde_json::json;
    use tokio::sync::mpsc;

    fn task_for(action: &str, n: u64) -> Task {
        Task::new("1.1").with_entry(Entry::call(action, json!({ "n": n })))
    }

    #[tokio::test]
    async fn test_fifo_delivery_with_one_in_flight() {
        let adapter = InMemorySourceAdapter::new();
        let queue = tokio_test::assert_ok!(adapter.on_issue_queue("work", false, false).await);
        let (tx, mut rx) = mpsc::unbounded_channel();

        tokio_test::assert_ok!(queue.on_enqueue("work", task_for("work", 1)).await);
        tokio_test::assert_ok!(queue.on_enqueue("work", task_for("work", 2)).await);
        tokio_test::assert_ok!(queue.on_listen(tx).await);

        assert_eq!(rx.recv().await.unwrap(), task_for("work", 1));
        assert!(rx.try_recv().is_err(), "second task must wait for next()");
        assert!(adapter.queue_stats("work").unwrap().in_flight);

        queue.on_next().await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), task_for("work", 2));
        assert_eq!(adapter.queue_stats("work").unwrap().delivered_total, 2);
    }

    #[tokio::test]
    async fn test_unlistened_queue_keeps_tasks() {
        let adapter = InMemorySourceAdapter::new();
        adapter.push_task(task_for("print", 1));

        assert!(adapter.has_queue("print"));
        assert_eq!(adapter.queued_tasks("print"), vec![task_for("print", 1)]);
    }

    #[tokio::test]
    async fn test_disconnect_drops_auto_delete_and_requeues_unacked() {
        let adapter = InMemorySourceAdapter::new();
        adapter.on_issue_queue("client.results", true, true).await.unwrap();
        let work = adapter.on_issue_queue("work", false, false).await.unwrap();
        let (tx, mut rx) = mpsc::unbounded_channel();

        work.on_enqueue("work", task_for("work", 7)).await.unwrap();
        work.on_listen(tx).await.unwrap();
        assert_eq!(rx.recv().await.unwrap(), task_for("work", 7));
        assert_eq!(adapter.queue_len("work"), 0);

        adapter.on_disconnect().await.unwrap();

        assert!(!adapter.has_queue("client.results"));
        assert_eq!(adapter.queued_tasks("work"), vec![task_for("work", 7)]);
    }

    #[tokio::test]
    async fn test_dropped_listener_does_not_lose_tasks() {
        let adapter = InMemorySourceAdapter::new();
        let queue = adapter.on_issue_queue("work", false, false).await.unwrap();
        let (tx, rx) = mpsc::unbounded_channel();
        queue.on_listen(tx).await.unwrap();
        drop(rx);

        queue.on_enqueue("work", task_for("work", 1)).await.unwrap();
        assert_eq!(adapter.queue_len("work"), 1);
    }
}
