//! Shared fixtures: an in-memory broker, workers wired to it, and probe
//! handlers that report what they observed.

#![allow(dead_code)]

use orch_core::messaging::clients::InMemorySourceAdapter;
use orch_core::messaging::QueueSource;
use orch_core::{
    ActionHandler, ActionStatus, Client, OrchConfig, Task, Worker, WorkerContext, WorkerEvent,
};
use serde_json::Value;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::{broadcast, mpsc};

pub const WAIT: Duration = Duration::from_secs(2);

/// In-memory broker shared by the workers and clients of one test
pub struct Harness {
    pub adapter: Arc<InMemorySourceAdapter>,
    pub source: Arc<QueueSource>,
}

impl Harness {
    pub fn new() -> Self {
        let adapter = Arc::new(InMemorySourceAdapter::new());
        let source = Arc::new(QueueSource::new(adapter.clone()));
        Self { adapter, source }
    }

    pub fn worker(&self) -> Worker {
        Worker::new(OrchConfig::default()).with_source(self.source.clone())
    }

    pub async fn client(&self, client_id: &str) -> Client {
        let config = OrchConfig::default()
            .with_rpc(true)
            .with_client_id(client_id);
        let client = Client::new(config).with_source(self.source.clone());
        client.connect().await.expect("client connects");
        client
    }
}

/// What a probe handler saw
#[derive(Debug, Clone)]
pub struct Observed {
    pub action: String,
    pub input: Value,
    pub result: Option<Value>,
    pub status: ActionStatus,
    pub task: Task,
}

/// Handler that reports its context and completes with `null`
pub fn probe(sink: mpsc::UnboundedSender<Observed>) -> impl ActionHandler {
    move |ctx: WorkerContext| {
        let sink = sink.clone();
        async move {
            let _ = sink.send(Observed {
                action: ctx.action().to_string(),
                input: ctx.input().clone(),
                result: ctx.result().cloned(),
                status: ctx.status().clone(),
                task: ctx.task().clone(),
            });
            ctx.complete(Value::Null).await
        }
    }
}

pub async fn next_observed(observed: &mut mpsc::UnboundedReceiver<Observed>) -> Observed {
    tokio::time::timeout(WAIT, observed.recv())
        .await
        .expect("probe observed a delivery in time")
        .expect("probe channel open")
}

/// Wait for the first event matching `pred`
pub async fn wait_for_event<F>(
    events: &mut broadcast::Receiver<orch_core::events::PublishedEvent<WorkerEvent>>,
    mut pred: F,
) -> WorkerEvent
where
    F: FnMut(&WorkerEvent) -> bool,
{
    tokio::time::timeout(WAIT, async {
        loop {
            let event = events.recv().await.expect("event channel open").event;
            if pred(&event) {
                return event;
            }
        }
    })
    .await
    .expect("event published in time")
}
