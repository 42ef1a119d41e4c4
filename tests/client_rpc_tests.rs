//! RPC correlation between clients and workers sharing one broker

mod common;

use common::*;
use orch_core::{ActionFailure, Entry, OrchConfig, RpcReply, Task, WorkerContext};
use serde_json::{json, Map, Value};
use std::sync::atomic::{AtomicUsize, Ordering};
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn counting_sink(
    calls: Arc<AtomicUsize>,
    replies: mpsc::UnboundedSender<RpcReply>,
) -> impl FnOnce(RpcReply) + Send + 'static {
    move |reply| {
        calls.fetch_add(1, Ordering::SeqCst);
        let _ = replies.send(reply);
    }
}

fn result_task(results_queue: &str, correlation_id: &str, input: Value) -> Task {
    let mut vars = Map::new();
    vars.insert("correlationId".to_string(), json!(correlation_id));
    let mut entry = Entry::continuation(results_queue).with_vars(vars);
    entry.input = Some(input);
    Task::new("1.1").with_entry(entry)
}

#[tokio::test]
async fn test_rpc_round_trip_invokes_callback_once() {
    let harness = Harness::new();
    let mut worker = harness.worker();
    worker
        .register("add_one", |ctx: WorkerContext| async move {
            let n = ctx.input().as_i64().unwrap_or_default();
            ctx.complete(json!(n + 1)).await
        })
        .unwrap();
    let handle = worker.start().await.unwrap();

    let client = harness.client("rpc-client").await;
    let calls = Arc::new(AtomicUsize::new(0));
    let (replies_tx, mut replies) = mpsc::unbounded_channel();
    let correlation_id = client
        .rpc("add_one", json!(41), counting_sink(calls.clone(), replies_tx), None)
        .await
        .unwrap();

    let reply = tokio::time::timeout(WAIT, replies.recv()).await.unwrap().unwrap();
    assert_eq!(reply.result, json!(42));
    assert!(reply.status.is_empty());
    assert!(reply.is_success());
    assert_eq!(client.pending_rpcs(), 0);

    // a duplicate reply finds no correlation entry
    harness
        .adapter
        .push_task(result_task(&client.results_queue(), &correlation_id, json!(42)));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
    assert_eq!(harness.adapter.queue_len("rpc-client.results"), 0);
    handle.shutdown();
}

#[tokio::test]
async fn test_rpc_reply_carries_failure_status() {
    let harness = Harness::new();
    let mut worker = harness.worker();
    worker
        .register("get_weather", |ctx: WorkerContext| async move {
            ctx.fail(ActionFailure::new("upstream down").with_code("SERVICE_UNAVAILABLE"))
                .await
        })
        .unwrap();
    let handle = worker.start().await.unwrap();

    let client = harness.client("weather-client").await;
    let reply = client
        .call("get_weather", json!({ "city": "Lisbon" }), None)
        .await
        .unwrap();

    assert_eq!(reply.status.code(), Some("SERVICE_UNAVAILABLE"));
    assert_eq!(reply.status.msg.as_deref(), Some("upstream down"));
    assert_eq!(reply.result, Value::Null);
    handle.shutdown();
}

#[tokio::test]
async fn test_rpc_timeout_fires_once_and_drops_late_reply() {
    let harness = Harness::new();
    let client = harness.client("slow-client").await;
    let calls = Arc::new(AtomicUsize::new(0));
    let (replies_tx, mut replies) = mpsc::unbounded_channel();

    let started = tokio::time::Instant::now();
    let correlation_id = client
        .rpc(
            "nobody_home",
            json!("x"),
            counting_sink(calls.clone(), replies_tx),
            Some(Duration::from_millis(50)),
        )
        .await
        .unwrap();

    let reply = tokio::time::timeout(WAIT, replies.recv()).await.unwrap().unwrap();
    assert!(started.elapsed() >= Duration::from_millis(50));
    assert_eq!(reply.status.code(), Some("RPC_TIMEOUT"));
    assert_eq!(reply.result, Value::Null);
    assert_eq!(client.pending_rpcs(), 0);

    // the call is still parked on its queue; a late reply is dropped
    assert_eq!(harness.adapter.queue_len("nobody_home"), 1);
    harness
        .adapter
        .push_task(result_task(&client.results_queue(), &correlation_id, json!("late")));
    tokio::time::sleep(Duration::from_millis(50)).await;
    assert_eq!(calls.load(Ordering::SeqCst), 1);
}

#[tokio::test]
async fn test_rpc_through_deferred_chain() {
    let harness = Harness::new();
    let mut worker = harness.worker();
    worker
        .register("double", |ctx: WorkerContext| async move {
            let n = ctx.input().as_i64().unwrap_or_default();
            ctx.complete(json!(n * 2)).await
        })
        .unwrap();
    worker
        .register("quadruple", |ctx: WorkerContext| async move {
            let n = ctx.input().clone();
            ctx.defer("double", n, "once").await
        })
        .unwrap()
        .callback("once", |ctx: WorkerContext| async move {
            let doubled = ctx.result().cloned().unwrap_or_default();
            ctx.defer("double", doubled, "twice").await
        })
        .unwrap()
        .callback("twice", |ctx: WorkerContext| async move {
            let summary = json!({
                "in": ctx.input().clone(),
                "out": ctx.result().cloned().unwrap_or_default(),
            });
            ctx.complete(summary).await
        })
        .unwrap();
    let handle = worker.start().await.unwrap();

    let client = harness.client("chain-client").await;
    let reply = client.call("quadruple", json!(3), None).await.unwrap();
    assert_eq!(reply.result, json!({ "in": 3, "out": 12 }));
    handle.shutdown();
}

#[tokio::test]
async fn test_rpc_requires_enable_rpc() {
    let harness = Harness::new();
    let client = orch_core::Client::new(OrchConfig::default()).with_source(harness.source.clone());
    client.connect().await.unwrap();

    assert_eq!(
        client.call("anything", Value::Null, None).await.unwrap_err(),
        orch_core::OrchError::RpcDisabled
    );
    assert!(!harness.adapter.has_queue(&client.results_queue()));
}

#[tokio::test]
async fn test_client_fails_fast_before_connect() {
    let harness = Harness::new();
    let client = orch_core::Client::new(OrchConfig::default()).with_source(harness.source.clone());

    let err = client.run("anything", Value::Null, None).await.unwrap_err();
    assert_eq!(
        err,
        orch_core::OrchError::Messaging(orch_core::MessagingError::NotConnected)
    );
}
