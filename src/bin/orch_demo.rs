//! Runs the hello-world, deferred-vars, retry and RPC scenarios against the
//! in-memory broker.
//!
//! ```bash
//! cargo run --bin orch_demo
//! ORCH_LOG_FORMAT=json RUST_LOG=info cargo run --bin orch_demo
//! ```

use anyhow::Context as _;
use orch_core::logging::init_structured_logging;
use orch_core::messaging::{clients::InMemorySourceAdapter, QueueSource};
use orch_core::{ActionFailure, Client, OrchConfig, Worker, WorkerContext};
use serde_json::{json, Value};
use std::collections::BTreeMap;
use std::sync::Arc;
use std::time::Duration;
use tokio::sync::mpsc;

fn format_message(format: &str, value: &str) -> String {
    format.replacen("%s", value, 1)
}

fn field<'a>(value: &'a Value, key: &str) -> Option<&'a str> {
    value.get(key).and_then(Value::as_str)
}

#[tokio::main]
async fn main() -> anyhow::Result<()> {
    init_structured_logging();
    println!("🧪 Orchestration demo (in-memory broker)");

    let config = OrchConfig::load(None).context("loading configuration")?;
    let adapter = Arc::new(InMemorySourceAdapter::new());
    let source = Arc::new(QueueSource::with_event_capacity(
        adapter.clone(),
        config.event_channel_capacity,
    ));
    let (printed_tx, mut printed) = mpsc::unbounded_channel::<String>();

    let mut worker = Worker::new(config.clone()).with_source(source.clone());

    worker.register("print", move |ctx: WorkerContext| {
        let printed_tx = printed_tx.clone();
        async move {
            let msg = field(ctx.input(), "msg").unwrap_or_default().to_string();
            println!("   Print: {msg}");
            let _ = printed_tx.send(msg);
            ctx.complete(Value::Null).await
        }
    })?;

    worker
        .register("format_string", |ctx: WorkerContext| async move {
            let Some(format) = field(ctx.input(), "format").map(str::to_string) else {
                return ctx
                    .retry(
                        ActionFailure::new("The format string is not valid")
                            .with_code("INVALID_FORMAT_STRING"),
                    )
                    .await;
            };
            let value = field(ctx.input(), "value").unwrap_or_default().to_string();
            ctx.complete(json!({ "str": format_message(&format, &value) }))
                .await
        })?
        .retry("INVALID_FORMAT_STRING", 3)?;

    worker.register("hello", |ctx: WorkerContext| async move {
        let name = field(ctx.input(), "name").unwrap_or("World").to_string();
        ctx.complete(json!({ "msg": format!("Hello {name}") })).await
    })?;

    // cross-frame state travels in vars, never in handler-local fields
    worker
        .register("generate_message", |mut ctx: WorkerContext| async move {
            let requested_at = chrono::Utc::now().to_rfc3339();
            ctx.vars_mut()
                .insert("req_time".to_string(), json!(requested_at));
            let sub_input = json!({
                "format": ctx.input().get("message").cloned().unwrap_or(Value::Null),
                "value": ctx.input().get("name").cloned().unwrap_or(Value::Null),
            });
            ctx.defer("format_string", sub_input, "formatted").await
        })?
        .callback("formatted", |ctx: WorkerContext| async move {
            if ctx.has_error() {
                let code = ctx.status().code().unwrap_or_default().to_string();
                let count = ctx.status().count.unwrap_or_default();
                return ctx
                    .complete(json!({
                        "msg": format!("Houston, Internal Application Error! ({code} after {count} attempts)")
                    }))
                    .await;
            }
            let formatted = ctx
                .result()
                .and_then(|result| field(result, "str"))
                .unwrap_or_default()
                .to_string();
            let requested_at = ctx
                .vars()
                .get("req_time")
                .and_then(Value::as_str)
                .unwrap_or_default()
                .to_string();
            ctx.complete(json!({ "msg": format!("{formatted} (requested {requested_at})") }))
                .await
        })?;

    let mut worker_events = worker.subscribe();
    let handle = worker.start().await?;
    println!("✅ Worker started: {:?}", handle.registered_actions());

    let client = Client::new(config.with_rpc(true)).with_source(source);
    client.connect().await?;

    println!("\n1️⃣  hello -> print");
    client
        .run("hello", json!({ "name": "World" }), Some("print"))
        .await?;
    wait_for_print(&mut printed).await?;

    println!("\n2️⃣  generate_message (defer with vars) -> print");
    client
        .run(
            "generate_message",
            json!({ "message": "Hello %s", "name": "World" }),
            Some("print"),
        )
        .await?;
    wait_for_print(&mut printed).await?;

    println!("\n3️⃣  generate_message with an invalid format (retries exhausted) -> print");
    client
        .run("generate_message", json!({ "name": "World" }), Some("print"))
        .await?;
    wait_for_print(&mut printed).await?;

    println!("\n4️⃣  rpc hello");
    let reply = client
        .call("hello", json!({ "name": "RPC" }), Some(Duration::from_secs(5)))
        .await?;
    println!("   Reply: status={:?} result={}", reply.status, reply.result);

    println!("\n5️⃣  rpc to an action nobody serves");
    let reply = client
        .call("nobody_home", Value::Null, Some(Duration::from_millis(200)))
        .await?;
    println!("   Reply: status={:?}", reply.status);
    println!("   Parked on 'nobody_home': {}", adapter.queue_len("nobody_home"));

    let mut tally: BTreeMap<&'static str, usize> = BTreeMap::new();
    while let Ok(published) = worker_events.try_recv() {
        *tally.entry(published.event.name()).or_default() += 1;
    }
    println!("\n📊 Worker events: {tally:?}");

    client.disconnect().await?;
    handle.shutdown();
    println!("\n🎉 Demo complete");
    Ok(())
}

async fn wait_for_print(printed: &mut mpsc::UnboundedReceiver<String>) -> anyhow::Result<String> {
    tokio::time::timeout(Duration::from_secs(5), printed.recv())
        .await
        .context("timed out waiting for print")?
        .context("print channel closed")
}
