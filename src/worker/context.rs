//! # Worker Context
//!
//! Per-delivery execution context handed to an [`ActionHandler`]. It exposes
//! the frame's input, the sub-call result for callbacks, the status left by
//! the previous action and the frame's `vars`, plus the terminal operations
//! that mutate the stack and re-submit it.
//!
//! Every terminal operation consumes the context, so a handler ends its turn
//! exactly once. After the stack mutation is committed the context publishes
//! [`WorkerEvent::ActionCompleted`]. Requesting the next delivery is left to
//! the dispatcher, which does it when the handler returns.
//!
//! An accumulated [`delay`](WorkerContext::delay) moves the commit onto its
//! own task: the terminal operation returns at once and the delivery is
//! acknowledged, so other tasks for the same action keep flowing.
//!
//! State that must survive a `defer` belongs in [`WorkerContext::vars_mut`];
//! the callback frame may be processed by a different worker.
//!
//! [`ActionHandler`]: crate::worker::ActionHandler

use crate::constants::status_codes::UNHANDLED_EXCEPTION;
use crate::error::{OrchError, Result};
use crate::events::{ActionOutcome, WorkerEvent};
use crate::messaging::task::{ActionStatus, Task};
use crate::worker::engine::WorkerRuntime;
use crate::worker::handler::ActionFailure;
use crate::worker::transitions::{self, StackOutcome};
use serde_json::{Map, Value};
use std::sync::Arc;
use std::time::Duration;
use tracing::{debug, error, warn};

pub struct WorkerContext {
    runtime: Arc<WorkerRuntime>,
    task: Task,
    action: String,
    is_callback: bool,
    input: Value,
    result: Option<Value>,
    status: ActionStatus,
    vars: Map<String, Value>,
    delay: Duration,
    finished: bool,
}

impl std::fmt::Debug for WorkerContext {
    fn fmt(&self, f: &mut std::fmt::Formatter<'_>) -> std::fmt::Result {
        f.debug_struct("WorkerContext")
            .field("action", &self.action)
            .field("is_callback", &self.is_callback)
            .field("depth", &self.task.depth())
            .field("delay", &self.delay)
            .finish_non_exhaustive()
    }
}

impl WorkerContext {
    pub(crate) fn new(runtime: Arc<WorkerRuntime>, task: Task) -> Self {
        let (action, input, deferred_input, status, vars) = match task.current() {
            Some(entry) => (
                entry.action.clone(),
                entry.input.clone(),
                entry.deferred_input.clone(),
                entry.status_or_default(),
                entry.vars.clone(),
            ),
            None => Default::default(),
        };

        let is_callback = runtime
            .registry
            .get(&action)
            .is_some_and(|metadata| metadata.is_callback());

        // callbacks see the caller's original input and the sub-call's output
        let (input, result) = if is_callback {
            (deferred_input.unwrap_or_default(), Some(input.unwrap_or_default()))
        } else {
            (input.unwrap_or_default(), None)
        };

        Self {
            runtime,
            task,
            action,
            is_callback,
            input,
            result,
            status,
            vars,
            delay: Duration::ZERO,
            finished: false,
        }
    }

    /// Action of the frame being executed
    pub fn action(&self) -> &str {
        &self.action
    }

    pub fn input(&self) -> &Value {
        &self.input
    }

    /// Output of the deferred sub-call; only set for callbacks
    pub fn result(&self) -> Option<&Value> {
        self.result.as_ref()
    }

    /// Status left by the action that produced this frame's input
    pub fn status(&self) -> &ActionStatus {
        &self.status
    }

    pub fn has_error(&self) -> bool {
        !self.status.is_empty()
    }

    pub fn vars(&self) -> &Map<String, Value> {
        &self.vars
    }

    pub fn vars_mut(&mut self) -> &mut Map<String, Value> {
        &mut self.vars
    }

    pub fn is_callback(&self) -> bool {
        self.is_callback
    }

    /// True when no continuation sits beneath the current frame
    pub fn is_last_call(&self) -> bool {
        self.task.continuation().is_none()
    }

    pub fn task(&self) -> &Task {
        &self.task
    }

    /// Postpone the terminal operation by `by`. Calls accumulate.
    pub fn delay(&mut self, by: Duration) -> &mut Self {
        self.delay += by;
        self
    }

    pub fn delay_ms(&mut self, ms: u64) -> &mut Self {
        self.delay(Duration::from_millis(ms))
    }

    /// Complete with `result`, handing it to the continuation
    pub async fn complete(self, result: Value) -> Result<()> {
        self.finish(result, None).await
    }

    /// Complete with `result` and an explicit status for the continuation
    pub async fn success(
        self,
        result: Value,
        code: impl Into<String>,
        msg: impl Into<String>,
    ) -> Result<()> {
        self.finish(result, Some(ActionStatus::new(code, msg))).await
    }

    /// Fail without retrying; the continuation observes the failure status
    pub async fn fail(mut self, failure: impl Into<ActionFailure>) -> Result<()> {
        let status = failure_status(failure.into());
        debug!(
            action = %self.action,
            code = status.code().unwrap_or_default(),
            "❌ Action failed"
        );
        self.commit(ActionOutcome::Failed, move |task| transitions::fail(task, status))
            .await
    }

    /// Re-run the current frame unless the retry ceiling for the failure's
    /// code is reached, in which case this becomes a `fail` carrying the
    /// attempt count.
    pub async fn retry(mut self, failure: impl Into<ActionFailure>) -> Result<()> {
        let mut failure = failure.into();
        let code = failure
            .code
            .get_or_insert_with(|| UNHANDLED_EXCEPTION.to_string())
            .clone();

        let count = transitions::record_retry(&mut self.task, &code);
        let policy = self.runtime.registry.retry_policy(&self.action, &code);
        if count >= policy.max_count {
            debug!(
                action = %self.action,
                code = %code,
                count = count,
                max_count = policy.max_count,
                "🛑 Retries exhausted"
            );
            return self.fail(failure.with_count(count)).await;
        }

        debug!(action = %self.action, code = %code, count = count, "🔁 Retrying action");
        let vars = std::mem::take(&mut self.vars);
        self.commit(ActionOutcome::Retried, move |task| {
            if let Some(entry) = task.current_mut() {
                entry.vars = vars;
            }
            StackOutcome::Forward
        })
        .await
    }

    /// Call `action` with `input` and resume in callback `callback` of the
    /// current root once it completes.
    pub async fn defer(mut self, action: &str, input: Value, callback: &str) -> Result<()> {
        if action.is_empty() {
            self.finished = true;
            return Err(OrchError::MissingActionName);
        }
        let callback_action = match self.runtime.registry.resolve_callback(&self.action, callback) {
            Ok(name) => name,
            Err(err) => {
                self.finished = true;
                return Err(err);
            }
        };

        let deferred_input = std::mem::take(&mut self.input);
        let vars = std::mem::take(&mut self.vars);
        let sub_action = action.to_string();
        debug!(
            action = %self.action,
            sub_action = %sub_action,
            callback = %callback_action,
            "↪️ Deferring to sub-action"
        );
        self.commit(ActionOutcome::Deferred, move |task| {
            transitions::defer(task, &callback_action, deferred_input, vars, &sub_action, input)
        })
        .await
    }

    async fn finish(mut self, result: Value, status: Option<ActionStatus>) -> Result<()> {
        self.commit(ActionOutcome::Completed, move |task| {
            transitions::complete(task, result, status)
        })
        .await
    }

    async fn commit<F>(&mut self, outcome: ActionOutcome, transition: F) -> Result<()>
    where
        F: FnOnce(&mut Task) -> StackOutcome + Send + 'static,
    {
        self.finished = true;
        let pending = PendingCommit {
            runtime: Arc::clone(&self.runtime),
            action: self.action.clone(),
            task: std::mem::take(&mut self.task),
            outcome,
        };

        if self.delay.is_zero() {
            return pending.apply(transition).await;
        }

        let delay = self.delay;
        debug!(
            action = %self.action,
            delay_ms = delay.as_millis() as u64,
            "⏳ Delaying terminal operation"
        );
        tokio::spawn(async move {
            tokio::time::sleep(delay).await;
            let runtime = Arc::clone(&pending.runtime);
            let action = pending.action.clone();
            if let Err(err) = pending.apply(transition).await {
                error!(action = %action, error = %err, "❌ Delayed commit failed");
                runtime.events.publish(WorkerEvent::HandlerError {
                    action,
                    message: err.to_string(),
                });
            }
        });
        Ok(())
    }
}

/// Stack mutation waiting to be applied and forwarded
struct PendingCommit {
    runtime: Arc<WorkerRuntime>,
    action: String,
    task: Task,
    outcome: ActionOutcome,
}

impl PendingCommit {
    async fn apply<F>(mut self, transition: F) -> Result<()>
    where
        F: FnOnce(&mut Task) -> StackOutcome,
    {
        let stack_outcome = transition(&mut self.task);
        let depth = self.task.depth();

        match stack_outcome {
            StackOutcome::Forward => self.runtime.source.enqueue(self.task).await?,
            StackOutcome::Terminated => {
                debug!(action = %self.action, "🏁 Task terminated");
            }
        }

        self.runtime.events.publish(WorkerEvent::ActionCompleted {
            action: self.action,
            outcome: self.outcome,
            depth,
        });
        Ok(())
    }
}

impl Drop for WorkerContext {
    fn drop(&mut self) {
        if !self.finished {
            warn!(
                action = %self.action,
                "⚠️ Worker context dropped without a terminal operation; task discarded"
            );
        }
    }
}

fn failure_status(failure: ActionFailure) -> ActionStatus {
    ActionStatus {
        code: Some(
            failure
                .code
                .unwrap_or_else(|| UNHANDLED_EXCEPTION.to_string()),
        ),
        msg: Some(failure.message),
        stack: failure.trace,
        count: Some(failure.count.unwrap_or(1)),
    }
}

#[cfg(test)]
mod tests {
    use super::*;
    use crate::messaging::task::Entry;
    use crate::worker::engine::tests::runtime_with;
    use serde_json::json;

    #[tokio::test]
    async fn test_callback_context_sees_deferred_input_and_result() {
        let (runtime, _) = runtime_with(|registry| {
            let noop = Arc::new(|ctx: WorkerContext| async move { ctx.complete(Value::Null).await });
            registry.register_root("root", noop.clone()).unwrap();
            registry.register_callback("root", "done", noop).unwrap();
        })
        .await;

        let mut callback = Entry::callback("root#done", json!({"format": "s% olleH"}));
        callback.input = Some(json!("Hello %s"));
        let task = Task::new("1.1").with_entry(callback);

        let ctx = WorkerContext::new(runtime, task);
        assert!(ctx.is_callback());
        assert!(ctx.is_last_call());
        assert_eq!(ctx.input(), &json!({"format": "s% olleH"}));
        assert_eq!(ctx.result(), Some(&json!("Hello %s")));
        ctx.complete(Value::Null).await.unwrap();
    }

    #[tokio::test]
    async fn test_fail_normalizes_missing_code() {
        let (runtime, adapter) = runtime_with(|_| {}).await;
        let task = Task::new("1.1")
            .with_entry(Entry::continuation("receive"))
            .with_entry(Entry::call("work", json!(null)));

        WorkerContext::new(runtime, task)
            .fail("something broke")
            .await
            .unwrap();

        let delivered = adapter.queued_tasks("receive");
        let status = delivered[0].current().unwrap().status_or_default();
        assert_eq!(status.code(), Some("UNHANDLED_EXCEPTION"));
        assert_eq!(status.msg.as_deref(), Some("something broke"));
        assert_eq!(status.count, Some(1));
    }

    #[tokio::test]
    async fn test_delay_postpones_commit_without_holding_the_caller() {
        let (runtime, adapter) = runtime_with(|_| {}).await;
        let mut events = runtime.events.subscribe();
        let task = Task::new("1.1")
            .with_entry(Entry::continuation("receive"))
            .with_entry(Entry::call("work", json!(null)));

        let mut ctx = WorkerContext::new(runtime, task);
        ctx.delay_ms(20).delay_ms(20);

        let started = tokio::time::Instant::now();
        ctx.complete(json!("late")).await.unwrap();
        assert!(started.elapsed() < Duration::from_millis(40));
        assert_eq!(adapter.queue_len("receive"), 0);

        let event = tokio::time::timeout(Duration::from_secs(2), events.recv())
            .await
            .unwrap()
            .unwrap()
            .event;
        assert!(matches!(
            event,
            WorkerEvent::ActionCompleted {
                outcome: ActionOutcome::Completed,
                depth: 1,
                ..
            }
        ));
        assert!(started.elapsed() >= Duration::from_millis(40));
        assert_eq!(adapter.queued_tasks("receive")[0].current().unwrap().input, Some(json!("late")));
    }

    #[tokio::test]
    async fn test_defer_to_unknown_callback_is_a_programming_error() {
        let (runtime, adapter) = runtime_with(|registry| {
            let noop = Arc::new(|ctx: WorkerContext| async move { ctx.complete(Value::Null).await });
            registry.register_root("root", noop).unwrap();
        })
        .await;
        let task = Task::new("1.1").with_entry(Entry::call("root", json!(1)));

        let err = WorkerContext::new(runtime, task)
            .defer("sub", json!(2), "missing")
            .await
            .unwrap_err();

        assert!(matches!(err, OrchError::CallbackNotFound { .. }));
        assert_eq!(adapter.queue_len("sub"), 0);
    }
}
