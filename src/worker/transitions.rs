//! # Stack Transitions
//!
//! The push/pop discipline behind every context operation, as pure functions
//! over a [`Task`]. Only the top two frames are ever touched.

use crate::messaging::task::{ActionStatus, Entry, RetryCounter, Task};
use serde_json::{Map, Value};

/// Where a task goes after a transition
#[derive(Debug, Clone, Copy, PartialEq, Eq)]
pub enum StackOutcome {
    /// Re-enqueue toward the new tail action
    Forward,
    /// The last frame completed; nothing is left to run
    Terminated,
}

/// Pop the tail and hand `result` to the continuation, attaching `status`
/// when it is non-empty.
pub fn complete(task: &mut Task, result: Value, status: Option<ActionStatus>) -> StackOutcome {
    if task.depth() < 2 {
        task.stack.clear();
        return StackOutcome::Terminated;
    }

    task.stack.pop();
    if let Some(continuation) = task.current_mut() {
        continuation.input = Some(result);
        continuation.status = status.filter(|status| !status.is_empty());
    }
    StackOutcome::Forward
}

/// Pop the tail and attach `status` to the continuation. A failure at the
/// bottom of the stack terminates the task and is discarded.
pub fn fail(task: &mut Task, status: ActionStatus) -> StackOutcome {
    if task.depth() < 2 {
        task.stack.clear();
        return StackOutcome::Terminated;
    }

    task.stack.pop();
    if let Some(continuation) = task.current_mut() {
        continuation.status = Some(status);
    }
    StackOutcome::Forward
}

/// Increment (or create) the tail frame's counter for `code` and return it
pub fn record_retry(task: &mut Task, code: &str) -> u32 {
    let Some(entry) = task.current_mut() else {
        return 0;
    };

    match entry.retries.iter_mut().rev().find(|counter| counter.code == code) {
        Some(counter) => {
            counter.count += 1;
            counter.count
        }
        None => {
            entry.retries.push(RetryCounter {
                code: code.to_string(),
                count: 1,
            });
            1
        }
    }
}

/// Replace the tail with a callback frame and push a call frame above it.
/// Net depth change is +1.
pub fn defer(
    task: &mut Task,
    callback_action: &str,
    deferred_input: Value,
    vars: Map<String, Value>,
    sub_action: &str,
    sub_input: Value,
) -> StackOutcome {
    task.stack.pop();
    task.stack
        .push(Entry::callback(callback_action, deferred_input).with_vars(vars));
    task.stack.push(Entry::call(sub_action, sub_input));
    StackOutcome::Forward
}

#[cfg(test)]
mod tests {
    use super::*;
    use serde_json::json;

    fn two_frames() -> Task {
        Task::new("1.1")
            .with_entry(Entry::continuation("print"))
            .with_entry(Entry::call("format_string", json!({"format": "Hello %s"})))
    }

    #[test]
    fn test_complete_hands_result_to_continuation() {
        let mut task = two_frames();
        let outcome = complete(&mut task, json!({"str": "Hello World"}), None);

        assert_eq!(outcome, StackOutcome::Forward);
        assert_eq!(task.depth(), 1);
        let top = task.current().unwrap();
        assert_eq!(top.action, "print");
        assert_eq!(top.input, Some(json!({"str": "Hello World"})));
        assert!(top.status.is_none());
    }

    #[test]
    fn test_complete_attaches_only_non_empty_status() {
        let mut task = two_frames();
        complete(&mut task, json!(1), Some(ActionStatus::default()));
        assert!(task.current().unwrap().status.is_none());

        let mut task = two_frames();
        complete(&mut task, json!(1), Some(ActionStatus::new("SUCCESS", "done")));
        assert_eq!(task.current().unwrap().status_or_default().code(), Some("SUCCESS"));
    }

    #[test]
    fn test_last_frame_terminates() {
        let mut task = Task::new("1.1").with_entry(Entry::call("print", json!("hi")));
        assert_eq!(complete(&mut task, json!(null), None), StackOutcome::Terminated);
        assert!(task.is_empty());

        let mut task = Task::new("1.1").with_entry(Entry::call("print", json!("hi")));
        assert_eq!(
            fail(&mut task, ActionStatus::new("BOOM", "boom")),
            StackOutcome::Terminated
        );
        assert!(task.is_empty());
    }

    #[test]
    fn test_fail_keeps_continuation_input() {
        let mut task = Task::new("1.1")
            .with_entry(Entry::call("receive", json!("kept")))
            .with_entry(Entry::call("generate", json!(null)));
        fail(&mut task, ActionStatus::new("ACTION_NOT_FOUND", "missing"));

        let top = task.current().unwrap();
        assert_eq!(top.input, Some(json!("kept")));
        assert_eq!(top.status_or_default().code(), Some("ACTION_NOT_FOUND"));
    }

    #[test]
    fn test_record_retry_counts_per_code() {
        let mut task = two_frames();
        assert_eq!(record_retry(&mut task, "TIMEOUT"), 1);
        assert_eq!(record_retry(&mut task, "TIMEOUT"), 2);
        assert_eq!(record_retry(&mut task, "SERVICE_UNAVAILABLE"), 1);
        assert_eq!(task.current().unwrap().retry_count("TIMEOUT"), Some(2));
        assert_eq!(record_retry(&mut Task::new("1.1"), "TIMEOUT"), 0);
    }

    #[test]
    fn test_defer_replaces_tail_with_callback_and_call() {
        let mut task = two_frames();
        let mut vars = Map::new();
        vars.insert("suffix".to_string(), json!("!"));

        defer(
            &mut task,
            "format_string#formatted",
            json!({"format": "Hello %s"}),
            vars,
            "reverse_string",
            json!("dlroW"),
        );

        assert_eq!(task.depth(), 3);
        let callback = &task.stack[1];
        assert_eq!(callback.action, "format_string#formatted");
        assert_eq!(callback.deferred_input, Some(json!({"format": "Hello %s"})));
        assert_eq!(callback.vars.get("suffix"), Some(&json!("!")));
        assert!(callback.input.is_none());
        assert_eq!(task.current().unwrap().action, "reverse_string");
        assert_eq!(task.current().unwrap().input, Some(json!("dlroW")));
    }
}
