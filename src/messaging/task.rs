//! # Task Stack Wire Types
//!
//! A [`Task`] is the unit the transport carries end-to-end. Its `stack` is a call
//! stack of [`Entry`] frames: the tail is what executes next, the frame beneath
//! it is what resumes when the tail completes. Only the top two frames are ever
//! inspected, so stacks may grow arbitrarily deep through recursive defers.
//!
//! Cross-frame state belongs in [`Entry::vars`]. Handlers run as stateless
//! functions and there is no guarantee that the worker processing a callback
//! frame is the one that processed the frame which deferred to it.

use serde::{Deserialize, Serialize};
use serde_json::{Map, Value};

/// Outcome of the action that produced a frame's input.
///
/// Every field is optional; an all-empty status means no outcome was recorded.
#[derive(Debug, Clone, Default, PartialEq, Eq, Serialize, Deserialize)]
pub struct ActionStatus {
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub code: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub msg: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub stack: Option<String>,
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub count: Option<u32>,
}

impl ActionStatus {
    /// Status carrying a code and a message
    pub fn new(code: impl Into<String>, msg: impl Into<String>) -> Self {
        Self {
            code: Some(code.into()),
            msg: Some(msg.into()),
            stack: None,
            count: None,
        }
    }

    /// True when no outcome has been recorded
    pub fn is_empty(&self) -> bool {
        self.code.is_none() && self.msg.is_none() && self.stack.is_none() && self.count.is_none()
    }

    /// Reset every field
    pub fn clear(&mut self) {
        *self = Self::default();
    }

    /// Overlay the fields that are present on `other`
    pub fn merge(&mut self, other: &ActionStatus) {
        if other.code.is_some() {
            self.code.clone_from(&other.code);
        }
        if other.msg.is_some() {
            self.msg.clone_from(&other.msg);
        }
        if other.stack.is_some() {
            self.stack.clone_from(&other.stack);
        }
        if other.count.is_some() {
            self.count = other.count;
        }
    }

    pub fn code(&self) -> Option<&str> {
        self.code.as_deref()
    }
}

/// Per-frame retry bookkeeping for one error code
#[derive(Debug, Clone, PartialEq, Eq, Serialize, Deserialize)]
pub struct RetryCounter {
    pub code: String,
    pub count: u32,
}

/// One frame of the task stack
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
#[serde(rename_all = "camelCase")]
pub struct Entry {
    /// Action this frame invokes next
    pub action: String,

    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub input: Option<Value>,

    /// Original caller input, present only on callback frames
    #[serde(default, skip_serializing_if = "Option::is_none")]
    pub deferred_input: Option<Value>,

    #[serde(default, skip_serializing_if = "Map::is_empty")]
    pub vars: Map<String, Value>,

    /// Outcome of the action that produced `input`. Older deployments call this
    /// field `error`; it is accepted on input and never written.
    #[serde(default, alias = "error", skip_serializing_if = "Option::is_none")]
    pub status: Option<ActionStatus>,

    #[serde(default, skip_serializing_if = "Vec::is_empty")]
    pub retries: Vec<RetryCounter>,
}

impl Entry {
    /// Frame that calls `action` with `input`
    pub fn call(action: impl Into<String>, input: Value) -> Self {
        Self {
            action: action.into(),
            input: Some(input),
            ..Default::default()
        }
    }

    /// Frame waiting for a result (no input yet)
    pub fn continuation(action: impl Into<String>) -> Self {
        Self {
            action: action.into(),
            ..Default::default()
        }
    }

    /// Callback frame preserving the caller's input across a nested call
    pub fn callback(action: impl Into<String>, deferred_input: Value) -> Self {
        Self {
            action: action.into(),
            deferred_input: Some(deferred_input),
            ..Default::default()
        }
    }

    pub fn with_vars(mut self, vars: Map<String, Value>) -> Self {
        self.vars = vars;
        self
    }

    pub fn with_status(mut self, status: ActionStatus) -> Self {
        self.status = Some(status);
        self
    }

    /// Status recorded on this frame, empty when none
    pub fn status_or_default(&self) -> ActionStatus {
        self.status.clone().unwrap_or_default()
    }

    /// Retry counter for `code`, if one was recorded
    pub fn retry_count(&self, code: &str) -> Option<u32> {
        self.retries
            .iter()
            .rev()
            .find(|counter| counter.code == code)
            .map(|counter| counter.count)
    }
}

/// The unit transported end-to-end
#[derive(Debug, Clone, Default, PartialEq, Serialize, Deserialize)]
pub struct Task {
    pub version: String,
    pub stack: Vec<Entry>,
}

impl Task {
    pub fn new(version: impl Into<String>) -> Self {
        Self {
            version: version.into(),
            stack: Vec::new(),
        }
    }

    /// Push a frame (builder style)
    pub fn with_entry(mut self, entry: Entry) -> Self {
        self.stack.push(entry);
        self
    }

    pub fn depth(&self) -> usize {
        self.stack.len()
    }

    pub fn is_empty(&self) -> bool {
        self.stack.is_empty()
    }

    /// Frame that executes next
    pub fn current(&self) -> Option<&Entry> {
        self.stack.last()
    }

    pub fn current_mut(&mut self) -> Option<&mut Entry> {
        self.stack.last_mut()
    }

    /// Frame that resumes when the current one completes
    pub fn continuation(&self) -> Option<&Entry> {
        self.stack.len().checked_sub(2).and_then(|i| self.stack.get(i))
    }

    /// Action the transport should route this task to
    pub fn next_action(&self) -> Option<&str> {
        self.current().map(|entry| entry.action.as_str())
    }

    pub fn to_json(&self) -> Result<Value, serde_json::Error> {
        serde_json::to_value(self)
    }

    pub fn from_json(json: Value) -> Result<Self, serde_json::Error> {
        serde_json::from_value(json)
    }
}
