//! Proptest strategies for task stacks

#![allow(dead_code)]

use orch_core::messaging::{ActionStatus, Entry, Task};
use proptest::prelude::*;
use serde_json::{json, Map, Value};

pub fn action_name_strategy() -> impl Strategy<Value = String> {
    "[a-z][a-z_]{0,15}"
}

pub fn json_value_strategy() -> impl Strategy<Value = Value> {
    prop_oneof![
        Just(Value::Null),
        any::<bool>().prop_map(Value::Bool),
        any::<i64>().prop_map(|n| json!(n)),
        "[a-zA-Z %]{0,20}".prop_map(Value::String),
        ("[a-z]{1,8}", any::<i32>()).prop_map(|(key, n)| {
            let mut object = Map::new();
            object.insert(key, json!(n));
            Value::Object(object)
        }),
    ]
}

pub fn vars_strategy() -> impl Strategy<Value = Map<String, Value>> {
    prop::collection::btree_map("[a-z]{1,8}", json_value_strategy(), 0..3)
        .prop_map(|vars| vars.into_iter().collect())
}

pub fn status_strategy() -> impl Strategy<Value = Option<ActionStatus>> {
    prop::option::of(("[A-Z_]{1,12}", "[a-z ]{0,20}", 1u32..5).prop_map(|(code, msg, count)| {
        ActionStatus {
            count: Some(count),
            ..ActionStatus::new(code, msg)
        }
    }))
}

pub fn entry_strategy() -> impl Strategy<Value = Entry> {
    (
        action_name_strategy(),
        prop::option::of(json_value_strategy()),
        vars_strategy(),
        status_strategy(),
    )
        .prop_map(|(action, input, vars, status)| Entry {
            action,
            input,
            vars,
            status,
            ..Default::default()
        })
}

/// Live task with 1..=8 frames
pub fn task_strategy() -> impl Strategy<Value = Task> {
    prop::collection::vec(entry_strategy(), 1..=8).prop_map(|stack| Task {
        version: "1.1".to_string(),
        stack,
    })
}
