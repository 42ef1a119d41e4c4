use criterion::{black_box, criterion_group, criterion_main, Criterion};
use orch_core::messaging::{Entry, Task};
use orch_core::worker::transitions;
use serde_json::{json, Map};

fn deep_task(depth: usize) -> Task {
    (0..depth).fold(Task::new("1.1"), |task, i| {
        task.with_entry(Entry::call(format!("action_{i}"), json!({ "n": i })))
    })
}

fn benchmark_defer_complete_cycle(c: &mut Criterion) {
    c.bench_function("defer_then_complete", |b| {
        b.iter(|| {
            let mut task = deep_task(4);
            transitions::defer(
                &mut task,
                "action_3#done",
                json!({ "n": 3 }),
                Map::new(),
                "sub",
                json!("input"),
            );
            transitions::complete(&mut task, json!("result"), None);
            black_box(task)
        })
    });
}

fn benchmark_task_serialization(c: &mut Criterion) {
    let task = deep_task(16);
    c.bench_function("task_to_json_depth_16", |b| {
        b.iter(|| black_box(task.to_json()))
    });

    let wire = serde_json::to_string(&task).unwrap_or_default();
    c.bench_function("task_from_str_depth_16", |b| {
        b.iter(|| black_box(serde_json::from_str::<Task>(&wire)))
    });
}

criterion_group!(benches, benchmark_defer_complete_cycle, benchmark_task_serialization);
criterion_main!(benches);
